use eyre::Result;
use jex_store::{
    ChangeEntry, ComponentManager, ComponentRequest, Environment, ReconcileReport,
};

fn parse_requests(components: &[String]) -> Result<Vec<ComponentRequest>> {
    components
        .iter()
        .map(|c| c.parse::<ComponentRequest>().map_err(eyre::Report::from))
        .collect()
}

/// Handle the add command - resolve and install components
pub async fn handle_add_command(
    components: Vec<String>,
    manager: &ComponentManager,
    dry_run: bool,
) -> Result<()> {
    let requests = parse_requests(&components)?;

    if dry_run {
        for request in &requests {
            println!("Would add component: {}", request);
        }
        return Ok(());
    }

    println!("📦 Adding {} component(s)...", requests.len());
    let report = manager.add(&requests).await?;
    print_report(&report);
    println!("✅ Components added successfully!");
    Ok(())
}

/// Handle the update command - move components to newer versions
pub async fn handle_update_command(
    components: Vec<String>,
    manager: &ComponentManager,
    dry_run: bool,
) -> Result<()> {
    let requests = parse_requests(&components)?;

    if dry_run {
        for request in &requests {
            println!("Would update component: {}", request);
        }
        return Ok(());
    }

    println!("🔄 Updating {} component(s)...", requests.len());
    let report = manager.update(&requests).await?;
    print_report(&report);
    println!("✅ Components updated successfully!");
    Ok(())
}

/// Handle the remove command
pub async fn handle_remove_command(
    components: Vec<String>,
    manager: &ComponentManager,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        for name in &components {
            println!("Would remove component: {}", name);
        }
        return Ok(());
    }

    println!("🗑️  Removing {} component(s)...", components.len());
    let report = manager.remove(&components).await?;
    print_report(&report);
    println!("✅ Components removed successfully!");
    Ok(())
}

pub async fn handle_add_pack_command(
    pack: String,
    manager: &ComponentManager,
    dry_run: bool,
) -> Result<()> {
    let request: ComponentRequest = pack.parse()?;

    if dry_run {
        println!("Would add pack: {}", request);
        return Ok(());
    }

    println!("📦 Adding pack {}...", request);
    let report = manager.add_pack(&request).await?;
    print_report(&report);
    println!("✅ Pack added successfully!");
    Ok(())
}

pub async fn handle_remove_pack_command(
    pack: String,
    manager: &ComponentManager,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("Would remove pack: {}", pack);
        return Ok(());
    }

    println!("🗑️  Removing pack {}...", pack);
    let report = manager.remove_pack(&pack).await?;
    print_report(&report);
    println!("✅ Pack removed successfully!");
    Ok(())
}

pub async fn handle_list_command(manager: &ComponentManager) -> Result<()> {
    let environment = manager.list().await?;
    print!("{}", format_environment(&environment));
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    for name in &report.removed {
        println!("  - {}", name);
    }
    for name in &report.skipped {
        println!("  = {} (already installed)", name);
    }
    for unit in &report.installed {
        println!("  + {}", unit.descriptor);
    }

    let timings: Vec<String> = report
        .timings
        .iter()
        .map(|(bucket, elapsed)| format!("{} {:.2?}", bucket, elapsed))
        .collect();
    if !timings.is_empty() {
        println!("⏱️  {}", timings.join(", "));
    }
}

fn format_environment(environment: &Environment) -> String {
    if environment.is_empty() {
        return "No components installed.\n".to_string();
    }

    let mut out = format!("📚 Installed ({}):\n", environment.entries().len());
    for (name, entry) in environment.entries() {
        match entry {
            ChangeEntry::Version(version) => {
                out.push_str(&format!("  {}@{}\n", name, version));
            }
            ChangeEntry::Pack(pack) => {
                out.push_str(&format!("  {}@{} (pack)\n", name, pack.version));
                let count = pack.components.len();
                for (index, (member, version)) in pack.components.iter().enumerate() {
                    let branch = if index + 1 == count { "└─" } else { "├─" };
                    out.push_str(&format!("    {} {}@{}\n", branch, member, version));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use jex_store::{ChangeMap, PackEntry};

    #[test]
    fn test_parse_requests_rejects_bad_names() {
        let ok = parse_requests(&["oj-sample@1.2.0".to_string()]).unwrap();
        assert_eq!(ok[0].name, "oj-sample");
        assert!(parse_requests(&["../oj-sample".to_string()]).is_err());
    }

    #[test]
    fn test_format_environment() {
        let environment = Environment::from_entries(ChangeMap::from([
            (
                "oj-pack".to_string(),
                ChangeEntry::Pack(PackEntry {
                    version: "1.0.0".to_string(),
                    components: [("button", "1.0.0"), ("input", "1.1.0")]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }),
            ),
            (
                "oj-sample".to_string(),
                ChangeEntry::Version("1.2.0".to_string()),
            ),
        ]));

        let out = format_environment(&environment);
        assert!(out.contains("oj-pack@1.0.0 (pack)"));
        assert!(out.contains("├─ button@1.0.0"));
        assert!(out.contains("└─ input@1.1.0"));
        assert!(out.contains("oj-sample@1.2.0"));

        assert_eq!(
            format_environment(&Environment::default()),
            "No components installed.\n"
        );
    }
}
