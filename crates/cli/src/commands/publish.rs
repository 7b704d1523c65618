use std::path::{Path, PathBuf};

use eyre::Result;
use jex_store::{JsonComponentCache, PublishOutcome, Publisher};

/// Handle the publish command - upload a built component
///
/// With `--cache` the target is a component name looked up in the build cache,
/// otherwise it is the component directory itself.
pub async fn handle_publish_command(
    target: String,
    cache: Option<PathBuf>,
    publisher: &Publisher,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        match &cache {
            Some(cache) => println!(
                "Would publish component '{}' from cache {}",
                target,
                cache.display()
            ),
            None => println!("Would publish component directory {}", target),
        }
        return Ok(());
    }

    let outcome = match cache {
        Some(cache_path) => {
            let cache = JsonComponentCache::load(&cache_path).await?;
            println!("📤 Publishing {}...", target);
            publisher.publish_component(&cache, &target).await?
        }
        None => {
            let dir = Path::new(&target);
            println!("📤 Publishing {}...", dir.display());
            publisher.publish_directory(dir).await?
        }
    };

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &PublishOutcome) {
    println!(
        "✅ Published {}@{} ({} bytes)",
        outcome.full_name, outcome.version, outcome.archive_size
    );
    if !outcome.response.is_null() {
        println!("{}", outcome.response);
    }
}
