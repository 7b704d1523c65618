use eyre::Result;
use inquire::Confirm;

use crate::cli::ConfigCommands;
use crate::config::Config;

pub async fn handle_config_command(cmd: ConfigCommands, dry_run: bool) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => handle_set_config(key, value, dry_run).await,
        ConfigCommands::Get { key } => handle_get_config(key).await,
        ConfigCommands::Show => handle_show_config().await,
        ConfigCommands::Reset { force } => handle_reset_config(force, dry_run).await,
    }
}

async fn handle_set_config(key: String, value: String, dry_run: bool) -> Result<()> {
    let mut config = Config::load().await?;
    // Validate before the dry-run short circuit so typos surface either way
    config.set_value(&key, &value)?;

    if dry_run {
        println!("Would set config: {} = {}", key, value);
        return Ok(());
    }

    config.save().await?;
    println!("✅ Configuration updated: {} = {}", key, value);
    Ok(())
}

async fn handle_get_config(key: String) -> Result<()> {
    let config = Config::load().await?;
    println!("{}: {}", key, config.get_value(&key)?);
    Ok(())
}

async fn handle_show_config() -> Result<()> {
    let config = Config::load().await?;
    println!("{}", config.show_all());
    println!("\n📁 {}", Config::get_config_path().display());
    Ok(())
}

async fn handle_reset_config(force: bool, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("Would reset configuration to defaults");
        return Ok(());
    }

    if !force {
        let confirmed = tokio::task::spawn_blocking(|| {
            Confirm::new("Reset all jex configuration to defaults?")
                .with_default(false)
                .prompt()
        })
        .await??;
        if !confirmed {
            println!("❌ Cancelled");
            return Ok(());
        }
    }

    Config::reset().await?;
    println!("✅ Configuration reset to defaults");
    Ok(())
}
