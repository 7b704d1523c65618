mod cli;
mod commands;
mod config;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use jex_store::{CommandPackageManager, ComponentManager, ExchangeError, ProjectConfig, Publisher};

use crate::cli::{Cli, Commands};
use crate::commands::*;
use crate::config::Config;
use crate::prompt::InquireCredentials;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("❌ {}", e);
        if let Some(err) = e.downcast_ref::<ExchangeError>()
            && !err.is_user_error()
        {
            eprintln!("💡 Run with RUST_LOG=debug for details");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let Cli {
        project,
        exchange_url,
        dry_run,
        command,
    } = cli;

    // User configuration never needs an exchange
    let command = match command {
        Commands::Config { command } => return handle_config_command(command, dry_run).await,
        other => other,
    };

    let project_root = match project {
        Some(path) => path,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let project_config = ProjectConfig::load(&project_root).await?;
    let config = Config::load().await?;
    let options = config.exchange_options(&project_root, &project_config, exchange_url)?;
    tracing::debug!("Using exchange {}", options.exchange_url);

    let manager = ComponentManager::with_defaults(
        options,
        Arc::new(InquireCredentials),
        Arc::new(CommandPackageManager::new(config.host.program.clone())),
    )?;

    match command {
        Commands::Add { components } => handle_add_command(components, &manager, dry_run).await,
        Commands::Remove { components } => {
            handle_remove_command(components, &manager, dry_run).await
        }
        Commands::Update { components } => {
            handle_update_command(components, &manager, dry_run).await
        }
        Commands::AddPack { pack } => handle_add_pack_command(pack, &manager, dry_run).await,
        Commands::RemovePack { pack } => handle_remove_pack_command(pack, &manager, dry_run).await,
        Commands::List => handle_list_command(&manager).await,
        Commands::Publish { target, cache } => {
            let publisher = Publisher::new(manager.client().clone());
            handle_publish_command(target, cache, &publisher, dry_run).await
        }
        Commands::Login => handle_login_command(&manager).await,
        Commands::Logout => handle_logout_command(&manager).await,
        Commands::Config { .. } => Ok(()),
    }
}
