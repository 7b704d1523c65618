use std::path::PathBuf;

use url::Url;

#[derive(clap::Parser, Debug)]
#[clap(name = "jex", version, about = "Install and publish components from an exchange")]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,

    /// Exchange URL, overriding the project and user configuration
    #[clap(long, global = true)]
    pub exchange_url: Option<Url>,

    /// Show what would be done without doing it
    #[clap(long, global = true)]
    pub dry_run: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Add components (`name` or `name@version`)
    Add {
        #[clap(required = true)]
        components: Vec<String>,
    },
    /// Remove components
    Remove {
        #[clap(required = true)]
        components: Vec<String>,
    },
    /// Update components to a newer version
    Update {
        #[clap(required = true)]
        components: Vec<String>,
    },
    /// Add a pack with all of its members
    AddPack {
        /// Pack name, optionally `name@version`
        pack: String,
    },
    /// Remove a pack with all of its installed members
    RemovePack { pack: String },
    /// List installed components and packs
    List,
    /// Publish a built component to the exchange
    Publish {
        /// Component directory, or a component name when --cache is given
        target: String,
        /// Component cache written by the application build
        #[clap(long)]
        cache: Option<PathBuf>,
    },
    /// Log in to the exchange and store an access token
    Login,
    /// Remove the stored access token
    Logout,
    /// Manage user configuration
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set { key: String, value: String },
    /// Get a configuration value
    Get { key: String },
    /// Show all configuration
    Show,
    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[clap(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_add_with_global_flags() {
        let cli = Cli::parse_from([
            "jex",
            "add",
            "oj-sample@1.2.0",
            "oj-other",
            "--dry-run",
            "--exchange-url",
            "https://exchange.example.com/api/",
        ]);

        assert!(cli.dry_run);
        assert_eq!(
            cli.exchange_url.unwrap().as_str(),
            "https://exchange.example.com/api/"
        );
        match cli.command {
            Commands::Add { components } => assert_eq!(components, ["oj-sample@1.2.0", "oj-other"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_add_requires_components() {
        assert!(Cli::try_parse_from(["jex", "add"]).is_err());
    }

    #[test]
    fn test_parse_publish_from_cache() {
        let cli = Cli::parse_from(["jex", "publish", "oj-sample", "--cache", "web/.cache.json"]);
        match cli.command {
            Commands::Publish { target, cache } => {
                assert_eq!(target, "oj-sample");
                assert_eq!(cache, Some(PathBuf::from("web/.cache.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
