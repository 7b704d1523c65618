use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use eyre::Result;
use jex_store::options::{DEFAULT_FETCH_ATTEMPTS, DEFAULT_MAX_AUTH_RETRIES};
use jex_store::{ExchangeOptions, ProjectConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub url: Option<String>,
    pub max_auth_retries: u32,
    pub fetch_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Package manager used for reference components
    pub program: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_auth_retries: DEFAULT_MAX_AUTH_RETRIES,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
        }
    }
}

impl Config {
    pub fn get_config_path() -> PathBuf {
        get_default_config_dir().join("config.json")
    }

    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()).await
    }

    pub async fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()).await
    }

    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, content).await?;
        Ok(())
    }

    /// Options for one invocation.
    ///
    /// The exchange URL comes from the command line, then the project config, then
    /// this user config.
    pub fn exchange_options(
        &self,
        project_root: &Path,
        project: &ProjectConfig,
        url_override: Option<Url>,
    ) -> Result<ExchangeOptions> {
        let url = match url_override.or_else(|| project.exchange_url.clone()) {
            Some(url) => url,
            None => {
                let configured = self.exchange.url.as_deref().ok_or_else(|| {
                    eyre::eyre!(
                        "No exchange configured. Use --exchange-url, set exchangeUrl in jex.json or run `jex config set exchange.url <url>`"
                    )
                })?;
                Url::parse(configured)
                    .map_err(|e| eyre::eyre!("Invalid exchange URL '{}': {}", configured, e))?
            }
        };

        let mut options = ExchangeOptions::new(project_root, url)
            .with_fetch_attempts(self.exchange.fetch_attempts)
            .with_max_auth_retries(self.exchange.max_auth_retries);
        if let Some(dir) = &project.components_dir {
            options = options.with_components_dir(dir.clone());
        }
        Ok(options)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["exchange", "url"] => {
                self.exchange.url = if value.is_empty() {
                    None
                } else {
                    Url::parse(value).map_err(|e| eyre::eyre!("Invalid URL '{}': {}", value, e))?;
                    Some(value.to_string())
                };
            }
            ["exchange", "max_auth_retries"] => {
                self.exchange.max_auth_retries = value
                    .parse::<u32>()
                    .map_err(|_| eyre::eyre!("Invalid number: {}", value))?;
            }
            ["exchange", "fetch_attempts"] => {
                let attempts = value
                    .parse::<u32>()
                    .map_err(|_| eyre::eyre!("Invalid number: {}", value))?;
                if attempts == 0 {
                    return Err(eyre::eyre!("fetch_attempts must be at least 1"));
                }
                self.exchange.fetch_attempts = attempts;
            }
            ["host", "program"] => {
                if value.is_empty() {
                    return Err(eyre::eyre!("host.program cannot be empty"));
                }
                self.host.program = value.to_string();
            }
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        let value = match parts.as_slice() {
            ["exchange", "url"] => self.exchange.url.clone().unwrap_or_default(),
            ["exchange", "max_auth_retries"] => self.exchange.max_auth_retries.to_string(),
            ["exchange", "fetch_attempts"] => self.exchange.fetch_attempts.to_string(),
            ["host", "program"] => self.host.program.clone(),
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        };

        Ok(value)
    }

    pub fn show_all(&self) -> String {
        format!(
            "Configuration:\n\
             Exchange:\n\
             ├─ url: {}\n\
             ├─ max_auth_retries: {}\n\
             └─ fetch_attempts: {}\n\
             Host:\n\
             └─ program: {}",
            self.exchange.url.as_deref().unwrap_or("(not set)"),
            self.exchange.max_auth_retries,
            self.exchange.fetch_attempts,
            self.host.program,
        )
    }

    pub async fn reset() -> Result<Self> {
        let config = Self::default();
        config.save().await?;
        Ok(config)
    }
}

/// Get the default configuration directory
fn get_default_config_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("org", "jex", "jex") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        // Fallback to current directory if we can't determine project dirs
        PathBuf::from(".jex").join("config")
    }
}
