//! Per-invocation options threaded explicitly through every operation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

pub const DEFAULT_COMPONENTS_DIR: &str = "jet_components";
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 3;
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Project root holding the project config and `tsconfig.json`
    pub project_root: PathBuf,
    /// Components directory name relative to the project root
    pub components_dir: String,
    pub exchange_url: Url,
    /// Download attempts per archive
    pub fetch_attempts: u32,
    /// Re-authentication rounds allowed per request
    pub max_auth_retries: u32,
    /// Pause before retrying a failed resource relocation
    pub lock_retry_delay: Duration,
}

impl ExchangeOptions {
    pub fn new(project_root: impl Into<PathBuf>, exchange_url: Url) -> Self {
        Self {
            project_root: project_root.into(),
            components_dir: DEFAULT_COMPONENTS_DIR.to_string(),
            exchange_url,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            max_auth_retries: DEFAULT_MAX_AUTH_RETRIES,
            lock_retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }

    pub fn with_components_dir(mut self, dir: impl Into<String>) -> Self {
        self.components_dir = dir.into();
        self
    }

    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts.max(1);
        self
    }

    pub fn with_max_auth_retries(mut self, retries: u32) -> Self {
        self.max_auth_retries = retries;
        self
    }

    pub fn with_lock_retry_delay(mut self, delay: Duration) -> Self {
        self.lock_retry_delay = delay;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn components_root(&self) -> PathBuf {
        self.project_root.join(&self.components_dir)
    }

    pub fn tsconfig_path(&self) -> PathBuf {
        self.project_root.join("tsconfig.json")
    }
}
