//! Access tokens, their per-registry persistence and credential sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExchangeError, Result};

/// Tokens with less than this many seconds left are treated as expired
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Build a token whose expiration is computed locally from its lifetime
    pub fn from_lifetime(access_token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(EXPIRY_MARGIN_SECS)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Body of `GET /auth/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

impl From<TokenResponse> for AccessToken {
    fn from(value: TokenResponse) -> Self {
        AccessToken::from_lifetime(value.access_token, value.expires_in)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Source of login credentials when the exchange asks for authentication
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, exchange_url: &Url) -> Result<Credentials>;
}

/// Per-registry token files under a user-scoped directory
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Token store in the OS-specific local data directory
    pub fn with_defaults() -> Result<Self> {
        let project_dirs = ProjectDirs::from("org", "jex", "jex").ok_or_else(|| {
            ExchangeError::Config(
                "Could not determine system directories for current user/OS".to_string(),
            )
        })?;
        Ok(Self::new(project_dirs.data_local_dir().join("tokens")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One file per registry, named by the URL-safe base64 of its URL
    pub fn token_path(&self, exchange_url: &Url) -> PathBuf {
        let normalized = exchange_url.as_str().trim_end_matches('/');
        let key = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(normalized);
        self.dir.join(format!("{}.json", key))
    }

    pub async fn load(&self, exchange_url: &Url) -> Result<Option<AccessToken>> {
        let path = self.token_path(exchange_url);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ExchangeError::io("read access token", &path, e))?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, exchange_url: &Url, token: &AccessToken) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ExchangeError::io("create token directory", &self.dir, e))?;

        let path = self.token_path(exchange_url);
        let content = serde_json::to_string_pretty(token)?;
        fs::write(&path, content)
            .await
            .map_err(|e| ExchangeError::io("write access token", &path, e))?;
        debug!("Stored access token for {}", exchange_url);
        Ok(())
    }

    pub async fn clear(&self, exchange_url: &Url) -> Result<bool> {
        let path = self.token_path(exchange_url);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| ExchangeError::io("remove access token", &path, e))?;
        Ok(true)
    }
}
