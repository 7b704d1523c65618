use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// One entry of the `{errors: [...]}` body the exchange returns on failure
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryErrorDetail {
    pub id: String,
    pub message: String,
    /// Documentation link rendered from `id` against the registry base URL
    #[serde(skip)]
    pub link: Option<String>,
}

/// Decoded list of registry errors, rendered one per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryErrors(pub Vec<RegistryErrorDetail>);

impl fmt::Display for RegistryErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, detail) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", detail.message)?;
            if let Some(link) = &detail.link {
                write!(f, " (see {})", link)?;
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Dependency resolution failed: {0}")]
    Resolution(String),

    #[error(
        "Could not reach the exchange at '{url}': {message}. \
         If you are behind a proxy, check the HTTPS_PROXY and NO_PROXY settings"
    )]
    Network { url: String, message: String },

    #[error("Exchange request failed with status {status}:\n{errors}")]
    HttpStatus { status: u16, errors: RegistryErrors },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Installation of '{component}' failed and its directory was removed: {source}")]
    PartialInstall {
        component: String,
        #[source]
        source: Box<ExchangeError>,
    },

    #[error("Host package manager command '{command}' failed: {message}")]
    HostPackageManager { command: String, message: String },

    #[error("Component '{0}' not found")]
    ComponentNotFound(String),

    #[error("Component '{0}' has not been built")]
    NotBuilt(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO operation '{operation}' failed on path '{path}': {source}")]
    IoOperation {
        operation: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJsonFile {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

impl ExchangeError {
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExchangeError::IoOperation {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Failures worth another fetch attempt
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExchangeError::Network { .. } => true,
            ExchangeError::HttpStatus { status, .. } => *status >= 500,
            ExchangeError::Archive(_) => true,
            _ => false,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ExchangeError::Resolution(_)
                | ExchangeError::Validation(_)
                | ExchangeError::ComponentNotFound(_)
                | ExchangeError::NotBuilt(_)
                | ExchangeError::Config(_)
        )
    }

    /// Validation failures end the command without retries or recovery
    pub fn is_validation(&self) -> bool {
        matches!(self, ExchangeError::Validation(_))
    }
}

impl From<zip::result::ZipError> for ExchangeError {
    fn from(err: zip::result::ZipError) -> Self {
        ExchangeError::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_render_links() {
        let errors = RegistryErrors(vec![
            RegistryErrorDetail {
                id: "COMPONENT_NOT_FOUND".to_string(),
                message: "Component oj-missing does not exist".to_string(),
                link: Some("https://exchange.example.com/docs/errors/COMPONENT_NOT_FOUND".to_string()),
            },
            RegistryErrorDetail {
                id: "X".to_string(),
                message: "Second".to_string(),
                link: None,
            },
        ]);

        assert_eq!(
            errors.to_string(),
            "Component oj-missing does not exist (see https://exchange.example.com/docs/errors/COMPONENT_NOT_FOUND)\nSecond"
        );
    }

    #[test]
    fn test_error_classification() {
        let network = ExchangeError::Network {
            url: "https://exchange.example.com".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(network.is_recoverable());
        assert!(network.to_string().contains("proxy"));

        let server = ExchangeError::HttpStatus {
            status: 503,
            errors: RegistryErrors::default(),
        };
        assert!(server.is_recoverable());

        let client = ExchangeError::HttpStatus {
            status: 404,
            errors: RegistryErrors::default(),
        };
        assert!(!client.is_recoverable());

        let validation = ExchangeError::Validation("missing component.json".to_string());
        assert!(validation.is_validation());
        assert!(validation.is_user_error());
        assert!(!validation.is_recoverable());
    }
}
