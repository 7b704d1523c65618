//! Jex Store - component and pack management against a remote exchange
//!
//! This crate installs, updates and removes components of a web application project.
//! Components are resolved by the exchange's dependency resolver, downloaded as zip
//! archives and unpacked below the project's components directory.
//!
//! # Features
//!
//! - **Resolution**: every batch is sent to the exchange, which answers with the
//!   environment and config changes to apply
//! - **Packs**: pack-level add/remove expands to the pack and its member components
//! - **Reference components**: installation is delegated to the host package manager
//! - **Authentication**: bearer tokens per exchange, obtained on demand after a 401
//! - **Publishing**: zip a built component and upload it
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jex_store::{CommandPackageManager, ComponentManager, ComponentRequest, ExchangeOptions};
//! use jex_store::registry::{CredentialProvider, Credentials};
//! # use async_trait::async_trait;
//! # use url::Url;
//! # struct Fixed;
//! # #[async_trait]
//! # impl CredentialProvider for Fixed {
//! #     async fn credentials(&self, _: &Url) -> jex_store::Result<Credentials> {
//! #         Ok(Credentials::new("user", "secret"))
//! #     }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ExchangeOptions::new(".", Url::parse("https://exchange.example.com/api/")?);
//! let manager = ComponentManager::with_defaults(
//!     options,
//!     Arc::new(Fixed),
//!     Arc::new(CommandPackageManager::default()),
//! )?;
//!
//! let request: ComponentRequest = "oj-sample@1.2.0".parse()?;
//! let report = manager.add(&[request]).await?;
//! for unit in report.installed {
//!     println!("Installed {}", unit.descriptor);
//! }
//! # Ok(())
//! # }
//! ```
pub mod archive;
pub mod environment;
pub mod error;
pub mod host;
pub mod installer;
pub mod manager;
pub mod models;
pub mod options;
pub mod organizer;
pub mod pack;
pub mod path_mapping;
pub mod profiler;
pub mod project;
pub mod publish;
pub mod reconciler;
pub mod registry;

// Re-export commonly used types
pub use environment::Environment;
pub use error::{ExchangeError, RegistryErrorDetail, RegistryErrors, Result};
pub use host::{CommandPackageManager, HostPackageManager};
pub use installer::{ArchiveInstaller, InstallStage, InstalledUnit};
pub use manager::ComponentManager;
pub use models::{
    ChangeEntry, ChangeMap, ChangeSet, ComponentCacheEntry, ComponentDescriptor, ComponentJson,
    ComponentRequest, ComponentType, PackEntry, RequestedChanges, Solution,
};
pub use options::ExchangeOptions;
pub use pack::PackExpander;
pub use path_mapping::PathMappings;
pub use profiler::{ProfileBucket, Profiler};
pub use project::ProjectConfig;
pub use publish::{ComponentCache, JsonComponentCache, PublishOutcome, Publisher};
pub use reconciler::{EnvironmentReconciler, ReconcileReport};
pub use registry::RegistryClient;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "jex_store");
    }
}
