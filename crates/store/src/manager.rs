use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::environment::Environment;
use crate::error::{ExchangeError, Result};
use crate::host::HostPackageManager;
use crate::installer::ArchiveInstaller;
use crate::models::{ANY_VERSION, ComponentRequest, RequestedChanges, validate_unit_name};
use crate::options::ExchangeOptions;
use crate::pack::{PackExpander, descriptor_changes};
use crate::project::ProjectConfig;
use crate::reconciler::{EnvironmentReconciler, ReconcileReport};
use crate::registry::{
    AccessToken, CredentialProvider, RegistryClient, ReqwestTransport, TokenStore,
};

/// Entry point for every component and pack operation on one project
pub struct ComponentManager {
    options: ExchangeOptions,
    client: Arc<RegistryClient>,
    host: Arc<dyn HostPackageManager>,
}

impl ComponentManager {
    pub fn new(
        options: ExchangeOptions,
        client: Arc<RegistryClient>,
        host: Arc<dyn HostPackageManager>,
    ) -> Self {
        Self {
            options,
            client,
            host,
        }
    }

    /// Manager talking to `options.exchange_url` over reqwest, with tokens in the
    /// user data directory
    pub fn with_defaults(
        options: ExchangeOptions,
        credentials: Arc<dyn CredentialProvider>,
        host: Arc<dyn HostPackageManager>,
    ) -> Result<Self> {
        let client = RegistryClient::new(
            options.exchange_url.clone(),
            Arc::new(ReqwestTransport::new()),
            TokenStore::with_defaults()?,
            credentials,
        )
        .with_max_auth_retries(options.max_auth_retries);

        Ok(Self::new(options, Arc::new(client), host))
    }

    pub fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }

    pub async fn add(&self, requests: &[ComponentRequest]) -> Result<ReconcileReport> {
        let changes = RequestedChanges {
            add: requested_versions(requests),
            ..Default::default()
        };
        self.run(changes).await
    }

    pub async fn update(&self, requests: &[ComponentRequest]) -> Result<ReconcileReport> {
        let changes = RequestedChanges {
            update: requested_versions(requests),
            ..Default::default()
        };
        self.run(changes).await
    }

    /// Remove components by name; the resolver also drops dependents nothing else needs
    pub async fn remove(&self, names: &[String]) -> Result<ReconcileReport> {
        for name in names {
            validate_unit_name(name)?;
        }

        let environment = self.environment().await?;
        let remove = names
            .iter()
            .map(|name| {
                let version = environment
                    .get(name)
                    .map(|entry| entry.version().to_string())
                    .unwrap_or_else(|| ANY_VERSION.to_string());
                (name.clone(), version)
            })
            .collect();

        self.run(RequestedChanges {
            remove,
            ..Default::default()
        })
        .await
    }

    /// Add a pack together with every member its metadata lists
    pub async fn add_pack(&self, request: &ComponentRequest) -> Result<ReconcileReport> {
        let descriptors = self.expander().expand_add(request).await?;
        self.run(RequestedChanges {
            add: descriptor_changes(&descriptors),
            ..Default::default()
        })
        .await
    }

    /// Remove a pack and every member still installed below it
    pub async fn remove_pack(&self, pack: &str) -> Result<ReconcileReport> {
        let descriptors = self.expander().expand_remove(pack).await?;
        self.run(RequestedChanges {
            remove: descriptor_changes(&descriptors),
            ..Default::default()
        })
        .await
    }

    pub async fn list(&self) -> Result<Environment> {
        self.environment().await
    }

    pub async fn login(&self) -> Result<AccessToken> {
        self.client.login().await
    }

    pub async fn logout(&self) -> Result<bool> {
        self.client.logout().await
    }

    async fn run(&self, changes: RequestedChanges) -> Result<ReconcileReport> {
        if changes.is_empty() {
            return Err(ExchangeError::Validation(
                "no components were requested".to_string(),
            ));
        }

        let environment = self.environment().await?;
        let config = ProjectConfig::load(self.options.project_root()).await?;
        debug!(
            "Resolving {:?} against {} installed unit(s)",
            changes,
            environment.entries().len()
        );

        let solution = self
            .client
            .resolve(&config.components, environment.entries(), &changes)
            .await?;
        info!("Exchange resolved the requested changes");

        self.reconciler().apply(&solution, &config).await
    }

    async fn environment(&self) -> Result<Environment> {
        Environment::scan(&self.options.components_root()).await
    }

    fn expander(&self) -> PackExpander {
        PackExpander::new(self.client.clone(), self.options.components_root())
    }

    fn reconciler(&self) -> EnvironmentReconciler {
        let installer =
            ArchiveInstaller::new(self.client.clone(), self.host.clone(), self.options.clone());
        EnvironmentReconciler::new(installer, self.options.clone())
    }
}

fn requested_versions(requests: &[ComponentRequest]) -> BTreeMap<String, String> {
    requests
        .iter()
        .map(|request| (request.name.clone(), request.version_or_any()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_versions_default_to_any() {
        let requests: Vec<ComponentRequest> = ["oj-sample@1.2.0", "oj-other"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        let versions = requested_versions(&requests);
        assert_eq!(versions["oj-sample"], "1.2.0");
        assert_eq!(versions["oj-other"], "*");
    }
}
