//! Uploading built components to the exchange.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::info;

use crate::archive;
use crate::error::{ExchangeError, Result};
use crate::models::{ComponentCacheEntry, ComponentJson, member_full_name};
use crate::registry::RegistryClient;

/// Read-only lookup of build metadata by component full name
pub trait ComponentCache: Send + Sync {
    fn get(&self, full_name: &str) -> Option<ComponentCacheEntry>;
}

impl ComponentCache for BTreeMap<String, ComponentCacheEntry> {
    fn get(&self, full_name: &str) -> Option<ComponentCacheEntry> {
        BTreeMap::get(self, full_name).cloned()
    }
}

/// Component cache persisted by the application build as a JSON object
#[derive(Debug, Clone, Default)]
pub struct JsonComponentCache {
    entries: BTreeMap<String, ComponentCacheEntry>,
}

impl JsonComponentCache {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ExchangeError::io("read component cache", path, e))?;
        let entries = serde_json::from_str(&content).map_err(|source| ExchangeError::InvalidJsonFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { entries })
    }
}

impl ComponentCache for JsonComponentCache {
    fn get(&self, full_name: &str) -> Option<ComponentCacheEntry> {
        self.entries.get(full_name).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub full_name: String,
    pub version: String,
    pub file_name: String,
    pub archive_size: usize,
    /// Whatever the exchange answered with, `Null` for an empty body
    pub response: serde_json::Value,
}

pub struct Publisher {
    client: Arc<RegistryClient>,
}

impl Publisher {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    /// Publish the built component found through `cache`
    pub async fn publish_component(
        &self,
        cache: &dyn ComponentCache,
        full_name: &str,
    ) -> Result<PublishOutcome> {
        let entry = cache
            .get(full_name)
            .ok_or_else(|| ExchangeError::ComponentNotFound(full_name.to_string()))?;

        let built: PathBuf = entry
            .built_path
            .ok_or_else(|| ExchangeError::NotBuilt(full_name.to_string()))?;
        if !fs::try_exists(&built).await.unwrap_or(false) {
            return Err(ExchangeError::NotBuilt(full_name.to_string()));
        }

        self.publish_directory(&built).await
    }

    /// Zip `dir` and upload it; the directory must carry a valid `component.json`
    pub async fn publish_directory(&self, dir: &Path) -> Result<PublishOutcome> {
        let json = ComponentJson::read_from_dir(dir).await?.ok_or_else(|| {
            ExchangeError::Validation(format!("{} has no component.json", dir.display()))
        })?;
        let full_name = validate_for_publish(&json)?;

        let archive = archive::pack_directory(dir).await?;
        let archive_size = archive.len();
        let file_name = format!("{}-{}.zip", full_name, json.version);
        info!("Publishing {} ({} bytes)", file_name, archive_size);

        let response = self.client.publish(&file_name, archive).await?;
        info!("Published {}@{}", full_name, json.version);

        Ok(PublishOutcome {
            full_name,
            version: json.version,
            file_name,
            archive_size,
            response,
        })
    }
}

/// Full name the exchange will know the component by
fn validate_for_publish(json: &ComponentJson) -> Result<String> {
    if json.name.trim().is_empty() {
        return Err(ExchangeError::Validation(
            "component.json is missing a name".to_string(),
        ));
    }
    if json.version.trim().is_empty() {
        return Err(ExchangeError::Validation(format!(
            "component.json of '{}' is missing a version",
            json.name
        )));
    }
    if json.is_pack() && json.pack.is_some() {
        return Err(ExchangeError::Validation(format!(
            "pack '{}' cannot itself belong to a pack",
            json.name
        )));
    }

    Ok(match &json.pack {
        Some(pack) => member_full_name(pack, &json.name),
        None => json.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_publishes_under_full_name() {
        let json = ComponentJson {
            name: "button".to_string(),
            version: "1.0.0".to_string(),
            pack: Some("oj-pack".to_string()),
            ..Default::default()
        };
        assert_eq!(validate_for_publish(&json).unwrap(), "oj-pack-button");
    }

    #[test]
    fn test_missing_version_is_rejected() {
        let json = ComponentJson {
            name: "oj-sample".to_string(),
            ..Default::default()
        };
        assert!(validate_for_publish(&json).unwrap_err().is_validation());
    }

    #[test]
    fn test_map_cache_lookup() {
        let mut cache = BTreeMap::new();
        cache.insert(
            "oj-sample".to_string(),
            ComponentCacheEntry {
                is_local: true,
                ..Default::default()
            },
        );
        let cache: &dyn ComponentCache = &cache;
        assert!(cache.get("oj-sample").unwrap().is_local);
        assert!(cache.get("oj-missing").is_none());
    }
}
