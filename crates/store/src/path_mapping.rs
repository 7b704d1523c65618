//! `compilerOptions.paths` entries in the project's `tsconfig.json`.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ExchangeError, Result};
use crate::organizer::TYPES_DIR;

#[derive(Debug, Clone)]
pub struct PathMappings {
    tsconfig: PathBuf,
    components_dir: String,
}

impl PathMappings {
    pub fn new(tsconfig: impl Into<PathBuf>, components_dir: impl Into<String>) -> Self {
        Self {
            tsconfig: tsconfig.into(),
            components_dir: components_dir.into(),
        }
    }

    pub fn key(name: &str) -> String {
        format!("{}/*", name)
    }

    pub fn target(&self, name: &str) -> String {
        format!("./{}/{}/{}/*", self.components_dir, name, TYPES_DIR)
    }

    /// Register the shared types folder of `name`; `false` when the project has no tsconfig
    pub async fn add(&self, name: &str) -> Result<bool> {
        let key = Self::key(name);
        let target = self.target(name);

        self.edit(|paths| {
            let entry = Value::Array(vec![Value::String(target.clone())]);
            if paths.get(&key) == Some(&entry) {
                return false;
            }
            paths.insert(key.clone(), entry);
            true
        })
        .await
    }

    /// Drop the mapping of `name`, if present
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let key = Self::key(name);
        self.edit(|paths| paths.remove(&key).is_some()).await
    }

    /// Current mapping table, empty when there is none
    pub async fn list(&self) -> Result<Map<String, Value>> {
        Ok(self
            .read()
            .await?
            .and_then(|config| {
                config
                    .get("compilerOptions")
                    .and_then(|options| options.get("paths"))
                    .and_then(Value::as_object)
                    .cloned()
            })
            .unwrap_or_default())
    }

    async fn edit<F>(&self, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut Map<String, Value>) -> bool,
    {
        let Some(mut config) = self.read().await? else {
            return Ok(false);
        };

        let Some(root) = config.as_object_mut() else {
            warn!("{} is not a JSON object, skipping path mapping", self.tsconfig.display());
            return Ok(false);
        };

        let options = root
            .entry("compilerOptions")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(options) = options.as_object_mut() else {
            return Ok(false);
        };
        let paths = options
            .entry("paths")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(paths) = paths.as_object_mut() else {
            return Ok(false);
        };

        if !apply(paths) {
            return Ok(false);
        }

        let content = serde_json::to_string_pretty(&config)?;
        fs::write(&self.tsconfig, content)
            .await
            .map_err(|e| ExchangeError::io("write tsconfig", &self.tsconfig, e))?;
        debug!("Updated path mappings in {}", self.tsconfig.display());
        Ok(true)
    }

    async fn read(&self) -> Result<Option<Value>> {
        if !fs::try_exists(&self.tsconfig).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.tsconfig)
            .await
            .map_err(|e| ExchangeError::io("read tsconfig", &self.tsconfig, e))?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "Could not parse {} ({}), path mappings left unchanged",
                    self.tsconfig.display(),
                    e
                );
                Ok(None)
            }
        }
    }
}
