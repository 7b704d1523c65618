use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{ExchangeError, Result};
use crate::models::{ChangeEntry, ChangeMap, ComponentJson, PackEntry};

/// Snapshot of what is installed under the components root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    entries: ChangeMap,
}

impl Environment {
    pub fn from_entries(entries: ChangeMap) -> Self {
        Self { entries }
    }

    /// Read every unit directory below `components_root`
    pub async fn scan(components_root: &Path) -> Result<Self> {
        let mut entries = ChangeMap::new();

        for (name, dir) in list_dirs(components_root).await? {
            let Some(json) = ComponentJson::read_from_dir(&dir).await? else {
                debug!("Skipping {} without a descriptor", dir.display());
                continue;
            };

            if json.is_pack() {
                let components = scan_pack_members(&dir)
                    .await?
                    .into_iter()
                    .map(|(member, json)| (member, json.version))
                    .collect();
                entries.insert(
                    name,
                    ChangeEntry::Pack(PackEntry {
                        version: json.version,
                        components,
                    }),
                );
            } else {
                entries.insert(name, ChangeEntry::Version(json.version));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &ChangeMap {
        &self.entries
    }

    pub fn into_entries(self) -> ChangeMap {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ChangeEntry> {
        self.entries.get(name)
    }

    pub fn pack(&self, name: &str) -> Option<&PackEntry> {
        match self.entries.get(name) {
            Some(ChangeEntry::Pack(pack)) => Some(pack),
            _ => None,
        }
    }
}

/// Member directories of a pack that still hold a descriptor, sorted by name
pub async fn scan_pack_members(pack_dir: &Path) -> Result<Vec<(String, ComponentJson)>> {
    let mut members = Vec::new();
    for (name, dir) in list_dirs(pack_dir).await? {
        if let Some(json) = ComponentJson::read_from_dir(&dir).await? {
            members.push((name, json));
        }
    }
    Ok(members)
}

async fn list_dirs(root: &Path) -> Result<Vec<(String, std::path::PathBuf)>> {
    if !fs::try_exists(root).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    let mut entries = fs::read_dir(root)
        .await
        .map_err(|e| ExchangeError::io("read directory", root, e))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        dirs.push((name, entry.path()));
    }

    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_scan_reduces_tree_to_change_map() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            &root.join("oj-sample/component.json"),
            r#"{"name": "oj-sample", "version": "1.2.0"}"#,
        );
        write(
            &root.join("oj-pack/component.json"),
            r#"{"name": "oj-pack", "version": "2.0.0", "type": "pack"}"#,
        );
        write(
            &root.join("oj-pack/button/component.json"),
            r#"{"name": "button", "version": "2.0.1", "pack": "oj-pack"}"#,
        );
        std::fs::create_dir_all(root.join("oj-pack/min/button")).unwrap();
        std::fs::create_dir_all(root.join("leftover")).unwrap();

        let environment = Environment::scan(root).await.unwrap();

        assert_eq!(environment.entries().len(), 2);
        assert_eq!(
            environment.get("oj-sample"),
            Some(&ChangeEntry::Version("1.2.0".to_string()))
        );
        let pack = environment.pack("oj-pack").unwrap();
        assert_eq!(pack.version, "2.0.0");
        assert_eq!(pack.components.len(), 1);
        assert_eq!(pack.components["button"], "2.0.1");
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let environment = Environment::scan(&temp_dir.path().join("nope")).await.unwrap();
        assert!(environment.is_empty());
    }
}
