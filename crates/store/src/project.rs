//! The project's declarative component record (`jex.json`).

use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::error::{ExchangeError, Result};
use crate::models::{ChangeEntry, ChangeMap, ChangeSet};

pub const PROJECT_CONFIG_FILE: &str = "jex.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components_dir: Option<String>,
    #[serde(default)]
    pub components: ChangeMap,
    /// Keys owned by other tools, written back untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ProjectConfig {
    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_CONFIG_FILE)
    }

    /// Load the project config, an empty record when the file does not exist yet
    pub async fn load(project_root: &Path) -> Result<Self> {
        let path = Self::path_in(project_root);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No project config at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ExchangeError::io("read project config", &path, e))?;
        serde_json::from_str(&content).map_err(|source| ExchangeError::InvalidJsonFile { path, source })
    }

    pub async fn save(&self, project_root: &Path) -> Result<()> {
        let path = Self::path_in(project_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| ExchangeError::io("write project config", &path, e))?;
        debug!("Project config saved to {}", path.display());
        Ok(())
    }

    /// Produce the record that results from applying `changes`.
    ///
    /// `add` and `update` merge first: pack entries union their `components` and take
    /// the new `version`. `remove` then drops singleton keys and listed pack members,
    /// deleting a pack key once none of its members remain.
    pub fn with_changes(&self, changes: &ChangeSet) -> Self {
        let mut next = self.clone();

        for map in [&changes.add, &changes.update].into_iter().flatten() {
            for (name, entry) in map {
                next.merge_entry(name, entry);
            }
        }

        if let Some(remove) = &changes.remove {
            for (name, entry) in remove {
                next.remove_entry(name, entry);
            }
        }

        next
    }

    fn merge_entry(&mut self, name: &str, entry: &ChangeEntry) {
        match (self.components.entry(name.to_string()), entry) {
            (Entry::Occupied(mut slot), ChangeEntry::Pack(incoming)) => match slot.get_mut() {
                ChangeEntry::Pack(existing) => {
                    existing.version = incoming.version.clone();
                    existing
                        .components
                        .extend(incoming.components.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                existing => *existing = entry.clone(),
            },
            (Entry::Occupied(mut slot), ChangeEntry::Version(_)) => {
                slot.insert(entry.clone());
            }
            (Entry::Vacant(slot), _) => {
                slot.insert(entry.clone());
            }
        }
    }

    fn remove_entry(&mut self, name: &str, entry: &ChangeEntry) {
        let remove_key = match (self.components.get_mut(name), entry) {
            (Some(ChangeEntry::Pack(existing)), ChangeEntry::Pack(removed))
                if !removed.components.is_empty() =>
            {
                for member in removed.components.keys() {
                    existing.components.remove(member);
                }
                existing.components.is_empty()
            }
            (Some(_), _) => true,
            (None, _) => false,
        };

        if remove_key {
            self.components.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::PackEntry;
    use tempfile::TempDir;

    fn pack(version: &str, members: &[(&str, &str)]) -> ChangeEntry {
        ChangeEntry::Pack(PackEntry {
            version: version.to_string(),
            components: members
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    #[test]
    fn test_pack_merge_unions_members_and_overwrites_version() {
        let mut config = ProjectConfig::default();
        config
            .components
            .insert("oj-pack".to_string(), pack("1.0.0", &[("button", "1.0.0")]));

        let changes = ChangeSet {
            update: Some(BTreeMap::from([(
                "oj-pack".to_string(),
                pack("1.1.0", &[("input", "1.1.0")]),
            )])),
            ..Default::default()
        };

        let next = config.with_changes(&changes);
        assert_eq!(
            next.components["oj-pack"],
            pack("1.1.0", &[("button", "1.0.0"), ("input", "1.1.0")])
        );
        // the original snapshot is untouched
        assert_eq!(config.components["oj-pack"], pack("1.0.0", &[("button", "1.0.0")]));
    }

    #[test]
    fn test_removing_last_member_drops_pack_key() {
        let mut config = ProjectConfig::default();
        config.components.insert(
            "oj-pack".to_string(),
            pack("1.0.0", &[("button", "1.0.0"), ("input", "1.0.0")]),
        );
        config
            .components
            .insert("oj-sample".to_string(), ChangeEntry::Version("1.2.0".to_string()));

        let first = config.with_changes(&ChangeSet {
            remove: Some(BTreeMap::from([(
                "oj-pack".to_string(),
                pack("1.0.0", &[("button", "1.0.0")]),
            )])),
            ..Default::default()
        });
        assert_eq!(first.components["oj-pack"], pack("1.0.0", &[("input", "1.0.0")]));

        let second = first.with_changes(&ChangeSet {
            remove: Some(BTreeMap::from([
                ("oj-pack".to_string(), pack("1.0.0", &[("input", "1.0.0")])),
                ("oj-sample".to_string(), ChangeEntry::Version("1.2.0".to_string())),
            ])),
            ..Default::default()
        });
        assert!(second.components.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(PROJECT_CONFIG_FILE),
            r#"{"theme": "redwood", "components": {"oj-sample": "1.2.0"}}"#,
        )
        .unwrap();

        let config = ProjectConfig::load(temp_dir.path()).await.unwrap();
        assert_eq!(config.extra["theme"], "redwood");
        config.save(temp_dir.path()).await.unwrap();

        let reloaded = ProjectConfig::load(temp_dir.path()).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(temp_dir.path()).await.unwrap();
        assert!(config.components.is_empty());
    }
}
