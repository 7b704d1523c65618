//! Application of a resolver solution to the project tree and config.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info};

use crate::environment::{Environment, scan_pack_members};
use crate::error::{ExchangeError, Result};
use crate::installer::{ArchiveInstaller, InstalledUnit};
use crate::models::{ChangeEntry, ChangeMap, ChangeSet, ComponentDescriptor, PackEntry, Solution};
use crate::options::ExchangeOptions;
use crate::organizer::{MIN_DIR, TYPES_DIR};
use crate::path_mapping::PathMappings;
use crate::profiler::{ProfileBucket, Profiler};
use crate::project::ProjectConfig;

/// What one `apply` did
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Unit directories deleted in the remove phase (`pack/member` for members)
    pub removed: Vec<String>,
    pub installed: Vec<InstalledUnit>,
    /// Packs already present at the requested version
    pub skipped: Vec<String>,
    pub config: ProjectConfig,
    pub timings: BTreeMap<ProfileBucket, Duration>,
}

pub struct EnvironmentReconciler {
    installer: ArchiveInstaller,
    options: ExchangeOptions,
    mappings: PathMappings,
}

impl EnvironmentReconciler {
    pub fn new(installer: ArchiveInstaller, options: ExchangeOptions) -> Self {
        let mappings = PathMappings::new(options.tsconfig_path(), options.components_dir.clone());
        Self {
            installer,
            options,
            mappings,
        }
    }

    /// Apply `solution` against the `config` snapshot.
    ///
    /// Removes run first, then adds and updates are installed one by one, and only
    /// after every install succeeded is the merged config written. A failed install
    /// aborts the batch without restoring what the remove phase deleted.
    pub async fn apply(&self, solution: &Solution, config: &ProjectConfig) -> Result<ReconcileReport> {
        solution.validate_names()?;

        let changes = &solution.environment_changes;
        let mut report = ReconcileReport::default();

        if let Some(remove) = &changes.remove {
            report.removed = self.remove_phase(remove).await?;
        }

        let environment = Environment::scan(&self.options.components_root()).await?;
        let (descriptors, skipped) = flatten(changes, &environment);
        for name in &skipped {
            info!("{} is already installed at the requested version, skipping", name);
        }
        report.skipped = skipped;

        let profiler = Profiler::new();
        report.installed = self.installer.install_all(descriptors, &profiler).await?;
        profiler.report();
        report.timings = profiler.snapshot();

        let next = config.with_changes(&solution.config_changes);
        next.save(self.options.project_root()).await?;
        report.config = next;

        Ok(report)
    }

    async fn remove_phase(&self, remove: &ChangeMap) -> Result<Vec<String>> {
        let root = self.options.components_root();
        let mut removed = Vec::new();

        for (name, entry) in remove {
            match entry {
                ChangeEntry::Version(_) => {
                    if self.remove_unit(&root.join(name), name).await? {
                        removed.push(name.clone());
                    }
                }
                ChangeEntry::Pack(pack) => {
                    removed.extend(self.remove_pack_members(&root, name, pack).await?);
                }
            }
        }

        Ok(removed)
    }

    /// Delete one unit directory, dropping its path mapping if it had a types folder
    async fn remove_unit(&self, dir: &Path, mapping_name: &str) -> Result<bool> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            debug!("{} is not installed, nothing to remove", dir.display());
            return Ok(false);
        }

        let had_types = fs::try_exists(dir.join(TYPES_DIR)).await.unwrap_or(false);
        fs::remove_dir_all(dir)
            .await
            .map_err(|e| ExchangeError::io("remove component", dir, e))?;
        if had_types {
            self.mappings.remove(mapping_name).await?;
        }

        info!("Removed {}", dir.display());
        Ok(true)
    }

    async fn remove_pack_members(&self, root: &Path, pack: &str, entry: &PackEntry) -> Result<Vec<String>> {
        let pack_dir = root.join(pack);
        let mut removed = Vec::new();

        for member in entry.components.keys() {
            for shared in [MIN_DIR, TYPES_DIR] {
                let dir = pack_dir.join(shared).join(member);
                if fs::try_exists(&dir).await.unwrap_or(false) {
                    fs::remove_dir_all(&dir)
                        .await
                        .map_err(|e| ExchangeError::io("remove member resources", &dir, e))?;
                }
            }

            let member_dir = pack_dir.join(member);
            if fs::try_exists(&member_dir).await.unwrap_or(false) {
                fs::remove_dir_all(&member_dir)
                    .await
                    .map_err(|e| ExchangeError::io("remove pack member", &member_dir, e))?;
                info!("Removed {}/{}", pack, member);
                removed.push(format!("{}/{}", pack, member));
            }
        }

        if !fs::try_exists(&pack_dir).await.unwrap_or(false) {
            return Ok(removed);
        }

        if scan_pack_members(&pack_dir).await?.is_empty() {
            if self.remove_unit(&pack_dir, pack).await? {
                removed.push(pack.to_string());
            }
            return Ok(removed);
        }

        let types_dir = pack_dir.join(TYPES_DIR);
        if is_empty_dir(&types_dir).await {
            if fs::try_exists(&types_dir).await.unwrap_or(false) {
                fs::remove_dir_all(&types_dir)
                    .await
                    .map_err(|e| ExchangeError::io("remove empty types folder", &types_dir, e))?;
            }
            if self.mappings.remove(pack).await? {
                debug!("No member of {} ships type definitions anymore", pack);
            }
        }

        Ok(removed)
    }
}

/// Missing directories count as empty
async fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => true,
    }
}

/// Turn `add` and `update` entries into an ordered install list.
///
/// Packs come before their members. A pack already on disk at the requested version
/// is skipped along with its members that match too; other members are still listed.
pub fn flatten(changes: &ChangeSet, environment: &Environment) -> (Vec<ComponentDescriptor>, Vec<String>) {
    let mut descriptors = Vec::new();
    let mut skipped = Vec::new();

    for map in [&changes.add, &changes.update].into_iter().flatten() {
        for (name, entry) in map {
            match entry {
                ChangeEntry::Version(version) => {
                    descriptors.push(ComponentDescriptor::singleton(name, version));
                }
                ChangeEntry::Pack(pack) => {
                    let installed = environment
                        .pack(name)
                        .filter(|installed| installed.version == pack.version);

                    match installed {
                        Some(_) => skipped.push(name.clone()),
                        None => descriptors.push(ComponentDescriptor::pack(name, &pack.version)),
                    }

                    for (member, version) in &pack.components {
                        let unchanged = installed
                            .and_then(|installed| installed.components.get(member))
                            .is_some_and(|current| current == version);
                        if !unchanged {
                            descriptors.push(ComponentDescriptor::member(name, member, version));
                        }
                    }
                }
            }
        }
    }

    (descriptors, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_flatten_orders_pack_before_members() {
        let changes = ChangeSet {
            add: Some(ChangeMap::from([
                ("oj-pack".to_string(), pack("1.0.0", &[("button", "1.0.0"), ("input", "1.0.0")])),
                ("oj-sample".to_string(), ChangeEntry::Version("1.2.0".to_string())),
            ])),
            ..Default::default()
        };

        let (descriptors, skipped) = flatten(&changes, &Environment::default());
        let names: Vec<_> = descriptors.iter().map(|d| d.full_name.as_str()).collect();
        assert_eq!(names, ["oj-pack", "oj-pack-button", "oj-pack-input", "oj-sample"]);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_flatten_skips_pack_at_same_version() {
        let environment = Environment::from_entries(ChangeMap::from([(
            "oj-pack".to_string(),
            pack("1.0.0", &[("button", "1.0.0"), ("input", "0.9.0")]),
        )]));
        let changes = ChangeSet {
            add: Some(ChangeMap::from([(
                "oj-pack".to_string(),
                pack(
                    "1.0.0",
                    &[("button", "1.0.0"), ("input", "1.0.0"), ("slider", "1.0.0")],
                ),
            )])),
            ..Default::default()
        };

        let (descriptors, skipped) = flatten(&changes, &environment);
        let names: Vec<_> = descriptors.iter().map(|d| d.full_name.as_str()).collect();
        assert_eq!(names, ["oj-pack-input", "oj-pack-slider"]);
        assert_eq!(skipped, ["oj-pack"]);
    }

    #[test]
    fn test_flatten_refetches_pack_at_other_version() {
        let environment = Environment::from_entries(ChangeMap::from([(
            "oj-pack".to_string(),
            pack("1.0.0", &[("button", "1.0.0")]),
        )]));
        let changes = ChangeSet {
            update: Some(ChangeMap::from([(
                "oj-pack".to_string(),
                pack("2.0.0", &[("button", "1.0.0")]),
            )])),
            ..Default::default()
        };

        let (descriptors, skipped) = flatten(&changes, &environment);
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[0].is_pack());
        assert!(skipped.is_empty());
    }
}
