//! Relocation of minified bundles and type definitions to shared locations.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ExchangeError, Result};
use crate::models::ComponentDescriptor;

pub const MIN_DIR: &str = "min";
pub const TYPES_DIR: &str = "types";
const TYPE_DEFINITION_SUFFIX: &str = ".d.ts";

/// Outcome of organizing one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizedResources {
    /// Name the shared types folder is mapped under (the pack, or the singleton)
    pub mapping_name: Option<String>,
    /// Shared types folder, if the unit has one after relocation
    pub types_dir: Option<PathBuf>,
    pub moved_files: usize,
}

#[derive(Debug, Clone)]
pub struct ResourceOrganizer {
    components_root: PathBuf,
}

impl ResourceOrganizer {
    pub fn new(components_root: impl Into<PathBuf>) -> Self {
        Self {
            components_root: components_root.into(),
        }
    }

    /// Move shared sub-resources of an installed unit into their pack-level places.
    ///
    /// Pack roots are left untouched.
    pub async fn organize(&self, descriptor: &ComponentDescriptor) -> Result<OrganizedResources> {
        if descriptor.is_pack() {
            return Ok(OrganizedResources::default());
        }

        let organizer = self.clone();
        let descriptor = descriptor.clone();
        tokio::task::spawn_blocking(move || organizer.organize_blocking(&descriptor))
            .await
            .map_err(|e| ExchangeError::Archive(format!("resource relocation task failed: {}", e)))?
    }

    fn organize_blocking(&self, descriptor: &ComponentDescriptor) -> Result<OrganizedResources> {
        let unit_dir = descriptor.local_path(&self.components_root);
        let mut outcome = OrganizedResources::default();

        match &descriptor.pack {
            Some(pack) => {
                let pack_dir = self.components_root.join(pack);

                let min_src = unit_dir.join(MIN_DIR);
                if min_src.is_dir() {
                    let min_dest = pack_dir.join(MIN_DIR).join(&descriptor.name);
                    replace_dir(&min_src, &min_dest)?;
                    outcome.moved_files += 1;
                }

                let types_dest = pack_dir.join(TYPES_DIR).join(&descriptor.name);
                outcome.moved_files += move_type_definitions(&unit_dir, &types_dest, true)?;

                let shared = pack_dir.join(TYPES_DIR);
                if shared.is_dir() {
                    outcome.mapping_name = Some(pack.clone());
                    outcome.types_dir = Some(shared);
                }
            }
            None => {
                let types_dest = unit_dir.join(TYPES_DIR);
                outcome.moved_files += move_type_definitions(&unit_dir, &types_dest, false)?;

                if types_dest.is_dir() {
                    outcome.mapping_name = Some(descriptor.name.clone());
                    outcome.types_dir = Some(types_dest);
                }
            }
        }

        debug!(
            "Organized resources of {} ({} moves)",
            descriptor.full_name, outcome.moved_files
        );
        Ok(outcome)
    }
}

/// Replace `dest` with the directory at `src`
fn replace_dir(src: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| ExchangeError::io("remove stale resources", dest, e))?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(src, dest).map_err(|e| ExchangeError::io("move resources", src, e))
}

/// Move `*.d.ts` files of `unit_dir` below `dest`, keeping relative paths.
///
/// Files already in the unit's canonical `types/` folder are only moved when the
/// destination lies elsewhere (`include_canonical`); their `types/` prefix is dropped.
/// Existing destination files are never overwritten.
fn move_type_definitions(unit_dir: &Path, dest: &Path, include_canonical: bool) -> Result<usize> {
    let canonical = unit_dir.join(TYPES_DIR);
    let min_dir = unit_dir.join(MIN_DIR);

    let files: Vec<PathBuf> = WalkDir::new(unit_dir)
        .into_iter()
        .filter_entry(|e| e.path() != min_dir.as_path())
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(TYPE_DEFINITION_SUFFIX))
        .map(|e| e.into_path())
        .collect();

    let mut moved = 0;
    for file in files {
        let relative = match file.strip_prefix(&canonical) {
            Ok(inside) if include_canonical => inside.to_path_buf(),
            Ok(_) => continue,
            Err(_) => file
                .strip_prefix(unit_dir)
                .map_err(|e| ExchangeError::Archive(e.to_string()))?
                .to_path_buf(),
        };

        let target = dest.join(relative);
        if target.exists() {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&file, &target).map_err(|e| ExchangeError::io("move type definition", &file, e))?;
        moved += 1;
    }

    if include_canonical && canonical.is_dir() && is_empty_tree(&canonical) {
        fs::remove_dir_all(&canonical)?;
    }

    Ok(moved)
}

fn is_empty_tree(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .all(|e| !e.file_type().is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_pack_member_resources_move_to_pack_level() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let member = root.join("oj-pack/button");
        write(&member.join("component.json"), "{}");
        write(&member.join("min/loader.js"), "min");
        write(&member.join("button.d.ts"), "declare");
        write(&member.join("types/extra.d.ts"), "extra");

        let organizer = ResourceOrganizer::new(root);
        let descriptor = ComponentDescriptor::member("oj-pack", "button", "1.0.0");
        let outcome = organizer.organize(&descriptor).await.unwrap();

        assert!(root.join("oj-pack/min/button/loader.js").exists());
        assert!(!member.join("min").exists());
        assert!(root.join("oj-pack/types/button/button.d.ts").exists());
        assert!(root.join("oj-pack/types/button/extra.d.ts").exists());
        assert!(!member.join("button.d.ts").exists());
        assert!(!member.join("types").exists());
        assert_eq!(outcome.mapping_name.as_deref(), Some("oj-pack"));
        assert_eq!(outcome.types_dir, Some(root.join("oj-pack/types")));
    }

    #[tokio::test]
    async fn test_singleton_definitions_move_into_own_types_folder() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let unit = root.join("oj-sample");
        write(&unit.join("component.json"), "{}");
        write(&unit.join("lib/sample.d.ts"), "new");
        write(&unit.join("types/lib/sample.d.ts"), "existing");
        write(&unit.join("types/index.d.ts"), "index");

        let organizer = ResourceOrganizer::new(root);
        let outcome = organizer
            .organize(&ComponentDescriptor::singleton("oj-sample", "1.0.0"))
            .await
            .unwrap();

        // the destination already existed, so the file stays where it was
        assert_eq!(
            fs::read_to_string(unit.join("types/lib/sample.d.ts")).unwrap(),
            "existing"
        );
        assert!(unit.join("lib/sample.d.ts").exists());
        assert!(unit.join("types/index.d.ts").exists());
        assert_eq!(outcome.mapping_name.as_deref(), Some("oj-sample"));
        assert_eq!(outcome.moved_files, 0);
    }

    #[tokio::test]
    async fn test_pack_root_is_never_organized() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("oj-pack/min/bundle.js"), "bundle");

        let organizer = ResourceOrganizer::new(root);
        let outcome = organizer
            .organize(&ComponentDescriptor::pack("oj-pack", "1.0.0"))
            .await
            .unwrap();

        assert_eq!(outcome, OrganizedResources::default());
        assert!(root.join("oj-pack/min/bundle.js").exists());
    }
}
