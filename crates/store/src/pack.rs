//! Expansion of pack-level requests into member-level descriptors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::environment::scan_pack_members;
use crate::error::{ExchangeError, Result};
use crate::models::{ComponentDescriptor, ComponentJson, ComponentRequest, validate_unit_name};
use crate::registry::RegistryClient;

pub struct PackExpander {
    client: Arc<RegistryClient>,
    components_root: PathBuf,
}

impl PackExpander {
    pub fn new(client: Arc<RegistryClient>, components_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            components_root: components_root.into(),
        }
    }

    /// The pack followed by one descriptor per member listed in its dependency map
    pub async fn expand_add(&self, request: &ComponentRequest) -> Result<Vec<ComponentDescriptor>> {
        let metadata = self
            .client
            .get_metadata(&request.name, request.version.as_deref())
            .await?;

        if !metadata.is_pack() {
            return Err(ExchangeError::Validation(format!(
                "'{}' is not a pack",
                request.name
            )));
        }

        let descriptors = pack_descriptors(&request.name, &metadata)?;
        info!(
            "Pack {}@{} expands to {} member(s)",
            request.name,
            metadata.version,
            descriptors.len() - 1
        );
        Ok(descriptors)
    }

    /// The pack followed by every installed member that still has a descriptor file
    pub async fn expand_remove(&self, pack: &str) -> Result<Vec<ComponentDescriptor>> {
        validate_unit_name(pack)?;
        let pack_dir = self.components_root.join(pack);
        let json = ComponentJson::read_from_dir(&pack_dir)
            .await?
            .ok_or_else(|| ExchangeError::ComponentNotFound(pack.to_string()))?;

        if !json.is_pack() {
            return Err(ExchangeError::Validation(format!("'{}' is not a pack", pack)));
        }

        let mut descriptors = vec![ComponentDescriptor::pack(pack, json.version)];
        for (member, member_json) in scan_pack_members(&pack_dir).await? {
            debug!("Found installed member {}/{}", pack, member);
            descriptors.push(ComponentDescriptor::member(pack, member, member_json.version));
        }

        Ok(descriptors)
    }
}

/// Build descriptors from pack metadata; dependency keys must carry the `<pack>-` prefix
pub fn pack_descriptors(pack: &str, metadata: &ComponentJson) -> Result<Vec<ComponentDescriptor>> {
    let prefix = format!("{}-", pack);
    let mut descriptors = vec![ComponentDescriptor::pack(pack, metadata.version.clone())];

    for (key, version) in &metadata.dependencies {
        let member = key
            .strip_prefix(&prefix)
            .filter(|member| !member.is_empty())
            .ok_or_else(|| {
                ExchangeError::Validation(format!(
                    "dependency '{}' of pack '{}' is missing the '{}' prefix",
                    key, pack, prefix
                ))
            })?;
        validate_unit_name(member)?;
        descriptors.push(ComponentDescriptor::member(pack, member, version.clone()));
    }

    Ok(descriptors)
}

/// Requested-change map (`fullName -> version`) for a descriptor batch
pub fn descriptor_changes(descriptors: &[ComponentDescriptor]) -> BTreeMap<String, String> {
    descriptors
        .iter()
        .map(|d| (d.full_name.clone(), d.version.clone()))
        .collect()
}
