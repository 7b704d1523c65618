//! Sequential fetch, unpack and normalization of component archives.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::archive;
use crate::error::{ExchangeError, Result};
use crate::host::HostPackageManager;
use crate::models::{ComponentDescriptor, ComponentJson};
use crate::options::ExchangeOptions;
use crate::organizer::{OrganizedResources, ResourceOrganizer};
use crate::path_mapping::PathMappings;
use crate::profiler::{ProfileBucket, Profiler};
use crate::registry::RegistryClient;

/// Where a descriptor is in its install pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Created,
    Fetching { attempt: u32 },
    Unpacking,
    MetadataEnriched,
    ReferenceInstalling,
    ReferenceSkipped,
    ResourceRelocated,
    PathMapped,
    Done,
}

/// A unit that made it through the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledUnit {
    pub descriptor: ComponentDescriptor,
    pub path: PathBuf,
    /// Name registered in the type-system path mappings, if any
    pub path_mapping: Option<String>,
}

pub struct ArchiveInstaller {
    client: Arc<RegistryClient>,
    host: Arc<dyn HostPackageManager>,
    options: ExchangeOptions,
    organizer: ResourceOrganizer,
    mappings: PathMappings,
}

impl ArchiveInstaller {
    pub fn new(
        client: Arc<RegistryClient>,
        host: Arc<dyn HostPackageManager>,
        options: ExchangeOptions,
    ) -> Self {
        let organizer = ResourceOrganizer::new(options.components_root());
        let mappings = PathMappings::new(options.tsconfig_path(), options.components_dir.clone());
        Self {
            client,
            host,
            options,
            organizer,
            mappings,
        }
    }

    /// Install `descriptors` one at a time, in order.
    ///
    /// The first failure stops the batch; units installed before it stay on disk.
    pub async fn install_all(
        &self,
        descriptors: Vec<ComponentDescriptor>,
        profiler: &Profiler,
    ) -> Result<Vec<InstalledUnit>> {
        let total = descriptors.len();
        let mut installed = Vec::with_capacity(total);

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            info!("[{}/{}] Installing {}", index + 1, total, descriptor);
            installed.push(self.install_one(descriptor, profiler).await?);
        }

        Ok(installed)
    }

    pub async fn install_one(
        &self,
        mut descriptor: ComponentDescriptor,
        profiler: &Profiler,
    ) -> Result<InstalledUnit> {
        let mut stage = InstallStage::Created;
        debug!("{}: {:?}", descriptor, stage);

        let components_root = self.options.components_root();
        fs::create_dir_all(&components_root)
            .await
            .map_err(|e| ExchangeError::io("create components directory", &components_root, e))?;

        let bytes = profiler
            .profile(ProfileBucket::FetchComponent, self.fetch(&descriptor, &mut stage))
            .await?;

        stage = InstallStage::Unpacking;
        debug!("{}: {:?}", descriptor, stage);
        let target = descriptor.local_path(&components_root);
        profiler
            .profile(
                ProfileBucket::UnpackArchive,
                self.unpack(&descriptor, &bytes, &components_root, &target),
            )
            .await?;

        let json = ComponentJson::read_from_dir(&target).await?.ok_or_else(|| {
            ExchangeError::Validation(format!(
                "the archive of {} does not contain a component.json",
                descriptor
            ))
        })?;
        validate_descriptor(&descriptor, &json)?;
        descriptor.enrich(&json);
        stage = InstallStage::MetadataEnriched;
        debug!("{}: {:?}", descriptor, stage);

        if descriptor.is_reference() {
            stage = InstallStage::ReferenceInstalling;
            debug!("{}: {:?}", descriptor, stage);
            self.install_reference(&descriptor, &target, profiler).await?;
        } else {
            stage = InstallStage::ReferenceSkipped;
            debug!("{}: {:?}", descriptor, stage);
        }

        let organized = self.organize_with_retry(&descriptor).await?;
        stage = InstallStage::ResourceRelocated;
        debug!("{}: {:?}", descriptor, stage);

        let path_mapping = match organized.mapping_name {
            Some(name) => {
                self.mappings.add(&name).await?;
                Some(name)
            }
            None if descriptor.is_pack() => None,
            None => {
                // no shared types folder left, so any older mapping is stale
                let name = descriptor.pack.as_deref().unwrap_or(&descriptor.name);
                if self.mappings.remove(name).await? {
                    debug!("Dropped stale path mapping of {}", name);
                }
                None
            }
        };
        stage = InstallStage::PathMapped;
        debug!("{}: {:?}", descriptor, stage);

        stage = InstallStage::Done;
        info!("Installed {} ({:?})", descriptor, stage);
        Ok(InstalledUnit {
            descriptor,
            path: target,
            path_mapping,
        })
    }

    async fn fetch(&self, descriptor: &ComponentDescriptor, stage: &mut InstallStage) -> Result<Vec<u8>> {
        let attempts = self.options.fetch_attempts.max(1);
        let mut attempt = 1;

        loop {
            *stage = InstallStage::Fetching { attempt };
            debug!("{}: {:?}", descriptor, stage);

            match self
                .client
                .download(&descriptor.full_name, &descriptor.version)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_recoverable() && attempt < attempts => {
                    warn!(
                        "Fetching {} failed (attempt {}/{}): {}",
                        descriptor, attempt, attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn unpack(
        &self,
        descriptor: &ComponentDescriptor,
        bytes: &[u8],
        components_root: &Path,
        target: &Path,
    ) -> Result<()> {
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}-", descriptor.full_name))
            .suffix(".zip")
            .tempfile_in(components_root)
            .map_err(|e| ExchangeError::io("create temporary archive", components_root, e))?;
        fs::write(temp.path(), bytes)
            .await
            .map_err(|e| ExchangeError::io("write temporary archive", temp.path(), e))?;

        if descriptor.is_pack() {
            archive::purge_pack_dir(target).await?;
        } else if let Some(pack) = &descriptor.pack {
            archive::clear_member_resources(&components_root.join(pack), &descriptor.name).await?;
        }

        if !descriptor.is_pack() && fs::try_exists(target).await.unwrap_or(false) {
            fs::remove_dir_all(target)
                .await
                .map_err(|e| ExchangeError::io("remove previous installation", target, e))?;
        }

        archive::unpack(temp.path(), target).await?;

        temp.close()
            .map_err(|e| ExchangeError::io("delete temporary archive", components_root, e))?;
        Ok(())
    }

    async fn install_reference(
        &self,
        descriptor: &ComponentDescriptor,
        target: &Path,
        profiler: &Profiler,
    ) -> Result<()> {
        let package = descriptor.package.as_deref().unwrap_or(&descriptor.name);

        let result = profiler
            .profile(
                ProfileBucket::InstallReferences,
                self.host
                    .install(package, &descriptor.version, self.options.project_root()),
            )
            .await;

        if let Err(e) = result {
            warn!(
                "Reference install for {} failed, removing {}",
                descriptor,
                target.display()
            );
            if let Err(cleanup) = fs::remove_dir_all(target).await {
                warn!("Could not remove {}: {}", target.display(), cleanup);
            }
            return Err(ExchangeError::PartialInstall {
                component: descriptor.full_name.clone(),
                source: Box::new(e),
            });
        }

        Ok(())
    }

    /// Relocation may hit a transient file lock; it is retried once after a pause
    async fn organize_with_retry(&self, descriptor: &ComponentDescriptor) -> Result<OrganizedResources> {
        retry_once(self.options.lock_retry_delay, || async move {
            self.organizer.organize(descriptor).await.inspect_err(|e| {
                warn!("Relocating resources of {} failed: {}", descriptor, e);
            })
        })
        .await
    }
}

/// Run `step`, and once more after `delay` if the first run fails
async fn retry_once<T, F, Fut>(delay: Duration, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match step().await {
        Ok(value) => Ok(value),
        Err(_) => {
            debug!("Retrying in {:?}", delay);
            tokio::time::sleep(delay).await;
            step().await
        }
    }
}

fn validate_descriptor(descriptor: &ComponentDescriptor, json: &ComponentJson) -> Result<()> {
    let Some(pack) = &descriptor.pack else {
        return Ok(());
    };

    if json.is_pack() {
        return Err(ExchangeError::Validation(format!(
            "{} is a pack inside pack '{}'; packs cannot be nested",
            descriptor, pack
        )));
    }

    if let Some(declared) = &json.pack
        && declared != pack
    {
        return Err(ExchangeError::Validation(format!(
            "{} declares pack '{}' but is installed into pack '{}'",
            descriptor, declared, pack
        )));
    }

    Ok(())
}
