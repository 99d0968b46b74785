//! Subdirectory strategy
//!
//! Each volume is a directory `basePath/name` under the file system root,
//! created and removed through a scratch root mount.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::Provisioner;
use crate::credentials::CredentialResolver;
use crate::error::{ProvisionError, Result};
use crate::params::{relative_to_root, VolumeParameters};
use crate::sequencer::MountSequencer;
use crate::types::{CreateVolumeRequest, DeleteVolumeRequest, Volume};
use crate::volume_id::VolumeHandle;

#[derive(Clone)]
pub struct DirectoryProvisioner {
    resolver: CredentialResolver,
    sequencer: MountSequencer,
}

impl DirectoryProvisioner {
    pub fn new(resolver: CredentialResolver, sequencer: MountSequencer) -> Self {
        Self {
            resolver,
            sequencer,
        }
    }
}

#[async_trait]
impl Provisioner for DirectoryProvisioner {
    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn provision(
        &self,
        request: &CreateVolumeRequest,
        uid: u32,
        gid: u32,
    ) -> Result<Volume> {
        let params = VolumeParameters::parse(&request.parameters)?;
        let provisioned_path = params.provisioned_path(&request.name)?;
        let relative = relative_to_root(&provisioned_path).ok_or_else(|| {
            ProvisionError::InvalidArgument(format!("Invalid volume path {:?}", provisioned_path))
        })?;
        let mode = params.directory_mode();

        let cloud = self.resolver.resolve(&request.secrets).await?;

        let path = provisioned_path.clone();
        self.sequencer
            .with_root_mount(&cloud, &params.file_system_id, move |mounter, root| {
                let dir = root.join(&relative);
                mounter.create_dir_all(&dir, mode).map_err(|e| {
                    ProvisionError::internal(format!("Could not create directory {:?}", path), e)
                })?;
                mounter.chown(&dir, uid, gid).map_err(|e| {
                    ProvisionError::internal(
                        format!("Could not change owner of {:?} to {}:{}", path, uid, gid),
                        e,
                    )
                })
            })
            .await?;

        info!(
            "Provisioned directory {} on {} (mode {:o}, owner {}:{})",
            provisioned_path, params.file_system_id, mode, uid, gid
        );

        Ok(Volume {
            capacity_bytes: request.capacity_bytes,
            volume_id: VolumeHandle::subdirectory(&params.file_system_id, provisioned_path)
                .encode(),
            volume_context: Default::default(),
        })
    }

    #[instrument(skip(self, request), fields(volume_id = %request.volume_id))]
    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()> {
        let handle = VolumeHandle::decode(&request.volume_id);
        let relative = match relative_to_root(&handle.sub_path) {
            Some(relative) => relative,
            None => {
                return Err(ProvisionError::NotFound(format!(
                    "Volume {} does not address a directory",
                    request.volume_id
                )));
            }
        };

        let cloud = self.resolver.resolve(&request.secrets).await?;

        let path = handle.sub_path.clone();
        self.sequencer
            .with_root_mount(&cloud, &handle.file_system_id, move |mounter, root| {
                mounter.remove_all(&root.join(&relative)).map_err(|e| {
                    ProvisionError::internal(format!("Could not delete directory {:?}", path), e)
                })
            })
            .await?;

        debug!("deleted directory {} on {}", handle.sub_path, handle.file_system_id);
        Ok(())
    }
}
