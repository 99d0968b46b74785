//! Access point strategy
//!
//! Each volume is a managed access point rooted at `basePath/name`. The
//! control plane creates the root directory with the requested owner and
//! permissions on first use. On delete the root directory is optionally
//! removed through a scratch root mount before the access point goes away.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{Provisioner, ProvisionerSettings};
use crate::cloud::CloudError;
use crate::credentials::{CredentialResolver, ResolvedCloud};
use crate::error::{ProvisionError, Result};
use crate::params::{
    client_token, relative_to_root, AccessPointOptionsBuilder, VolumeParameters,
    MOUNT_TARGET_IP,
};
use crate::sequencer::MountSequencer;
use crate::types::{CreateVolumeRequest, DeleteVolumeRequest, Volume};
use crate::volume_id::VolumeHandle;

#[derive(Clone)]
pub struct AccessPointProvisioner {
    resolver: CredentialResolver,
    sequencer: MountSequencer,
    tags: HashMap<String, String>,
    delete_root_dir: bool,
}

impl AccessPointProvisioner {
    pub fn new(
        resolver: CredentialResolver,
        sequencer: MountSequencer,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            resolver,
            sequencer,
            tags: settings.tags,
            delete_root_dir: settings.delete_access_point_root_dir,
        }
    }

    /// Remove the access point's root directory. `Ok(false)` means the
    /// access point is already gone and there is nothing left to delete.
    async fn delete_root_directory(
        &self,
        cloud: &ResolvedCloud,
        file_system_id: &str,
        access_point_id: &str,
    ) -> Result<bool> {
        let access_point = match cloud.cloud().describe_access_point(access_point_id).await {
            Ok(access_point) => access_point,
            Err(CloudError::NotFound(_)) => {
                debug!("access point {} already deleted", access_point_id);
                return Ok(false);
            }
            Err(CloudError::AccessDenied(e)) => {
                return Err(ProvisionError::Unauthenticated(format!(
                    "Access denied describing access point {}: {}",
                    access_point_id, e
                )));
            }
            Err(e) => {
                return Err(ProvisionError::internal(
                    format!("Failed to describe access point {}", access_point_id),
                    e,
                ));
            }
        };

        let root_directory = access_point.root_directory;
        let relative = relative_to_root(&root_directory).ok_or_else(|| {
            ProvisionError::Internal(format!(
                "Refusing to delete root directory {:?} of access point {}",
                root_directory, access_point_id
            ))
        })?;

        let path = root_directory.clone();
        self.sequencer
            .with_root_mount(cloud, file_system_id, move |mounter, root| {
                mounter.remove_all(&root.join(&relative)).map_err(|e| {
                    ProvisionError::internal(
                        format!("Could not delete access point root directory {:?}", path),
                        e,
                    )
                })
            })
            .await?;

        debug!(
            "deleted root directory {} of access point {}",
            root_directory, access_point_id
        );
        Ok(true)
    }
}

#[async_trait]
impl Provisioner for AccessPointProvisioner {
    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn provision(
        &self,
        request: &CreateVolumeRequest,
        uid: u32,
        gid: u32,
    ) -> Result<Volume> {
        if request.name.is_empty() {
            return Err(ProvisionError::InvalidArgument(
                "Volume name not provided".to_string(),
            ));
        }

        let params = VolumeParameters::parse(&request.parameters)?;
        let options = AccessPointOptionsBuilder::new(&params, &request.name)
            .capacity_bytes(request.capacity_bytes)
            .owner(uid, gid)
            .operator_tags(&self.tags)
            .build()?;

        let cloud = self.resolver.resolve(&request.secrets).await?;

        match cloud.cloud().describe_file_system(&params.file_system_id).await {
            Ok(_) => {}
            Err(CloudError::NotFound(e)) => {
                return Err(ProvisionError::InvalidArgument(format!(
                    "File System does not exist: {}",
                    e
                )));
            }
            Err(CloudError::AccessDenied(e)) => {
                return Err(ProvisionError::Unauthenticated(format!("Access Denied: {}", e)));
            }
            Err(e) => {
                return Err(ProvisionError::internal("Failed to fetch File System info", e));
            }
        }

        let access_point = cloud
            .cloud()
            .create_access_point(&client_token(&request.name), &options)
            .await
            .map_err(|e| match e {
                CloudError::AccessDenied(e) => {
                    ProvisionError::Unauthenticated(format!("Access Denied: {}", e))
                }
                CloudError::AlreadyExists(e) => ProvisionError::AlreadyExists(format!(
                    "Access point for volume {} already exists: {}",
                    request.name, e
                )),
                e => ProvisionError::internal("Failed to create Access point", e),
            })?;

        let mut volume_context = HashMap::new();
        if let Some(ip) = cloud
            .mount_target_ip(&params.file_system_id, params.availability_zone.as_deref())
            .await
        {
            volume_context.insert(MOUNT_TARGET_IP.to_string(), ip);
        }

        info!(
            "Created access point {} rooted at {} on {}",
            access_point.access_point_id, options.directory_path, params.file_system_id
        );

        Ok(Volume {
            capacity_bytes: request.capacity_bytes,
            volume_id: VolumeHandle::access_point(
                &params.file_system_id,
                access_point.access_point_id,
            )
            .encode(),
            volume_context,
        })
    }

    #[instrument(skip(self, request), fields(volume_id = %request.volume_id))]
    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()> {
        let handle = VolumeHandle::decode(&request.volume_id);
        if handle.access_point_id.is_empty() {
            return Err(ProvisionError::NotFound(format!(
                "Failed to find access point for volume {}",
                request.volume_id
            )));
        }

        let cloud = self.resolver.resolve(&request.secrets).await?;

        if self.delete_root_dir
            && !self
                .delete_root_directory(&cloud, &handle.file_system_id, &handle.access_point_id)
                .await?
        {
            return Ok(());
        }

        match cloud.cloud().delete_access_point(&handle.access_point_id).await {
            Ok(()) => {
                info!("Deleted access point {}", handle.access_point_id);
                Ok(())
            }
            Err(CloudError::NotFound(_)) => {
                debug!("access point {} already deleted", handle.access_point_id);
                Ok(())
            }
            Err(CloudError::AccessDenied(e)) => {
                Err(ProvisionError::Unauthenticated(format!("Access Denied: {}", e)))
            }
            Err(e) => Err(ProvisionError::internal(
                format!("Failed to Delete volume {}", request.volume_id),
                e,
            )),
        }
    }
}
