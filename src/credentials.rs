//! Per-call credential resolution
//!
//! A request either runs against the process-wide default control-plane
//! handle or, when its secrets name a cross-account role, against a freshly
//! built delegated handle. Delegated handles are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cloud::{Cloud, DelegatedCloudFactory};
use crate::error::{ProvisionError, Result};
use crate::params::ROLE_ARN;

/// Control-plane handle resolved for one call
#[derive(Clone)]
pub struct ResolvedCloud {
    cloud: Arc<dyn Cloud>,
    role_arn: Option<String>,
}

impl ResolvedCloud {
    pub(crate) fn new(cloud: Arc<dyn Cloud>, role_arn: Option<String>) -> Self {
        Self { cloud, role_arn }
    }

    pub fn cloud(&self) -> &dyn Cloud {
        self.cloud.as_ref()
    }

    /// Role the handle is scoped to, `None` for the default handle
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn is_delegated(&self) -> bool {
        self.role_arn.is_some()
    }

    /// Best-effort mount target lookup for cross-account mounts.
    ///
    /// Returns `None` for the default handle. A failed lookup is logged and
    /// degrades to `None`; the caller proceeds without the hint.
    pub async fn mount_target_ip(
        &self,
        file_system_id: &str,
        availability_zone: Option<&str>,
    ) -> Option<String> {
        if !self.is_delegated() {
            return None;
        }

        match self
            .cloud
            .describe_mount_targets(file_system_id, availability_zone)
            .await
        {
            Ok(target) => {
                debug!(
                    "using mount target {} ({}) for file system {}",
                    target.mount_target_id, target.ip_address, file_system_id
                );
                Some(target.ip_address)
            }
            Err(e) => {
                warn!(
                    "Failed to describe mount targets for file system {}. Skip using `mounttargetip` mount option: {}",
                    file_system_id, e
                );
                None
            }
        }
    }
}

/// Chooses between the default handle and a delegated one
#[derive(Clone)]
pub struct CredentialResolver {
    default_cloud: Arc<dyn Cloud>,
    factory: Arc<dyn DelegatedCloudFactory>,
}

impl CredentialResolver {
    pub fn new(default_cloud: Arc<dyn Cloud>, factory: Arc<dyn DelegatedCloudFactory>) -> Self {
        Self {
            default_cloud,
            factory,
        }
    }

    /// Resolve the handle for a call's secrets.
    ///
    /// A role that cannot be assumed is fatal: the request never falls back
    /// to the default account.
    pub async fn resolve(&self, secrets: &HashMap<String, String>) -> Result<ResolvedCloud> {
        let role_arn = match secrets.get(ROLE_ARN).map(|r| r.trim()) {
            Some(role) if !role.is_empty() => role,
            _ => {
                return Ok(ResolvedCloud::new(Arc::clone(&self.default_cloud), None));
            }
        };

        let cloud = self.factory.with_role(role_arn).await.map_err(|e| {
            ProvisionError::Unauthenticated(format!(
                "Unable to initialize aws cloud: {}. Please verify role has the correct AWS permissions for cross account mount",
                e
            ))
        })?;

        Ok(ResolvedCloud::new(cloud, Some(role_arn.to_string())))
    }
}
