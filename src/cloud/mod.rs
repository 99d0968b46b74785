//! Storage control-plane collaborator
//!
//! The provisioners only see the narrow [`Cloud`] contract below. Retry and
//! pagination policies belong to the concrete client ([`efs::EfsCloud`]).

pub mod efs;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Closed error set reported by every control-plane call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Other(String),
}

/// A file system as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystem {
    pub file_system_id: String,
}

/// A managed access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub access_point_id: String,
    pub file_system_id: String,
    /// Root directory inside the file system, e.g. `/export/vol-1`
    pub root_directory: String,
}

/// A network endpoint of a file system in one availability zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTarget {
    pub mount_target_id: String,
    pub availability_zone: String,
    pub ip_address: String,
}

/// Options for creating an access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointOptions {
    pub file_system_id: String,
    /// Capacity hint; not enforced by EFS
    pub capacity_bytes: i64,
    /// Octal permission string applied when the root directory is created
    pub directory_perms: String,
    /// Root directory path, `basePath + "/" + volumeName`
    pub directory_path: String,
    pub uid: u32,
    pub gid: u32,
    pub tags: HashMap<String, String>,
}

/// Control-plane operations used by the provisioners
#[async_trait]
pub trait Cloud: Send + Sync {
    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystem, CloudError>;

    /// Create an access point. `client_token` makes the call idempotent for a
    /// given volume name.
    async fn create_access_point(
        &self,
        client_token: &str,
        options: &AccessPointOptions,
    ) -> Result<AccessPoint, CloudError>;

    async fn describe_access_point(&self, access_point_id: &str)
        -> Result<AccessPoint, CloudError>;

    async fn delete_access_point(&self, access_point_id: &str) -> Result<(), CloudError>;

    /// Pick an available mount target, preferring `availability_zone` when given
    async fn describe_mount_targets(
        &self,
        file_system_id: &str,
        availability_zone: Option<&str>,
    ) -> Result<MountTarget, CloudError>;
}

/// Builds control-plane handles scoped to a cross-account role
#[async_trait]
pub trait DelegatedCloudFactory: Send + Sync {
    async fn with_role(&self, role_arn: &str) -> Result<Arc<dyn Cloud>, CloudError>;
}
