//! Parse-and-validate step for request parameters
//!
//! The orchestrator hands over a weakly-typed `String -> String` map. Every
//! recognised key is read exactly once here; strategies only see the typed
//! [`VolumeParameters`] and the derived [`AccessPointOptions`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cloud::AccessPointOptions;
use crate::error::{ProvisionError, Result};

/// File system id parameter (required)
pub const FS_ID: &str = "fileSystemId";
/// Directory the volume is created under (optional)
pub const BASE_PATH: &str = "basePath";
/// Octal permission bits of the volume root directory (optional)
pub const DIRECTORY_PERMS: &str = "directoryPerms";
/// Preferred availability zone for the cross-account mount target (optional)
pub const AZ_NAME: &str = "az";

/// Secret naming the cross-account role
pub const ROLE_ARN: &str = "awsRoleArn";

/// Volume context key / mount option carrying the mount target address
pub const MOUNT_TARGET_IP: &str = "mounttargetip";

pub const DEFAULT_TAG_KEY: &str = "created-by";
pub const DEFAULT_TAG_VALUE: &str = "efs-provisioner";

/// Default permission bits of a provisioned directory (rwxr-xr-x)
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
pub const DEFAULT_DIRECTORY_PERMS: &str = "0755";

/// Longest idempotency token `CreateAccessPoint` accepts
pub const MAX_CLIENT_TOKEN_LEN: usize = 64;

const RECOGNISED_KEYS: [&str; 4] = [FS_ID, BASE_PATH, DIRECTORY_PERMS, AZ_NAME];

/// Validated view of the storage-class parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeParameters {
    pub file_system_id: String,
    pub base_path: String,
    /// Raw value; each strategy applies its own defaulting rules
    pub directory_perms: Option<String>,
    pub availability_zone: Option<String>,
}

impl VolumeParameters {
    pub fn parse(parameters: &HashMap<String, String>) -> Result<Self> {
        let file_system_id = match parameters.get(FS_ID) {
            Some(value) if value.trim().is_empty() => {
                return Err(ProvisionError::InvalidArgument(format!(
                    "Parameter {} cannot be empty",
                    FS_ID
                )));
            }
            Some(value) => value.clone(),
            None => {
                return Err(ProvisionError::InvalidArgument(format!(
                    "Missing {} parameter",
                    FS_ID
                )));
            }
        };

        for key in parameters.keys() {
            if !RECOGNISED_KEYS.contains(&key.as_str()) {
                debug!("ignoring unrecognised parameter {:?}", key);
            }
        }

        Ok(Self {
            file_system_id,
            base_path: parameters.get(BASE_PATH).cloned().unwrap_or_default(),
            directory_perms: parameters.get(DIRECTORY_PERMS).cloned(),
            availability_zone: parameters
                .get(AZ_NAME)
                .filter(|az| !az.trim().is_empty())
                .cloned(),
        })
    }

    /// `basePath + "/" + volumeName`, checked to stay beneath the root.
    ///
    /// The result always starts with `/`. A relative base path would
    /// otherwise leak into the volume id, where a leading `:` reads as an
    /// access point.
    pub fn provisioned_path(&self, volume_name: &str) -> Result<String> {
        let path = if self.base_path.starts_with('/') {
            format!("{}/{}", self.base_path, volume_name)
        } else {
            format!("/{}/{}", self.base_path, volume_name)
        };
        relative_to_root(&path).ok_or_else(|| {
            ProvisionError::InvalidArgument(format!(
                "Volume path {:?} does not resolve beneath the file system root",
                path
            ))
        })?;
        Ok(path)
    }

    /// Permission bits for subdirectory mode. Malformed values fall back to
    /// the default instead of failing the request.
    pub fn directory_mode(&self) -> u32 {
        self.directory_perms
            .as_deref()
            .and_then(parse_octal_mode)
            .unwrap_or(DEFAULT_DIRECTORY_MODE)
    }
}

/// Parse an octal permission string (`"755"`, `"0750"`). Anything beyond
/// the permission and special bits is rejected.
pub fn parse_octal_mode(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() || value.len() > 4 {
        return None;
    }
    u32::from_str_radix(value, 8).ok().filter(|mode| *mode <= 0o7777)
}

/// Convert an absolute-looking path inside the file system into a relative
/// path suitable for joining onto a mount point.
///
/// Returns `None` for paths that escape the root (`..`) or address the root itself.
pub fn relative_to_root(path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative)
}

/// Idempotency token for creating the access point of `volume_name`.
///
/// Names that fit are used as is. Longer names map to their hex SHA-256,
/// which is exactly [`MAX_CLIENT_TOKEN_LEN`] characters.
pub fn client_token(volume_name: &str) -> String {
    if volume_name.len() <= MAX_CLIENT_TOKEN_LEN {
        return volume_name.to_string();
    }
    hex::encode(Sha256::digest(volume_name.as_bytes()))
}

/// Tags applied to every access point: the default tag seeded first, then
/// operator tags, which win on key collisions.
pub fn access_point_tags(operator_tags: &HashMap<String, String>) -> HashMap<String, String> {
    let mut tags = HashMap::with_capacity(operator_tags.len() + 1);
    tags.insert(DEFAULT_TAG_KEY.to_string(), DEFAULT_TAG_VALUE.to_string());
    tags.extend(operator_tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

/// Builder for [`AccessPointOptions`]; `build` performs the validation.
#[derive(Debug)]
pub struct AccessPointOptionsBuilder<'a> {
    params: &'a VolumeParameters,
    volume_name: &'a str,
    capacity_bytes: i64,
    uid: u32,
    gid: u32,
    operator_tags: Option<&'a HashMap<String, String>>,
}

impl<'a> AccessPointOptionsBuilder<'a> {
    pub fn new(params: &'a VolumeParameters, volume_name: &'a str) -> Self {
        Self {
            params,
            volume_name,
            capacity_bytes: 0,
            uid: 0,
            gid: 0,
            operator_tags: None,
        }
    }

    pub fn capacity_bytes(mut self, capacity_bytes: i64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn operator_tags(mut self, tags: &'a HashMap<String, String>) -> Self {
        self.operator_tags = Some(tags);
        self
    }

    pub fn build(self) -> Result<AccessPointOptions> {
        let params = self.params;
        let directory_perms = match params.directory_perms.as_deref() {
            None => DEFAULT_DIRECTORY_PERMS.to_string(),
            Some(perms) if perms.trim().len() >= 3 && parse_octal_mode(perms).is_some() => {
                perms.trim().to_string()
            }
            Some(perms) => {
                return Err(ProvisionError::InvalidArgument(format!(
                    "Parameter {} must be an octal permission string, got {:?}",
                    DIRECTORY_PERMS, perms
                )));
            }
        };

        let empty = HashMap::new();
        Ok(AccessPointOptions {
            file_system_id: params.file_system_id.clone(),
            capacity_bytes: self.capacity_bytes,
            directory_perms,
            directory_path: params.provisioned_path(self.volume_name)?,
            uid: self.uid,
            gid: self.gid,
            tags: access_point_tags(self.operator_tags.unwrap_or(&empty)),
        })
    }
}
