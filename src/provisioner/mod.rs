//! Provisioning strategies
//!
//! A volume is carved out of an existing file system either as a plain
//! directory ([`directory::DirectoryProvisioner`]) or as a managed access
//! point ([`access_point::AccessPointProvisioner`]). The strategy is picked
//! per request by its [`ProvisioningMode`]; both are built once from the same
//! read-only dependencies and held by [`Provisioners`].

pub mod access_point;
pub mod directory;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::CredentialResolver;
use crate::error::{ProvisionError, Result};
use crate::sequencer::MountSequencer;
use crate::types::{CreateVolumeRequest, DeleteVolumeRequest, Volume};

pub use access_point::AccessPointProvisioner;
pub use directory::DirectoryProvisioner;

/// Operations exposed to the front end
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a volume owned by `uid`/`gid`
    async fn provision(&self, request: &CreateVolumeRequest, uid: u32, gid: u32)
        -> Result<Volume>;

    /// Delete a volume. Deleting something already gone succeeds.
    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()>;
}

/// Mode identifier selecting a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningMode {
    Subdirectory,
    AccessPoint,
}

impl ProvisioningMode {
    pub const ALL: [ProvisioningMode; 2] =
        [ProvisioningMode::Subdirectory, ProvisioningMode::AccessPoint];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningMode::Subdirectory => "efs-dir",
            ProvisioningMode::AccessPoint => "efs-ap",
        }
    }
}

impl fmt::Display for ProvisioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningMode {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        ProvisioningMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| {
                ProvisionError::InvalidArgument(format!("Unknown provisioning mode: {:?}", s))
            })
    }
}

/// Read-only settings shared by the strategies
#[derive(Debug, Clone, Default)]
pub struct ProvisionerSettings {
    /// Operator tags added to every access point
    pub tags: HashMap<String, String>,
    /// Remove an access point's root directory when the access point is deleted
    pub delete_access_point_root_dir: bool,
}

/// Both strategies, keyed by mode
#[derive(Clone)]
pub struct Provisioners {
    directory: Arc<DirectoryProvisioner>,
    access_point: Arc<AccessPointProvisioner>,
}

impl Provisioners {
    pub fn new(
        resolver: CredentialResolver,
        sequencer: MountSequencer,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            directory: Arc::new(DirectoryProvisioner::new(
                resolver.clone(),
                sequencer.clone(),
            )),
            access_point: Arc::new(AccessPointProvisioner::new(resolver, sequencer, settings)),
        }
    }

    pub fn get(&self, mode: ProvisioningMode) -> Arc<dyn Provisioner> {
        match mode {
            ProvisioningMode::Subdirectory => self.directory.clone(),
            ProvisioningMode::AccessPoint => self.access_point.clone(),
        }
    }
}
