//! efs-provisioner: dynamic volume provisioning on Amazon EFS
//!
//! This library carves volumes out of existing EFS file systems for a
//! container orchestrator's storage front end.
//!
//! # Architecture
//!
//! - **Provisioners**: two strategies behind the [`provisioner::Provisioner`]
//!   trait. Subdirectory mode creates a plain directory per volume; access
//!   point mode creates a managed access point per volume.
//! - **Volume ids**: the durable composite identifier handed back to the
//!   caller ([`volume_id::VolumeHandle`]).
//! - **Credential resolver**: picks the default control-plane handle or a
//!   per-call delegated one for cross-account requests.
//! - **Mount sequencer**: mounts a file system root on a scratch directory,
//!   runs a filesystem operation there, and always unmounts and cleans up.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use efs_provisioner::cloud::efs::{load_sdk_config, EfsCloud, EfsCloudFactory};
//! use efs_provisioner::config::Config;
//! use efs_provisioner::credentials::CredentialResolver;
//! use efs_provisioner::mount::SystemMounter;
//! use efs_provisioner::provisioner::{Provisioners, ProvisioningMode};
//! use efs_provisioner::sequencer::MountSequencer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("config.yaml".as_ref())?;
//! let sdk_config = load_sdk_config(config.aws.region.clone()).await;
//!
//! let resolver = CredentialResolver::new(
//!     Arc::new(EfsCloud::new(&sdk_config)),
//!     Arc::new(EfsCloudFactory::new(sdk_config, "efs-provisioner")),
//! );
//! let sequencer = MountSequencer::new(
//!     Arc::new(SystemMounter::new()),
//!     config.provisioning.temp_mount_path.clone(),
//! );
//! let provisioners = Provisioners::new(resolver, sequencer, config.provisioning.settings());
//! let _access_points = provisioners.get(ProvisioningMode::AccessPoint);
//! # Ok(())
//! # }
//! ```

pub mod cloud;
pub mod config;
pub mod credentials;
pub mod env;
pub mod error;
pub mod mount;
pub mod params;
pub mod provisioner;
pub mod sequencer;
pub mod types;
pub mod volume_id;

#[cfg(test)]
mod test_support;

pub use error::{ProvisionError, Result};
pub use types::{CreateVolumeRequest, DeleteVolumeRequest, Volume, VolumeId};
