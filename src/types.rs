//! Request and descriptor types exchanged with the front end
//!
//! These mirror the subset of the Container Storage Interface controller
//! messages the provisioner consumes. They are plain data: no validation
//! happens here, strategies parse what they need (see [`crate::params`]).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque volume identifier handed back to the caller.
///
/// The caller persists this string and presents it again on delete; its
/// structure is owned by [`crate::volume_id::VolumeHandle`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VolumeId(pub String);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Request to provision a new volume
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateVolumeRequest {
    /// Caller-unique volume name
    pub name: String,

    /// Required capacity in bytes. Advisory only: EFS does not enforce it,
    /// but the orchestrator matches claims to volumes by it.
    #[serde(default)]
    pub capacity_bytes: i64,

    /// Storage-class parameters
    #[serde(default)]
    pub parameters: HashMap<String, String>,

    /// Per-call secrets (may carry a cross-account role)
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

/// Request to delete a previously provisioned volume
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteVolumeRequest {
    pub volume_id: VolumeId,

    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

/// Descriptor of a provisioned volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    /// Capacity echoed from the request
    pub capacity_bytes: i64,
    pub volume_id: VolumeId,
    /// Hints needed at mount time (e.g. a resolved mount target address)
    pub volume_context: HashMap<String, String>,
}
