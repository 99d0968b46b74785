//! Composite volume identifier codec
//!
//! A volume id encodes the logical triple `(file system id, sub-path,
//! access point id)`:
//!
//! ```text
//! fs-123:/export/vol-1     subdirectory volume
//! fs-123::fsap-0abc        access point volume
//! ```
//!
//! The double separator marks an access point id, since sub-paths may
//! themselves contain single separators. The encoding is the only durable
//! handle a caller keeps between provision and delete, so it must not change.

use crate::types::VolumeId;

const SEPARATOR: char = ':';

/// Decoded form of a [`VolumeId`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeHandle {
    pub file_system_id: String,
    /// Empty for access point volumes
    pub sub_path: String,
    /// Empty for subdirectory volumes
    pub access_point_id: String,
}

impl VolumeHandle {
    pub fn subdirectory(file_system_id: impl Into<String>, sub_path: impl Into<String>) -> Self {
        Self {
            file_system_id: file_system_id.into(),
            sub_path: sub_path.into(),
            access_point_id: String::new(),
        }
    }

    pub fn access_point(
        file_system_id: impl Into<String>,
        access_point_id: impl Into<String>,
    ) -> Self {
        Self {
            file_system_id: file_system_id.into(),
            sub_path: String::new(),
            access_point_id: access_point_id.into(),
        }
    }

    pub fn encode(&self) -> VolumeId {
        if self.access_point_id.is_empty() {
            VolumeId(format!("{}{}{}", self.file_system_id, SEPARATOR, self.sub_path))
        } else {
            VolumeId(format!(
                "{}{}{}{}",
                self.file_system_id, SEPARATOR, SEPARATOR, self.access_point_id
            ))
        }
    }

    /// Decode an identifier. Never fails.
    ///
    /// An id without any separator yields the whole string as the file system
    /// id with empty sub-path and access point id; callers treat that as
    /// "nothing to address".
    pub fn decode(id: &VolumeId) -> Self {
        let Some((file_system_id, rest)) = id.0.split_once(SEPARATOR) else {
            return Self {
                file_system_id: id.0.clone(),
                ..Default::default()
            };
        };

        match rest.strip_prefix(SEPARATOR) {
            Some(access_point_id) => Self::access_point(file_system_id, access_point_id),
            None => Self::subdirectory(file_system_id, rest),
        }
    }
}
