//! Local mount collaborator
//!
//! [`Mounter`] is the narrow contract the provisioners use to touch the local
//! host: mount and unmount plus the handful of filesystem primitives needed
//! on a mounted file system root. All methods block; async callers go through
//! [`crate::sequencer`], which moves them onto the blocking pool.

use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

/// Mount and filesystem primitives
pub trait Mounter: Send + Sync {
    /// Create a mount point directory (and its parents)
    fn make_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn mount(&self, source: &str, target: &Path, fs_type: &str, options: &[String])
        -> io::Result<()>;

    fn unmount(&self, target: &Path) -> io::Result<()>;

    /// Create a directory tree; the leaf gets exactly `mode`, regardless of umask
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        DirBuilder::new().recursive(true).mode(mode).create(path)?;
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
    }

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    /// Recursively remove `path`. Removing an absent path succeeds.
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// [`Mounter`] backed by the host's `mount(8)` / `umount(8)`.
///
/// Mounting `efs` file systems requires the EFS mount helper to be installed.
#[derive(Debug, Default, Clone)]
pub struct SystemMounter;

impl SystemMounter {
    pub fn new() -> Self {
        Self
    }

    fn run(mut command: Command) -> io::Result<()> {
        debug!("running {:?}", command);
        let output = command.output()?;
        if output.status.success() {
            return Ok(());
        }
        Err(io::Error::other(format!(
            "{:?} exited with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

impl Mounter for SystemMounter {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> io::Result<()> {
        info!("Mounting {} at {:?} (type {}, options {:?})", source, target, fs_type, options);

        let mut command = Command::new("mount");
        command.arg("-t").arg(fs_type);
        if !options.is_empty() {
            command.arg("-o").arg(options.join(","));
        }
        command.arg(source).arg(target);
        Self::run(command)
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        info!("Unmounting {:?}", target);

        let mut command = Command::new("umount");
        command.arg(target);
        Self::run(command)
    }
}
