//! Mount / operate / unmount sequencer
//!
//! Root-level work on a file system (creating a volume directory, removing
//! one) always follows the same protocol:
//!
//! 1. create a per-call scratch directory under the temp mount prefix
//! 2. mount the file system root there
//! 3. run the operation relative to the mount point
//! 4. unmount
//! 5. recursively remove the scratch directory
//!
//! Steps 1 to 5 run as a single task on the blocking pool. Steps 4 and 5
//! also run when the operation fails or panics, and a dropped calling future
//! leaves the task to finish in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scopeguard::ScopeGuard;
use tracing::{debug, warn, Span};
use uuid::Uuid;

use crate::credentials::ResolvedCloud;
use crate::error::{ProvisionError, Result};
use crate::mount::Mounter;
use crate::params::MOUNT_TARGET_IP;

/// Default parent of all scratch mount points
pub const TEMP_MOUNT_PATH_PREFIX: &str = "/var/lib/csi/pv";

/// Filesystem type handed to the mount helper
pub const EFS_FS_TYPE: &str = "efs";

/// Transport encryption and IAM authorization, always on
const BASE_MOUNT_OPTIONS: [&str; 2] = ["tls", "iam"];

/// Mount options for a root mount, optionally pinned to a mount target
pub fn mount_options(mount_target_ip: Option<&str>) -> Vec<String> {
    let mut options: Vec<String> = BASE_MOUNT_OPTIONS.iter().map(|o| o.to_string()).collect();
    if let Some(ip) = mount_target_ip {
        options.push(format!("{}={}", MOUNT_TARGET_IP, ip));
    }
    options
}

/// Run a blocking mounter call on the blocking pool, inside the caller's span
async fn run_blocking<T, F>(mounter: &Arc<dyn Mounter>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Mounter) -> T + Send + 'static,
{
    let mounter = Arc::clone(mounter);
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        f(mounter.as_ref())
    })
    .await
    .map_err(|e| ProvisionError::internal("Mount task failed", e))
}

/// Unmount, then recursively remove the scratch directory. Never removes it
/// while it may still be mounted.
fn release(mounter: &dyn Mounter, target: &Path) -> Result<()> {
    mounter
        .unmount(target)
        .map_err(|e| ProvisionError::internal(format!("Could not unmount {:?}", target), e))?;
    mounter
        .remove_all(target)
        .map_err(|e| ProvisionError::internal(format!("Could not delete {:?}", target), e))?;
    debug!("released scratch mount {:?}", target);
    Ok(())
}

/// Steps 1 to 5 of the protocol, run start to finish on one blocking thread.
///
/// Dropping the awaiting future does not interrupt this function, so the
/// release always follows the operation.
fn mount_and_run<T, F>(
    mounter: &dyn Mounter,
    file_system_id: &str,
    target: &Path,
    options: &[String],
    operation: F,
) -> Result<T>
where
    F: FnOnce(&dyn Mounter, &Path) -> Result<T>,
{
    mounter
        .make_dir(target)
        .map_err(|e| ProvisionError::internal(format!("Could not create dir {:?}", target), e))?;

    if let Err(e) = mounter.mount(file_system_id, target, EFS_FS_TYPE, options) {
        // Created empty just above; a plain rmdir cannot reach into a
        // half-established mount.
        mounter
            .remove_dir(target)
            .map_err(|e| ProvisionError::internal(format!("Could not delete {:?}", target), e))?;
        return Err(ProvisionError::internal(
            format!("Could not mount {:?} at {:?}", file_system_id, target),
            e,
        ));
    }
    debug!("mounted {} at {:?}", file_system_id, target);

    let guard = scopeguard::guard_on_unwind(target, |target| {
        if let Err(e) = release(mounter, target) {
            warn!("Cleanup after panicked operation on {:?}: {}", target, e);
        }
    });
    let outcome = operation(mounter, target);
    let target = ScopeGuard::into_inner(guard);

    match outcome {
        Ok(value) => {
            release(mounter, target)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(cleanup) = release(mounter, target) {
                warn!("Cleanup after failed operation on {:?}: {}", target, cleanup);
            }
            Err(e)
        }
    }
}

/// Shared root-mount protocol used by both provisioning strategies
#[derive(Clone)]
pub struct MountSequencer {
    mounter: Arc<dyn Mounter>,
    temp_mount_path: PathBuf,
}

impl MountSequencer {
    pub fn new(mounter: Arc<dyn Mounter>, temp_mount_path: impl Into<PathBuf>) -> Self {
        Self {
            mounter,
            temp_mount_path: temp_mount_path.into(),
        }
    }

    pub fn temp_mount_path(&self) -> &Path {
        &self.temp_mount_path
    }

    /// Mount the root of `file_system_id`, run `operation` against the mount
    /// point, then unmount and clean up.
    ///
    /// `operation` receives the mounter plus the mount point. Its error is
    /// returned after a best-effort teardown. Teardown failures after a
    /// successful operation are `Internal`.
    ///
    /// The mount target lookup is the only cancellable step. Once the scratch
    /// directory exists, the rest runs to completion on the blocking pool
    /// even if the returned future is dropped.
    pub async fn with_root_mount<T, F>(
        &self,
        cloud: &ResolvedCloud,
        file_system_id: &str,
        operation: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Mounter, &Path) -> Result<T> + Send + 'static,
    {
        let mount_target_ip = cloud.mount_target_ip(file_system_id, None).await;
        let options = mount_options(mount_target_ip.as_deref());

        let target = self.temp_mount_path.join(Uuid::new_v4().to_string());
        let source = file_system_id.to_string();
        run_blocking(&self.mounter, move |m| {
            mount_and_run(m, &source, &target, &options, operation)
        })
        .await
        .and_then(|inner| inner)
    }
}
