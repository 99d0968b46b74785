//! Scriptable fakes for the control plane and the local mounter.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::cloud::{
    AccessPoint, AccessPointOptions, Cloud, CloudError, DelegatedCloudFactory, FileSystem,
    MountTarget,
};
use crate::credentials::ResolvedCloud;
use crate::mount::Mounter;
use crate::params::ROLE_ARN;

pub const FAKE_MOUNT_TARGET_IP: &str = "10.0.12.34";

pub fn secrets_with_role(role: &str) -> HashMap<String, String> {
    HashMap::from([(ROLE_ARN.to_string(), role.to_string())])
}

pub fn default_resolved(cloud: Arc<FakeCloud>) -> ResolvedCloud {
    ResolvedCloud::new(cloud, None)
}

pub fn delegated_resolved(cloud: Arc<FakeCloud>, role: &str) -> ResolvedCloud {
    ResolvedCloud::new(cloud, Some(role.to_string()))
}

/// In-memory control plane recording every call
#[derive(Default)]
pub struct FakeCloud {
    calls: Mutex<Vec<String>>,
    access_points: Mutex<HashMap<String, AccessPoint>>,
    created_options: Mutex<Vec<AccessPointOptions>>,
    next_id: AtomicUsize,
    describe_file_system_error: Mutex<Option<CloudError>>,
    create_error: Mutex<Option<CloudError>>,
    describe_access_point_error: Mutex<Option<CloudError>>,
    delete_error: Mutex<Option<CloudError>>,
    mount_targets_error: Mutex<Option<CloudError>>,
    mount_targets_delay: Mutex<Option<Duration>>,
}

impl FakeCloud {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn created_options(&self) -> Vec<AccessPointOptions> {
        self.created_options.lock().clone()
    }

    pub fn insert_access_point(&self, access_point: AccessPoint) {
        self.access_points
            .lock()
            .insert(access_point.access_point_id.clone(), access_point);
    }

    pub fn has_access_point(&self, access_point_id: &str) -> bool {
        self.access_points.lock().contains_key(access_point_id)
    }

    pub fn fail_describe_file_system(&self, err: CloudError) {
        *self.describe_file_system_error.lock() = Some(err);
    }

    pub fn fail_create(&self, err: CloudError) {
        *self.create_error.lock() = Some(err);
    }

    pub fn fail_describe_access_point(&self, err: CloudError) {
        *self.describe_access_point_error.lock() = Some(err);
    }

    pub fn fail_delete(&self, err: CloudError) {
        *self.delete_error.lock() = Some(err);
    }

    pub fn fail_mount_targets(&self, err: CloudError) {
        *self.mount_targets_error.lock() = Some(err);
    }

    /// Stall every mount target lookup for `delay`
    pub fn delay_mount_targets(&self, delay: Duration) {
        *self.mount_targets_delay.lock() = Some(delay);
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn injected(slot: &Mutex<Option<CloudError>>) -> Result<(), CloudError> {
    match slot.lock().clone() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait]
impl Cloud for FakeCloud {
    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystem, CloudError> {
        self.record(format!("describe_file_system {}", file_system_id));
        injected(&self.describe_file_system_error)?;
        Ok(FileSystem {
            file_system_id: file_system_id.to_string(),
        })
    }

    async fn create_access_point(
        &self,
        client_token: &str,
        options: &AccessPointOptions,
    ) -> Result<AccessPoint, CloudError> {
        self.record(format!(
            "create_access_point {} {}",
            client_token, options.file_system_id
        ));
        injected(&self.create_error)?;

        let id = format!("fsap-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let access_point = AccessPoint {
            access_point_id: id,
            file_system_id: options.file_system_id.clone(),
            root_directory: options.directory_path.clone(),
        };
        self.created_options.lock().push(options.clone());
        self.insert_access_point(access_point.clone());
        Ok(access_point)
    }

    async fn describe_access_point(
        &self,
        access_point_id: &str,
    ) -> Result<AccessPoint, CloudError> {
        self.record(format!("describe_access_point {}", access_point_id));
        injected(&self.describe_access_point_error)?;
        self.access_points
            .lock()
            .get(access_point_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(access_point_id.to_string()))
    }

    async fn delete_access_point(&self, access_point_id: &str) -> Result<(), CloudError> {
        self.record(format!("delete_access_point {}", access_point_id));
        injected(&self.delete_error)?;
        self.access_points
            .lock()
            .remove(access_point_id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(access_point_id.to_string()))
    }

    async fn describe_mount_targets(
        &self,
        file_system_id: &str,
        availability_zone: Option<&str>,
    ) -> Result<MountTarget, CloudError> {
        self.record(format!(
            "describe_mount_targets {} {}",
            file_system_id,
            availability_zone.unwrap_or("-")
        ));
        let delay = *self.mount_targets_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        injected(&self.mount_targets_error)?;
        Ok(MountTarget {
            mount_target_id: "fsmt-1".to_string(),
            availability_zone: availability_zone.unwrap_or("us-east-1a").to_string(),
            ip_address: FAKE_MOUNT_TARGET_IP.to_string(),
        })
    }
}

/// Delegated-handle factory that records requested roles
#[derive(Default)]
pub struct FakeCloudFactory {
    roles: Mutex<Vec<String>>,
    cloud: Option<Arc<FakeCloud>>,
    fail: bool,
}

impl FakeCloudFactory {
    pub fn returning(cloud: Arc<FakeCloud>) -> Self {
        Self {
            cloud: Some(cloud),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn requested_roles(&self) -> Vec<String> {
        self.roles.lock().clone()
    }
}

#[async_trait]
impl DelegatedCloudFactory for FakeCloudFactory {
    async fn with_role(&self, role_arn: &str) -> Result<Arc<dyn Cloud>, CloudError> {
        self.roles.lock().push(role_arn.to_string());
        if self.fail {
            return Err(CloudError::AccessDenied(format!("cannot assume {}", role_arn)));
        }
        let cloud: Arc<dyn Cloud> = match &self.cloud {
            Some(cloud) => cloud.clone(),
            None => Arc::new(FakeCloud::default()),
        };
        Ok(cloud)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    MakeDir(PathBuf),
    Mount {
        source: String,
        target: PathBuf,
        fs_type: String,
        options: Vec<String>,
    },
    Unmount(PathBuf),
    CreateDirAll(PathBuf),
}

/// Mounter that maps each mounted scratch directory onto a per-file-system
/// directory under a tempdir, standing in for the remote root.
pub struct FakeMounter {
    dir: TempDir,
    mounts: Mutex<HashMap<PathBuf, String>>,
    calls: Mutex<Vec<MountCall>>,
    chowns: Mutex<Vec<(PathBuf, u32, u32)>>,
    fail_make_dir: AtomicBool,
    fail_mount: AtomicBool,
    fail_unmount: AtomicBool,
    mount_delay: Mutex<Option<Duration>>,
}

impl Default for FakeMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMounter {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            mounts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            chowns: Mutex::new(Vec::new()),
            fail_make_dir: AtomicBool::new(false),
            fail_mount: AtomicBool::new(false),
            fail_unmount: AtomicBool::new(false),
            mount_delay: Mutex::new(None),
        }
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// Directory standing in for the root of `file_system_id`
    pub fn remote_root(&self, file_system_id: &str) -> PathBuf {
        let root = self.dir.path().join("remote").join(file_system_id);
        fs::create_dir_all(&root).expect("create remote root");
        root
    }

    pub fn calls(&self) -> Vec<MountCall> {
        self.calls.lock().clone()
    }

    pub fn chowns(&self) -> Vec<(PathBuf, u32, u32)> {
        self.chowns.lock().clone()
    }

    pub fn active_mounts(&self) -> usize {
        self.mounts.lock().len()
    }

    /// Number of scratch directories left on disk
    pub fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn fail_make_dir(&self) {
        self.fail_make_dir.store(true, Ordering::SeqCst);
    }

    pub fn fail_mount(&self) {
        self.fail_mount.store(true, Ordering::SeqCst);
    }

    pub fn fail_unmount(&self) {
        self.fail_unmount.store(true, Ordering::SeqCst);
    }

    /// Make every mount block its thread for `delay` before succeeding
    pub fn delay_mount(&self, delay: Duration) {
        *self.mount_delay.lock() = Some(delay);
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let mounts = self.mounts.lock();
        for (target, file_system_id) in mounts.iter() {
            if let Ok(rest) = path.strip_prefix(target) {
                return self.dir.path().join("remote").join(file_system_id).join(rest);
            }
        }
        path.to_path_buf()
    }

    fn injected(flag: &AtomicBool, what: &str) -> io::Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(io::Error::other(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

impl Mounter for FakeMounter {
    fn make_dir(&self, path: &Path) -> io::Result<()> {
        self.calls.lock().push(MountCall::MakeDir(path.to_path_buf()));
        Self::injected(&self.fail_make_dir, "mkdir")?;
        fs::create_dir_all(path)
    }

    fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> io::Result<()> {
        self.calls.lock().push(MountCall::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fs_type: fs_type.to_string(),
            options: options.to_vec(),
        });
        Self::injected(&self.fail_mount, "mount")?;
        let delay = *self.mount_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.remote_root(source);
        self.mounts
            .lock()
            .insert(target.to_path_buf(), source.to_string());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        self.calls.lock().push(MountCall::Unmount(target.to_path_buf()));
        Self::injected(&self.fail_unmount, "unmount")?;
        match self.mounts.lock().remove(target) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "not mounted")),
        }
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

        self.calls.lock().push(MountCall::CreateDirAll(path.to_path_buf()));
        let path = self.resolve(path);
        fs::DirBuilder::new().recursive(true).mode(mode).create(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let path = self.resolve(path);
        fs::metadata(&path)?;
        self.chowns.lock().push((path, uid, gid));
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(self.resolve(path))
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(self.resolve(path)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
