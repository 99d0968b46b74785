//! Amazon EFS control-plane client
//!
//! [`EfsCloud`] implements [`Cloud`] on top of `aws-sdk-efs`.
//! [`EfsCloudFactory`] builds per-call clients that assume a cross-account
//! role through STS; those clients are never cached.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_efs::config::Region;
use aws_sdk_efs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_efs::types::{CreationInfo, LifeCycleState, PosixUser, RootDirectory, Tag};
use aws_sdk_efs::Client;
use tracing::{debug, trace};

use crate::cloud::{
    AccessPoint, AccessPointOptions, Cloud, CloudError, DelegatedCloudFactory, FileSystem,
    MountTarget,
};

/// Error code EFS reports for IAM denials
const ACCESS_DENIED_CODE: &str = "AccessDeniedException";

/// Load the shared SDK configuration from the default provider chain
pub async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}

/// EFS client bound to one set of credentials
pub struct EfsCloud {
    client: Client,
}

impl EfsCloud {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map an SDK failure onto the closed [`CloudError`] set
fn classify<E>(
    err: SdkError<E>,
    is_not_found: impl Fn(&E) -> bool,
    is_already_exists: impl Fn(&E) -> bool,
) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.as_service_error() {
        Some(service) if is_not_found(service) => CloudError::NotFound(message),
        Some(service) if is_already_exists(service) => CloudError::AlreadyExists(message),
        Some(service) if service.code() == Some(ACCESS_DENIED_CODE) => {
            CloudError::AccessDenied(message)
        }
        _ => CloudError::Other(message),
    }
}

fn never<E>(_: &E) -> bool {
    false
}

#[async_trait]
impl Cloud for EfsCloud {
    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystem, CloudError> {
        trace!("describe_file_system: {}", file_system_id);

        let output = self
            .client
            .describe_file_systems()
            .file_system_id(file_system_id)
            .send()
            .await
            .map_err(|e| classify(e, |s| s.is_file_system_not_found(), never))?;

        if output.file_systems().is_empty() {
            return Err(CloudError::NotFound(format!(
                "file system {} not found",
                file_system_id
            )));
        }

        Ok(FileSystem {
            file_system_id: file_system_id.to_string(),
        })
    }

    async fn create_access_point(
        &self,
        client_token: &str,
        options: &AccessPointOptions,
    ) -> Result<AccessPoint, CloudError> {
        debug!(
            "create_access_point: fs={} path={} uid={} gid={}",
            options.file_system_id, options.directory_path, options.uid, options.gid
        );

        let build_err = |e: aws_sdk_efs::error::BuildError| CloudError::Other(e.to_string());

        let posix_user = PosixUser::builder()
            .uid(i64::from(options.uid))
            .gid(i64::from(options.gid))
            .build()
            .map_err(build_err)?;

        let creation_info = CreationInfo::builder()
            .owner_uid(i64::from(options.uid))
            .owner_gid(i64::from(options.gid))
            .permissions(&options.directory_perms)
            .build()
            .map_err(build_err)?;

        let root_directory = RootDirectory::builder()
            .path(&options.directory_path)
            .creation_info(creation_info)
            .build();

        let mut request = self
            .client
            .create_access_point()
            .client_token(client_token)
            .file_system_id(&options.file_system_id)
            .posix_user(posix_user)
            .root_directory(root_directory);

        for (key, value) in &options.tags {
            let tag = Tag::builder().key(key).value(value).build().map_err(build_err)?;
            request = request.tags(tag);
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify(e, never, |s| s.is_access_point_already_exists()))?;

        let access_point_id = output
            .access_point_id()
            .ok_or_else(|| CloudError::Other("CreateAccessPoint returned no id".to_string()))?;

        Ok(AccessPoint {
            access_point_id: access_point_id.to_string(),
            file_system_id: options.file_system_id.clone(),
            root_directory: options.directory_path.clone(),
        })
    }

    async fn describe_access_point(
        &self,
        access_point_id: &str,
    ) -> Result<AccessPoint, CloudError> {
        trace!("describe_access_point: {}", access_point_id);

        let output = self
            .client
            .describe_access_points()
            .access_point_id(access_point_id)
            .send()
            .await
            .map_err(|e| classify(e, |s| s.is_access_point_not_found(), never))?;

        let description = output.access_points().first().ok_or_else(|| {
            CloudError::NotFound(format!("access point {} not found", access_point_id))
        })?;

        Ok(AccessPoint {
            access_point_id: access_point_id.to_string(),
            file_system_id: description.file_system_id().unwrap_or_default().to_string(),
            root_directory: description
                .root_directory()
                .and_then(|r| r.path())
                .unwrap_or("/")
                .to_string(),
        })
    }

    async fn delete_access_point(&self, access_point_id: &str) -> Result<(), CloudError> {
        debug!("delete_access_point: {}", access_point_id);

        self.client
            .delete_access_point()
            .access_point_id(access_point_id)
            .send()
            .await
            .map_err(|e| classify(e, |s| s.is_access_point_not_found(), never))?;

        Ok(())
    }

    async fn describe_mount_targets(
        &self,
        file_system_id: &str,
        availability_zone: Option<&str>,
    ) -> Result<MountTarget, CloudError> {
        trace!(
            "describe_mount_targets: fs={} az={:?}",
            file_system_id,
            availability_zone
        );

        let output = self
            .client
            .describe_mount_targets()
            .file_system_id(file_system_id)
            .send()
            .await
            .map_err(|e| classify(e, |s| s.is_file_system_not_found(), never))?;

        let mut available = output
            .mount_targets()
            .iter()
            .filter(|mt| *mt.life_cycle_state() == LifeCycleState::Available);

        let chosen = match availability_zone {
            Some(az) => available.find(|mt| mt.availability_zone_name() == Some(az)),
            None => available.next(),
        };

        let target = chosen.ok_or_else(|| {
            CloudError::NotFound(format!(
                "no available mount target for file system {} (az: {})",
                file_system_id,
                availability_zone.unwrap_or("any")
            ))
        })?;

        let ip_address = target.ip_address().ok_or_else(|| {
            CloudError::Other(format!(
                "mount target {} has no IP address",
                target.mount_target_id()
            ))
        })?;

        Ok(MountTarget {
            mount_target_id: target.mount_target_id().to_string(),
            availability_zone: target.availability_zone_name().unwrap_or_default().to_string(),
            ip_address: ip_address.to_string(),
        })
    }
}

/// Builds [`EfsCloud`] handles that assume a cross-account IAM role
pub struct EfsCloudFactory {
    sdk_config: SdkConfig,
    session_name: String,
}

impl EfsCloudFactory {
    pub fn new(sdk_config: SdkConfig, session_name: impl Into<String>) -> Self {
        Self {
            sdk_config,
            session_name: session_name.into(),
        }
    }
}

/// Check the shape `arn:<partition>:iam::<account>:role/<name>`
fn validate_role_arn(role_arn: &str) -> Result<(), CloudError> {
    let parts: Vec<&str> = role_arn.splitn(6, ':').collect();
    let valid = parts.len() == 6
        && parts[0] == "arn"
        && !parts[1].is_empty()
        && parts[2] == "iam"
        && !parts[4].is_empty()
        && parts[5].starts_with("role/")
        && parts[5].len() > "role/".len();

    if valid {
        Ok(())
    } else {
        Err(CloudError::AccessDenied(format!(
            "invalid role ARN {:?}",
            role_arn
        )))
    }
}

#[async_trait]
impl DelegatedCloudFactory for EfsCloudFactory {
    async fn with_role(&self, role_arn: &str) -> Result<Arc<dyn Cloud>, CloudError> {
        validate_role_arn(role_arn)?;

        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(self.session_name.clone())
            .configure(&self.sdk_config)
            .build()
            .await;

        // Assume the role now so a bad role fails here rather than on the
        // first control-plane call.
        provider.provide_credentials().await.map_err(|e| {
            CloudError::AccessDenied(format!(
                "assume role {}: {}",
                role_arn,
                DisplayErrorContext(&e)
            ))
        })?;

        let config = aws_sdk_efs::config::Builder::from(&self.sdk_config)
            .credentials_provider(provider)
            .build();

        debug!("built delegated EFS client for role {}", role_arn);
        Ok(Arc::new(EfsCloud::from_client(Client::from_conf(config))))
    }
}
