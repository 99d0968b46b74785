//! efs-provisioner operator entry point

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use efs_provisioner::cloud::efs::{load_sdk_config, EfsCloud, EfsCloudFactory};
use efs_provisioner::config::Config;
use efs_provisioner::credentials::CredentialResolver;
use efs_provisioner::mount::SystemMounter;
use efs_provisioner::provisioner::{Provisioners, ProvisioningMode};
use efs_provisioner::sequencer::MountSequencer;
use efs_provisioner::{CreateVolumeRequest, DeleteVolumeRequest, ProvisionError, VolumeId};

/// Print usage information
fn print_usage() {
    eprintln!("Usage: efs-provisioner <config.yaml> <create|delete> <request.yaml>");
    eprintln!();
    eprintln!("efs-provisioner - provision volumes on Amazon EFS");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml     Path to configuration file");
    eprintln!("  create          Provision a volume and print its descriptor");
    eprintln!("  delete          Delete a previously provisioned volume");
    eprintln!("  request.yaml    Path to the request file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  efs-provisioner /etc/efs-provisioner/config.yaml create vol-1.yaml");
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Create,
    Delete,
}

/// Create request as read from the request file
#[derive(Debug, Deserialize)]
struct CreateRequestFile {
    mode: String,
    name: String,
    #[serde(default)]
    capacity_bytes: i64,
    #[serde(default)]
    parameters: HashMap<String, String>,
    #[serde(default)]
    secrets: HashMap<String, String>,
    #[serde(default)]
    uid: u32,
    #[serde(default)]
    gid: u32,
}

/// Delete request as read from the request file
#[derive(Debug, Deserialize)]
struct DeleteRequestFile {
    mode: String,
    volume_id: String,
    #[serde(default)]
    secrets: HashMap<String, String>,
}

fn read_request<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read request file {:?}: {}", path, e))?;
    let request = serde_yaml::from_str(&content)
        .map_err(|e| format!("Failed to parse request file {:?}: {}", path, e))?;
    Ok(request)
}

async fn run(
    provisioners: &Provisioners,
    command: Command,
    request_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Create => {
            let file: CreateRequestFile = read_request(request_path)?;
            let mode: ProvisioningMode = file.mode.parse()?;
            let request = CreateVolumeRequest {
                name: file.name,
                capacity_bytes: file.capacity_bytes,
                parameters: file.parameters,
                secrets: file.secrets,
            };

            let volume = provisioners
                .get(mode)
                .provision(&request, file.uid, file.gid)
                .await?;
            info!("Provisioned volume {} ({})", volume.volume_id, mode);
            print!("{}", serde_yaml::to_string(&volume)?);
        }
        Command::Delete => {
            let file: DeleteRequestFile = read_request(request_path)?;
            let mode: ProvisioningMode = file.mode.parse()?;
            let request = DeleteVolumeRequest {
                volume_id: VolumeId(file.volume_id),
                secrets: file.secrets,
            };

            provisioners.get(mode).delete(&request).await?;
            info!("Deleted volume {} ({})", request.volume_id, mode);
        }
    }
    Ok(())
}

/// Build the provisioners and run one command. Returns the process exit code.
async fn execute(config: Config, command: Command, request_path: PathBuf, label: &str) -> i32 {
    let sdk_config = load_sdk_config(config.aws.region.clone()).await;
    let resolver = CredentialResolver::new(
        Arc::new(EfsCloud::new(&sdk_config)),
        Arc::new(EfsCloudFactory::new(
            sdk_config,
            config.aws.role_session_name.clone(),
        )),
    );
    let sequencer = MountSequencer::new(
        Arc::new(SystemMounter::new()),
        config.provisioning.temp_mount_path.clone(),
    );
    let provisioners = Provisioners::new(resolver, sequencer, config.provisioning.settings());

    // Ctrl+C drops the in-flight operation
    let cancelled = Arc::new(Notify::new());
    let c = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Received interrupt, cancelling");
        c.notify_one();
    }) {
        error!("Failed to install interrupt handler: {}", e);
        return 1;
    }

    let outcome = tokio::select! {
        result = run(&provisioners, command, &request_path) => Some(result),
        _ = cancelled.notified() => None,
    };

    match outcome {
        Some(Ok(())) => 0,
        Some(Err(e)) => {
            match e.downcast_ref::<ProvisionError>() {
                Some(err) => error!("{} failed: {}: {}", label, err.code(), err.message()),
                None => error!("{} failed: {}", label, e),
            }
            1
        }
        None => {
            error!("{} cancelled", label);
            130
        }
    }
}

fn main() {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let command = match args[2].as_str() {
        "create" => Command::Create,
        "delete" => Command::Delete,
        _ => {
            print_usage();
            std::process::exit(1);
        }
    };
    let request_path = PathBuf::from(&args[3]);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging; stdout carries the volume descriptor
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("efs-provisioner starting");
    info!("Loaded configuration from {:?}", config_path);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(execute(config, command, request_path, &args[2]));

    // A cancelled operation leaves its mount teardown on the blocking pool;
    // dropping the runtime waits for it.
    drop(runtime);
    std::process::exit(code);
}
