//! netbox-sync: keeps NetBox devices in line with declarative manifests.
//!
//! Two ways to run:
//! - `run`: controller mode. Mirrors a manifest file into an object store and
//!   reconciles every device until stopped, deleting NetBox records for
//!   devices removed from the file.
//! - `apply` / `delete` / `get`: one-shot operations against NetBox.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tabled::{Table, Tabled};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netbox_sync::manifest::{ManifestSource, load_manifests};
use netbox_sync::store::ObjectStore;
use netbox_sync::{
    Config, Controller, Device, DeviceReconciler, MemoryStore, NetboxClient, NetboxServer,
};

/// Declarative NetBox
#[derive(Parser, Debug)]
#[command(name = "netbox-sync", version, about)]
struct Args {
    /// NetBox URL (e.g., https://netbox.example.com)
    #[arg(long, env = "NETBOX_URL")]
    netbox_url: String,

    /// NetBox API token
    #[arg(long, env = "NETBOX_TOKEN", hide_env_values = true)]
    netbox_token: String,

    /// Seconds to wait before retrying a failed sync
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    retry_interval: u64,

    /// Per-request timeout for NetBox calls in seconds
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..))]
    request_timeout: u64,

    /// Enable debug-level logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the devices in a manifest file until stopped
    Run {
        /// Manifest file with the desired devices
        #[arg(short, long)]
        manifest: PathBuf,

        /// Seconds between manifest re-reads
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: u64,

        /// Seconds between full resyncs of every device
        #[arg(long, default_value = "600", value_parser = clap::value_parser!(u64).range(1..))]
        resync_interval: u64,
    },

    /// Create or update the devices in a manifest file
    Apply {
        /// Manifest file
        file: PathBuf,
    },

    /// Delete the devices in a manifest file
    Delete {
        /// Manifest file
        file: PathBuf,
    },

    /// List devices in NetBox
    #[command(alias = "devices")]
    Get {
        /// Device name (all devices if omitted)
        name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Check that NetBox accepts the token
    CheckAuth,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TYPE")]
    device_type: String,
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "SITE")]
    site: String,
}

impl From<Device> for DeviceRow {
    fn from(dev: Device) -> Self {
        Self {
            id: dev
                .status
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            name: dev.metadata.name,
            device_type: dev.spec.device_type,
            role: dev.spec.role,
            site: dev.spec.site,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "netbox_sync=debug,reqwest=warn,hyper=warn"
    } else {
        "netbox_sync=info,reqwest=warn,hyper=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = Config::new(args.netbox_url, args.netbox_token)
        .with_retry_interval(Duration::from_secs(args.retry_interval))
        .with_request_timeout(Duration::from_secs(args.request_timeout));
    let client = NetboxClient::new(&config).context("Failed to build NetBox client")?;

    match args.command {
        Commands::Run {
            manifest,
            poll_interval,
            resync_interval,
        } => run(config, client, manifest, poll_interval, resync_interval).await,

        Commands::Apply { file } => {
            let server = NetboxServer::new(client);
            for mut resource in load_manifests(&file).await? {
                server
                    .apply(&mut resource)
                    .await
                    .with_context(|| format!("failed to apply {}", resource.name()))?;
                println!("{} {} applied", resource.kind(), resource.name());
            }
            Ok(())
        }

        Commands::Delete { file } => {
            let server = NetboxServer::new(client);
            for mut resource in load_manifests(&file).await? {
                server
                    .delete(&mut resource)
                    .await
                    .with_context(|| format!("failed to delete {}", resource.name()))?;
                println!("{} {} deleted", resource.kind(), resource.name());
            }
            Ok(())
        }

        Commands::Get { name, output } => {
            let server = NetboxServer::new(client);
            let devices = server.devices().list(name.as_deref()).await?;
            match output {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&devices)?);
                }
                OutputFormat::Table if devices.is_empty() => println!("No devices found"),
                OutputFormat::Table => {
                    let rows: Vec<DeviceRow> = devices.into_iter().map(DeviceRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
            Ok(())
        }

        Commands::CheckAuth => {
            client.check_auth().await?;
            println!("Authenticated against {}", config.netbox_url);
            Ok(())
        }
    }
}

async fn run(
    config: Config,
    client: NetboxClient,
    manifest: PathBuf,
    poll_interval: u64,
    resync_interval: u64,
) -> Result<()> {
    client
        .check_auth()
        .await
        .with_context(|| format!("NetBox at {} is not usable", config.netbox_url))?;
    info!("Connected to NetBox at {}", config.netbox_url);

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let source = ManifestSource::new(&manifest, Arc::clone(&store));
    source
        .sync()
        .await
        .with_context(|| format!("Failed to load {}", manifest.display()))?;
    let watcher = tokio::spawn(source.watch(Duration::from_secs(poll_interval)));

    let reconciler = Arc::new(DeviceReconciler::new(Arc::clone(&store), client, &config));
    let controller = Controller::new(store, reconciler, &config)
        .with_resync_interval(Duration::from_secs(resync_interval));

    controller
        .run(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        })
        .await;

    watcher.abort();
    Ok(())
}
