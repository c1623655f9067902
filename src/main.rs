//! pxebootd - PXE boot assistant daemon
//!
//! Runs a proxyDHCP responder next to an existing DHCP server and a TFTP
//! server for the boot files.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pxeboot::{Config, ProxyDhcpServer, TftpServer, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "pxebootd")]
#[command(version, about = "PXE boot assistant - proxyDHCP and TFTP")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// TFTP server address announced to PXE clients
    #[arg(short, long)]
    server_ip: Option<Ipv4Addr>,

    /// Boot file name announced to PXE clients
    #[arg(short, long)]
    boot_file: Option<String>,

    /// Directory served over TFTP
    #[arg(short, long)]
    tftp_root: Option<PathBuf>,

    /// Network interface to listen on (e.g., eth0)
    #[arg(short, long)]
    interface: Option<String>,

    /// Do not start the TFTP server
    #[arg(long)]
    no_tftp: bool,

    /// Accept TFTP uploads
    #[arg(long)]
    tftp_allow_write: bool,

    /// Log every request and the decision taken
    #[arg(long)]
    log: bool,

    /// Also hex-dump request and reply bytes
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(server_ip) = self.server_ip {
            config.boot.server_ip = server_ip;
        }
        if let Some(boot_file) = self.boot_file {
            config.boot.boot_file = boot_file;
        }
        if let Some(root) = self.tftp_root {
            config.tftp.root = root;
        }
        if let Some(interface) = self.interface {
            config.dhcp.interface = Some(interface);
        }
        if self.no_tftp {
            config.tftp.enabled = false;
        }
        if self.tftp_allow_write {
            config.tftp.allow_write = true;
        }
        config.log |= self.log;
        config.debug |= self.debug;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let config_path = args.config.clone();
    args.apply(&mut config);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting pxebootd");
    info!("Config path: {:?}", config_path);

    let config = Arc::new(config);

    let shutdown = Arc::new(Notify::new());
    let notify = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping");
        notify.notify_one();
    })
    .context("Failed to install signal handler")?;

    let dhcp = ProxyDhcpServer::new(Arc::clone(&config));

    let tftp = config.tftp.enabled.then(|| {
        info!("Serving files from: {}", config.tftp.root.display());
        TftpServer::new(&config)
    });
    let tftp_task = async {
        match &tftp {
            Some(server) => server.run().await,
            None => std::future::pending().await,
        }
    };

    let result = tokio::select! {
        result = dhcp.run() => result.context("ProxyDHCP server failed"),
        result = tftp_task => result.context("TFTP server failed"),
        _ = shutdown.notified() => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("Server stopped");
    result
}
