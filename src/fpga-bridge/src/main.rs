// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod bridge;
mod config;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use fpga_app::{init_logging, ConfigFile};

use bridge::{run_bridge, Bridge};
use config::BridgeConfig;

type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const PKG_DESCRIPTION: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " - TCP to UDP bridge for FPGA boards"
);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// IP address to listen on
    #[arg(long = "listen")]
    listen: Option<IpAddr>,
    /// TCP port to listen on
    #[arg(long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", BridgeConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        cfg.listen.listen = listen;
    }
    if let Some(port) = cli.port {
        cfg.listen.port = port;
    }
    cfg.validate()
        .map_err(|e| format!("Invalid fpga-bridge configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let addr = SocketAddr::from((cfg.listen.listen, cfg.listen.port));
    let listener = TcpListener::bind(addr).await?;
    let bridge = Bridge::new(cfg.udp.bind_host.clone(), cfg.udp.max_datagram);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        if let Err(e) = run_bridge(listener, bridge, shutdown_rx).await {
            error!("Bridge error: {:?}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    if !handle.is_finished() {
        handle.abort();
    }
    let _ = handle.await;
    Ok(())
}
