// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use fpga_app::{init_logging, ConfigFile};
use fpga_core::DynResult;
use fpga_transport::{DatagramConfig, TransportAccess};

use config::CtlConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - FPGA CSR control tool");

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
    /// Transport used to reach the board
    #[arg(short = 'a', long = "access", value_enum)]
    access: Option<AccessKind>,
    /// Serial device path (serial access)
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Serial baud rate (serial access)
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// FPGA endpoint as <host>:<port> (udp access)
    #[arg(long = "remote")]
    remote: Option<String>,
    /// Bridge address as <host>:<port> (udp access)
    #[arg(long = "bridge")]
    bridge: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AccessKind {
    Serial,
    Udp,
    Sim,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read one register
    Read {
        /// Register address, hex
        address: String,
    },
    /// Write one register
    Write {
        /// Register address, hex
        address: String,
        /// Value, hex
        data: String,
    },
    /// Read registers repeatedly
    Poll {
        /// Register addresses, hex
        #[arg(required = true)]
        addresses: Vec<String>,
        /// Override [behavior].poll_interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after this many snapshots
        #[arg(long)]
        count: Option<u64>,
    },
    /// Send raw bytes given as hex text and print what comes back
    Send {
        /// e.g. "01 00 00 00 00 00 00 00 00"
        hex: String,
    },
    /// Collect RX samples and report the spectrum
    Capture {
        /// Capture duration in seconds
        #[arg(long, default_value_t = 5)]
        seconds: u64,
        /// Write samples as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Register writes performed before capturing, as <addr>=<value>
        #[arg(long = "arm", value_name = "ADDR=VALUE")]
        arm: Vec<String>,
        /// Read hex text lines from stdin instead of the transport
        #[arg(long)]
        stdin: bool,
        /// Skip the spectrum
        #[arg(long)]
        no_spectrum: bool,
    },
}

/// Split `<host>:<port>`.
fn parse_host_port(addr: &str) -> DynResult<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("Address '{}' must be '<host>:<port>'", addr))?;
    if host.is_empty() {
        return Err(format!("Address '{}' has an empty host", addr).into());
    }
    let port: u16 = port
        .parse()
        .map_err(|e| format!("Invalid port in '{}': {}", addr, e))?;
    Ok((host.to_string(), port))
}

/// Merge CLI overrides into the configured transport.
fn resolve_access(cli: &Cli, cfg: &CtlConfig) -> DynResult<TransportAccess> {
    let transport = &cfg.transport;
    let kind = match cli.access {
        Some(kind) => kind,
        None => match transport.transport_type.as_deref() {
            Some("serial") => AccessKind::Serial,
            Some("udp") => AccessKind::Udp,
            Some("sim") => AccessKind::Sim,
            Some(other) => return Err(format!("Unknown transport type: {}", other).into()),
            None => {
                return Err(
                    "Transport not specified. Use --access or set [transport].type in config."
                        .into(),
                )
            }
        },
    };

    Ok(match kind {
        AccessKind::Serial => {
            let path = cli
                .port
                .clone()
                .or_else(|| transport.port.clone())
                .ok_or("Serial access requires a port. Use --port or set [transport].port.")?;
            TransportAccess::Serial {
                path,
                baud: cli.baud.unwrap_or(transport.baud),
            }
        }
        AccessKind::Udp => {
            let (remote_host, remote_port) = match cli.remote.as_deref() {
                Some(remote) => parse_host_port(remote)?,
                None => (transport.remote_host.clone(), transport.remote_port),
            };
            let bridge_addr = match cli.bridge.as_deref() {
                Some(bridge) => {
                    let (host, port) = parse_host_port(bridge)?;
                    format!("{}:{}", host, port)
                }
                None => format!("{}:{}", transport.bridge_host, transport.bridge_port),
            };
            TransportAccess::Udp(DatagramConfig {
                bridge_addr,
                local_port: transport.local_port,
                remote_host,
                remote_port,
                broadcast: transport.broadcast,
            })
        }
        AccessKind::Sim => TransportAccess::Sim,
    })
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", CtlConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = CtlConfig::load(cli.config.as_deref())?;
    cfg.validate()
        .map_err(|e| format!("Invalid fpga-ctl configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let command = cli
        .command
        .as_ref()
        .ok_or("No command given. See --help.")?;

    if let Command::Capture {
        seconds,
        csv,
        stdin: true,
        no_spectrum,
        ..
    } = command
    {
        let options = commands::CaptureOptions {
            seconds: *seconds,
            csv: csv.clone(),
            arm: Vec::new(),
            no_spectrum: *no_spectrum,
        };
        return commands::capture_stdin(&cfg, options).await;
    }

    let access = resolve_access(&cli, &cfg)?;
    info!("Starting fpga-ctl (access: {})", access);
    let session = commands::Session::connect(access, &cfg).await?;

    let result = match command {
        Command::Read { address } => commands::read(&session, address).await,
        Command::Write { address, data } => commands::write(&session, address, data).await,
        Command::Poll {
            addresses,
            interval_ms,
            count,
        } => {
            let interval_ms = interval_ms.unwrap_or(cfg.behavior.poll_interval_ms);
            commands::poll(&session, addresses, interval_ms, *count).await
        }
        Command::Send { hex } => commands::send(&session, hex, &cfg).await,
        Command::Capture {
            seconds,
            csv,
            arm,
            no_spectrum,
            ..
        } => {
            let options = commands::CaptureOptions {
                seconds: *seconds,
                csv: csv.clone(),
                arm: arm.clone(),
                no_spectrum: *no_spectrum,
            };
            commands::capture(&session, &cfg, options).await
        }
    };

    session.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fpga-ctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("192.168.1.50:9999").unwrap(),
            ("192.168.1.50".to_string(), 9999)
        );
        assert!(parse_host_port("no-port").is_err());
        assert!(parse_host_port(":80").is_err());
        assert!(parse_host_port("host:99999").is_err());
    }

    #[test]
    fn test_resolve_serial_from_cli() {
        let cli = cli(&["-a", "serial", "-p", "/dev/ttyACM1", "read", "0x0"]);
        let access = resolve_access(&cli, &CtlConfig::default()).unwrap();
        assert_eq!(
            access,
            TransportAccess::Serial {
                path: "/dev/ttyACM1".into(),
                baud: 115_200
            }
        );
    }

    #[test]
    fn test_resolve_serial_needs_port() {
        let cli = cli(&["-a", "serial", "read", "0x0"]);
        assert!(resolve_access(&cli, &CtlConfig::default()).is_err());
    }

    #[test]
    fn test_resolve_udp_from_config_with_override() {
        let mut cfg = CtlConfig::default();
        cfg.transport.transport_type = Some("udp".into());
        cfg.transport.broadcast = true;
        let cli = cli(&["--remote", "10.0.0.9:7000", "write", "0x10000", "0x2A"]);

        match resolve_access(&cli, &cfg).unwrap() {
            TransportAccess::Udp(dgram) => {
                assert_eq!(dgram.remote_host, "10.0.0.9");
                assert_eq!(dgram.remote_port, 7000);
                assert_eq!(dgram.bridge_addr, "127.0.0.1:8080");
                assert!(dgram.broadcast);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_requires_transport() {
        let cli = cli(&["read", "0x0"]);
        assert!(resolve_access(&cli, &CtlConfig::default()).is_err());
    }

    #[test]
    fn test_capture_args() {
        let cli = cli(&[
            "-a", "sim", "capture", "--seconds", "2", "--arm", "0x1000=0x10", "--no-spectrum",
        ]);
        match cli.command {
            Some(Command::Capture {
                seconds,
                arm,
                no_spectrum,
                stdin,
                ..
            }) => {
                assert_eq!(seconds, 2);
                assert_eq!(arm, vec!["0x1000=0x10".to_string()]);
                assert!(no_spectrum);
                assert!(!stdin);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
