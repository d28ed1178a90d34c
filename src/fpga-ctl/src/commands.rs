// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Subcommand implementations.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use fpga_core::csr::codec::{parse_hex_text, parse_u32_hex};
use fpga_core::csr::run_register_poller;
use fpga_core::transport::FixedPolling;
use fpga_core::{
    CsrClient, DynResult, RegisterSnapshot, RxDirection, RxMessage, SignalCapture, Spectrum,
};
use fpga_transport::{build_transport, TransportAccess};

use crate::config::CtlConfig;

const SEND_LISTEN_MIN: Duration = Duration::from_millis(200);
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// An opened CSR client plus its task.
pub struct Session {
    client: CsrClient,
    task: JoinHandle<()>,
}

impl Session {
    pub async fn connect(access: TransportAccess, cfg: &CtlConfig) -> DynResult<Self> {
        let (client, task) = CsrClient::spawn(build_transport(access), cfg.task_config());
        if let Err(e) = client.open().await {
            task.abort();
            return Err(format!("Failed to open transport: {}", e).into());
        }
        Ok(Self { client, task })
    }

    pub async fn shutdown(self) {
        if let Err(e) = self.client.close().await {
            warn!("Close failed: {}", e);
        }
        drop(self.client);
        if time::timeout(TASK_STOP_TIMEOUT, self.task).await.is_err() {
            warn!("CSR task did not stop in time");
        }
    }
}

pub async fn read(session: &Session, address: &str) -> DynResult<()> {
    let addr = parse_u32_hex(address)?;
    match session.client.read(addr).await? {
        Some(value) => println!("0x{:08X} = 0x{:08X}", addr, value),
        None => println!("0x{:08X} = (no response)", addr),
    }
    Ok(())
}

pub async fn write(session: &Session, address: &str, data: &str) -> DynResult<()> {
    session.client.write_csr(address, data).await?;
    println!(
        "0x{:08X} <- 0x{:08X}",
        parse_u32_hex(address)?,
        parse_u32_hex(data)?
    );
    Ok(())
}

pub async fn poll(
    session: &Session,
    addresses: &[String],
    interval_ms: u64,
    count: Option<u64>,
) -> DynResult<()> {
    let addresses = addresses
        .iter()
        .map(|a| parse_u32_hex(a))
        .collect::<Result<Vec<_>, _>>()?;

    let (snapshot_tx, mut snapshot_rx) = watch::channel(RegisterSnapshot::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(run_register_poller(
        session.client.clone(),
        addresses,
        FixedPolling::new(Duration::from_millis(interval_ms)),
        snapshot_tx,
        shutdown_rx,
    ));

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                print_snapshot(&snapshot);
                if count.is_some_and(|n| snapshot.polls >= n) {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl+C received, stopping poll");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = poller.await;
    Ok(())
}

fn print_snapshot(snapshot: &RegisterSnapshot) {
    let values: Vec<String> = snapshot
        .values
        .iter()
        .map(|(addr, value)| match value {
            Some(v) => format!("0x{:08X}=0x{:08X}", addr, v),
            None => format!("0x{:08X}=--------", addr),
        })
        .collect();
    println!(
        "[{}] #{} {}",
        snapshot.polled_at.as_deref().unwrap_or("-"),
        snapshot.polls,
        values.join(" ")
    );
}

pub async fn send(session: &Session, hex: &str, cfg: &CtlConfig) -> DynResult<()> {
    let bytes = parse_hex_text(hex)?;
    let mut rx = session.client.subscribe();
    session.client.send_raw(bytes).await?;

    let listen = Duration::from_millis(cfg.csr.timeout_ms).max(SEND_LISTEN_MIN);
    let deadline = Instant::now() + listen;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => break,
            msg = rx.recv() => match msg {
                Ok(msg) => print_message(&msg),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Skipped {} message(s)", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_message(msg: &RxMessage) {
    let tag = match msg.direction {
        RxDirection::Tx => "TX",
        RxDirection::Rx => "RX",
        RxDirection::Info => "INFO",
        RxDirection::Error => "ERROR",
    };
    match msg.direction {
        RxDirection::Info | RxDirection::Error => {
            println!("{} {} {}", msg.timestamp, tag, String::from_utf8_lossy(&msg.data))
        }
        _ => println!(
            "{} {} {}{}",
            msg.timestamp,
            tag,
            msg.source
                .as_deref()
                .map(|s| format!("[{}] ", s))
                .unwrap_or_default(),
            msg.payload_hex()
        ),
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub seconds: u64,
    pub csv: Option<PathBuf>,
    /// `<addr>=<value>` register writes issued before capturing.
    pub arm: Vec<String>,
    pub no_spectrum: bool,
}

fn new_capture(cfg: &CtlConfig, options: &CaptureOptions) -> DynResult<SignalCapture> {
    let mut config = cfg.capture.clone();
    config.spectrum = config.spectrum && !options.no_spectrum;
    Ok(SignalCapture::new(config)?)
}

fn parse_arm(spec: &str) -> DynResult<(&str, &str)> {
    spec.split_once('=')
        .map(|(a, v)| (a.trim(), v.trim()))
        .ok_or_else(|| format!("--arm '{}' must be <addr>=<value>", spec).into())
}

pub async fn capture(session: &Session, cfg: &CtlConfig, options: CaptureOptions) -> DynResult<()> {
    let mut capture = new_capture(cfg, &options)?;
    let mut rx = session.client.subscribe();
    capture.start(std::iter::empty());

    for spec in &options.arm {
        let (address, value) = parse_arm(spec)?;
        session.client.write_csr(address, value).await?;
        info!("Armed {} = {}", address, value);
    }

    let duration = Duration::from_secs(options.seconds);
    tokio::select! {
        _ = collect(&mut rx, &mut capture, duration) => {}
        _ = signal::ctrl_c() => info!("Ctrl+C received, stopping capture"),
    }
    capture.stop();

    finish_capture(&capture, cfg, &options)
}

/// Feed hex text lines from stdin until EOF.
pub async fn capture_stdin(cfg: &CtlConfig, options: CaptureOptions) -> DynResult<()> {
    let mut capture = new_capture(cfg, &options)?;
    capture.start(std::iter::empty());
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = ingest_lines(reader, &mut capture) => { res?; }
        _ = signal::ctrl_c() => info!("Ctrl+C received, stopping capture"),
    }
    capture.stop();
    finish_capture(&capture, cfg, &options)
}

async fn collect(
    rx: &mut broadcast::Receiver<RxMessage>,
    capture: &mut SignalCapture,
    duration: Duration,
) {
    let deadline = Instant::now() + duration;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return,
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    capture.ingest(&msg);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Capture lagged, {} message(s) lost", n);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

async fn ingest_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    capture: &mut SignalCapture,
) -> std::io::Result<usize> {
    let mut lines = reader.lines();
    let mut total = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        total += capture.ingest_hex(Uuid::new_v4(), &line);
    }
    Ok(total)
}

/// Strongest bin above DC.
fn peak_above_dc(spectrum: &Spectrum) -> Option<usize> {
    spectrum
        .nyquist_bins()
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn finish_capture(
    capture: &SignalCapture,
    cfg: &CtlConfig,
    options: &CaptureOptions,
) -> DynResult<()> {
    println!("Captured {} sample(s)", capture.buffer().len());
    match capture.spectrum() {
        Some(spectrum) => {
            if let Some(bin) = peak_above_dc(spectrum) {
                println!(
                    "Peak bin {} ({:.1} Hz, power {:.1})",
                    bin,
                    spectrum.bin_frequency(bin, cfg.capture.sample_rate),
                    spectrum.magnitudes()[bin]
                );
            }
        }
        None if capture.spectrum_enabled() => {
            println!(
                "Not enough samples for a {}-point spectrum",
                cfg.capture.fft_size
            );
        }
        None => {}
    }

    if let Some(path) = options.csv.as_ref() {
        let file = File::create(path)
            .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
        capture.export_csv(BufWriter::new(file))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CaptureOptions {
        CaptureOptions {
            seconds: 1,
            csv: None,
            arm: Vec::new(),
            no_spectrum: false,
        }
    }

    #[test]
    fn test_parse_arm() {
        assert_eq!(parse_arm("0x1000 = 0x10").unwrap(), ("0x1000", "0x10"));
        assert!(parse_arm("0x1000").is_err());
    }

    #[test]
    fn test_peak_above_dc() {
        let spectrum = Spectrum::new(vec![100.0, 1.0, 5.0, 2.0, 0.0, 2.0, 5.0, 1.0]);
        assert_eq!(peak_above_dc(&spectrum), Some(2));
        assert_eq!(peak_above_dc(&Spectrum::new(vec![3.0])), None);
    }

    #[tokio::test]
    async fn test_ingest_lines() {
        let cfg = CtlConfig::default();
        let mut capture = new_capture(&cfg, &options()).unwrap();
        capture.start(std::iter::empty());

        let input: &[u8] = b"[adc] 0x01 0x02\n\n7F,80;FF\nzz 10\n";
        let total = ingest_lines(input, &mut capture).await.unwrap();
        assert_eq!(total, 6);
        let samples: Vec<f32> = capture.buffer().iter().collect();
        assert_eq!(samples, vec![1.0, 2.0, 127.0, 128.0, 255.0, 16.0]);
    }

    #[tokio::test]
    async fn test_capture_from_simulated_stream() {
        let cfg = CtlConfig::default();
        let session = Session::connect(TransportAccess::Sim, &cfg).await.unwrap();
        let mut capture = new_capture(&cfg, &options()).unwrap();
        let mut rx = session.client.subscribe();
        capture.start(std::iter::empty());

        // 16-sample sine period lands in bin 128 / 16 = 8.
        session.client.write_csr("0x1000", "0x10").await.unwrap();
        collect(&mut rx, &mut capture, Duration::from_millis(300)).await;
        capture.stop();

        assert!(capture.buffer().len() >= cfg.capture.fft_size);
        let spectrum = capture.spectrum().unwrap();
        assert_eq!(peak_above_dc(spectrum), Some(8));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_spectrum_option() {
        let cfg = CtlConfig::default();
        let opts = CaptureOptions {
            no_spectrum: true,
            ..options()
        };
        let capture = new_capture(&cfg, &opts).unwrap();
        assert!(!capture.spectrum_enabled());
    }
}
