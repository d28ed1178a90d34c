// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Datagram transport relayed through `fpga-bridge`.
//!
//! Opening connects to the bridge, binds the shared UDP socket and sets the
//! remote endpoint. Each `RECEIVE` event becomes one [`Inbound::Data`].

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use fpga_core::transport::{Inbound, Transport, TransportError, TransportFuture, TransportKind};
use fpga_protocol::{parse_event, to_line, BridgeEvent, BridgeRequest, MAX_LINE_BYTES};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramConfig {
    /// `host:port` of the bridge.
    pub bridge_addr: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub broadcast: bool,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            bridge_addr: "127.0.0.1:8080".to_string(),
            local_port: 8888,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 9999,
            broadcast: false,
        }
    }
}

pub struct DatagramTransport {
    config: DatagramConfig,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
}

impl DatagramTransport {
    pub fn new(config: DatagramConfig) -> Self {
        Self {
            config,
            writer: None,
            reader: None,
        }
    }

    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }

    async fn request(&mut self, request: &BridgeRequest) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        write_request(writer, request).await
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

async fn write_request(
    writer: &mut OwnedWriteHalf,
    request: &BridgeRequest,
) -> Result<(), TransportError> {
    let line = to_line(request).map_err(|e| TransportError::Io(e.to_string()))?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Map a bridge event to what the transport owner sees, if anything.
fn to_inbound(event: BridgeEvent) -> Option<Inbound> {
    match event {
        BridgeEvent::Receive {
            data,
            remote_address,
            remote_port,
            ..
        } => Some(Inbound::Data {
            bytes: data.into(),
            source: Some(format!("{}:{}", remote_address, remote_port)),
        }),
        BridgeEvent::Error { message } => Some(Inbound::Error(message)),
        other => {
            debug!("Bridge event: {:?}", other);
            None
        }
    }
}

/// Wait until the bridge acknowledged bind, remote and (optionally) broadcast.
async fn handshake(
    reader: &mut BufReader<OwnedReadHalf>,
    inbound: &mpsc::Sender<Inbound>,
    broadcast: bool,
) -> Result<(), TransportError> {
    let mut bound = false;
    let mut remote_set = false;
    let mut broadcast_set = !broadcast;

    while !(bound && remote_set && broadcast_set) {
        let line = read_limited_line(reader, MAX_LINE_BYTES)
            .await?
            .ok_or(TransportError::Closed)?;
        let event = match parse_event(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring malformed bridge message: {}", e);
                continue;
            }
        };
        match event {
            BridgeEvent::BindSuccess { local_port } => {
                debug!("Bridge bound UDP port {}", local_port);
                bound = true;
            }
            BridgeEvent::RemoteSet { .. } => remote_set = true,
            BridgeEvent::BroadcastSet { .. } => broadcast_set = true,
            BridgeEvent::Error { message } => return Err(TransportError::Connection(message)),
            other => {
                if let Some(msg) = to_inbound(other) {
                    let _ = inbound.send(msg).await;
                }
            }
        }
    }
    Ok(())
}

async fn read_loop(mut reader: BufReader<OwnedReadHalf>, inbound: mpsc::Sender<Inbound>) {
    let reason = loop {
        match read_limited_line(&mut reader, MAX_LINE_BYTES).await {
            Ok(Some(line)) => match parse_event(&line) {
                Ok(event) => {
                    if let Some(msg) = to_inbound(event) {
                        if inbound.send(msg).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!("Ignoring malformed bridge message: {}", e),
            },
            Ok(None) => break "bridge closed the connection".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    warn!("Bridge link lost: {}", reason);
    let _ = inbound.send(Inbound::Disconnected { reason }).await;
}

async fn read_limited_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_bytes: usize,
) -> std::io::Result<Option<String>> {
    let mut line = Vec::with_capacity(256);
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        let (chunk, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (&available[..=pos], true),
            None => (available, false),
        };
        if line.len() + chunk.len() > max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds maximum size of {max_bytes} bytes"),
            ));
        }
        line.extend_from_slice(chunk);
        let used = chunk.len();
        reader.consume(used);
        if done {
            break;
        }
    }
    String::from_utf8(line).map(Some).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("line is not valid UTF-8: {e}"),
        )
    })
}

impl Transport for DatagramTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn describe(&self) -> String {
        format!(
            "udp :{} -> {}:{} via {}",
            self.config.local_port,
            self.config.remote_host,
            self.config.remote_port,
            self.config.bridge_addr
        )
    }

    fn open<'a>(&'a mut self, inbound: mpsc::Sender<Inbound>) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.stop_reader();
            self.writer = None;

            let stream = time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.config.bridge_addr))
                .await
                .map_err(|_| {
                    TransportError::Connection(format!(
                        "connect to bridge {} timed out",
                        self.config.bridge_addr
                    ))
                })?
                .map_err(|e| {
                    TransportError::Connection(format!("bridge {}: {}", self.config.bridge_addr, e))
                })?;
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            write_request(
                &mut write_half,
                &BridgeRequest::Bind {
                    local_port: self.config.local_port,
                },
            )
            .await?;
            write_request(
                &mut write_half,
                &BridgeRequest::SetRemote {
                    host: self.config.remote_host.clone(),
                    port: self.config.remote_port,
                },
            )
            .await?;
            if self.config.broadcast {
                write_request(&mut write_half, &BridgeRequest::SetBroadcast { enabled: true })
                    .await?;
            }

            time::timeout(
                HANDSHAKE_TIMEOUT,
                handshake(&mut reader, &inbound, self.config.broadcast),
            )
            .await
            .map_err(|_| TransportError::Connection("bridge handshake timed out".into()))??;

            info!("Bridge ready: {}", self.describe());
            self.writer = Some(write_half);
            self.reader = Some(tokio::spawn(read_loop(reader, inbound)));
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.request(&BridgeRequest::Send {
                data: bytes.to_vec(),
            })
            .await
        })
    }

    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.stop_reader();
            if let Some(mut writer) = self.writer.take() {
                let _ = time::timeout(
                    CLOSE_TIMEOUT,
                    write_request(&mut writer, &BridgeRequest::Close {}),
                )
                .await;
                let _ = writer.shutdown().await;
            }
            Ok(())
        })
    }
}
