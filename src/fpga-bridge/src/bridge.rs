// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TCP JSON-lines front for one shared UDP socket.
//!
//! Every connected client drives the same socket. Replies go to the client
//! that sent the request; received datagrams go to all clients.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fpga_protocol::{parse_request, to_line, BridgeEvent, BridgeRequest, MAX_LINE_BYTES};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CLIENT_QUEUE_DEPTH: usize = 64;

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Default)]
struct UdpState {
    socket: Option<Arc<UdpSocket>>,
    recv_task: Option<JoinHandle<()>>,
    local_port: u16,
    remote_host: String,
    remote_port: u16,
}

impl UdpState {
    fn close_socket(&mut self) -> bool {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.socket.take().is_some()
    }

    fn status(&self) -> BridgeEvent {
        BridgeEvent::Status {
            is_bound: self.socket.is_some(),
            local_port: self.local_port,
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
        }
    }
}

/// Shared socket state plus the fan-out channel for received datagrams.
pub struct Bridge {
    bind_host: String,
    max_datagram: usize,
    udp: Mutex<UdpState>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Bridge {
    pub fn new(bind_host: impl Into<String>, max_datagram: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            bind_host: bind_host.into(),
            max_datagram: max_datagram.max(1),
            udp: Mutex::new(UdpState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> BridgeEvent {
        self.udp.lock().await.status()
    }

    /// Execute one request. `None` means no reply is sent.
    pub async fn handle(&self, req: BridgeRequest) -> Option<BridgeEvent> {
        match req {
            BridgeRequest::Bind { local_port } => Some(self.bind(local_port).await),
            BridgeRequest::Send { data } => Some(self.send(data).await),
            BridgeRequest::SetRemote { host, port } => {
                let mut udp = self.udp.lock().await;
                udp.remote_host = host.clone();
                udp.remote_port = port;
                info!("Remote set to {}:{}", host, port);
                Some(BridgeEvent::RemoteSet { host, port })
            }
            BridgeRequest::Close {} => {
                let mut udp = self.udp.lock().await;
                if udp.close_socket() {
                    info!("UDP socket on port {} closed", udp.local_port);
                    Some(BridgeEvent::CloseSuccess {})
                } else {
                    None
                }
            }
            BridgeRequest::SetBroadcast { enabled } => {
                let udp = self.udp.lock().await;
                let Some(socket) = udp.socket.as_ref() else {
                    return Some(BridgeEvent::error("UDP socket not bound"));
                };
                match socket.set_broadcast(enabled) {
                    Ok(()) => Some(BridgeEvent::BroadcastSet { enabled }),
                    Err(e) => Some(BridgeEvent::error(format!("Broadcast error: {}", e))),
                }
            }
            BridgeRequest::GetStatus {} => Some(self.status().await),
        }
    }

    async fn bind(&self, local_port: u16) -> BridgeEvent {
        let mut udp = self.udp.lock().await;
        udp.close_socket();

        let socket = match UdpSocket::bind((self.bind_host.as_str(), local_port)).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                warn!("Bind to {}:{} failed: {}", self.bind_host, local_port, e);
                return BridgeEvent::error(format!("Bind error: {}", e));
            }
        };
        let bound_port = match socket.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => return BridgeEvent::error(format!("Bind error: {}", e)),
        };

        udp.recv_task = Some(tokio::spawn(receive_loop(
            Arc::clone(&socket),
            self.events.clone(),
            self.max_datagram,
        )));
        udp.socket = Some(socket);
        udp.local_port = bound_port;
        info!("UDP socket bound on {}:{}", self.bind_host, bound_port);
        BridgeEvent::BindSuccess {
            local_port: bound_port,
        }
    }

    async fn send(&self, data: Vec<u8>) -> BridgeEvent {
        let (socket, host, port) = {
            let udp = self.udp.lock().await;
            let Some(socket) = udp.socket.clone() else {
                return BridgeEvent::error("UDP socket not bound");
            };
            if udp.remote_host.is_empty() || udp.remote_port == 0 {
                return BridgeEvent::error("Remote host/port not set");
            }
            (socket, udp.remote_host.clone(), udp.remote_port)
        };

        match socket.send_to(&data, (host.as_str(), port)).await {
            Ok(bytes) => {
                debug!("Sent {} byte(s) to {}:{}", bytes, host, port);
                BridgeEvent::SendSuccess {
                    bytes,
                    timestamp: now(),
                }
            }
            Err(e) => BridgeEvent::error(format!("Send error: {}", e)),
        }
    }

    pub async fn shutdown(&self) {
        self.udp.lock().await.close_socket();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    events: broadcast::Sender<BridgeEvent>,
    max_datagram: usize,
) {
    let mut buf = vec![0u8; max_datagram];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                debug!("Received {} byte(s) from {}", len, from);
                // No subscribers is fine.
                let _ = events.send(BridgeEvent::Receive {
                    data: buf[..len].to_vec(),
                    remote_address: from.ip().to_string(),
                    remote_port: from.port(),
                    timestamp: now(),
                });
            }
            Err(e) => {
                error!("UDP receive error: {}", e);
                let _ = events.send(BridgeEvent::error(format!("Receive error: {}", e)));
                return;
            }
        }
    }
}

/// Accept clients until shutdown.
pub async fn run_bridge(
    listener: TcpListener,
    bridge: Arc<Bridge>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Bridge listening on {}", addr);
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Client connected: {}", peer);
                let bridge = Arc::clone(&bridge);
                let client_shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, peer, bridge, client_shutdown_rx).await {
                        error!("Client {} error: {}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    bridge.shutdown().await;
    info!("Bridge stopped");
    Ok(())
}

async fn handle_client(
    socket: TcpStream,
    peer: SocketAddr,
    bridge: Arc<Bridge>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (reader, writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    let (out_tx, out_rx) = mpsc::channel::<BridgeEvent>(CLIENT_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, out_rx));
    let forward_task = tokio::spawn(forward_events(bridge.subscribe(), out_tx.clone()));

    let _ = out_tx.send(bridge.status().await).await;

    let result = loop {
        let line = tokio::select! {
            line = read_limited_line(&mut reader, MAX_LINE_BYTES) => line,
            _ = shutdown_rx.changed() => break Ok(()),
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Client {} disconnected", peer);
                break Ok(());
            }
            Err(e) => break Err(e),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match parse_request(trimmed) {
            Ok(req) => {
                debug!("{} -> {:?}", peer, req);
                bridge.handle(req).await
            }
            Err(e) => {
                warn!("Invalid JSON from {}: {}", peer, e);
                Some(BridgeEvent::error(format!("Invalid message: {}", e)))
            }
        };
        if let Some(reply) = reply {
            if out_tx.send(reply).await.is_err() {
                break Ok(());
            }
        }
    };

    forward_task.abort();
    drop(out_tx);
    let _ = writer_task.await;
    result
}

async fn forward_events(
    mut events: broadcast::Receiver<BridgeEvent>,
    out_tx: mpsc::Sender<BridgeEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out_tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Client lagging, dropped {} datagram(s)", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn write_loop(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut out_rx: mpsc::Receiver<BridgeEvent>,
) {
    while let Some(event) = out_rx.recv().await {
        let line = match to_line(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode {:?}: {}", event, e);
                continue;
            }
        };
        if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;
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
