// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! CSR client: a task owning the transport plus a cloneable handle.
//!
//! Register operations are queued and executed one at a time. A read stays
//! pending until five response bytes have accumulated or the timeout fires;
//! the next queued operation is not sent before that. Bytes arriving while
//! no read is pending are published on the message stream.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::codec::{decode_response, parse_u32_hex, Command, CsrOp, RESPONSE_FRAME_LEN};
use super::request::{CsrCommand, CsrReply, CsrRequest};
use super::response::{CsrError, CsrResult};
use crate::message::RxMessage;
use crate::transport::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, ExponentialBackoff, Inbound,
    RetryPolicy, Transport,
};

const CONTROL_QUEUE_DEPTH: usize = 4;
const INBOUND_QUEUE_DEPTH: usize = 64;
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Configuration for the CSR task.
#[derive(Debug, Clone)]
pub struct CsrTaskConfig {
    /// How long a read waits for its five response bytes.
    pub timeout: Duration,
    pub queue_depth: usize,
    /// Reopen the transport after an unsolicited disconnect.
    pub auto_reconnect: bool,
    pub retry: ExponentialBackoff,
    /// Capacity of the message broadcast channel.
    pub message_capacity: usize,
}

impl Default for CsrTaskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            queue_depth: 32,
            auto_reconnect: false,
            retry: ExponentialBackoff::default(),
            message_capacity: 256,
        }
    }
}

/// Handle to a running CSR task.
#[derive(Clone)]
pub struct CsrClient {
    tx: mpsc::Sender<CsrRequest>,
    ctl_tx: mpsc::Sender<CsrRequest>,
    messages: broadcast::Sender<RxMessage>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl CsrClient {
    /// Spawn the task. The transport starts closed; call [`CsrClient::open`].
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(transport: Box<dyn Transport>, config: CsrTaskConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (ctl_tx, ctl_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let (messages, _) = broadcast::channel(config.message_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);

        info!(
            "CSR task using {} transport {}",
            transport.kind(),
            transport.describe()
        );

        let task = CsrTask {
            transport,
            config,
            machine: ConnectionStateMachine::new(),
            state_tx,
            messages: messages.clone(),
            inbound_tx,
            pending: None,
            reconnect: None,
            acc: Vec::with_capacity(RESPONSE_FRAME_LEN * 2),
        };
        let handle = tokio::spawn(task.run(rx, ctl_rx, inbound_rx));

        (
            Self {
                tx,
                ctl_tx,
                messages,
                state_rx,
            },
            handle,
        )
    }

    pub async fn open(&self) -> CsrResult<()> {
        self.call(&self.ctl_tx, CsrCommand::Open).await.map(|_| ())
    }

    /// Close the transport. A pending read resolves to `None`.
    pub async fn close(&self) -> CsrResult<()> {
        self.call(&self.ctl_tx, CsrCommand::Close).await.map(|_| ())
    }

    /// Write with hex text operands, e.g. `write_csr("0x10000", "0x2A")`.
    pub async fn write_csr(&self, address: &str, data: &str) -> CsrResult<()> {
        let address = parse_u32_hex(address)?;
        let data = parse_u32_hex(data)?;
        self.write(address, data).await
    }

    /// Read with a hex text address. `Ok(None)` means the device stayed silent.
    pub async fn read_csr(&self, address: &str) -> CsrResult<Option<u32>> {
        let address = parse_u32_hex(address)?;
        self.read(address).await
    }

    pub async fn write(&self, address: u32, data: u32) -> CsrResult<()> {
        self.call(&self.tx, CsrCommand::Csr(Command::write(address, data)))
            .await
            .map(|_| ())
    }

    pub async fn read(&self, address: u32) -> CsrResult<Option<u32>> {
        match self.call(&self.tx, CsrCommand::Csr(Command::read(address))).await? {
            CsrReply::Value(value) => Ok(value),
            CsrReply::Done => Ok(None),
        }
    }

    pub async fn send_raw(&self, bytes: Vec<u8>) -> CsrResult<()> {
        self.call(&self.tx, CsrCommand::SendRaw(bytes))
            .await
            .map(|_| ())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RxMessage> {
        self.messages.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn call(
        &self,
        queue: &mpsc::Sender<CsrRequest>,
        cmd: CsrCommand,
    ) -> CsrResult<CsrReply> {
        let (respond_to, response) = oneshot::channel();
        queue
            .send(CsrRequest { cmd, respond_to })
            .await
            .map_err(|_| CsrError::TaskClosed)?;
        response.await.map_err(|_| CsrError::TaskClosed)?
    }
}

struct PendingRead {
    address: u32,
    deadline: Instant,
    respond_to: oneshot::Sender<CsrResult<CsrReply>>,
}

/// Next reopen attempt after an unsolicited disconnect.
struct Reconnect {
    attempt: u32,
    next_attempt: Instant,
}

struct CsrTask {
    transport: Box<dyn Transport>,
    config: CsrTaskConfig,
    machine: ConnectionStateMachine,
    state_tx: watch::Sender<ConnectionState>,
    messages: broadcast::Sender<RxMessage>,
    inbound_tx: mpsc::Sender<Inbound>,
    pending: Option<PendingRead>,
    reconnect: Option<Reconnect>,
    acc: Vec<u8>,
}

impl CsrTask {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<CsrRequest>,
        mut ctl_rx: mpsc::Receiver<CsrRequest>,
        mut inbound_rx: mpsc::Receiver<Inbound>,
    ) {
        loop {
            let deadline = self
                .pending
                .as_ref()
                .map(|p| p.deadline)
                .unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            let next_attempt = self
                .reconnect
                .as_ref()
                .map(|r| r.next_attempt)
                .unwrap_or_else(|| Instant::now() + IDLE_WAIT);

            tokio::select! {
                biased;
                ctl = ctl_rx.recv() => match ctl {
                    Some(req) => self.execute(req).await,
                    None => break,
                },
                Some(inbound) = inbound_rx.recv() => self.handle_inbound(inbound).await,
                _ = time::sleep_until(next_attempt), if self.reconnect.is_some() => {
                    self.try_reconnect().await
                }
                _ = time::sleep_until(deadline), if self.pending.is_some() => self.expire_pending(),
                req = rx.recv(), if self.pending.is_none() => match req {
                    Some(req) => self.execute(req).await,
                    None => break,
                },
            }
        }

        info!("CSR task shutting down (channel closed)");
        if self.machine.state().is_connected() {
            self.close_transport().await;
        }
    }

    async fn execute(&mut self, req: CsrRequest) {
        let CsrRequest { cmd, respond_to } = req;
        match cmd {
            CsrCommand::Open => {
                let _ = respond_to.send(self.open_transport().await);
            }
            CsrCommand::Close => {
                self.close_transport().await;
                let _ = respond_to.send(Ok(CsrReply::Done));
            }
            CsrCommand::Csr(cmd) => {
                let frame = cmd.to_frame();
                if cmd.op() == CsrOp::Read {
                    // Stale bytes from an earlier exchange must not leak into this reply.
                    self.acc.clear();
                }
                if let Err(err) = self.send(frame.as_bytes()).await {
                    let _ = respond_to.send(Err(err));
                    return;
                }
                match cmd.op() {
                    CsrOp::Write => {
                        debug!("CSR write 0x{:08X} = 0x{:08X}", cmd.address(), cmd.data());
                        let _ = respond_to.send(Ok(CsrReply::Done));
                    }
                    CsrOp::Read => {
                        debug!("CSR read 0x{:08X} sent", cmd.address());
                        self.pending = Some(PendingRead {
                            address: cmd.address(),
                            deadline: Instant::now() + self.config.timeout,
                            respond_to,
                        });
                    }
                }
            }
            CsrCommand::SendRaw(bytes) => {
                let result = self.send(&bytes).await.map(|_| CsrReply::Done);
                let _ = respond_to.send(result);
            }
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> CsrResult<()> {
        if !self.machine.state().is_connected() {
            return Err(CsrError::NotConnected);
        }
        if let Err(err) = self.transport.send(bytes).await {
            error!("Send on {} failed: {}", self.transport.describe(), err);
            self.transition(ConnectionEvent::Failed(err.to_string()));
            return Err(err.into());
        }
        self.publish(RxMessage::tx(bytes.to_vec()));
        Ok(())
    }

    async fn open_transport(&mut self) -> CsrResult<CsrReply> {
        if self.machine.state().is_connected() {
            return Ok(CsrReply::Done);
        }
        if self.cancel_reconnect() {
            self.transition(ConnectionEvent::Close);
            self.transition(ConnectionEvent::Closed);
        }
        self.transition(ConnectionEvent::Open);
        match self.transport.open(self.inbound_tx.clone()).await {
            Ok(()) => {
                info!("Connected to {}", self.transport.describe());
                self.transition(ConnectionEvent::Opened);
                Ok(CsrReply::Done)
            }
            Err(err) => {
                error!("Failed to open {}: {}", self.transport.describe(), err);
                self.transition(ConnectionEvent::Failed(err.to_string()));
                Err(err.into())
            }
        }
    }

    async fn close_transport(&mut self) {
        self.cancel_reconnect();
        self.resolve_pending_silent("transport closed");
        self.acc.clear();
        self.transition(ConnectionEvent::Close);
        if let Err(err) = self.transport.close().await {
            warn!("Close of {} reported: {}", self.transport.describe(), err);
        }
        self.transition(ConnectionEvent::Closed);
        info!("Disconnected from {}", self.transport.describe());
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Data { bytes, source } => self.on_data(&bytes, source),
            Inbound::Error(message) => {
                warn!("Transport error: {}", message);
                self.publish(RxMessage::error(message));
            }
            Inbound::Disconnected { reason } => self.on_dropped(reason).await,
        }
    }

    fn on_data(&mut self, bytes: &[u8], source: Option<String>) {
        if self.pending.is_none() {
            self.publish(RxMessage::rx(bytes.to_vec(), source));
            return;
        }

        self.acc.extend_from_slice(bytes);
        let Some(frame) = decode_response(&self.acc) else {
            return;
        };
        let rest = self.acc.split_off(RESPONSE_FRAME_LEN);
        self.acc.clear();

        if let Some(pending) = self.pending.take() {
            let result = if frame.is_ok() {
                debug!("CSR read 0x{:08X} -> 0x{:08X}", pending.address, frame.value);
                Ok(CsrReply::Value(Some(frame.value)))
            } else {
                warn!(
                    "CSR read 0x{:08X} returned status 0x{:02X}",
                    pending.address, frame.status
                );
                Err(CsrError::DeviceStatus(frame.status))
            };
            let _ = pending.respond_to.send(result);
        }

        if !rest.is_empty() {
            self.publish(RxMessage::rx(rest, source));
        }
    }

    fn expire_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(
                "CSR read 0x{:08X}: no response after {:?} ({} bytes buffered)",
                pending.address,
                self.config.timeout,
                self.acc.len()
            );
            let _ = pending.respond_to.send(Ok(CsrReply::Value(None)));
        }
        self.acc.clear();
    }

    fn resolve_pending_silent(&mut self, why: &str) {
        if let Some(pending) = self.pending.take() {
            info!("CSR read 0x{:08X} abandoned: {}", pending.address, why);
            let _ = pending.respond_to.send(Ok(CsrReply::Value(None)));
        }
    }

    async fn on_dropped(&mut self, reason: String) {
        if !self.machine.state().is_connected() {
            debug!("Ignoring disconnect notice while {}: {}", self.machine.state(), reason);
            return;
        }
        warn!("Lost {}: {}", self.transport.describe(), reason);
        self.resolve_pending_silent("link dropped");
        self.acc.clear();
        let _ = self.transport.close().await;
        self.publish(RxMessage::error(format!("disconnected: {}", reason)));
        self.transition(ConnectionEvent::Dropped {
            auto_reconnect: self.config.auto_reconnect,
        });
        if self.config.auto_reconnect {
            self.schedule_reconnect(0);
        }
    }

    fn schedule_reconnect(&mut self, attempt: u32) {
        let delay = self.config.retry.delay(attempt);
        debug!("Reconnect attempt {} in {:?}", attempt + 1, delay);
        self.reconnect = Some(Reconnect {
            attempt,
            next_attempt: Instant::now() + delay,
        });
    }

    /// Returns true if a reconnect cycle was running.
    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(reconnect) => {
                info!("Reconnect cancelled after {} attempt(s)", reconnect.attempt);
                true
            }
            None => false,
        }
    }

    /// One reopen attempt; schedules the next one on a retryable failure.
    async fn try_reconnect(&mut self) {
        let Some(Reconnect { attempt, .. }) = self.reconnect.take() else {
            return;
        };
        match self.transport.open(self.inbound_tx.clone()).await {
            Ok(()) => {
                info!(
                    "Reconnected to {} after {} attempt(s)",
                    self.transport.describe(),
                    attempt + 1
                );
                self.transition(ConnectionEvent::Opened);
            }
            Err(err) => {
                let attempt = attempt + 1;
                if !self.config.retry.should_retry(attempt, &err) {
                    error!(
                        "Giving up on {} after {} attempt(s): {}",
                        self.transport.describe(),
                        attempt,
                        err
                    );
                    self.transition(ConnectionEvent::GaveUp(err.to_string()));
                    return;
                }
                warn!("Reconnect attempt {} failed: {}", attempt, err);
                self.transition(ConnectionEvent::Failed(err.to_string()));
                self.schedule_reconnect(attempt);
            }
        }
    }

    fn transition(&mut self, event: ConnectionEvent) {
        if self.machine.process_event(event) {
            debug!("Connection state -> {}", self.machine.state());
            self.state_tx.send_replace(self.machine.state().clone());
        }
    }

    fn publish(&self, message: RxMessage) {
        // No subscribers is fine.
        let _ = self.messages.send(message);
    }
}
