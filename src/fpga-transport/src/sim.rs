// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-process board simulator speaking the CSR wire protocol.
//!
//! WRITE stores the value, READ answers `00` plus the value or `01` for an
//! unknown address. Writing a nonzero value to [`SIM_STREAM_REGISTER`]
//! starts an unsolicited stream of sine samples, one byte per sample.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fpga_core::csr::codec::{decode_command, CsrOp, ResponseFrame, WIRE_FRAME_LEN};
use fpga_core::transport::{Inbound, Transport, TransportError, TransportFuture, TransportKind};

pub const SIM_ID_REGISTER: u32 = 0x0000_0000;
pub const SIM_ID_VALUE: u32 = 0x4650_4741;
pub const SIM_VERSION_REGISTER: u32 = 0x0000_0004;
pub const SIM_SCRATCH_REGISTER: u32 = 0x0001_0000;
/// Nonzero enables the sample stream; the value is the sine period in samples.
pub const SIM_STREAM_REGISTER: u32 = 0x0000_1000;

const STATUS_UNKNOWN_ADDRESS: u8 = 0x01;
const STREAM_CHUNK: usize = 32;
const STREAM_INTERVAL: Duration = Duration::from_millis(10);

type Registers = Arc<Mutex<HashMap<u32, u32>>>;

pub struct SimTransport {
    registers: Registers,
    inbound: Option<mpsc::Sender<Inbound>>,
    pending: BytesMut,
    /// Deliver replies in two pieces, like a slow UART.
    fragment: bool,
    stream: Option<JoinHandle<()>>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    pub fn new() -> Self {
        let registers = HashMap::from([
            (SIM_ID_REGISTER, SIM_ID_VALUE),
            (SIM_VERSION_REGISTER, 0x0001_0000),
            (SIM_SCRATCH_REGISTER, 0),
            (SIM_STREAM_REGISTER, 0),
        ]);
        Self {
            registers: Arc::new(Mutex::new(registers)),
            inbound: None,
            pending: BytesMut::new(),
            fragment: false,
            stream: None,
        }
    }

    pub fn with_fragmentation(mut self, fragment: bool) -> Self {
        self.fragment = fragment;
        self
    }

    pub fn register(&self, address: u32) -> Option<u32> {
        self.registers.lock().ok()?.get(&address).copied()
    }

    /// Run every complete request frame buffered so far; returns the replies.
    fn process(&mut self) -> Vec<Bytes> {
        let mut replies = Vec::new();
        while self.pending.len() >= WIRE_FRAME_LEN {
            let frame = self.pending.split_to(WIRE_FRAME_LEN);
            let cmd = match decode_command(&frame) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => break,
                Err(e) => {
                    warn!("Simulator dropped frame: {}", e);
                    continue;
                }
            };
            let Ok(mut registers) = self.registers.lock() else {
                break;
            };
            match cmd.op() {
                CsrOp::Write => {
                    debug!("sim: [0x{:08X}] <- 0x{:08X}", cmd.address(), cmd.data());
                    registers.insert(cmd.address(), cmd.data());
                    if cmd.address() == SIM_STREAM_REGISTER {
                        drop(registers);
                        self.update_stream(cmd.data());
                    }
                }
                CsrOp::Read => {
                    let reply = match registers.get(&cmd.address()) {
                        Some(&value) => ResponseFrame::ok(value),
                        None => ResponseFrame {
                            status: STATUS_UNKNOWN_ADDRESS,
                            value: 0,
                        },
                    };
                    replies.push(Bytes::copy_from_slice(&reply.to_bytes()));
                }
            }
        }
        replies
    }

    fn update_stream(&mut self, period: u32) {
        if let Some(stream) = self.stream.take() {
            stream.abort();
        }
        if period == 0 {
            return;
        }
        if let Some(inbound) = self.inbound.clone() {
            self.stream = Some(tokio::spawn(stream_samples(inbound, period)));
        }
    }
}

async fn stream_samples(inbound: mpsc::Sender<Inbound>, period: u32) {
    let mut n: u32 = 0;
    let mut ticker = tokio::time::interval(STREAM_INTERVAL);
    loop {
        ticker.tick().await;
        let chunk: Vec<u8> = (0..STREAM_CHUNK)
            .map(|_| {
                let phase = 2.0 * PI * (n % period) as f32 / period as f32;
                n = n.wrapping_add(1);
                (128.0 + 100.0 * phase.sin()).round() as u8
            })
            .collect();
        if inbound.send(Inbound::data(chunk)).await.is_err() {
            return;
        }
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.abort();
        }
    }
}

impl Transport for SimTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ByteStream
    }

    fn describe(&self) -> String {
        "simulated board".to_string()
    }

    fn open<'a>(&'a mut self, inbound: mpsc::Sender<Inbound>) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.pending.clear();
            self.inbound = Some(inbound);
            let period = self.register(SIM_STREAM_REGISTER).unwrap_or(0);
            self.update_stream(period);
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let inbound = self.inbound.clone().ok_or(TransportError::NotConnected)?;
            self.pending.extend_from_slice(bytes);
            for reply in self.process() {
                let pieces = if self.fragment {
                    vec![reply.slice(..2), reply.slice(2..)]
                } else {
                    vec![reply]
                };
                for piece in pieces {
                    inbound
                        .send(Inbound::Data {
                            bytes: piece,
                            source: None,
                        })
                        .await
                        .map_err(|_| TransportError::Closed)?;
                }
            }
            Ok(())
        })
    }

    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if let Some(stream) = self.stream.take() {
                stream.abort();
            }
            self.inbound = None;
            self.pending.clear();
            Ok(())
        })
    }
}
