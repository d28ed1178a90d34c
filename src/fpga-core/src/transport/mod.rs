// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport capability shared by the byte-stream and datagram variants.
//!
//! A transport only moves bytes. Inbound traffic is pushed into the
//! [`mpsc::Sender<Inbound>`] handed to [`Transport::open`]; the byte-stream
//! variant gives no guarantee that a delivery lines up with a frame boundary,
//! the datagram variant delivers exactly one datagram per [`Inbound::Data`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod machine;
#[cfg(test)]
pub(crate) mod mock;
pub mod policies;

pub use machine::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
pub use policies::{ExponentialBackoff, FixedPolling, NoPolling, PollingPolicy, RetryPolicy};

/// Alias to reduce type complexity in [`Transport`].
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transport is not open")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("transport closed by remote")]
    Closed,
}

impl TransportError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_) | Self::Closed)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Serial-like stream, arbitrary chunking.
    ByteStream,
    /// UDP-like, framing preserved per delivery.
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::ByteStream => write!(f, "byte-stream"),
            TransportKind::Datagram => write!(f, "datagram"),
        }
    }
}

/// Something a transport pushes to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Data {
        bytes: Bytes,
        /// `host:port` of the sender for datagrams.
        source: Option<String>,
    },
    /// The link went away without being asked to (device unplugged, bridge gone).
    Disconnected { reason: String },
    /// Non-fatal error reported by the far side.
    Error(String),
}

impl Inbound {
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Inbound::Data {
            bytes: bytes.into(),
            source: None,
        }
    }
}

/// Raw byte transport to the board.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;

    fn open<'a>(&'a mut self, inbound: mpsc::Sender<Inbound>) -> TransportFuture<'a, ()>;

    /// Send one buffer; for datagrams this is exactly one datagram to the
    /// configured remote.
    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()>;

    /// Always succeeds locally; remote teardown is best effort.
    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()>;
}
