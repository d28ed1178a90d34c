// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

/// Client to bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BridgeRequest {
    /// (Re)bind the shared UDP socket. Port 0 picks an ephemeral port.
    Bind { local_port: u16 },
    /// Send one datagram to the configured remote.
    Send { data: Vec<u8> },
    SetRemote { host: String, port: u16 },
    Close {},
    SetBroadcast { enabled: bool },
    GetStatus {},
}

/// Bridge to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BridgeEvent {
    BindSuccess {
        local_port: u16,
    },
    SendSuccess {
        bytes: usize,
        timestamp: String,
    },
    RemoteSet {
        host: String,
        port: u16,
    },
    /// A datagram arrived; fanned out to every connected client.
    Receive {
        data: Vec<u8>,
        remote_address: String,
        remote_port: u16,
        timestamp: String,
    },
    CloseSuccess {},
    BroadcastSet {
        enabled: bool,
    },
    Status {
        is_bound: bool,
        local_port: u16,
        remote_host: String,
        remote_port: u16,
    },
    Error {
        message: String,
    },
}

impl BridgeEvent {
    pub fn error(message: impl Into<String>) -> Self {
        BridgeEvent::Error {
            message: message.into(),
        }
    }
}
