// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Messages exchanged between a datagram transport and the UDP bridge.
//!
//! Every message is one JSON object `{"type": ..., "payload": {...}}` on its
//! own line.

pub mod codec;
pub mod types;

pub use codec::{parse_event, parse_request, to_line, MAX_LINE_BYTES};
pub use types::{BridgeEvent, BridgeRequest};
