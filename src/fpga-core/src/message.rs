// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Traffic log entries published by the CSR task.

use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::csr::codec::to_hex_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RxDirection {
    Tx,
    Rx,
    Info,
    Error,
}

/// One entry of the traffic log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RxMessage {
    pub id: Uuid,
    pub direction: RxDirection,
    pub data: Vec<u8>,
    pub source: Option<String>,
    /// RFC 3339, millisecond precision.
    pub timestamp: String,
}

impl RxMessage {
    pub fn new(direction: RxDirection, data: Vec<u8>, source: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            data,
            source,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn rx(data: Vec<u8>, source: Option<String>) -> Self {
        Self::new(RxDirection::Rx, data, source)
    }

    pub fn tx(data: Vec<u8>) -> Self {
        Self::new(RxDirection::Tx, data, None)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(RxDirection::Info, text.into().into_bytes(), None)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(RxDirection::Error, text.into().into_bytes(), None)
    }

    pub fn payload_hex(&self) -> String {
        to_hex_text(&self.data)
    }
}

/// Bounded history of messages, oldest dropped first.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<RxMessage>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: RxMessage) {
        self.entries.push_back(message);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RxMessage> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().map(|m| m.id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let a = RxMessage::rx(vec![1], None);
        let b = RxMessage::rx(vec![1], None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.direction, RxDirection::Rx);
        assert!(a.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_payload_hex() {
        let msg = RxMessage::rx(vec![0x00, 0xAB, 0x10], Some("10.0.0.2:9999".into()));
        assert_eq!(msg.payload_hex(), "00 AB 10");
    }

    #[test]
    fn test_log_drops_oldest() {
        let mut log = MessageLog::new(2);
        let first = RxMessage::info("a");
        let first_id = first.id;
        log.push(first);
        log.push(RxMessage::info("b"));
        log.push(RxMessage::info("c"));
        assert_eq!(log.len(), 2);
        assert!(log.ids().all(|id| id != first_id));
    }

    #[test]
    fn test_serialized_direction() {
        let msg = RxMessage::tx(vec![1]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["direction"], "TX");
        assert!(json["id"].is_string());
    }
}
