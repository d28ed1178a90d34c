// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON line encoding for bridge messages.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::{BridgeEvent, BridgeRequest};

/// Upper bound on one message line, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Parse one request line.
///
/// A missing `payload` is read as `{}` so payload-less requests such as
/// `{"type":"GET_STATUS"}` are accepted.
pub fn parse_request(input: &str) -> Result<BridgeRequest, serde_json::Error> {
    parse_tagged(input)
}

pub fn parse_event(input: &str) -> Result<BridgeEvent, serde_json::Error> {
    parse_tagged(input)
}

fn parse_tagged<T: DeserializeOwned>(input: &str) -> Result<T, serde_json::Error> {
    let mut value: Value = serde_json::from_str(input.trim_end())?;
    if let Value::Object(map) = &mut value {
        map.entry("payload")
            .or_insert_with(|| Value::Object(Default::default()));
    }
    serde_json::from_value(value)
}

/// Serialize a message as one newline-terminated line.
pub fn to_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let line = to_line(&BridgeRequest::Bind { local_port: 8888 }).unwrap();
        assert_eq!(line, "{\"type\":\"BIND\",\"payload\":{\"localPort\":8888}}\n");

        let line = to_line(&BridgeRequest::SetRemote {
            host: "192.168.1.50".into(),
            port: 9999,
        })
        .unwrap();
        assert_eq!(
            line,
            "{\"type\":\"SET_REMOTE\",\"payload\":{\"host\":\"192.168.1.50\",\"port\":9999}}\n"
        );
    }

    #[test]
    fn test_send_carries_byte_array() {
        let line = to_line(&BridgeRequest::Send {
            data: vec![0, 255, 16],
        })
        .unwrap();
        assert_eq!(line, "{\"type\":\"SEND\",\"payload\":{\"data\":[0,255,16]}}\n");
    }

    #[test]
    fn test_parse_request_without_payload() {
        assert_eq!(
            parse_request("{\"type\":\"GET_STATUS\"}").unwrap(),
            BridgeRequest::GetStatus {}
        );
        assert_eq!(
            parse_request("{\"type\":\"CLOSE\",\"payload\":{}}\n").unwrap(),
            BridgeRequest::Close {}
        );
    }

    #[test]
    fn test_parse_request_rejects_unknown_type() {
        assert!(parse_request("{\"type\":\"EXPLODE\",\"payload\":{}}").is_err());
        assert!(parse_request("not json").is_err());
        assert!(parse_request("{\"type\":\"BIND\",\"payload\":{}}").is_err());
    }

    #[test]
    fn test_parse_receive_event() {
        let event = parse_event(
            "{\"type\":\"RECEIVE\",\"payload\":{\"data\":[0,171,205,239,1],\
             \"remoteAddress\":\"10.0.0.2\",\"remotePort\":9999,\
             \"timestamp\":\"2025-01-01T00:00:00.000Z\"}}",
        )
        .unwrap();
        assert_eq!(
            event,
            BridgeEvent::Receive {
                data: vec![0x00, 0xAB, 0xCD, 0xEF, 0x01],
                remote_address: "10.0.0.2".into(),
                remote_port: 9999,
                timestamp: "2025-01-01T00:00:00.000Z".into(),
            }
        );
    }

    #[test]
    fn test_status_round_trip() {
        let status = BridgeEvent::Status {
            is_bound: true,
            local_port: 8888,
            remote_host: "127.0.0.1".into(),
            remote_port: 9999,
        };
        let line = to_line(&status).unwrap();
        assert!(line.contains("\"isBound\":true"));
        assert_eq!(parse_event(&line).unwrap(), status);
    }
}
