// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

use super::codec::CodecError;
use crate::transport::TransportError;

/// Result type for CSR operations.
pub type CsrResult<T> = Result<T, CsrError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("transport is not connected")]
    NotConnected,

    #[error("device returned status 0x{0:02X}")]
    DeviceStatus(u8),

    #[error("CSR task is not running")]
    TaskClosed,
}

impl CsrError {
    /// Whether the operation may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
            Self::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            CsrError::DeviceStatus(1).to_string(),
            "device returned status 0x01"
        );
        let err: CsrError = CodecError::InvalidRange("address -1 is not a u32".into()).into();
        assert_eq!(err.to_string(), "value out of range: address -1 is not a u32");
    }

    #[test]
    fn test_transient() {
        assert!(CsrError::NotConnected.is_transient());
        assert!(CsrError::Transport(TransportError::Io("broken pipe".into())).is_transient());
        assert!(!CsrError::DeviceStatus(2).is_transient());
        assert!(!CsrError::TaskClosed.is_transient());
    }
}
