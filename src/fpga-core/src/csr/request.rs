// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use super::codec::Command;
use super::response::CsrResult;

/// Operations understood by the CSR task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrCommand {
    Open,
    Close,
    Csr(Command),
    /// Bytes sent as-is; any reply shows up on the message stream.
    SendRaw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrReply {
    Done,
    /// Register value, `None` when the device did not answer in time.
    Value(Option<u32>),
}

/// Request sent to the CSR task.
#[derive(Debug)]
pub struct CsrRequest {
    pub cmd: CsrCommand,
    pub respond_to: oneshot::Sender<CsrResult<CsrReply>>,
}
