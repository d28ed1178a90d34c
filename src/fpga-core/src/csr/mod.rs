// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod client;
pub mod codec;
pub mod poller;
pub mod request;
pub mod response;

pub use client::{CsrClient, CsrTaskConfig};
pub use poller::{run_register_poller, RegisterSnapshot};
pub use request::{CsrCommand, CsrReply, CsrRequest};
pub use response::{CsrError, CsrResult};
