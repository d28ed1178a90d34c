// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod capture;
pub mod csr;
pub mod dsp;
pub mod message;
pub mod transport;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use capture::{CaptureConfig, SampleBuffer, SignalCapture};
pub use csr::codec::{CodecError, Command, CsrOp, ResponseFrame, WireFrame};
pub use csr::{CsrClient, CsrError, CsrResult, CsrTaskConfig, RegisterSnapshot};
pub use dsp::fft::{Fft, FftError, Window};
pub use dsp::spectrum::Spectrum;
pub use message::{MessageLog, RxDirection, RxMessage};
pub use transport::machine::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
pub use transport::{Inbound, Transport, TransportError, TransportFuture, TransportKind};
