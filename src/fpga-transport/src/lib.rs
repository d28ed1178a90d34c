// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Concrete transports for the CSR client.

use std::fmt;

use fpga_core::Transport;

pub mod datagram;
pub mod serial;
pub mod sim;

pub use datagram::{DatagramConfig, DatagramTransport};
pub use serial::SerialTransport;
pub use sim::SimTransport;

/// Connection details for instantiating a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAccess {
    Serial { path: String, baud: u32 },
    Udp(DatagramConfig),
    Sim,
}

impl fmt::Display for TransportAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportAccess::Serial { path, baud } => write!(f, "serial {} @ {} baud", path, baud),
            TransportAccess::Udp(cfg) => write!(
                f,
                "udp {}:{} via bridge {}",
                cfg.remote_host, cfg.remote_port, cfg.bridge_addr
            ),
            TransportAccess::Sim => write!(f, "simulator"),
        }
    }
}

pub fn build_transport(access: TransportAccess) -> Box<dyn Transport> {
    match access {
        TransportAccess::Serial { path, baud } => Box::new(SerialTransport::new(path, baud)),
        TransportAccess::Udp(config) => Box::new(DatagramTransport::new(config)),
        TransportAccess::Sim => Box::new(SimTransport::new()),
    }
}
