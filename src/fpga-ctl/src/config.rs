// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for fpga-ctl.
//!
//! Config is loaded from the `[fpga-ctl]` section of `fpga-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./fpga-rs.toml`
//! 3. `~/.config/fpga-rs/fpga-rs.toml`
//! 4. `/etc/fpga-rs/fpga-rs.toml`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fpga_app::ConfigFile;
use fpga_core::capture::CaptureConfig;
use fpga_core::transport::ExponentialBackoff;
use fpga_core::CsrTaskConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    pub general: GeneralConfig,
    pub transport: TransportConfig,
    pub csr: CsrConfig,
    pub behavior: BehaviorConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// How to reach the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// "serial", "udp" or "sim"
    #[serde(rename = "type")]
    pub transport_type: Option<String>,
    /// Serial device path
    pub port: Option<String>,
    pub baud: u32,
    pub bridge_host: String,
    pub bridge_port: u16,
    /// UDP port the bridge binds locally
    pub local_port: u16,
    /// FPGA endpoint
    pub remote_host: String,
    pub remote_port: u16,
    pub broadcast: bool,
    /// Reopen the transport after an unexpected disconnect
    pub auto_reconnect: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_type: None,
            port: None,
            baud: 115_200,
            bridge_host: "127.0.0.1".to_string(),
            bridge_port: 8080,
            local_port: 8888,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 9999,
            broadcast: false,
            auto_reconnect: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrConfig {
    /// Read response timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum queued CSR operations
    pub queue_depth: usize,
}

impl Default for CsrConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            queue_depth: 32,
        }
    }
}

/// Polling and reconnect behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub poll_interval_ms: u64,
    /// Reconnect attempts before giving up
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

impl CtlConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(level) = self.general.log_level.as_deref() {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                _ => {
                    return Err(format!(
                        "[general].log_level '{}' is not one of trace, debug, info, warn, error",
                        level
                    ))
                }
            }
        }

        match self.transport.transport_type.as_deref() {
            None | Some("sim") => {}
            Some("serial") => {
                if self.transport.baud == 0 {
                    return Err("[transport].baud must be > 0".to_string());
                }
            }
            Some("udp") => {
                if self.transport.bridge_port == 0 {
                    return Err("[transport].bridge_port must be > 0".to_string());
                }
                if self.transport.remote_port == 0 {
                    return Err("[transport].remote_port must be > 0".to_string());
                }
                if self.transport.remote_host.trim().is_empty() {
                    return Err("[transport].remote_host must not be empty".to_string());
                }
            }
            Some(other) => {
                return Err(format!(
                    "[transport].type '{}' is not one of serial, udp, sim",
                    other
                ))
            }
        }

        if self.csr.timeout_ms == 0 {
            return Err("[csr].timeout_ms must be > 0".to_string());
        }
        if self.csr.queue_depth == 0 {
            return Err("[csr].queue_depth must be > 0".to_string());
        }
        if self.behavior.poll_interval_ms == 0 {
            return Err("[behavior].poll_interval_ms must be > 0".to_string());
        }
        if self.behavior.retry_base_delay_ms == 0 {
            return Err("[behavior].retry_base_delay_ms must be > 0".to_string());
        }
        if self.behavior.retry_max_delay_ms < self.behavior.retry_base_delay_ms {
            return Err(
                "[behavior].retry_max_delay_ms must be >= retry_base_delay_ms".to_string(),
            );
        }
        if !self.capture.fft_size.is_power_of_two() {
            return Err("[capture].fft_size must be a power of two".to_string());
        }
        if self.capture.max_samples < self.capture.fft_size {
            return Err("[capture].max_samples must be >= fft_size".to_string());
        }
        if self.capture.sample_rate.is_nan() || self.capture.sample_rate <= 0.0 {
            return Err("[capture].sample_rate must be > 0".to_string());
        }
        Ok(())
    }

    pub fn task_config(&self) -> CsrTaskConfig {
        CsrTaskConfig {
            timeout: Duration::from_millis(self.csr.timeout_ms),
            queue_depth: self.csr.queue_depth,
            auto_reconnect: self.transport.auto_reconnect,
            retry: ExponentialBackoff::new(
                self.behavior.max_retries,
                Duration::from_millis(self.behavior.retry_base_delay_ms),
                Duration::from_millis(self.behavior.retry_max_delay_ms),
            ),
            ..CsrTaskConfig::default()
        }
    }

    /// Example wrapped under `[fpga-ctl]`, for a combined `fpga-rs.toml`.
    pub fn example_combined_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "fpga-ctl")]
            inner: CtlConfig,
        }
        let example = CtlConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            transport: TransportConfig {
                transport_type: Some("serial".to_string()),
                port: Some("/dev/ttyUSB0".to_string()),
                ..TransportConfig::default()
            },
            ..CtlConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for CtlConfig {
    fn section_key() -> &'static str {
        "fpga-ctl"
    }
}
