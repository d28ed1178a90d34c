// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `[fpga-bridge]` section of `fpga-rs.toml`.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use fpga_app::ConfigFile;

/// Largest payload of an IPv4 UDP datagram.
const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub general: GeneralConfig,
    pub listen: ListenConfig,
    pub udp: UdpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// TCP endpoint clients connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Address the UDP socket binds to on BIND
    pub bind_host: String,
    /// Receive buffer size
    pub max_datagram: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            max_datagram: MAX_UDP_PAYLOAD,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(level) = self.general.log_level.as_deref() {
            if !matches!(level, "trace" | "debug" | "info" | "warn" | "error") {
                return Err(format!(
                    "[general].log_level '{}' is not one of trace, debug, info, warn, error",
                    level
                ));
            }
        }
        if self.listen.port == 0 {
            return Err("[listen].port must be > 0".to_string());
        }
        if self.udp.bind_host.trim().is_empty() {
            return Err("[udp].bind_host must not be empty".to_string());
        }
        if self.udp.max_datagram == 0 || self.udp.max_datagram > MAX_UDP_PAYLOAD {
            return Err(format!(
                "[udp].max_datagram must be in 1..={}",
                MAX_UDP_PAYLOAD
            ));
        }
        Ok(())
    }

    /// Example wrapped under `[fpga-bridge]`, for a combined `fpga-rs.toml`.
    pub fn example_combined_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "fpga-bridge")]
            inner: BridgeConfig,
        }
        let example = BridgeConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            ..BridgeConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for BridgeConfig {
    fn section_key() -> &'static str {
        "fpga-bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.listen.listen, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.udp.bind_host, "0.0.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[listen]
listen = "0.0.0.0"
port = 9000

[udp]
max_datagram = 1500
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen.listen, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.listen.port, 9000);
        assert_eq!(config.udp.max_datagram, 1500);
        assert_eq!(config.udp.bind_host, "0.0.0.0");
    }

    #[test]
    fn test_validate() {
        let mut config = BridgeConfig::default();
        config.listen.port = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.udp.max_datagram = 70_000;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.general.log_level = Some("verbose".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_parses() {
        let text = BridgeConfig::example_combined_toml();
        assert!(text.contains("[fpga-bridge.listen]"));
        let table: toml::Table = toml::from_str(&text).unwrap();
        let section = toml::to_string(&table["fpga-bridge"]).unwrap();
        let parsed: BridgeConfig = toml::from_str(&section).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
