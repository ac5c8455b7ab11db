use mev_plus_bus::ModuleFlags;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Bus namespace this module registers under (spec §4.9/§6).
pub const MODULE_NAME: &str = "builderApi";

pub const LOGGER_LEVEL_FLAG: &str = "logger-level";
pub const LOGGER_FORMAT_FLAG: &str = "logger-format";
pub const LISTEN_ADDRESS_FLAG: &str = "listen-address";
pub const READ_TIMEOUT_MS_FLAG: &str = "read-timeout-ms";
pub const READ_HEADER_TIMEOUT_MS_FLAG: &str = "read-header-timeout-ms";
pub const WRITE_TIMEOUT_MS_FLAG: &str = "write-timeout-ms";
pub const IDLE_TIMEOUT_MS_FLAG: &str = "idle-timeout-ms";
pub const MAX_HEADER_BYTES_FLAG: &str = "max-header-bytes";

const DEFAULT_LISTEN_ADDRESS: (Ipv4Addr, u16) = (Ipv4Addr::new(0, 0, 0, 0), 28_545);
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_HEADER_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_HEADER_BYTES: u32 = 1 << 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}: {1}")]
    InvalidListenAddress(String, std::net::AddrParseError),
    #[error("flag {flag} has a non-numeric value {value:?}")]
    NotANumber { flag: &'static str, value: String },
}

/// Parsed configuration for the `builderApi` module (spec §6). The four
/// timeouts and `max_header_bytes` mirror the Go HTTP server's
/// `http.Server` field set one-to-one; this adapter applies `write_timeout_ms`
/// as the overall deadline on a request's round trip through the bus.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_address: SocketAddr,
    pub read_timeout_ms: u64,
    pub read_header_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_header_bytes: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(DEFAULT_LISTEN_ADDRESS),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_header_timeout_ms: DEFAULT_READ_HEADER_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl ApiConfig {
    pub fn from_flags(flags: &ModuleFlags) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (name, value) in flags {
            match name.as_str() {
                LOGGER_LEVEL_FLAG | LOGGER_FORMAT_FLAG => {}
                LISTEN_ADDRESS_FLAG => {
                    cfg.listen_address = value.parse().map_err(|e| ConfigError::InvalidListenAddress(value.clone(), e))?;
                }
                READ_TIMEOUT_MS_FLAG => cfg.read_timeout_ms = parse_u64(READ_TIMEOUT_MS_FLAG, value)?,
                READ_HEADER_TIMEOUT_MS_FLAG => cfg.read_header_timeout_ms = parse_u64(READ_HEADER_TIMEOUT_MS_FLAG, value)?,
                WRITE_TIMEOUT_MS_FLAG => cfg.write_timeout_ms = parse_u64(WRITE_TIMEOUT_MS_FLAG, value)?,
                IDLE_TIMEOUT_MS_FLAG => cfg.idle_timeout_ms = parse_u64(IDLE_TIMEOUT_MS_FLAG, value)?,
                MAX_HEADER_BYTES_FLAG => {
                    cfg.max_header_bytes = value.parse().map_err(|_| ConfigError::NotANumber { flag: MAX_HEADER_BYTES_FLAG, value: value.clone() })?;
                }
                _ => {}
            }
        }
        Ok(cfg)
    }
}

fn parse_u64(flag: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::NotANumber { flag, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pairs: &[(&str, &str)]) -> ModuleFlags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_to_all_interfaces_on_the_default_port() {
        let cfg = ApiConfig::from_flags(&flags(&[])).unwrap();
        assert_eq!(cfg.listen_address.port(), 28_545);
    }

    #[test]
    fn parses_a_custom_listen_address() {
        let cfg = ApiConfig::from_flags(&flags(&[(LISTEN_ADDRESS_FLAG, "127.0.0.1:9000")])).unwrap();
        assert_eq!(cfg.listen_address.port(), 9000);
    }
}
