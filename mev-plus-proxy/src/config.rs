use mev_plus_bus::ModuleFlags;
use thiserror::Error;
use url::Url;

/// Bus namespace this module registers under (spec §4.8).
pub const MODULE_NAME: &str = "externalValidatorProxy";

pub const LOGGER_LEVEL_FLAG: &str = "logger-level";
pub const LOGGER_FORMAT_FLAG: &str = "logger-format";
pub const ADDRESS_FLAG: &str = "address";
pub const REQUEST_TIMEOUT_MS_FLAG: &str = "request-timeout-ms";
pub const REQUEST_MAX_RETRIES_FLAG: &str = "request-max-retries";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REQUEST_MAX_RETRIES: u32 = 3;
const MAX_ADDRESSES: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at most {MAX_ADDRESSES} addresses may be configured, got {0}")]
    TooManyAddresses(usize),
    #[error("duplicate address {0:?}")]
    DuplicateAddress(String),
    #[error("invalid address {0:?}: {1}")]
    InvalidAddress(String, url::ParseError),
    #[error("flag {flag} has a non-numeric value {value:?}")]
    NotANumber { flag: &'static str, value: String },
}

/// Parsed configuration for the `externalValidatorProxy` module (spec
/// §4.8/§4.10). An empty `addresses` list is valid: the module still
/// configures cleanly but excludes itself from the aggregator's
/// notifications at `start` rather than registering as a block source.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub addresses: Vec<Url>,
    pub request_timeout_ms: u64,
    pub request_max_retries: u32,
}

impl ProxyConfig {
    pub fn from_flags(flags: &ModuleFlags) -> Result<Self, ConfigError> {
        let mut raw_addresses: Option<&str> = None;
        let mut request_timeout_ms = DEFAULT_REQUEST_TIMEOUT_MS;
        let mut request_max_retries = DEFAULT_REQUEST_MAX_RETRIES;

        for (name, value) in flags {
            match name.as_str() {
                LOGGER_LEVEL_FLAG | LOGGER_FORMAT_FLAG => {}
                ADDRESS_FLAG => raw_addresses = Some(value.as_str()),
                REQUEST_TIMEOUT_MS_FLAG => {
                    request_timeout_ms = value.parse().map_err(|_| ConfigError::NotANumber { flag: REQUEST_TIMEOUT_MS_FLAG, value: value.clone() })?;
                }
                REQUEST_MAX_RETRIES_FLAG => {
                    request_max_retries = value.parse().map_err(|_| ConfigError::NotANumber { flag: REQUEST_MAX_RETRIES_FLAG, value: value.clone() })?;
                }
                _ => {}
            }
        }

        let mut addresses = Vec::new();
        if let Some(raw) = raw_addresses {
            for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let normalized = if entry.contains("://") { entry.to_string() } else { format!("http://{entry}") };
                let url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidAddress(entry.to_string(), e))?;
                if addresses.contains(&url) {
                    return Err(ConfigError::DuplicateAddress(entry.to_string()));
                }
                addresses.push(url);
            }
        }
        if addresses.len() > MAX_ADDRESSES {
            return Err(ConfigError::TooManyAddresses(addresses.len()));
        }

        Ok(Self { addresses, request_timeout_ms, request_max_retries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pairs: &[(&str, &str)]) -> ModuleFlags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_to_no_addresses() {
        let cfg = ProxyConfig::from_flags(&flags(&[])).unwrap();
        assert!(cfg.addresses.is_empty());
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let err = ProxyConfig::from_flags(&flags(&[(ADDRESS_FLAG, "proxy-a.example.com,proxy-a.example.com")])).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAddress(_)));
    }

    #[test]
    fn rejects_more_than_two_addresses() {
        let err = ProxyConfig::from_flags(&flags(&[(ADDRESS_FLAG, "a.example.com,b.example.com,c.example.com")])).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyAddresses(_)));
    }

    #[test]
    fn prepends_http_scheme_when_missing() {
        let cfg = ProxyConfig::from_flags(&flags(&[(ADDRESS_FLAG, "proxy.example.com:8080")])).unwrap();
        assert_eq!(cfg.addresses[0].scheme(), "http");
    }
}
