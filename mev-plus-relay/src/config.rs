use ethereum_consensus::primitives::U256;
use mev_plus_bus::ModuleFlags;
use mev_plus_types::{compute_builder_domain, parse_u256_decimal, Domain, Network, RelayEntry, RelayEntryError};
use thiserror::Error;

/// Bus namespace this module registers under (spec §4.7).
pub const MODULE_NAME: &str = "relay";

pub const LOGGER_LEVEL_FLAG: &str = "logger-level";
pub const LOGGER_FORMAT_FLAG: &str = "logger-format";
pub const RELAY_ENTRIES_FLAG: &str = "relay-entries";
pub const RELAY_CHECK_FLAG: &str = "relay-check";
pub const SKIP_RELAY_SIGNATURE_CHECK_FLAG: &str = "skip-relay-signature-check";
pub const MAINNET_FLAG: &str = "mainnet";
pub const SEPOLIA_FLAG: &str = "sepolia";
pub const GOERLI_FLAG: &str = "goerli";
pub const MIN_BID_FLAG: &str = "min-bid";
pub const GENESIS_FORK_VERSION_FLAG: &str = "genesis-fork-version";
pub const GENESIS_VALIDATORS_ROOT_FLAG: &str = "genesis-validators-root";
pub const GENESIS_TIME_FLAG: &str = "genesis-time";
pub const REQUEST_TIMEOUT_MS_FLAG: &str = "request-timeout-ms";
pub const REQUEST_MAX_RETRIES_FLAG: &str = "request-max-retries";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REQUEST_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot set {0} together with {1}")]
    ConflictingNetworkSelectors(&'static str, &'static str),
    #[error("cannot set a custom genesis-time flag without a custom genesis-fork-version flag")]
    GenesisTimeWithoutCustomForkVersion,
    #[error("invalid min-bid value {0:?}")]
    InvalidMinBid(String),
    #[error("invalid logger format {0:?}")]
    InvalidLoggerFormat(String),
    #[error("invalid hex fork version {0:?}")]
    InvalidForkVersion(String),
    #[error("invalid hex genesis validators root {0:?}")]
    InvalidGenesisValidatorsRoot(String),
    #[error("flag {flag} has a non-numeric value {value:?}")]
    NotANumber { flag: &'static str, value: String },
    #[error("no relay entries provided")]
    NoRelayEntries,
    #[error(transparent)]
    InvalidRelayEntry(#[from] RelayEntryError),
}

/// Raw flag values, accumulated before the network/fork-version selection is
/// resolved (spec §4.7 "Configuration", grounded on
/// `modules/relay/utils.go::ParseConfigFLags`'s `forkVersionFlagNameSet` state
/// machine).
#[derive(Default)]
struct NetworkSelection {
    flag_name_set: Option<&'static str>,
    custom_fork_version: Option<[u8; 4]>,
    custom_genesis_time: Option<u64>,
    network: Network,
}

impl NetworkSelection {
    fn select_preset(&mut self, flag: &'static str, network: Network) -> Result<(), ConfigError> {
        if let Some(set) = self.flag_name_set {
            return Err(ConfigError::ConflictingNetworkSelectors(flag, set));
        }
        self.flag_name_set = Some(flag);
        self.network = network;
        Ok(())
    }

    fn select_custom_fork_version(&mut self, version: [u8; 4]) -> Result<(), ConfigError> {
        if let Some(set) = self.flag_name_set {
            if set != GENESIS_FORK_VERSION_FLAG {
                return Err(ConfigError::ConflictingNetworkSelectors(GENESIS_FORK_VERSION_FLAG, set));
            }
        }
        self.flag_name_set = Some(GENESIS_FORK_VERSION_FLAG);
        self.custom_fork_version = Some(version);
        Ok(())
    }
}

/// Parsed configuration for the `relay` module (spec §4.7/§6). `domain` is
/// the single application-builder signing domain every configured relay's bid
/// is checked against.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relays: Vec<RelayEntry>,
    pub relay_check: bool,
    pub skip_relay_signature_check: bool,
    pub min_bid: U256,
    pub network: Network,
    pub genesis_validators_root: [u8; 32],
    pub domain: Domain,
    pub request_timeout_ms: u64,
    pub request_max_retries: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let network = Network::default();
        let genesis_validators_root = [0u8; 32];
        Self {
            relays: Vec::new(),
            relay_check: false,
            skip_relay_signature_check: false,
            min_bid: U256::from(0u64),
            domain: compute_builder_domain(network.genesis_fork_version(), genesis_validators_root),
            network,
            genesis_validators_root,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            request_max_retries: DEFAULT_REQUEST_MAX_RETRIES,
        }
    }
}

impl RelayConfig {
    /// Parse `ModuleFlags` into a `RelayConfig`. Two passes: the first
    /// resolves the network/fork-version/genesis-validators-root/timeouts and
    /// validates the mainnet/sepolia/goerli/custom exclusivity rules; the
    /// second parses `relay-entries` once the signing domain they're bound to
    /// is known (spec §4.7, grounded on
    /// `modules/relay/utils.go::ParseConfigFLags`).
    pub fn from_flags(flags: &ModuleFlags) -> Result<Self, ConfigError> {
        let mut selection = NetworkSelection::default();
        let mut relay_check = false;
        let mut skip_relay_signature_check = false;
        let mut min_bid = U256::from(0u64);
        let mut genesis_validators_root = [0u8; 32];
        let mut request_timeout_ms = DEFAULT_REQUEST_TIMEOUT_MS;
        let mut request_max_retries = DEFAULT_REQUEST_MAX_RETRIES;
        let mut raw_relay_entries: Option<&str> = None;

        for (name, value) in flags {
            match name.as_str() {
                LOGGER_LEVEL_FLAG | LOGGER_FORMAT_FLAG => {}
                RELAY_ENTRIES_FLAG => raw_relay_entries = Some(value.as_str()),
                RELAY_CHECK_FLAG => relay_check = value.parse().unwrap_or(true),
                SKIP_RELAY_SIGNATURE_CHECK_FLAG => skip_relay_signature_check = value.parse().unwrap_or(true),
                MIN_BID_FLAG => min_bid = parse_u256_decimal(value).ok_or_else(|| ConfigError::InvalidMinBid(value.clone()))?,
                MAINNET_FLAG => selection.select_preset(MAINNET_FLAG, Network::Mainnet)?,
                SEPOLIA_FLAG => selection.select_preset(SEPOLIA_FLAG, Network::Sepolia)?,
                GOERLI_FLAG => selection.select_preset(GOERLI_FLAG, Network::Goerli)?,
                GENESIS_FORK_VERSION_FLAG => {
                    let version = parse_fork_version(value)?;
                    selection.select_custom_fork_version(version)?;
                }
                GENESIS_TIME_FLAG => {
                    if let Some(set) = selection.flag_name_set {
                        if set != GENESIS_FORK_VERSION_FLAG {
                            return Err(ConfigError::ConflictingNetworkSelectors(GENESIS_TIME_FLAG, set));
                        }
                    }
                    let time: u64 = value.parse().map_err(|_| ConfigError::NotANumber { flag: GENESIS_TIME_FLAG, value: value.clone() })?;
                    selection.custom_genesis_time = Some(time);
                }
                GENESIS_VALIDATORS_ROOT_FLAG => {
                    genesis_validators_root = parse_root(value)?;
                }
                REQUEST_TIMEOUT_MS_FLAG => {
                    request_timeout_ms = value.parse().map_err(|_| ConfigError::NotANumber { flag: REQUEST_TIMEOUT_MS_FLAG, value: value.clone() })?;
                }
                REQUEST_MAX_RETRIES_FLAG => {
                    request_max_retries = value.parse().map_err(|_| ConfigError::NotANumber { flag: REQUEST_MAX_RETRIES_FLAG, value: value.clone() })?;
                }
                _ => {}
            }
        }

        if selection.custom_genesis_time.is_some() && selection.custom_fork_version.is_none() {
            return Err(ConfigError::GenesisTimeWithoutCustomForkVersion);
        }

        let network = match selection.custom_fork_version {
            Some(fork_version) => Network::Custom {
                genesis_fork_version: fork_version,
                genesis_time: selection.custom_genesis_time.unwrap_or_else(|| selection.network.genesis_time()),
            },
            None => selection.network,
        };

        let domain = compute_builder_domain(network.genesis_fork_version(), genesis_validators_root);

        let relays = match raw_relay_entries {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|entry| RelayEntry::parse(entry, domain))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if relays.is_empty() {
            return Err(ConfigError::NoRelayEntries);
        }

        Ok(Self {
            relays,
            relay_check,
            skip_relay_signature_check,
            min_bid,
            network,
            genesis_validators_root,
            domain,
            request_timeout_ms,
            request_max_retries,
        })
    }
}

fn parse_fork_version(value: &str) -> Result<[u8; 4], ConfigError> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(hex_str).map_err(|_| ConfigError::InvalidForkVersion(value.to_string()))?;
    bytes.try_into().map_err(|_| ConfigError::InvalidForkVersion(value.to_string()))
}

fn parse_root(value: &str) -> Result<[u8; 32], ConfigError> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(hex_str).map_err(|_| ConfigError::InvalidGenesisValidatorsRoot(value.to_string()))?;
    bytes.try_into().map_err(|_| ConfigError::InvalidGenesisValidatorsRoot(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pairs: &[(&str, &str)]) -> ModuleFlags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn rejects_mainnet_and_sepolia_together() {
        let err = RelayConfig::from_flags(&flags(&[(MAINNET_FLAG, "true"), (SEPOLIA_FLAG, "true"), (RELAY_ENTRIES_FLAG, "")])).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingNetworkSelectors(..)));
    }

    #[test]
    fn rejects_custom_genesis_time_without_custom_fork_version() {
        let err = RelayConfig::from_flags(&flags(&[(GENESIS_TIME_FLAG, "123")])).unwrap_err();
        assert!(matches!(err, ConfigError::GenesisTimeWithoutCustomForkVersion));
    }

    #[test]
    fn rejects_empty_relay_entries() {
        let err = RelayConfig::from_flags(&flags(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::NoRelayEntries));
    }

    #[test]
    fn accepts_a_single_relay_entry_on_mainnet() {
        let key = format!("0x{}", "ab".repeat(48));
        let raw = format!("https://{key}@relay.example.com");
        let cfg = RelayConfig::from_flags(&flags(&[(MAINNET_FLAG, "true"), (RELAY_ENTRIES_FLAG, &raw)])).unwrap();
        assert_eq!(cfg.relays.len(), 1);
        assert_eq!(cfg.network.genesis_fork_version(), [0, 0, 0, 0]);
    }
}
