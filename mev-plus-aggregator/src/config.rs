use mev_plus_bus::ModuleFlags;
use thiserror::Error;

/// Bus namespace this module registers under (spec §4.6).
pub const MODULE_NAME: &str = "blockAggregator";

pub const GENESIS_TIME_FLAG: &str = "genesis-time";
pub const AUCTION_DURATION_FLAG: &str = "auction-duration";
pub const SLOT_DURATION_FLAG: &str = "slot-duration";

const DEFAULT_SLOT_DURATION_SECS: u64 = 12;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("flag {flag} has non-numeric value {value:?}")]
    NotANumber { flag: &'static str, value: String },
}

/// Slot-timing parameters (spec §6 `blockAggregator` flags).
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub genesis_time: u64,
    pub auction_duration: u64,
    pub slot_duration: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { genesis_time: 0, auction_duration: 0, slot_duration: DEFAULT_SLOT_DURATION_SECS }
    }
}

impl AggregatorConfig {
    pub fn from_flags(flags: &ModuleFlags) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (name, value) in flags {
            match name.as_str() {
                GENESIS_TIME_FLAG => cfg.genesis_time = parse_flag(GENESIS_TIME_FLAG, value)?,
                AUCTION_DURATION_FLAG => cfg.auction_duration = parse_flag(AUCTION_DURATION_FLAG, value)?,
                SLOT_DURATION_FLAG => cfg.slot_duration = parse_flag(SLOT_DURATION_FLAG, value)?,
                _ => {}
            }
        }
        Ok(cfg)
    }

    /// Unix time the slot begins (spec §4.6 `getHeader`: `slot_time = genesis_time + slot * slot_duration`).
    pub fn slot_time(&self, slot: u64) -> u64 {
        self.genesis_time + slot * self.slot_duration
    }

    /// The instant after which bids for `slot` may no longer be accepted.
    pub fn auction_deadline(&self, slot: u64) -> u64 {
        self.slot_time(slot) + self.auction_duration
    }
}

fn parse_flag(flag: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::NotANumber { flag, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auction_deadline_adds_slot_time_and_auction_duration() {
        let cfg = AggregatorConfig { genesis_time: 1_000, auction_duration: 2, slot_duration: 12 };
        assert_eq!(cfg.slot_time(10), 1_120);
        assert_eq!(cfg.auction_deadline(10), 1_122);
    }

    #[test]
    fn rejects_non_numeric_flag_values() {
        let mut flags = ModuleFlags::new();
        flags.insert(GENESIS_TIME_FLAG.to_string(), "soon".to_string());
        let err = AggregatorConfig::from_flags(&flags).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));
    }
}
