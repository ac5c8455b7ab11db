use mev_plus_bus::BusError;
use thiserror::Error;

/// Top-level error type, aggregating crate-local errors the way
/// `mev-rs/src/error.rs` nests `RelayError`/`BoostError` under one enum
/// (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("malformed override {0:?}, expected `module.flag=value`")]
    MalformedOverride(String),
    #[error(transparent)]
    Bus(#[from] BusError),
}
