use mev_plus_bus::{BusError, ErrorKind, RpcError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("invalid proposerPubkey or parentHash")]
    InvalidHeaderRequest,
    #[error("invalid module name")]
    InvalidModuleName,
    #[error("could not identify module {0}")]
    ModuleIdentityMismatch(String),
    #[error("slot header with block hash {0} not found")]
    SlotHeaderNotFound(String),
    #[error("slot {0} not found")]
    SlotNotFound(u64),
    #[error("addition of old slot header: slot {slot} is before last slot {last_slot}")]
    StaleBid { slot: u64, last_slot: u64 },
    #[error("no module block sources are up: {0:?}")]
    NoBlockSourcesUp(Vec<String>),
    #[error("failed to process validator registrations: {0:?}")]
    RegistrationsFailed(Vec<String>),
    #[error("slot header bid is empty")]
    EmptyBid,
    #[error("core client not yet connected")]
    NotConnected,
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Maps an aggregator-local error onto the wire error codes of spec §4.1/§7;
/// everything that is not a client-shape problem collapses to `Internal`, the
/// same policy the bus applies to callback panics.
impl From<AggregatorError> for RpcError {
    fn from(err: AggregatorError) -> Self {
        match &err {
            AggregatorError::InvalidHeaderRequest | AggregatorError::InvalidModuleName => {
                RpcError::new(ErrorKind::InvalidParams, err.to_string())
            }
            AggregatorError::Bus(BusError::Remote(rpc)) => rpc.clone(),
            _ => RpcError::internal(err.to_string()),
        }
    }
}
