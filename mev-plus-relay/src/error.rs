use mev_plus_bus::{BusError, ErrorKind, RpcError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid proposerPubkey or parentHash")]
    InvalidHeaderRequest,
    #[error("malformed blinded block: missing execution payload header")]
    IncompletePayload,
    #[error("no bid received for slot {0} block hash {1}")]
    NoBidReceived(u64, String),
    #[error("no payload received from any relay")]
    NoPayloadReceived,
    #[error("failed to connect to any relays")]
    NoRelaysUp,
    #[error("core client not yet connected")]
    NotConnected,
    #[error("relay address {0} is the same as the builder api address {1}")]
    AddressCollidesWithBuilderApi(String, String),
    #[error("payload mismatch: {0}")]
    PayloadMismatch(String),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Maps a relay-local error onto the wire error codes of spec §4.1/§7, the
/// same policy `mev-plus-aggregator::error` applies.
impl From<RelayError> for RpcError {
    fn from(err: RelayError) -> Self {
        match &err {
            RelayError::InvalidHeaderRequest | RelayError::IncompletePayload => RpcError::new(ErrorKind::InvalidParams, err.to_string()),
            RelayError::Bus(BusError::Remote(rpc)) => rpc.clone(),
            _ => RpcError::internal(err.to_string()),
        }
    }
}
