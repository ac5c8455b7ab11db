use mev_plus_bus::{BusError, ErrorKind, RpcError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed blinded block: missing execution payload header")]
    IncompletePayload,
    #[error("no upstream proxy accepted the call")]
    NoUpstreamSucceeded,
    #[error("no payload from any upstream matched the requested block hash")]
    NoMatchingPayload,
    #[error("core client not yet connected")]
    NotConnected,
    #[error("proxy address {0} is the same as the builder api address {1}")]
    AddressCollidesWithBuilderApi(String, String),
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<ProxyError> for RpcError {
    fn from(err: ProxyError) -> Self {
        match &err {
            ProxyError::IncompletePayload => RpcError::new(ErrorKind::InvalidParams, err.to_string()),
            ProxyError::Bus(BusError::Remote(rpc)) => rpc.clone(),
            _ => RpcError::internal(err.to_string()),
        }
    }
}
