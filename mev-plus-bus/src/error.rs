use crate::envelope::RpcError;
use thiserror::Error;

/// Errors internal to the bus itself (client/handler/router/registry plumbing),
/// distinct from the wire-level `RpcError` a callback may choose to return.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("client is closed")]
    ClientClosed,
    #[error("bad result in bus response")]
    BadResult,
    #[error("bus response has no result")]
    NoResult,
    #[error("{0}")]
    Remote(#[from] RpcError),
    #[error("call to {0} timed out")]
    Timeout(String),
    #[error("module {0} not found")]
    ModuleNotFound(String),
    #[error("module {0} already registered")]
    ModuleAlreadyRegistered(String),
    #[error("service {0} doesn't have any suitable methods to expose")]
    NoSuitableCallbacks(String),
    #[error("module {0} start took too long or may be blocking")]
    StartTimedOut(String),
    #[error("failed to start module {0}: {1}")]
    StartFailed(String, String),
    #[error("failed to stop modules: {0:?}")]
    StopFailed(Vec<(String, String)>),
    #[error("failed to connect module {0} to core: {1}")]
    ConnectFailed(String, String),
    #[error("ping message mismatch for module {0}")]
    PingMismatch(String),
    #[error("core is already running")]
    AlreadyRunning,
    #[error("core is already stopped")]
    AlreadyStopped,
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
