use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mev_plus_bus::{BusError, ErrorKind};
use serde_json::json;
use thiserror::Error;

/// Maps a bus round trip onto the HTTP status table of spec §4.9/§6: `400`
/// for malformed input the adapter itself rejects or the aggregator reports
/// as invalid params, `500` for anything else the aggregator returns.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("slot must be a base-10 unsigned integer")]
    InvalidSlot,
    #[error("parent_hash must be 0x-prefixed and 66 characters long")]
    InvalidParentHash,
    #[error("pubkey must be 0x-prefixed and 98 characters long")]
    InvalidPublicKey,
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidSlot | Self::InvalidParentHash | Self::InvalidPublicKey => StatusCode::BAD_REQUEST,
            Self::Bus(BusError::Remote(rpc)) if rpc.code == ErrorKind::InvalidParams.code() => StatusCode::BAD_REQUEST,
            Self::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
