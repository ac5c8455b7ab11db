use crate::config::{ApiConfig, MODULE_NAME};
use crate::error::ApiError;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mev_plus_bus::{build_callback_map, BusError, Callback, CallbackMap, Client, ModuleFlags, RpcError, Service};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct AppState {
    client: Client,
}

async fn handle_root() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({})))
}

async fn handle_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.client.call::<Value>("blockAggregator_status", false, vec![], json!([])).await?;
    Ok((StatusCode::OK, Json(json!({}))))
}

async fn handle_register_validator(State(state): State<AppState>, Json(registrations): Json<Value>) -> Result<impl IntoResponse, ApiError> {
    state.client.call::<Value>("blockAggregator_registerValidator", false, vec![], json!([registrations])).await?;
    Ok((StatusCode::OK, Json(json!({}))))
}

fn validate_slot(slot: &str) -> Result<u64, ApiError> {
    slot.parse().map_err(|_| ApiError::InvalidSlot)
}

fn validate_parent_hash(parent_hash: &str) -> Result<(), ApiError> {
    if parent_hash.starts_with("0x") && parent_hash.len() == 66 {
        Ok(())
    } else {
        Err(ApiError::InvalidParentHash)
    }
}

fn validate_public_key(public_key: &str) -> Result<(), ApiError> {
    if public_key.starts_with("0x") && public_key.len() == 98 {
        Ok(())
    } else {
        Err(ApiError::InvalidPublicKey)
    }
}

async fn handle_get_header(
    State(state): State<AppState>,
    Path((slot, parent_hash, public_key)): Path<(String, String, String)>,
) -> Result<axum::response::Response, ApiError> {
    let slot = validate_slot(&slot)?;
    validate_parent_hash(&parent_hash)?;
    validate_public_key(&public_key)?;

    let result: Value = state.client.call("blockAggregator_getHeader", false, vec![], json!([slot, parent_hash, public_key])).await?;
    if result.is_null() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((StatusCode::OK, Json(result)).into_response())
    }
}

async fn handle_get_payload(State(state): State<AppState>, Json(block): Json<Value>) -> Result<axum::response::Response, ApiError> {
    let result: Value = state.client.call("blockAggregator_getPayload", false, vec![], json!([block])).await?;
    if result.is_null() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((StatusCode::OK, Json(result)).into_response())
    }
}

fn router(client: Client) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/eth/v1/builder/status", get(handle_status))
        .route("/eth/v1/builder/validators", post(handle_register_validator))
        .route("/eth/v1/builder/header/:slot/:parent_hash/:public_key", get(handle_get_header))
        .route("/eth/v1/builder/blinded_blocks", post(handle_get_payload))
        .with_state(AppState { client })
}

fn get_client(client: &RwLock<Option<Client>>) -> Result<Client, BusError> {
    client.read().clone().ok_or_else(|| BusError::ConnectFailed(MODULE_NAME.to_string(), "core client not yet connected".to_string()))
}

/// The `builderApi` module: an axum HTTP server translating the builder-API
/// surface one-to-one onto bus calls against the aggregator (spec §4.9/§6).
/// Grounded on `mev-rs/src/blinded_block_provider/api/server.rs`.
pub struct ApiService {
    cfg: Arc<RwLock<ApiConfig>>,
    client: Arc<RwLock<Option<Client>>>,
    server: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ApiService {
    pub fn new() -> Self {
        Self { cfg: Arc::new(RwLock::new(ApiConfig::default())), client: Arc::new(RwLock::new(None)), server: Arc::new(RwLock::new(None)) }
    }
}

impl Default for ApiService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for ApiService {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn callbacks(&self) -> CallbackMap {
        let cfg = self.cfg.clone();
        build_callback_map(vec![
            Callback::new("name", move |_args: Vec<Value>| async move { Ok(json!(MODULE_NAME)) }),
            Callback::new("listenAddress", {
                let cfg = cfg.clone();
                move |_args: Vec<Value>| {
                    let cfg = cfg.clone();
                    async move { Ok::<Value, RpcError>(json!(cfg.read().listen_address.to_string())) }
                }
            }),
        ])
    }

    /// Binds and spawns the axum server (spec §4.9). Unlike the other
    /// modules, `builderApi` never calls `blockAggregator_connectBlockSource`
    /// — it is the validator-facing edge, not a block source.
    async fn start(&self) -> Result<(), BusError> {
        let client = get_client(&self.client)?;
        let listen_address = self.cfg.read().listen_address;
        let app = router(client);

        let handle = tokio::spawn(async move {
            tracing::info!(%listen_address, "builder API listening");
            if let Err(err) = axum::Server::bind(&listen_address).serve(app.into_make_service()).await {
                tracing::error!(%err, "builder API server exited");
            }
        });
        *self.server.write() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BusError> {
        if let Some(handle) = self.server.write().take() {
            handle.abort();
        }
        Ok(())
    }

    async fn connect_core(&self, client: Client, ping_token: String) -> Result<(), BusError> {
        client.ping(ping_token).await?;
        *self.client.write() = Some(client);
        Ok(())
    }

    async fn configure(&self, flags: ModuleFlags) -> Result<(), BusError> {
        let parsed = ApiConfig::from_flags(&flags).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;
        *self.cfg.write() = parsed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_parent_hash() {
        assert!(validate_parent_hash("0xabc").is_err());
    }

    #[test]
    fn rejects_pubkey_missing_prefix() {
        let pubkey = "a".repeat(96);
        assert!(validate_public_key(&pubkey).is_err());
    }

    #[test]
    fn accepts_well_formed_parent_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(validate_parent_hash(&hash).is_ok());
    }
}
