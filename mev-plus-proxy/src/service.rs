use crate::config::{ProxyConfig, MODULE_NAME};
use crate::error::ProxyError;
use crate::http::{decode, send_request, send_request_with_retries};
use async_trait::async_trait;
use futures::future::join_all;
use mev_plus_bus::{build_callback_map, BusError, Callback, CallbackMap, Client, ModuleFlags, RpcError, Service};
use parking_lot::RwLock;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

/// The `externalValidatorProxy` module: aggregates bids/payloads from up to
/// two upstream proxy addresses with no ranking of its own, leaving the
/// aggregator to pick the best bid across every connected source (spec
/// §4.8). Grounded on `modules/external-validator-proxy/{service,apis}.go`.
pub struct ProxyService {
    cfg: Arc<RwLock<ProxyConfig>>,
    http: Arc<RwLock<reqwest::Client>>,
    client: Arc<RwLock<Option<Client>>>,
}

impl ProxyService {
    pub fn new() -> Self {
        let cfg = ProxyConfig::default();
        let http = build_http_client(cfg.request_timeout_ms);
        Self { cfg: Arc::new(RwLock::new(cfg)), http: Arc::new(RwLock::new(http)), client: Arc::new(RwLock::new(None)) }
    }
}

impl Default for ProxyService {
    fn default() -> Self {
        Self::new()
    }
}

fn build_http_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder().timeout(std::time::Duration::from_millis(timeout_ms)).build().unwrap_or_default()
}

fn get_client(client: &RwLock<Option<Client>>) -> Result<Client, ProxyError> {
    client.read().clone().ok_or(ProxyError::NotConnected)
}

fn arg_u64(args: &[Value], index: usize) -> Result<u64, RpcError> {
    args.get(index).and_then(Value::as_u64).ok_or_else(|| RpcError::invalid_params(format!("missing or non-integer argument {index}")))
}

fn arg_str(args: &[Value], index: usize) -> Result<String, RpcError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RpcError::invalid_params(format!("missing or non-string argument {index}")))
}

fn addr_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// `status` (spec §4.8): succeeds if any configured upstream is reachable, or
/// if none are configured at all.
async fn status_op(cfg: &RwLock<ProxyConfig>, http: &reqwest::Client) -> Result<Value, ProxyError> {
    let addresses = cfg.read().addresses.clone();
    if addresses.is_empty() {
        return Ok(Value::Null);
    }

    let checks = addresses.iter().cloned().map(|address| {
        let http = http.clone();
        async move {
            let url = format!("{}/eth/v1/builder/status", addr_base(&address));
            send_request::<()>(&http, Method::GET, &url, None).await.is_ok()
        }
    });
    let results = join_all(checks).await;
    if results.iter().any(|ok| *ok) {
        Ok(Value::Null)
    } else {
        Err(ProxyError::NoUpstreamSucceeded)
    }
}

/// `registerValidator` (spec §4.8): any-upstream-success semantics, mirroring
/// `apis.go::RegisterValidator`.
async fn register_validator_op(cfg: &RwLock<ProxyConfig>, http: &reqwest::Client, payload: Value) -> Result<Value, ProxyError> {
    let addresses = cfg.read().addresses.clone();

    let calls = addresses.iter().cloned().map(|address| {
        let http = http.clone();
        let payload = payload.clone();
        async move {
            let url = format!("{}/eth/v1/builder/validators", addr_base(&address));
            send_request(&http, Method::POST, &url, Some(&payload)).await
        }
    });
    let results = join_all(calls).await;

    if results.iter().any(Result::is_ok) {
        Ok(Value::Null)
    } else {
        Err(ProxyError::NoUpstreamSucceeded)
    }
}

/// `getHeader` (spec §4.8): every upstream's non-empty bids are aggregated
/// into one array with no local ranking — the aggregator ranks across all
/// connected sources itself. Grounded on `apis.go::GetHeader`.
async fn get_header_op(
    cfg: &RwLock<ProxyConfig>,
    http: &reqwest::Client,
    slot: u64,
    parent_hash: String,
    proposer_pubkey: String,
) -> Result<Value, ProxyError> {
    let (addresses, max_retries) = {
        let cfg = cfg.read();
        (cfg.addresses.clone(), cfg.request_max_retries)
    };

    let calls = addresses.iter().cloned().map(|address| {
        let http = http.clone();
        let parent_hash = parent_hash.clone();
        let proposer_pubkey = proposer_pubkey.clone();
        async move {
            let url = format!("{}/eth/v1/builder/header/{slot}/{parent_hash}/{proposer_pubkey}", addr_base(&address));
            let response = send_request_with_retries::<()>(&http, Method::GET, &url, None, max_retries).await.ok()?;
            decode::<Value>(response).await.ok().flatten()
        }
    });
    let results = join_all(calls).await;

    let bids: Vec<Value> = results
        .into_iter()
        .flatten()
        .filter(|bid| !bid_is_empty(bid))
        .collect();

    if bids.is_empty() {
        Err(ProxyError::NoUpstreamSucceeded)
    } else {
        Ok(json!(bids))
    }
}

fn bid_is_empty(bid: &Value) -> bool {
    let payload = bid.get("data").unwrap_or(bid);
    let zero = format!("0x{}", "00".repeat(32));
    payload.pointer("/message/header/block_hash").and_then(Value::as_str).map(|hash| hash == zero).unwrap_or(true)
}

/// `getPayload` (spec §4.8): a retried POST to every upstream; only the
/// response(s) whose payload block hash matches the blinded block being
/// opened are returned. Grounded on `apis.go::GetPayload`.
async fn get_payload_op(cfg: &RwLock<ProxyConfig>, http: &reqwest::Client, block: Value) -> Result<Value, ProxyError> {
    let expected_block_hash = block
        .pointer("/message/body/execution_payload_header/block_hash")
        .and_then(Value::as_str)
        .ok_or(ProxyError::IncompletePayload)?
        .to_string();

    let (addresses, max_retries) = {
        let cfg = cfg.read();
        (cfg.addresses.clone(), cfg.request_max_retries)
    };

    let calls = addresses.iter().cloned().map(|address| {
        let http = http.clone();
        let block = block.clone();
        async move {
            let url = format!("{}/eth/v1/builder/blinded_blocks", addr_base(&address));
            let response = send_request_with_retries(&http, Method::POST, &url, Some(&block), max_retries).await.ok()?;
            decode::<Value>(response).await.ok().flatten()
        }
    });
    let results = join_all(calls).await;

    let matches: Vec<Value> = results
        .into_iter()
        .flatten()
        .filter(|payload| {
            let data = payload.get("data").unwrap_or(payload);
            data.pointer("/block_hash")
                .or_else(|| data.pointer("/execution_payload/block_hash"))
                .and_then(Value::as_str)
                .map(|hash| hash == expected_block_hash)
                .unwrap_or(false)
        })
        .collect();

    matches.into_iter().next().ok_or(ProxyError::NoMatchingPayload)
}

#[async_trait]
impl Service for ProxyService {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn callbacks(&self) -> CallbackMap {
        let cfg = self.cfg.clone();
        let http = self.http.clone();

        build_callback_map(vec![
            Callback::new("name", move |_args: Vec<Value>| async move { Ok(json!(MODULE_NAME)) }),
            Callback::new("status", {
                let cfg = cfg.clone();
                let http = http.clone();
                move |_args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let http = http.read().clone();
                    async move { status_op(&cfg, &http).await.map_err(RpcError::from) }
                }
            }),
            Callback::new("registerValidator", {
                let cfg = cfg.clone();
                let http = http.clone();
                move |args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let http = http.read().clone();
                    async move {
                        let payload = args.first().cloned().unwrap_or(Value::Null);
                        register_validator_op(&cfg, &http, payload).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("getHeader", {
                let cfg = cfg.clone();
                let http = http.clone();
                move |args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let http = http.read().clone();
                    async move {
                        let slot = arg_u64(&args, 0)?;
                        let parent_hash = arg_str(&args, 1)?;
                        let proposer_pubkey = arg_str(&args, 2)?;
                        get_header_op(&cfg, &http, slot, parent_hash, proposer_pubkey).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("getPayload", {
                let cfg = cfg.clone();
                let http = http.clone();
                move |args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let http = http.read().clone();
                    async move {
                        let block = args.first().cloned().unwrap_or(Value::Null);
                        get_payload_op(&cfg, &http, block).await.map_err(RpcError::from)
                    }
                }
            }),
        ])
    }

    /// When no addresses are configured, this module excludes itself from
    /// aggregator notifications instead of registering as a block source
    /// (spec §4.8 "unconfigured" behavior). Otherwise it performs the same
    /// address/builder-api collision check the relay module does before
    /// connecting (spec §4.10).
    async fn start(&self) -> Result<(), BusError> {
        let client = get_client(&self.client).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;
        let addresses = self.cfg.read().addresses.clone();

        if addresses.is_empty() {
            client.notify("blockAggregator_excludeFromNotifications", false, vec![], json!([MODULE_NAME])).await?;
            return Ok(());
        }

        if let Ok(listen_address) = client.call::<String>("builderApi_listenAddress", false, vec![], json!([])).await {
            for address in &addresses {
                if addr_base(address) == listen_address.trim_end_matches('/') {
                    let err = ProxyError::AddressCollidesWithBuilderApi(address.to_string(), listen_address);
                    return Err(BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()));
                }
            }
        }

        client.call::<Value>("blockAggregator_connectBlockSource", false, vec![], json!([MODULE_NAME])).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn connect_core(&self, client: Client, ping_token: String) -> Result<(), BusError> {
        client.ping(ping_token).await?;
        *self.client.write() = Some(client);
        Ok(())
    }

    async fn configure(&self, flags: ModuleFlags) -> Result<(), BusError> {
        let parsed = ProxyConfig::from_flags(&flags).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;
        *self.http.write() = build_http_client(parsed.request_timeout_ms);
        *self.cfg.write() = parsed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_is_empty_when_hash_is_zero() {
        let zero = format!("0x{}", "00".repeat(32));
        assert!(bid_is_empty(&json!({"message": {"header": {"block_hash": zero}}})));
    }

    #[test]
    fn bid_is_not_empty_with_real_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(!bid_is_empty(&json!({"message": {"header": {"block_hash": hash}}})));
    }
}
