use crate::config::{RelayConfig, MODULE_NAME};
use crate::data::BidCache;
use crate::error::RelayError;
use crate::http::{decode, send_request, send_request_with_retries};
use crate::validate;
use async_trait::async_trait;
use ethereum_consensus::primitives::U256;
use futures::future::join_all;
use mev_plus_bus::{build_callback_map, BusError, Callback, CallbackMap, Client, ModuleFlags, RpcError, Service};
use mev_plus_types::types::{AuctionContents, SignedBlindedBeaconBlock, SignedBuilderBid};
use mev_plus_types::{BidResp, RelayEntry};
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

/// The `relay` module: fans requests out to a fixed list of BLS-keyed relays
/// and picks the best validated bid/payload (spec §4.7). Grounded on
/// `modules/relay/{relay,outgoing_calls,internal,handlers}.go`.
pub struct RelayService {
    cfg: Arc<RwLock<RelayConfig>>,
    cache: Arc<BidCache>,
    http: Arc<RwLock<reqwest::Client>>,
    client: Arc<RwLock<Option<Client>>>,
}

impl RelayService {
    pub fn new() -> Self {
        let cfg = RelayConfig::default();
        let http = build_http_client(cfg.request_timeout_ms);
        Self {
            cfg: Arc::new(RwLock::new(cfg)),
            cache: Arc::new(BidCache::new()),
            http: Arc::new(RwLock::new(http)),
            client: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

fn build_http_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .build()
        .unwrap_or_default()
}

fn get_client(client: &RwLock<Option<Client>>) -> Result<Client, RelayError> {
    client.read().clone().ok_or(RelayError::NotConnected)
}

fn arg_str(args: &[Value], index: usize) -> Result<String, RpcError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RpcError::invalid_params(format!("missing or non-string argument {index}")))
}

fn arg_u64(args: &[Value], index: usize) -> Result<u64, RpcError> {
    args.get(index).and_then(Value::as_u64).ok_or_else(|| RpcError::invalid_params(format!("missing or non-integer argument {index}")))
}

fn relay_base(relay: &RelayEntry) -> String {
    relay.url().as_str().trim_end_matches('/').to_string()
}

/// `status` (spec §4.7): if relay-checking is disabled, this module always
/// reports healthy; otherwise every relay's `/eth/v1/builder/status` is
/// pinged in parallel and at least one must succeed (grounded on
/// `modules/relay/internal.go::checkRelays`).
async fn status_op(cfg: &RwLock<RelayConfig>, http: &reqwest::Client) -> Result<Value, RelayError> {
    let (relays, relay_check) = {
        let cfg = cfg.read();
        (cfg.relays.clone(), cfg.relay_check)
    };
    if !relay_check {
        return Ok(Value::Null);
    }

    let checks = relays.iter().cloned().map(|relay| {
        let http = http.clone();
        async move {
            let url = format!("{}/eth/v1/builder/status", relay_base(&relay));
            send_request::<()>(&http, Method::GET, &url, None).await.is_ok()
        }
    });
    let results = join_all(checks).await;
    let up = results.iter().filter(|ok| **ok).count();
    if up == 0 {
        Err(RelayError::NoRelaysUp)
    } else {
        Ok(json!(up))
    }
}

/// `registerValidator` (spec §4.7): forwards registrations to every relay in
/// parallel; succeeds if at least one accepts (grounded on
/// `modules/relay/internal.go::processRegistration`).
async fn register_validator_op(cfg: &RwLock<RelayConfig>, http: &reqwest::Client, payload: Value) -> Result<Value, RelayError> {
    let relays = cfg.read().relays.clone();

    let calls = relays.iter().cloned().map(|relay| {
        let http = http.clone();
        let payload = payload.clone();
        async move {
            let url = format!("{}/eth/v1/builder/validators", relay_base(&relay));
            let result = send_request(&http, Method::POST, &url, Some(&payload)).await;
            (relay.to_string(), result)
        }
    });
    let results = join_all(calls).await;

    let mut failures = Vec::new();
    let mut any_success = false;
    for (relay, result) in results {
        match result {
            Ok(_) => any_success = true,
            Err(err) => failures.push(format!("{relay}: {err}")),
        }
    }

    if any_success {
        Ok(Value::Null)
    } else {
        tracing::warn!(?failures, "no relay accepted the validator registration batch");
        Err(RelayError::NoRelaysUp)
    }
}

#[derive(Default)]
struct HeaderFanOutState {
    relays_by_hash: std::collections::HashMap<String, Vec<RelayEntry>>,
    best: Option<(mev_plus_types::BidInfo, SignedBuilderBid, Value)>,
}

/// `getHeader` (spec §4.7): concurrently fetch a bid from every relay,
/// validate and (optionally) verify each one's signature, track the best
/// value seen so far with a smaller-block-hash tie-break, cache the winner,
/// and return it wrapped the same way the relay's own wire response shapes
/// it. Grounded on `modules/relay/outgoing_calls.go::requestRelayHeader`.
async fn get_header_op(
    cfg: &RwLock<RelayConfig>,
    http: &reqwest::Client,
    cache: &BidCache,
    slot: u64,
    parent_hash: String,
    proposer_pubkey: String,
) -> Result<Value, RelayError> {
    if proposer_pubkey.len() != 98 || parent_hash.len() != 66 {
        return Err(RelayError::InvalidHeaderRequest);
    }

    let (relays, domain, skip_sig, min_bid, max_retries) = {
        let cfg = cfg.read();
        (cfg.relays.clone(), cfg.domain, cfg.skip_relay_signature_check, cfg.min_bid, cfg.request_max_retries)
    };

    let state = Arc::new(Mutex::new(HeaderFanOutState::default()));

    let tasks = relays.iter().cloned().map(|relay| {
        let http = http.clone();
        let state = state.clone();
        let parent_hash = parent_hash.clone();
        let proposer_pubkey = proposer_pubkey.clone();
        async move {
            let url = format!("{}/eth/v1/builder/header/{slot}/{parent_hash}/{proposer_pubkey}", relay_base(&relay));
            let response = match send_request_with_retries::<()>(&http, Method::GET, &url, None, max_retries).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(relay = %relay, %err, "relay header request failed");
                    return;
                }
            };
            let envelope: Value = match decode(response).await {
                Ok(Some(body)) => body,
                Ok(None) => return,
                Err(err) => {
                    tracing::debug!(relay = %relay, %err, "relay header response was not decodable");
                    return;
                }
            };
            let mut signed: SignedBuilderBid = match serde_json::from_value(envelope.get("data").cloned().unwrap_or_else(|| envelope.clone())) {
                Ok(signed) => signed,
                Err(err) => {
                    tracing::debug!(relay = %relay, %err, "relay header payload did not match any known bid shape");
                    return;
                }
            };

            let bid_info = match validate::bid_info(&signed, relay.public_key(), &parent_hash, &min_bid) {
                Ok(bid_info) => bid_info,
                Err(err) => {
                    tracing::warn!(relay = %relay, %err, "rejected relay bid");
                    return;
                }
            };

            if !skip_sig {
                if let Err(err) = signed.verify_signature(domain) {
                    tracing::warn!(relay = %relay, %err, "relay bid signature verification failed");
                    return;
                }
            }

            let mut state = state.lock();
            state.relays_by_hash.entry(bid_info.block_hash.to_string()).or_default().push(relay.clone());
            let replace = match &state.best {
                None => true,
                Some((current, ..)) => {
                    bid_info.value > current.value
                        || (bid_info.value == current.value && bid_info.block_hash.to_string() < current.block_hash.to_string())
                }
            };
            if replace {
                state.best = Some((bid_info, signed, envelope));
            }
        }
    });
    join_all(tasks).await;

    let (bid_info, signed, envelope) = {
        let mut state = state.lock();
        state.best.take().ok_or_else(|| RelayError::NoBidReceived(slot, String::new()))?
    };
    let relays_for_hash = {
        let mut state = state.lock();
        state.relays_by_hash.remove(&bid_info.block_hash.to_string()).unwrap_or_default()
    };

    cache.insert(slot, BidResp::new(signed, bid_info, relays_for_hash));

    Ok(json!([envelope]))
}

/// `getPayload` (spec §4.7): look the winning bid up by slot/block-hash,
/// fan a retried POST out only to the relays that delivered it, validate the
/// first successful response against the cached bid's header, and drop later
/// winners once one has already been accepted. Grounded on
/// `modules/relay/outgoing_calls.go::requestRelayPayload`.
async fn get_payload_op(cfg: &RwLock<RelayConfig>, http: &reqwest::Client, cache: &BidCache, block: Value) -> Result<Value, RelayError> {
    let signed_block: SignedBlindedBeaconBlock = serde_json::from_value(block.clone()).map_err(|_| RelayError::IncompletePayload)?;
    let slot = block
        .pointer("/message/slot")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| block.pointer("/message/slot").and_then(Value::as_u64))
        .ok_or(RelayError::IncompletePayload)?;
    let block_hash = block
        .pointer("/message/body/execution_payload_header/block_hash")
        .and_then(Value::as_str)
        .ok_or(RelayError::IncompletePayload)?
        .to_string();

    let bid = cache.get(slot, &block_hash).ok_or_else(|| RelayError::NoBidReceived(slot, block_hash.clone()))?;
    if bid.relays.is_empty() {
        tracing::warn!(slot, %block_hash, "winning bid has no relays recorded to request the payload from");
    }

    let max_retries = cfg.read().request_max_retries;
    let winner: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let cancel = Arc::new(tokio::sync::Notify::new());

    let tasks = bid.relays.iter().cloned().map(|relay| {
        let http = http.clone();
        let winner = winner.clone();
        let cancel = cancel.clone();
        let block = block.clone();
        let bid = bid.clone();
        async move {
            tokio::select! {
                biased;
                _ = cancel.notified() => {}
                result = request_one_relay_payload(&http, &relay, &block, &bid, max_retries) => {
                    match result {
                        Ok(response) => {
                            let mut winner = winner.lock();
                            if winner.is_none() {
                                *winner = Some(response);
                                drop(winner);
                                cancel.notify_waiters();
                            }
                        }
                        Err(err) => tracing::debug!(relay = %relay, %err, "relay payload request failed or did not match the bid"),
                    }
                }
            }
        }
    });
    join_all(tasks).await;

    let _ = signed_block;
    winner.lock().take().ok_or(RelayError::NoPayloadReceived)
}

async fn request_one_relay_payload(
    http: &reqwest::Client,
    relay: &RelayEntry,
    block: &Value,
    bid: &BidResp,
    max_retries: u32,
) -> Result<Value, RelayError> {
    let url = format!("{}/eth/v1/builder/blinded_blocks", relay_base(relay));
    let response = send_request_with_retries(http, Method::POST, &url, Some(block), max_retries)
        .await
        .map_err(|err| RelayError::PayloadMismatch(err.to_string()))?;
    let envelope: Value = decode(response)
        .await
        .map_err(|err| RelayError::PayloadMismatch(err.to_string()))?
        .ok_or(RelayError::NoPayloadReceived)?;

    let auction_contents: AuctionContents = serde_json::from_value(envelope.get("data").cloned().unwrap_or_else(|| envelope.clone()))
        .map_err(|err| RelayError::PayloadMismatch(err.to_string()))?;
    validate::payload_matches_bid(&auction_contents, &bid.response)?;

    Ok(envelope)
}

#[async_trait]
impl Service for RelayService {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn callbacks(&self) -> CallbackMap {
        let cfg = self.cfg.clone();
        let cache = self.cache.clone();
        let http = self.http.clone();
        let client = self.client.clone();

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
                let cache = cache.clone();
                let http = http.clone();
                move |args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let cache = cache.clone();
                    let http = http.read().clone();
                    async move {
                        let slot = arg_u64(&args, 0)?;
                        let parent_hash = arg_str(&args, 1)?;
                        let proposer_pubkey = arg_str(&args, 2)?;
                        get_header_op(&cfg, &http, &cache, slot, parent_hash, proposer_pubkey).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("getPayload", {
                let cfg = cfg.clone();
                let cache = cache.clone();
                let http = http.clone();
                move |args: Vec<Value>| {
                    let cfg = cfg.clone();
                    let cache = cache.clone();
                    let http = http.read().clone();
                    async move {
                        let block = args.first().cloned().unwrap_or(Value::Null);
                        get_payload_op(&cfg, &http, &cache, block).await.map_err(RpcError::from)
                    }
                }
            }),
        ])
    }

    /// Checks no configured relay shares its URL with the builder-API's own
    /// listen address, then registers with the aggregator as a block source
    /// (grounded on `modules/relay/relay.go::Start`).
    async fn start(&self) -> Result<(), BusError> {
        let client = get_client(&self.client).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;

        if let Ok(listen_address) = client.call::<String>("builderApi_listenAddress", false, vec![], json!([])).await {
            let relays = self.cfg.read().relays.clone();
            for relay in &relays {
                if relay_base(relay) == listen_address.trim_end_matches('/') {
                    let err = RelayError::AddressCollidesWithBuilderApi(relay.to_string(), listen_address);
                    return Err(BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()));
                }
            }
        }

        client
            .call::<Value>("blockAggregator_connectBlockSource", false, vec![], json!([MODULE_NAME]))
            .await?;
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
        let parsed = RelayConfig::from_flags(&flags).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;
        *self.http.write() = build_http_client(parsed.request_timeout_ms);
        *self.cfg.write() = parsed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_base_strips_trailing_slash() {
        let key = format!("0x{}", "ab".repeat(48));
        let raw = format!("https://{key}@relay.example.com/");
        let domain = [0u8; 32];
        let relay = RelayEntry::parse(&raw, domain).unwrap();
        assert!(!relay_base(&relay).ends_with('/'));
    }

    #[test]
    fn min_bid_defaults_to_zero() {
        assert_eq!(RelayConfig::default().min_bid, U256::from(0u64));
    }
}
