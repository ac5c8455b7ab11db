use crate::config::{AggregatorConfig, MODULE_NAME};
use crate::data::AggregatorData;
use crate::error::AggregatorError;
use async_trait::async_trait;
use ethereum_consensus::primitives::{Hash32, U256};
use futures::future::join_all;
use mev_plus_bus::{build_callback_map, BusError, Callback, CallbackMap, Client, ModuleFlags, RpcError, Service};
use mev_plus_types::{parse_u256_decimal, SlotHeader};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The `blockAggregator` module: the only module that drives auction timing
/// (spec §4.6). Grounded on `modules/block-aggregator/{service,backend,bidHandling}.go`.
pub struct AggregatorService {
    data: Arc<AggregatorData>,
    cfg: Arc<RwLock<AggregatorConfig>>,
    client: Arc<RwLock<Option<Client>>>,
}

impl AggregatorService {
    pub fn new() -> Self {
        Self {
            data: Arc::new(AggregatorData::new()),
            cfg: Arc::new(RwLock::new(AggregatorConfig::default())),
            client: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for AggregatorService {
    fn default() -> Self {
        Self::new()
    }
}

fn get_client(client: &RwLock<Option<Client>>) -> Result<Client, AggregatorError> {
    client.read().clone().ok_or(AggregatorError::NotConnected)
}

/// Parse a hex string argument out of a positional params array.
fn arg_str(args: &[Value], index: usize) -> Result<String, RpcError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RpcError::invalid_params(format!("missing or non-string argument {index}")))
}

fn arg_u64(args: &[Value], index: usize) -> Result<u64, RpcError> {
    args.get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params(format!("missing or non-integer argument {index}")))
}

/// Bids and payloads cross the bus as opaque JSON: each block-source module
/// (relay, proxy) is the one place that actually needs the typed
/// `ethereum_consensus` builder-API structures, so the aggregator only reaches
/// into the known `message.header.block_hash` / `message.value` / top-level
/// `block_hash` paths it needs for ranking and lookup (spec §4.6.1, grounded
/// on `modules/block-aggregator/bidHandling.go`'s narrow use of
/// `bid.Value()`/`bid.BlockHash()` off an otherwise-opaque bid object).
fn bid_payload(bid: &Value) -> &Value {
    bid.get("data").unwrap_or(bid)
}

fn bid_block_hash(bid: &Value) -> Option<Hash32> {
    bid_payload(bid).pointer("/message/header/block_hash").and_then(Value::as_str).and_then(|s| Hash32::from_str(s).ok())
}

fn bid_value(bid: &Value) -> Option<U256> {
    bid_payload(bid).pointer("/message/value").and_then(Value::as_str).and_then(parse_u256_decimal)
}

fn bid_is_empty(bid: &Value) -> bool {
    bid_block_hash(bid).map(|hash| hash == Hash32::default()).unwrap_or(true)
}

fn payload_block_hash(payload: &Value) -> Option<String> {
    bid_payload(payload).pointer("/block_hash").and_then(Value::as_str).map(str::to_string)
}

fn blinded_block_hash(block: &Value) -> Result<String, AggregatorError> {
    bid_payload(block)
        .pointer("/message/body/execution_payload_header/block_hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AggregatorError::InvalidHeaderRequest)
}

fn ingest_bid(data: &AggregatorData, module: &str, slot: u64, bid: &Value) -> Result<(), AggregatorError> {
    let block_hash = bid_block_hash(bid).ok_or(AggregatorError::InvalidHeaderRequest)?;
    let value = bid_value(bid).ok_or(AggregatorError::InvalidHeaderRequest)?;
    let header = SlotHeader::new(module.to_string(), slot, block_hash, value, bid.clone());
    data.add_slot_header(header)
}

/// `status` (spec §4.6): pings every connected source in parallel; success if
/// at least one is up or none are configured.
async fn status_op(data: &AggregatorData, client: &Client) -> Result<Value, AggregatorError> {
    let sources = data.connected_block_sources();
    if sources.is_empty() {
        return Ok(Value::Null);
    }

    let checks = sources.iter().cloned().map(|module| {
        let client = client.clone();
        async move {
            let method = format!("{module}_status");
            let up = client.call::<Value>(&method, false, vec![], json!([])).await.is_ok();
            (module, up)
        }
    });
    let results = join_all(checks).await;
    let down: Vec<String> = results.iter().filter(|(_, up)| !up).map(|(m, _)| m.clone()).collect();
    if down.len() == results.len() {
        Err(AggregatorError::NoBlockSourcesUp(down))
    } else {
        Ok(Value::Null)
    }
}

/// `registerValidator` (spec §4.6): notify every connected source plus
/// exclusion once, then call `registerValidator` on every connected source in
/// parallel; succeeds if at least one call succeeds.
async fn register_validator_op(data: &AggregatorData, client: &Client, payload: Value) -> Result<Value, AggregatorError> {
    for module in data.notification_targets() {
        let method = format!("{module}_registerValidator");
        if let Err(err) = client.notify(&method, false, vec![], payload.clone()).await {
            tracing::debug!(%module, %err, "failed to notify block source of validator registrations");
        }
    }

    let sources = data.connected_block_sources();
    let calls = sources.iter().cloned().map(|module| {
        let client = client.clone();
        let payload = payload.clone();
        async move {
            let method = format!("{module}_registerValidator");
            let result = client.call::<Value>(&method, false, vec![], payload).await;
            (module, result)
        }
    });
    let results = join_all(calls).await;

    let mut failures = Vec::new();
    let mut any_success = false;
    for (module, result) in results {
        match result {
            Ok(_) => {
                any_success = true;
                tracing::info!(%module, "registered validator with connected block source");
            }
            Err(err) => failures.push(format!("{module}: {err}")),
        }
    }

    if any_success {
        Ok(Value::Null)
    } else {
        Err(AggregatorError::RegistrationsFailed(failures))
    }
}

fn unix_now() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Sleeps until `deadline` (a Unix timestamp in seconds) has passed, or
/// returns immediately if it's already behind us (spec §4.6 `getHeader`,
/// testable property 5).
async fn sleep_until_deadline(deadline: u64) {
    let now = unix_now().as_secs();
    if deadline > now {
        tokio::time::sleep(Duration::from_secs(deadline - now)).await;
    }
}

/// `getHeader` (spec §4.6/§4.6.1): validate shapes, sleep until the auction
/// deadline, fan bids in from every connected source, ingest each, and return
/// the winning bid.
async fn get_header_op(
    data: &AggregatorData,
    client: &Client,
    cfg: &RwLock<AggregatorConfig>,
    slot: u64,
    parent_hash: String,
    proposer_pubkey: String,
) -> Result<Value, AggregatorError> {
    if proposer_pubkey.len() != 98 || parent_hash.len() != 66 {
        return Err(AggregatorError::InvalidHeaderRequest);
    }

    let deadline = cfg.read().auction_deadline(slot);
    sleep_until_deadline(deadline).await;

    let sources = data.connected_block_sources();
    let params = json!([slot, parent_hash, proposer_pubkey]);
    let calls = sources.iter().cloned().map(|module| {
        let client = client.clone();
        let params = params.clone();
        async move {
            let method = format!("{module}_getHeader");
            let result = client.call::<Vec<Value>>(&method, false, vec![], params).await;
            (module, result)
        }
    });
    let results = join_all(calls).await;

    for (module, result) in results {
        match result {
            Ok(bids) => {
                for bid in bids.iter().filter(|bid| !bid_is_empty(bid)) {
                    if let Err(err) = ingest_bid(data, &module, slot, bid) {
                        tracing::warn!(%module, %err, "rejected bid");
                    }
                }
            }
            Err(err) => tracing::warn!(%module, %err, "block source returned no header"),
        }
    }

    let header = data.get_selected(slot).ok_or(AggregatorError::SlotNotFound(slot))?;

    for module in data.notification_targets() {
        let method = format!("{module}_receivedHeader");
        let _ = client.notify(&method, false, vec![], header.bid.clone()).await;
    }

    Ok(header.bid)
}

/// `getPayload` (spec §4.6): look the winning bid up by block hash, route a
/// single targeted call to the module that delivered it, then tell every
/// other source to discard its internal state for the slot.
async fn get_payload_op(data: &AggregatorData, client: &Client, block: Value) -> Result<Value, AggregatorError> {
    let block_hash = blinded_block_hash(&block)?;
    let header = data.get_by_hash(&block_hash).ok_or_else(|| AggregatorError::SlotHeaderNotFound(block_hash.clone()))?;
    if bid_is_empty(&header.bid) {
        return Err(AggregatorError::EmptyBid);
    }

    let method = format!("{}_getPayload", header.origin_module);
    let result: Value = client.call(&method, false, vec![], json!([block])).await?;

    if !result.is_null() {
        for module in data.notification_targets().into_iter().filter(|m| m != &header.origin_module) {
            let notify_method = format!("{module}_receivedPayload");
            let _ = client.notify(&notify_method, false, vec![], result.clone()).await;
        }
    }

    tracing::info!(
        from_module = %header.origin_module,
        block_hash_from_proposer = %block_hash,
        block_hash_from_module = payload_block_hash(&result).unwrap_or_default(),
        "block aggregator retrieved payload"
    );

    Ok(result)
}

#[async_trait]
impl Service for AggregatorService {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn callbacks(&self) -> CallbackMap {
        let data = self.data.clone();
        let cfg = self.cfg.clone();
        let client = self.client.clone();

        build_callback_map(vec![
            Callback::new("status", {
                let data = data.clone();
                let client = client.clone();
                move |_args: Vec<Value>| {
                    let data = data.clone();
                    let client = client.clone();
                    async move {
                        let client = get_client(&client)?;
                        status_op(&data, &client).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("registerValidator", {
                let data = data.clone();
                let client = client.clone();
                move |args: Vec<Value>| {
                    let data = data.clone();
                    let client = client.clone();
                    async move {
                        let payload = args.first().cloned().unwrap_or(Value::Array(vec![]));
                        let client = get_client(&client)?;
                        register_validator_op(&data, &client, payload).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("getHeader", {
                let data = data.clone();
                let cfg = cfg.clone();
                let client = client.clone();
                move |args: Vec<Value>| {
                    let data = data.clone();
                    let cfg = cfg.clone();
                    let client = client.clone();
                    async move {
                        let slot = arg_u64(&args, 0)?;
                        let parent_hash = arg_str(&args, 1)?;
                        let proposer_pubkey = arg_str(&args, 2)?;
                        let client = get_client(&client)?;
                        get_header_op(&data, &client, &cfg, slot, parent_hash, proposer_pubkey).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("getPayload", {
                let data = data.clone();
                let client = client.clone();
                move |args: Vec<Value>| {
                    let data = data.clone();
                    let client = client.clone();
                    async move {
                        let block = args.first().cloned().unwrap_or(Value::Null);
                        let client = get_client(&client)?;
                        get_payload_op(&data, &client, block).await.map_err(RpcError::from)
                    }
                }
            }),
            Callback::new("connectBlockSource", {
                let data = data.clone();
                let client = client.clone();
                move |args: Vec<Value>| {
                    let data = data.clone();
                    let client = client.clone();
                    async move {
                        let module = arg_str(&args, 0)?;
                        if module.is_empty() {
                            return Err(RpcError::from(AggregatorError::InvalidModuleName));
                        }
                        if data.is_connected(&module) {
                            return Ok(Value::Null);
                        }
                        let client = get_client(&client)?;
                        let method = format!("{module}_name");
                        let name: String = client
                            .call(&method, false, vec![], json!([]))
                            .await
                            .map_err(|err| RpcError::from(AggregatorError::Bus(err)))?;
                        if name != module {
                            return Err(RpcError::from(AggregatorError::ModuleIdentityMismatch(module)));
                        }
                        data.connect_block_source(module);
                        Ok(Value::Null)
                    }
                }
            }),
            Callback::new("excludeFromNotifications", {
                let data = data.clone();
                move |args: Vec<Value>| {
                    let data = data.clone();
                    async move {
                        let module = arg_str(&args, 0)?;
                        data.exclude_from_notifications(module);
                        Ok(Value::Null)
                    }
                }
            }),
        ])
    }

    async fn start(&self) -> Result<(), BusError> {
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
        let parsed = AggregatorConfig::from_flags(&flags).map_err(|err| BusError::ConnectFailed(MODULE_NAME.to_string(), err.to_string()))?;
        *self.cfg.write() = parsed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_is_empty_when_block_hash_missing() {
        assert!(bid_is_empty(&json!({})));
    }

    #[test]
    fn bid_is_empty_when_block_hash_is_zero() {
        let zero = format!("0x{}", "00".repeat(32));
        let bid = json!({"message": {"header": {"block_hash": zero}, "value": "1"}});
        assert!(bid_is_empty(&bid));
    }

    #[test]
    fn bid_is_not_empty_with_a_real_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        let bid = json!({"message": {"header": {"block_hash": hash}, "value": "100"}});
        assert!(!bid_is_empty(&bid));
    }
}
