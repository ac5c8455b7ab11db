use crate::relay_entry::RelayEntry;
use crate::types::SignedBuilderBid;
use ethereum_consensus::primitives::{BlsPublicKey, Hash32, U256};
use std::time::Instant;

/// Parsed, cross-check-ready summary of a bid, pulled out of the nested
/// `SignedBuilderBid` once so the relay client doesn't need to re-match on
/// the fork variant for every comparison (spec §4.7 "Parse bid-info").
#[derive(Debug, Clone)]
pub struct BidInfo {
    pub block_hash: Hash32,
    pub parent_hash: Hash32,
    pub builder_public_key: BlsPublicKey,
    pub value: U256,
}

/// A cached winning bid for a `(slot, block_hash)` pair (spec §3 `BidResp`),
/// keyed and evicted the same way the aggregator's `SlotHeader`s are (spec
/// §4.7, grounded on `modules/relay/utils.go`'s `bidResp`/`bidRespKey`).
#[derive(Debug, Clone)]
pub struct BidResp {
    pub received_at: Instant,
    pub response: SignedBuilderBid,
    pub bid_info: BidInfo,
    pub relays: Vec<RelayEntry>,
}

impl BidResp {
    pub fn new(response: SignedBuilderBid, bid_info: BidInfo, relays: Vec<RelayEntry>) -> Self {
        Self { received_at: Instant::now(), response, bid_info, relays }
    }
}

/// Key for the bid cache: `(slot, block_hash)` (spec §3).
pub type BidRespKey = (u64, String);

pub fn bid_resp_key(slot: u64, block_hash: &Hash32) -> BidRespKey {
    (slot, block_hash.to_string())
}
