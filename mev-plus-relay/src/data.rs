use mev_plus_types::{bid_resp_key, BidResp, BidRespKey};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Slots older than `last_slot - SLOT_EVICTION_HORIZON` are dropped from the
/// bid cache (spec §4.7 "evicting entries with slot < current − 64"), mirroring
/// the aggregator's own eviction horizon.
const SLOT_EVICTION_HORIZON: u64 = 64;

/// Winning bids cached by `(slot, block_hash)`, kept around so a later
/// `getPayload` can recover which relays delivered the bid it's being asked
/// to open (spec §3 `BidResp`, grounded on `modules/relay/relay.go`'s
/// `bids map[bidRespKey]bidResp`).
#[derive(Default)]
pub struct BidCache {
    bids: Mutex<HashMap<BidRespKey, BidResp>>,
}

impl BidCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, slot: u64, bid: BidResp) {
        let key = bid_resp_key(slot, &bid.bid_info.block_hash);
        let mut bids = self.bids.lock();
        bids.insert(key, bid);
        let horizon = slot.saturating_sub(SLOT_EVICTION_HORIZON);
        bids.retain(|(bid_slot, _), _| *bid_slot >= horizon);
    }

    pub fn get(&self, slot: u64, block_hash: &str) -> Option<BidResp> {
        self.bids.lock().get(&(slot, block_hash.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mev_plus_types::{BidInfo, SignedBuilderBid};
    use ethereum_consensus::primitives::{BlsPublicKey, BlsSignature, Hash32, U256};
    use mev_plus_types::types::{bellatrix, BuilderBid, ExecutionPayloadHeader};
    use std::str::FromStr;

    fn bid(byte: u8, slot: u64) -> BidResp {
        let hash = Hash32::from_str(&format!("0x{}", hex::encode([byte; 32]))).unwrap();
        let info = BidInfo { block_hash: hash, parent_hash: Hash32::default(), builder_public_key: BlsPublicKey::default(), value: U256::from(1u64) };
        let response = SignedBuilderBid {
            message: BuilderBid::Bellatrix(bellatrix::BuilderBid {
                header: ExecutionPayloadHeader::Bellatrix(Default::default()),
                value: U256::from(1u64),
                public_key: BlsPublicKey::default(),
            }),
            signature: BlsSignature::default(),
        };
        BidResp::new(response, info, Vec::new())
    }

    #[test]
    fn stores_and_retrieves_by_slot_and_hash() {
        let cache = BidCache::new();
        let entry = bid(7, 100);
        let hash = entry.bid_info.block_hash.to_string();
        cache.insert(100, entry);
        assert!(cache.get(100, &hash).is_some());
    }

    #[test]
    fn evicts_bids_older_than_horizon() {
        let cache = BidCache::new();
        let old = bid(1, 10);
        let old_hash = old.bid_info.block_hash.to_string();
        cache.insert(10, old);
        cache.insert(200, bid(2, 200));
        assert!(cache.get(10, &old_hash).is_none());
    }
}
