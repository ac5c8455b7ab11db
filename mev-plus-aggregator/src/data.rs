use crate::error::AggregatorError;
use mev_plus_types::{rank, SlotHeader};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Retained bids per slot (spec §3 `SlotHeader` "at most 3 retained per slot").
const RETAINED_HEADERS_PER_SLOT: usize = 3;

/// Slots older than `last_slot - SLOT_EVICTION_HORIZON` are dropped (spec §4.6.1,
/// §9 "the source defines the fixed K=3... and the 64-slot eviction horizon
/// without justification; preserve both as observable contracts").
const SLOT_EVICTION_HORIZON: u64 = 64;

#[derive(Default)]
struct SlotMap {
    last_slot: u64,
    selected: HashMap<u64, Vec<SlotHeader>>,
}

/// Sole-writer state the aggregator owns: the slot-header map, the set of
/// connected block sources, and the set of modules additionally notified on
/// fan-out (spec §3 "Ownership", §4.6 "State"). Grounded on
/// `modules/block-aggregator/data/data.go`'s `AggregatorData`.
pub struct AggregatorData {
    slots: Mutex<SlotMap>,
    connected_block_sources: Mutex<Vec<String>>,
    module_notification_exclusions: Mutex<HashSet<String>>,
}

impl Default for AggregatorData {
    fn default() -> Self {
        Self {
            slots: Mutex::new(SlotMap::default()),
            connected_block_sources: Mutex::new(Vec::new()),
            module_notification_exclusions: Mutex::new(HashSet::new()),
        }
    }
}

impl AggregatorData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bid ingestion (spec §4.6.1): reject stale slots, append, resort
    /// descending by value with ascending-block-hash tiebreak, truncate to the
    /// top 3, then evict anything older than the new horizon.
    pub fn add_slot_header(&self, header: SlotHeader) -> Result<(), AggregatorError> {
        let mut slots = self.slots.lock();
        if header.slot < slots.last_slot {
            return Err(AggregatorError::StaleBid { slot: header.slot, last_slot: slots.last_slot });
        }

        let slot = header.slot;
        let bucket = slots.selected.entry(slot).or_default();
        bucket.push(header);
        bucket.sort_by(rank);
        bucket.truncate(RETAINED_HEADERS_PER_SLOT);

        slots.last_slot = slot;
        let horizon = slots.last_slot.saturating_sub(SLOT_EVICTION_HORIZON);
        slots.selected.retain(|&s, _| s >= horizon);
        Ok(())
    }

    /// The current best bid for `slot`, i.e. the first (highest-ranked) entry.
    pub fn get_selected(&self, slot: u64) -> Option<SlotHeader> {
        self.slots.lock().selected.get(&slot).and_then(|headers| headers.first().cloned())
    }

    /// Find whichever retained `SlotHeader` carries `block_hash`, across all
    /// retained slots (spec §4.6 `getPayload` "looks up the stored SlotHeader
    /// by hash").
    pub fn get_by_hash(&self, block_hash: &str) -> Option<SlotHeader> {
        let slots = self.slots.lock();
        slots
            .selected
            .values()
            .flat_map(|headers| headers.iter())
            .find(|h| h.block_hash.to_string() == block_hash)
            .cloned()
    }

    pub fn is_connected(&self, module: &str) -> bool {
        self.connected_block_sources.lock().iter().any(|m| m == module)
    }

    pub fn connect_block_source(&self, module: String) {
        let mut sources = self.connected_block_sources.lock();
        if !sources.iter().any(|m| m == &module) {
            sources.push(module);
        }
    }

    pub fn connected_block_sources(&self) -> Vec<String> {
        self.connected_block_sources.lock().clone()
    }

    pub fn exclude_from_notifications(&self, module: String) {
        self.module_notification_exclusions.lock().insert(module);
    }

    /// `connected_block_sources ∪ module_notification_exclusions`, the fan-out
    /// target set for `registerValidator`/`getHeader`/`getPayload` broadcasts.
    pub fn notification_targets(&self) -> Vec<String> {
        let mut targets = self.connected_block_sources.lock().clone();
        for module in self.module_notification_exclusions.lock().iter() {
            if !targets.contains(module) {
                targets.push(module.clone());
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_consensus::primitives::{Hash32, U256};
    use serde_json::json;
    use std::str::FromStr;

    fn header(byte: u8, slot: u64, value: u64) -> SlotHeader {
        let hash = format!("0x{}", hex::encode([byte; 32]));
        SlotHeader::new("relay", slot, Hash32::from_str(&hash).unwrap(), U256::from(value), json!({}))
    }

    #[test]
    fn retains_only_top_three_by_value() {
        let data = AggregatorData::new();
        for (byte, value) in [(1, 10), (2, 40), (3, 20), (4, 30)] {
            data.add_slot_header(header(byte, 100, value)).unwrap();
        }
        let best = data.get_selected(100).unwrap();
        assert_eq!(best.value, U256::from(40u64));
    }

    #[test]
    fn rejects_stale_slot() {
        let data = AggregatorData::new();
        data.add_slot_header(header(1, 200, 10)).unwrap();
        let err = data.add_slot_header(header(2, 199, 10)).unwrap_err();
        assert!(matches!(err, AggregatorError::StaleBid { .. }));
    }

    #[test]
    fn evicts_slots_older_than_horizon() {
        let data = AggregatorData::new();
        data.add_slot_header(header(1, 100, 10)).unwrap();
        data.add_slot_header(header(2, 200, 10)).unwrap();
        assert!(data.get_selected(100).is_none());
        assert!(data.get_selected(200).is_some());
    }

    #[test]
    fn notification_targets_union_connected_and_excluded() {
        let data = AggregatorData::new();
        data.connect_block_source("relay".to_string());
        data.exclude_from_notifications("proxy".to_string());
        let mut targets = data.notification_targets();
        targets.sort();
        assert_eq!(targets, vec!["proxy".to_string(), "relay".to_string()]);
    }
}
