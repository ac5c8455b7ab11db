use ethereum_consensus::primitives::{Hash32, Slot, U256};

/// Top-K-retained bid entry accepted by the aggregator (spec §3 / §4.6.1) —
/// one per `(slot, block_hash)` pair, ranked within the slot's short list.
#[derive(Debug, Clone)]
pub struct SlotHeader {
    pub origin_module: String,
    pub slot: Slot,
    pub block_hash: Hash32,
    pub value: U256,
    pub bid: serde_json::Value,
}

impl SlotHeader {
    pub fn new(origin_module: impl Into<String>, slot: Slot, block_hash: Hash32, value: U256, bid: serde_json::Value) -> Self {
        Self { origin_module: origin_module.into(), slot, block_hash, value, bid }
    }
}

/// Orders by value descending, ties broken by ascending block hash (spec
/// §4.6.1: "smaller hash wins").
pub fn rank(a: &SlotHeader, b: &SlotHeader) -> std::cmp::Ordering {
    b.value.cmp(&a.value).then_with(|| a.block_hash.to_string().cmp(&b.block_hash.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn header(byte: u8, value: u64) -> SlotHeader {
        let hash = format!("0x{}", hex::encode([byte; 32]));
        SlotHeader::new("relay", 100, Hash32::from_str(&hash).unwrap(), U256::from(value), json!({}))
    }

    #[test]
    fn higher_value_wins() {
        let a = header(0xaa, 10);
        let b = header(0xbb, 20);
        assert_eq!(rank(&a, &b), std::cmp::Ordering::Greater);
    }

    #[test]
    fn tie_breaks_on_ascending_block_hash() {
        let a = header(0xaa, 10);
        let b = header(0xbb, 10);
        assert_eq!(rank(&a, &b), std::cmp::Ordering::Less);
    }
}
