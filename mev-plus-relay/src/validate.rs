//! Bid and payload validation shared by the `getHeader`/`getPayload` fan-outs
//! (spec §4.7 "Validation"), grounded on `modules/relay/outgoing_calls.go`'s
//! `requestRelayHeader`/`requestRelayPayload` checks.

use crate::error::RelayError;
use ethereum_consensus::primitives::{BlsPublicKey, Hash32, U256};
use mev_plus_types::{BidInfo, SignedBuilderBid};
use mev_plus_types::types::AuctionContents;

/// Extracts the four fields the aggregator and cache key on, and rejects a
/// relay response outright when they don't look like a real bid (zero block
/// hash, signer mismatch, stale parent, non-positive value) — mirrors
/// `requestRelayHeader`'s inline checks before a bid is allowed to compete.
/// `expected_signer` is the public key configured for the relay entry the bid
/// came from, not the proposer's validator key.
pub fn bid_info(
    signed: &SignedBuilderBid,
    expected_signer: &BlsPublicKey,
    expected_parent_hash: &str,
    min_bid: &U256,
) -> Result<BidInfo, RelayError> {
    let header = signed.message.header();
    let block_hash = header.block_hash().clone();
    if block_hash == Hash32::default() {
        return Err(RelayError::PayloadMismatch("zero block hash in bid".into()));
    }
    let public_key = signed.message.public_key().clone();
    if &public_key != expected_signer {
        return Err(RelayError::PayloadMismatch("bid signer does not match the relay's configured public key".into()));
    }
    let parent_hash = header.parent_hash().clone();
    if parent_hash.to_string() != expected_parent_hash {
        return Err(RelayError::PayloadMismatch("bid parent hash does not match request".into()));
    }
    let value = signed.message.value();
    if value == U256::from(0u64) {
        return Err(RelayError::PayloadMismatch("bid value is zero".into()));
    }
    if value < *min_bid {
        return Err(RelayError::PayloadMismatch("bid value below configured minimum".into()));
    }
    Ok(BidInfo { block_hash, parent_hash, builder_public_key: public_key, value })
}

/// Cross-checks a relay's `getPayload` response against the header it
/// originally committed to in `getHeader`: block hash, transactions root,
/// withdrawals root (Capella+), and blob KZG commitments (Deneb+) must all
/// match what the winning bid promised (spec §4.7, grounded on
/// `requestRelayPayload`'s post-fetch comparison against the blinded block).
pub fn payload_matches_bid(response: &AuctionContents, bid: &SignedBuilderBid) -> Result<(), RelayError> {
    let header = bid.message.header();
    let payload = response.execution_payload();

    if payload.block_hash() != header.block_hash() {
        return Err(RelayError::PayloadMismatch("payload block hash does not match bid header".into()));
    }

    let payload_transactions_root = payload.transactions().hash_tree_root().map_err(|e| RelayError::PayloadMismatch(e.to_string()))?;
    let header_transactions_root = header.transactions_root();
    if payload_transactions_root.as_ref() != header_transactions_root.as_ref() {
        return Err(RelayError::PayloadMismatch("payload transactions root does not match bid header".into()));
    }

    if let Some(withdrawals) = payload.withdrawals() {
        let payload_withdrawals_root = withdrawals.hash_tree_root().map_err(|e| RelayError::PayloadMismatch(e.to_string()))?;
        let header_withdrawals_root = header.withdrawals_root();
        if payload_withdrawals_root.as_ref() != header_withdrawals_root.as_ref() {
            return Err(RelayError::PayloadMismatch("payload withdrawals root does not match bid header".into()));
        }
    }

    if let (Some(bid_commitments), Some(bundle)) = (bid.message.blob_kzg_commitments(), response.blobs_bundle()) {
        let bid_value = serde_json::to_value(bid_commitments).map_err(|e| RelayError::PayloadMismatch(e.to_string()))?;
        let response_value = serde_json::to_value(&bundle.commitments).map_err(|e| RelayError::PayloadMismatch(e.to_string()))?;
        if bid_value != response_value {
            return Err(RelayError::PayloadMismatch("blob KZG commitments do not match bid".into()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_consensus::primitives::{BlsPublicKey, BlsSignature};
    use mev_plus_types::types::{bellatrix, BuilderBid, ExecutionPayloadHeader};

    fn signed_bid(value: u64) -> SignedBuilderBid {
        SignedBuilderBid {
            message: BuilderBid::Bellatrix(bellatrix::BuilderBid {
                header: ExecutionPayloadHeader::Bellatrix(Default::default()),
                value: U256::from(value),
                public_key: BlsPublicKey::default(),
            }),
            signature: BlsSignature::default(),
        }
    }

    #[test]
    fn rejects_zero_value_bid() {
        let signed = signed_bid(0);
        let err = bid_info(&signed, &BlsPublicKey::default(), &Hash32::default().to_string(), &U256::from(0u64)).unwrap_err();
        assert!(matches!(err, RelayError::PayloadMismatch(_)));
    }

    #[test]
    fn rejects_bid_below_min_bid() {
        let signed = signed_bid(5);
        let err = bid_info(&signed, &BlsPublicKey::default(), &Hash32::default().to_string(), &U256::from(10u64)).unwrap_err();
        assert!(matches!(err, RelayError::PayloadMismatch(_)));
    }
}
