//! Builder-API wire types shared across the aggregator, relay, proxy, and
//! HTTP adapter crates: the versioned builder bid, the blinded/execution
//! payload pair, and the validator registration the bus passes around as
//! opaque `serde_json::Value` params once clients decode it (spec §6,
//! grounded on `mev-rs/src/types/{mod,builder_bid,auction_contents}.rs`).

use crate::signing::Domain;
use ethereum_consensus::{
    deneb::{mainnet::MAX_BLOB_COMMITMENTS_PER_BLOCK, polynomial_commitments::KzgCommitment},
    primitives::{BlsPublicKey, BlsSignature, Hash32, U256},
    ssz::prelude::*,
    Error as ConsensusError, Fork,
};

pub use ethereum_consensus::{
    builder::SignedValidatorRegistration,
    types::mainnet::{ExecutionPayload, ExecutionPayloadHeader, SignedBlindedBeaconBlock},
};

pub mod bellatrix {
    use super::ExecutionPayloadHeader;
    use ethereum_consensus::{
        primitives::{BlsPublicKey, U256},
        ssz::prelude::*,
    };

    #[derive(Debug, Clone, SimpleSerialize, serde::Serialize, serde::Deserialize)]
    pub struct BuilderBid {
        pub header: ExecutionPayloadHeader,
        #[serde(with = "ethereum_consensus::serde::as_str")]
        pub value: U256,
        #[serde(rename = "pubkey")]
        pub public_key: BlsPublicKey,
    }
}

pub mod capella {
    pub use super::bellatrix::*;
}

pub mod deneb {
    use super::{KzgCommitment, MAX_BLOB_COMMITMENTS_PER_BLOCK};
    use crate::types::ExecutionPayloadHeader;
    use ethereum_consensus::{
        primitives::{BlsPublicKey, U256},
        ssz::prelude::*,
    };

    #[derive(Debug, Clone, SimpleSerialize, serde::Serialize, serde::Deserialize)]
    pub struct BuilderBid {
        pub header: ExecutionPayloadHeader,
        pub blob_kzg_commitments: List<KzgCommitment, MAX_BLOB_COMMITMENTS_PER_BLOCK>,
        #[serde(with = "ethereum_consensus::serde::as_str")]
        pub value: U256,
        #[serde(rename = "pubkey")]
        pub public_key: BlsPublicKey,
    }
}

/// A builder's signed offer for a slot, fork-tagged the way the upstream
/// relay/proxy endpoints return it (spec §4.1 glossary "Bid").
#[derive(Debug, Clone, SimpleSerialize, serde::Serialize)]
#[serde(untagged)]
#[ssz(transparent)]
pub enum BuilderBid {
    Bellatrix(bellatrix::BuilderBid),
    Capella(capella::BuilderBid),
    Deneb(deneb::BuilderBid),
}

impl<'de> serde::Deserialize<'de> for BuilderBid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
            return Ok(Self::Deneb(inner));
        }
        if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
            return Ok(Self::Capella(inner));
        }
        if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
            return Ok(Self::Bellatrix(inner));
        }
        Err(serde::de::Error::custom("no builder bid variant could be deserialized from input"))
    }
}

impl BuilderBid {
    pub fn version(&self) -> Fork {
        match self {
            Self::Bellatrix(..) => Fork::Bellatrix,
            Self::Capella(..) => Fork::Capella,
            Self::Deneb(..) => Fork::Deneb,
        }
    }

    pub fn header(&self) -> &ExecutionPayloadHeader {
        match self {
            Self::Bellatrix(inner) => &inner.header,
            Self::Capella(inner) => &inner.header,
            Self::Deneb(inner) => &inner.header,
        }
    }

    pub fn blob_kzg_commitments(&self) -> Option<&List<KzgCommitment, MAX_BLOB_COMMITMENTS_PER_BLOCK>> {
        match self {
            Self::Deneb(inner) => Some(&inner.blob_kzg_commitments),
            _ => None,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Self::Bellatrix(inner) => inner.value,
            Self::Capella(inner) => inner.value,
            Self::Deneb(inner) => inner.value,
        }
    }

    pub fn public_key(&self) -> &BlsPublicKey {
        match self {
            Self::Bellatrix(inner) => &inner.public_key,
            Self::Capella(inner) => &inner.public_key,
            Self::Deneb(inner) => &inner.public_key,
        }
    }
}

/// A builder bid plus the BLS signature the relay signed it with (spec's
/// `VersionedSignedBuilderBid`).
#[derive(Debug, Clone, SimpleSerialize, serde::Serialize, serde::Deserialize)]
pub struct SignedBuilderBid {
    pub message: BuilderBid,
    pub signature: BlsSignature,
}

impl SignedBuilderBid {
    pub fn version(&self) -> Fork {
        self.message.version()
    }

    pub fn is_empty(&self) -> bool {
        self.message.header().block_hash() == &Hash32::default()
    }

    /// Verify this bid's signature against `domain` (spec §4.7 "If signature
    /// verification is enabled..."). `domain` is the application-builder
    /// signing domain computed by [`crate::signing::compute_builder_domain`]
    /// for the configured network.
    pub fn verify_signature(&mut self, domain: Domain) -> Result<(), ConsensusError> {
        let object_root = self.message.hash_tree_root()?;
        let signing_root = crate::signing::compute_signing_root(object_root.as_ref(), domain);
        ethereum_consensus::signing::verify_signature(
            self.message.public_key(),
            signing_root.as_ref(),
            &self.signature,
        )
    }
}

impl std::fmt::Display for SignedBuilderBid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block hash {} and value {}", self.message.header().block_hash(), self.message.value())
    }
}

pub mod auction_contents {
    use super::ExecutionPayload;
    use ethereum_consensus::Fork;

    pub mod bellatrix {
        use super::ExecutionPayload;
        pub type AuctionContents = ExecutionPayload;
    }

    pub mod capella {
        pub use super::bellatrix::*;
    }

    pub mod deneb {
        use super::ExecutionPayload;
        use ethereum_consensus::{
            deneb::polynomial_commitments::{KzgCommitment, KzgProof},
            ssz::prelude::*,
        };
        use ethereum_consensus::deneb::mainnet::{Blob, MAX_BLOB_COMMITMENTS_PER_BLOCK};

        /// Post-Deneb data-availability bundle attached to a payload (spec
        /// §GLOSSARY "KZG commitment / proof / blob").
        #[derive(Clone, Debug, Default, Serializable, HashTreeRoot, PartialEq, Eq)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct BlobsBundle {
            pub commitments: List<KzgCommitment, MAX_BLOB_COMMITMENTS_PER_BLOCK>,
            pub proofs: List<KzgProof, MAX_BLOB_COMMITMENTS_PER_BLOCK>,
            pub blobs: List<Blob, MAX_BLOB_COMMITMENTS_PER_BLOCK>,
        }

        #[derive(Debug, Clone)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct AuctionContents {
            pub execution_payload: ExecutionPayload,
            pub blobs_bundle: BlobsBundle,
        }
    }

    /// The fork-tagged execution payload (plus blobs bundle from Deneb on)
    /// returned by `getPayload` (spec's `VersionedExecutionPayload`).
    #[derive(Debug, Clone)]
    #[derive(serde::Serialize)]
    #[serde(untagged)]
    pub enum AuctionContents {
        Bellatrix(bellatrix::AuctionContents),
        Capella(capella::AuctionContents),
        Deneb(deneb::AuctionContents),
    }

    impl<'de> serde::Deserialize<'de> for AuctionContents {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let value = serde_json::Value::deserialize(deserializer)?;
            if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
                return Ok(Self::Deneb(inner));
            }
            if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
                return Ok(Self::Capella(inner));
            }
            if let Ok(inner) = <_ as serde::Deserialize>::deserialize(&value) {
                return Ok(Self::Bellatrix(inner));
            }
            Err(serde::de::Error::custom("no auction contents variant could be deserialized from input"))
        }
    }

    impl AuctionContents {
        pub fn version(&self) -> Fork {
            match self {
                Self::Bellatrix(..) => Fork::Bellatrix,
                Self::Capella(..) => Fork::Capella,
                Self::Deneb(..) => Fork::Deneb,
            }
        }

        pub fn execution_payload(&self) -> &ExecutionPayload {
            match self {
                Self::Bellatrix(inner) => inner,
                Self::Capella(inner) => inner,
                Self::Deneb(inner) => &inner.execution_payload,
            }
        }

        pub fn blobs_bundle(&self) -> Option<&deneb::BlobsBundle> {
            match self {
                Self::Deneb(inner) => Some(&inner.blobs_bundle),
                _ => None,
            }
        }
    }
}
pub use auction_contents::AuctionContents;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signed_builder_bid_has_zero_block_hash() {
        let signed = SignedBuilderBid {
            message: BuilderBid::Bellatrix(bellatrix::BuilderBid {
                header: ExecutionPayloadHeader::Bellatrix(Default::default()),
                value: U256::default(),
                public_key: BlsPublicKey::default(),
            }),
            signature: BlsSignature::default(),
        };
        assert!(signed.is_empty());
    }
}
