use crate::signing::Domain;
use ethereum_consensus::{crypto::Error as CryptoError, primitives::BlsPublicKey};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Mirrors `mev-boost-rs`'s `RelayUrlError` for the same `scheme://<pubkey-hex>@host`
/// convention, extended with a point-at-infinity check (spec §3's "not point-at-infinity"
/// invariant, absent from the teacher since mev-boost trusts pre-validated relay lists).
#[derive(Debug, Error)]
pub enum RelayEntryError {
    #[error("{0}")]
    Bls(#[from] CryptoError),
    #[error("{0}")]
    Hex(#[from] hex::FromHexError),
    #[error("public key {0} missing '0x' hex prefix")]
    Missing0xPrefix(String),
    #[error("URL {0} missing public key username")]
    MissingPublicKey(String),
    #[error("relay public key {0} is the point at infinity")]
    PointAtInfinity(String),
    #[error("relay url {0} could not be parsed: {1}")]
    InvalidUrl(String, url::ParseError),
}

/// One configured relay: its URL, the BLS public key it signs bids with, and
/// the signing domain bids/payloads from it are checked against (spec §3,
/// §4.7). Grounded on `mev-boost-rs/src/relay.rs`'s `RelayEndpoint` parsing.
#[derive(Debug, Clone)]
pub struct RelayEntry {
    raw: String,
    url: Url,
    public_key: BlsPublicKey,
    domain: Domain,
}

impl RelayEntry {
    pub fn parse(raw: &str, domain: Domain) -> Result<Self, RelayEntryError> {
        let url = Url::parse(raw).map_err(|e| RelayEntryError::InvalidUrl(raw.to_string(), e))?;

        let public_key = url.username();
        if public_key.is_empty() {
            return Err(RelayEntryError::MissingPublicKey(raw.to_string()));
        }
        let public_key_hex = public_key
            .strip_prefix("0x")
            .ok_or_else(|| RelayEntryError::Missing0xPrefix(public_key.to_string()))?;
        let public_key_bytes = hex::decode(public_key_hex)?;
        if public_key_bytes.iter().all(|b| *b == 0) {
            return Err(RelayEntryError::PointAtInfinity(public_key.to_string()));
        }
        let public_key = BlsPublicKey::try_from(public_key_bytes.as_slice())?;

        let mut host_only = url.clone();
        let _ = host_only.set_username("");
        let _ = host_only.set_password(None);

        Ok(Self { raw: raw.to_string(), url: host_only, public_key, domain })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }
}

impl fmt::Display for RelayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_pubkey() {
        let err = RelayEntry::parse("https://relay.example.com", [0u8; 32]);
        assert!(matches!(err, Err(RelayEntryError::MissingPublicKey(_))));
    }

    #[test]
    fn rejects_pubkey_without_0x_prefix() {
        let err = RelayEntry::parse("https://abcd@relay.example.com", [0u8; 32]);
        assert!(matches!(err, Err(RelayEntryError::Missing0xPrefix(_))));
    }
}
