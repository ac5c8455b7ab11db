//! Shared wire types for the mev-plus workspace: the builder-API payloads
//! every module crate exchanges over the bus, the relay/network
//! configuration primitives, and the bid caches the aggregator and relay
//! client each keep per slot.

pub mod bid_resp;
pub mod network;
pub mod numeric;
pub mod relay_entry;
pub mod signing;
pub mod slot_header;
pub mod types;

pub use bid_resp::{bid_resp_key, BidInfo, BidResp, BidRespKey};
pub use network::Network;
pub use numeric::parse_u256_decimal;
pub use relay_entry::{RelayEntry, RelayEntryError};
pub use signing::{compute_builder_domain, compute_signing_root, Domain};
pub use slot_header::{rank, SlotHeader};
