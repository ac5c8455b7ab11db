//! The `externalValidatorProxy` module: forwards bids/payloads/registrations
//! through up to two upstream proxy endpoints with no local ranking,
//! excluding itself from aggregator notifications when unconfigured (spec
//! §4.8).

pub mod config;
pub mod error;
pub mod http;
pub mod service;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use service::ProxyService;
