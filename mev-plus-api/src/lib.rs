//! The `builderApi` module: an axum HTTP server exposing the builder-API
//! surface to validators and translating each request one-to-one onto a bus
//! call against the aggregator (spec §4.9/§6).

pub mod config;
pub mod error;
pub mod service;

pub use config::ApiConfig;
pub use error::ApiError;
pub use service::ApiService;
