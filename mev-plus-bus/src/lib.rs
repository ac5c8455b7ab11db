//! In-process, method-oriented module bus: the envelope format, per-module
//! clients, the fan-out router, and the registration/lifecycle manager modules
//! connect through.

pub mod client;
pub mod envelope;
pub mod error;
pub mod module;
pub mod module_registry;
pub mod registry;
pub mod router;

pub use client::{Client, ModuleChannels};
pub use envelope::{Envelope, ErrorKind, RequestId, RpcError};
pub use error::BusError;
pub use module::{ModuleFlags, Service};
pub use module_registry::ModuleRegistry;
pub use registry::{build_callback_map, CallContext, Callback, CallbackMap};
pub use router::Router;
