use crate::client::Client;
use crate::error::BusError;
use crate::registry::CallbackMap;
use async_trait::async_trait;
use std::collections::HashMap;

/// Flags configured for a single module, keyed by the flag's bare name (the part
/// after `<module>.`), matching the Go `common.ModuleFlags` shape (spec §6).
pub type ModuleFlags = HashMap<String, String>;

/// The capability every module implements, mirroring the Go `Service` interface
/// (spec §3/§4.4). `name` must be stable and is used both as the bus namespace
/// and as the registry key.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// The callback table this module exposes on the bus, built once at
    /// registration. Static and explicit in place of the Go original's
    /// reflection-based discovery (spec §9).
    fn callbacks(&self) -> CallbackMap;

    async fn start(&self) -> Result<(), BusError>;
    async fn stop(&self) -> Result<(), BusError>;

    /// Called once during `Configure`, before `start`, handing the module its
    /// bus client and a ping token it must echo back (spec §4.4).
    async fn connect_core(&self, client: Client, ping_token: String) -> Result<(), BusError>;

    /// Called once during `Configure`, before `connect_core`, with this module's
    /// flags (spec §4.4 step 1).
    async fn configure(&self, flags: ModuleFlags) -> Result<(), BusError>;
}
