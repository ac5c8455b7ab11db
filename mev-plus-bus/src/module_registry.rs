use crate::client::Client;
use crate::error::BusError;
use crate::module::{ModuleFlags, Service};
use crate::router::Router;
use rand::RngCore;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Hard ceiling on a single module's `start` (spec §4.4): a module that blocks
/// past this is treated as failed and the registry rolls back whatever already
/// started.
const START_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `Configure` waits for a freshly connected module to echo its ping
/// token back before giving up on it.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every registered module and drives it through register → configure →
/// start → stop (spec §4.4, grounded on the Go original's `core.go` `Configure`/
/// `StartModuleServices`/`StopModuleServices`).
pub struct ModuleRegistry {
    router: Router,
    modules: Vec<(String, Arc<dyn Service>)>,
    configured: HashSet<String>,
    started: Vec<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { router: Router::new(), modules: Vec::new(), configured: HashSet::new(), started: Vec::new() }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Add a module to the registry in the order it should be started (and the
    /// reverse order it will be stopped). Rejects duplicate names and modules
    /// that expose no callbacks at all.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<(), BusError> {
        let name = service.name().to_string();
        if self.modules.iter().any(|(n, _)| n == &name) {
            return Err(BusError::ModuleAlreadyRegistered(name));
        }
        if service.callbacks().is_empty() {
            return Err(BusError::NoSuitableCallbacks(name));
        }
        self.modules.push((name, service));
        Ok(())
    }

    /// Compile the global set of known methods (`<module>_<operation>` for every
    /// registered callback, plus `core_ping`), then configure + connect every
    /// module in registration order (spec §4.4 steps 1-3).
    pub async fn configure(&mut self, flags: &HashMap<String, ModuleFlags>) -> Result<(), BusError> {
        let mut known_callbacks: HashSet<String> = HashSet::new();
        known_callbacks.insert("core_ping".to_string());
        for (name, service) in &self.modules {
            for operation in service.callbacks().keys() {
                known_callbacks.insert(format!("{name}_{operation}"));
            }
        }
        let known_callbacks = Arc::new(known_callbacks);

        for (name, service) in &self.modules {
            let module_flags = flags.get(name).cloned().unwrap_or_default();
            service.configure(module_flags).await.map_err(|e| BusError::ConnectFailed(name.clone(), e.to_string()))?;

            let (client, mut channels) = Client::new(name.clone(), service.callbacks(), known_callbacks.clone());
            let ping_token = random_token();

            service
                .connect_core(client, ping_token.clone())
                .await
                .map_err(|e| BusError::ConnectFailed(name.clone(), e.to_string()))?;

            let ping = tokio::time::timeout(PING_TIMEOUT, channels.outgoing_rx.recv())
                .await
                .map_err(|_| BusError::PingMismatch(name.clone()))?
                .ok_or_else(|| BusError::PingMismatch(name.clone()))?;

            if ping.method != "core_ping" || ping.params.as_ref() != Some(&Value::Array(vec![Value::String(ping_token)])) {
                return Err(BusError::PingMismatch(name.clone()));
            }

            self.router.register(name.clone(), channels.incoming_tx);
            self.router.spawn_pump(channels.outgoing_rx);
            self.configured.insert(name.clone());
        }

        Ok(())
    }

    /// Start every configured module in registration order, each bounded by
    /// [`START_TIMEOUT`]. On failure, best-effort stops whatever already
    /// started before returning the failure (spec §4.4 step 4).
    pub async fn start_all(&mut self) -> Result<(), BusError> {
        for (name, service) in &self.modules {
            if !self.configured.contains(name) {
                continue;
            }
            let result = tokio::time::timeout(START_TIMEOUT, service.start()).await;
            match result {
                Ok(Ok(())) => self.started.push(name.clone()),
                Ok(Err(err)) => {
                    self.rollback_started().await;
                    return Err(BusError::StartFailed(name.clone(), err.to_string()));
                }
                Err(_) => {
                    self.rollback_started().await;
                    return Err(BusError::StartTimedOut(name.clone()));
                }
            }
        }
        Ok(())
    }

    async fn rollback_started(&mut self) {
        for name in self.started.drain(..).rev() {
            if let Some((_, service)) = self.modules.iter().find(|(n, _)| n == &name) {
                let _ = service.stop().await;
            }
        }
    }

    /// Stop every started module in reverse start order, collecting (not
    /// short-circuiting on) individual failures (spec §4.4 step 5).
    pub async fn stop_all(&mut self) -> Result<(), BusError> {
        let mut failures = Vec::new();
        for name in self.started.drain(..).rev() {
            if let Some((_, service)) = self.modules.iter().find(|(n, _)| n == &name) {
                if let Err(err) = service.stop().await {
                    failures.push((name, err.to_string()));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BusError::StopFailed(failures))
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{build_callback_map, Callback};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex as AsyncMutex;

    struct EchoModule {
        name: &'static str,
        client: AsyncMutex<Option<Client>>,
    }

    impl EchoModule {
        fn new(name: &'static str) -> Self {
            Self { name, client: AsyncMutex::new(None) }
        }
    }

    #[async_trait]
    impl Service for EchoModule {
        fn name(&self) -> &str {
            self.name
        }

        fn callbacks(&self) -> crate::registry::CallbackMap {
            build_callback_map(vec![Callback::new("ping", |_| async { Ok(json!("pong")) })])
        }

        async fn start(&self) -> Result<(), BusError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), BusError> {
            Ok(())
        }

        async fn connect_core(&self, client: Client, ping_token: String) -> Result<(), BusError> {
            client.ping(ping_token).await.map_err(|_| BusError::ClientClosed)?;
            *self.client.lock().await = Some(client);
            Ok(())
        }

        async fn configure(&self, _flags: ModuleFlags) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn configure_and_start_a_simple_module() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(EchoModule::new("probe"))).unwrap();
        registry.configure(&HashMap::new()).await.unwrap();
        registry.start_all().await.unwrap();
        assert_eq!(registry.router().connected_modules(), vec!["probe".to_string()]);
        registry.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(EchoModule::new("probe"))).unwrap();
        let err = registry.register(Arc::new(EchoModule::new("probe"))).unwrap_err();
        assert!(matches!(err, BusError::ModuleAlreadyRegistered(_)));
    }
}
