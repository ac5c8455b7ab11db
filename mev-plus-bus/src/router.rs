use crate::envelope::{Envelope, RpcError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fans envelopes out between registered modules (spec §4.5, the Go original's
/// `RelayComms`/core dispatch loop). Delivery is targeted: responses go back to
/// the module named in `origin`, calls/notifications go to the module named by
/// the method's namespace. `notify_all` additionally broadcasts an id-cleared
/// copy to every other connected module.
#[derive(Clone, Default)]
pub struct Router {
    senders: Arc<RwLock<HashMap<String, mpsc::Sender<Envelope>>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, sender: mpsc::Sender<Envelope>) {
        self.senders.write().insert(name.into(), sender);
    }

    pub fn deregister(&self, name: &str) {
        self.senders.write().remove(name);
    }

    pub fn connected_modules(&self) -> Vec<String> {
        self.senders.read().keys().cloned().collect()
    }

    /// Spawn the task that drains one module's outgoing queue into this router.
    pub fn spawn_pump(&self, mut outgoing_rx: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                router.route(msg).await;
            }
        })
    }

    async fn deliver(&self, target: &str, msg: Envelope) -> bool {
        let sender = self.senders.read().get(target).cloned();
        match sender {
            Some(tx) => tx.send(msg).await.is_ok(),
            None => false,
        }
    }

    pub async fn route(&self, msg: Envelope) {
        if msg.is_response() {
            let target = msg.origin.clone();
            if !self.deliver(&target, msg).await {
                tracing::debug!(%target, "response for unknown or departed module dropped");
            }
            return;
        }

        let target = msg.namespace().to_string();

        if msg.notify_all {
            self.broadcast_notify_all(&msg, &target);
        }

        if msg.is_call() {
            let origin = msg.origin.clone();
            let id = msg.id.clone();
            let method = msg.method.clone();
            if !self.deliver(&target, msg).await {
                let response = Envelope {
                    version: crate::envelope::VSN.to_string(),
                    id,
                    method: format!("{method}{}", crate::envelope::RESPONSE_METHOD_SUFFIX),
                    params: None,
                    result: None,
                    error: Some(RpcError::method_not_found(&method)),
                    notify_all: false,
                    notify_exclusion: Vec::new(),
                    origin,
                };
                let dest = response.origin.clone();
                self.deliver(&dest, response).await;
            }
        } else if msg.is_notification() {
            // unknown notification targets are dropped silently (spec §4.5).
            let _ = self.deliver(&target, msg).await;
        }
    }

    fn broadcast_notify_all(&self, msg: &Envelope, primary_target: &str) {
        let mut excluded: HashSet<&str> = HashSet::new();
        excluded.insert(msg.origin.as_str());
        excluded.insert(primary_target);
        excluded.extend(msg.notify_exclusion.iter().map(|s| s.as_str()));

        let copy = msg.notify_all_copy();
        let targets: Vec<(String, mpsc::Sender<Envelope>)> = self
            .senders
            .read()
            .iter()
            .filter(|(name, _)| !excluded.contains(name.as_str()))
            .map(|(name, tx)| (name.clone(), tx.clone()))
            .collect();

        for (name, tx) in targets {
            let copy = copy.clone();
            tokio::spawn(async move {
                if tx.send(copy).await.is_err() {
                    tracing::debug!(module = %name, "dropped notify-all copy, module queue closed");
                }
            });
        }
    }
}
