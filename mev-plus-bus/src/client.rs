use crate::envelope::{Envelope, RequestId, RpcError};
use crate::error::BusError;
use crate::registry::{CallContext, CallbackMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::time::Instant as TokioInstant;

/// Default bound on each module's incoming/outgoing queues (spec §4.3).
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;

/// Default per-call timeout applied by the handler's per-message timer (spec §4.3).
/// Sized generously past a typical slot duration so the aggregator's own
/// auction-deadline sleep (spec §4.6 `getHeader`) fits inside a single call
/// without a dedicated per-module override.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// The half of a module's communication channels owned by the router/core: the
/// sending end used to deliver messages into the module, and the receiving end
/// used to drain whatever the module sends out (spec §4.3/§4.5).
pub struct ModuleChannels {
    pub incoming_tx: mpsc::Sender<Envelope>,
    pub outgoing_rx: mpsc::Receiver<Envelope>,
}

type Outstanding = Arc<parking_lot::Mutex<HashMap<String, oneshot::Sender<Envelope>>>>;

fn id_key(id: &RequestId) -> String {
    id.to_string()
}

/// Per-module endpoint handed to a module at `ConnectCore` (spec §2/§4.3). Provides
/// `call`, `notify`, and `ping`; internally runs the dispatch loop that matches
/// responses to outstanding calls and invokes this module's own callbacks for
/// incoming calls/notifications.
#[derive(Clone)]
pub struct Client {
    service_name: String,
    id_counter: Arc<AtomicU64>,
    known_callbacks: Arc<HashSet<String>>,
    outstanding: Outstanding,
    outgoing_tx: mpsc::Sender<Envelope>,
    send_lock: Arc<AsyncMutex<()>>,
    call_timeout: Duration,
}

impl Client {
    /// Create a client for `service_name`, wire its dispatch loop to `own_callbacks`
    /// (the module's own operation table), and return it alongside the channel
    /// half the router keeps. `known_callbacks` is the global set of
    /// `<module>_<operation>` strings (plus `core_ping`) compiled during
    /// `Configure` (spec §4.4 step 2).
    pub fn new(
        service_name: impl Into<String>,
        own_callbacks: CallbackMap,
        known_callbacks: Arc<HashSet<String>>,
    ) -> (Self, ModuleChannels) {
        Self::with_timeout(service_name, own_callbacks, known_callbacks, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(
        service_name: impl Into<String>,
        own_callbacks: CallbackMap,
        known_callbacks: Arc<HashSet<String>>,
        call_timeout: Duration,
    ) -> (Self, ModuleChannels) {
        let service_name = service_name.into();
        let (incoming_tx, incoming_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);

        let outstanding: Outstanding = Arc::new(parking_lot::Mutex::new(HashMap::new()));

        let client = Self {
            service_name: service_name.clone(),
            id_counter: Arc::new(AtomicU64::new(0)),
            known_callbacks,
            outstanding: outstanding.clone(),
            outgoing_tx: outgoing_tx.clone(),
            send_lock: Arc::new(AsyncMutex::new(())),
            call_timeout,
        };

        let dispatch = DispatchLoop {
            service_name,
            callbacks: Arc::new(own_callbacks),
            outstanding,
            outgoing_tx,
            call_timeout,
        };
        tokio::spawn(dispatch.run(incoming_rx));

        (client, ModuleChannels { incoming_tx, outgoing_rx })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn next_id(&self) -> RequestId {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        Value::from(id)
    }

    /// Perform a call and decode its result as `T`. `notify_all`/`notify_exclusion`
    /// follow the router's notify-all semantics (spec §4.5) once this message
    /// reaches it.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        notify_all: bool,
        notify_exclusion: Vec<String>,
        params: Value,
    ) -> Result<T, BusError> {
        if !self.known_callbacks.contains(method) {
            return Err(BusError::UnknownMethod(method.to_string()));
        }

        let id = self.next_id();
        let mut envelope = Envelope::call(id.clone(), method, params);
        envelope.notify_all = notify_all;
        envelope.notify_exclusion = notify_exclusion;
        envelope.origin = self.service_name.clone();

        let (tx, rx) = oneshot::channel();
        {
            let _send_guard = self.send_lock.lock().await;
            self.outstanding.lock().insert(id_key(&id), tx);
            if self.outgoing_tx.send(envelope).await.is_err() {
                self.outstanding.lock().remove(&id_key(&id));
                return Err(BusError::ClientClosed);
            }
        }

        let sleep = tokio::time::sleep_until(TokioInstant::now() + self.call_timeout);
        tokio::pin!(sleep);
        tokio::select! {
            resp = rx => {
                let resp = resp.map_err(|_| BusError::ClientClosed)?;
                decode_response(resp)
            }
            _ = &mut sleep => {
                self.outstanding.lock().remove(&id_key(&id));
                Err(BusError::Timeout(method.to_string()))
            }
        }
    }

    /// Send a notification: identical to `call` except no id is assigned and no
    /// response is ever awaited (spec §4.3).
    pub async fn notify(
        &self,
        method: &str,
        notify_all: bool,
        notify_exclusion: Vec<String>,
        params: Value,
    ) -> Result<(), BusError> {
        if !self.known_callbacks.contains(method) {
            return Err(BusError::UnknownMethod(method.to_string()));
        }
        let mut envelope = Envelope::notification(method, params);
        envelope.notify_all = notify_all;
        envelope.notify_exclusion = notify_exclusion;
        envelope.origin = self.service_name.clone();

        let _send_guard = self.send_lock.lock().await;
        self.outgoing_tx.send(envelope).await.map_err(|_| BusError::ClientClosed)
    }

    /// Echo `token` back to core as a `core_ping` notification (spec §4.3).
    pub async fn ping(&self, token: impl Into<String>) -> Result<(), BusError> {
        self.notify("core_ping", false, Vec::new(), Value::from(vec![token.into()])).await
    }
}

fn decode_response<T: DeserializeOwned>(resp: Envelope) -> Result<T, BusError> {
    if let Some(err) = resp.error {
        return Err(BusError::Remote(err));
    }
    match resp.result {
        None => Err(BusError::NoResult),
        Some(value) => serde_json::from_value(value).map_err(|_| BusError::BadResult),
    }
}

/// Runs for the lifetime of a client: reads its incoming queue, matches
/// responses to outstanding calls, and dispatches calls/notifications to the
/// module's own callback table (spec §4.3's "dispatch loop").
struct DispatchLoop {
    service_name: String,
    callbacks: Arc<CallbackMap>,
    outstanding: Outstanding,
    outgoing_tx: mpsc::Sender<Envelope>,
    call_timeout: Duration,
}

impl DispatchLoop {
    async fn run(self, mut incoming_rx: mpsc::Receiver<Envelope>) {
        let shared = Arc::new(self);
        while let Some(msg) = incoming_rx.recv().await {
            if msg.is_response() {
                shared.handle_response(msg);
            } else {
                let shared = shared.clone();
                tokio::spawn(async move { shared.handle_call_message(msg).await });
            }
        }
    }

    fn handle_response(&self, msg: Envelope) {
        let key = msg.id.as_ref().map(id_key).unwrap_or_default();
        let waiter = self.outstanding.lock().remove(&key);
        match waiter {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => {
                tracing::debug!(method = %msg.method, "unsolicited response on {} client", self.service_name);
            }
        }
    }

    async fn handle_call_message(&self, msg: Envelope) {
        if msg.is_notification() {
            let _ = self.run_callback(&msg).await;
            return;
        }

        if !msg.is_call() {
            if msg.has_valid_id() {
                let resp = msg.error_response(RpcError::new(
                    crate::envelope::ErrorKind::InvalidRequest,
                    "invalid request",
                ));
                let _ = self.outgoing_tx.send(resp).await;
            }
            return;
        }

        let deadline = TokioInstant::now() + self.call_timeout;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        tokio::select! {
            result = self.run_callback(&msg) => {
                let answer = match result {
                    Ok(value) => msg.respond(value),
                    Err(err) => msg.error_response(err),
                };
                let _ = self.outgoing_tx.send(answer).await;
            }
            _ = &mut sleep => {
                let answer = msg.error_response(RpcError::timeout());
                let _ = self.outgoing_tx.send(answer).await;
            }
        }
    }

    async fn run_callback(&self, msg: &Envelope) -> Result<Value, RpcError> {
        let operation = msg.operation();
        let callback = match self.callbacks.get(operation) {
            Some(cb) => cb,
            None => return Err(RpcError::method_not_found(&msg.method)),
        };

        let args = match &msg.params {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(RpcError::invalid_params("params must be a positional array")),
        };

        let ctx = CallContext::new(Some(std::time::Instant::now() + self.call_timeout));
        callback.call(ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{build_callback_map, Callback};
    use serde_json::json;

    fn known(methods: &[&str]) -> Arc<HashSet<String>> {
        Arc::new(methods.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn call_routes_to_own_callback_and_decodes_result() {
        let callbacks = build_callback_map(vec![Callback::new("echo", |args| async move {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        })]);
        let (client, mut channels) = Client::new("relay", callbacks, known(&["relay_echo"]));

        // simulate a router that loops every outgoing envelope straight back to
        // this module (self-addressed call, then its own response).
        tokio::spawn(async move {
            while let Some(msg) = channels.outgoing_rx.recv().await {
                if channels.incoming_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let result: String = client
            .call("relay_echo", false, vec![], json!(["hello"]))
            .await
            .unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn call_to_unknown_method_is_rejected_locally() {
        let (client, _channels) = Client::new("relay", build_callback_map(vec![]), known(&[]));
        let err = client.call::<Value>("relay_missing", false, vec![], json!([])).await;
        assert!(matches!(err, Err(BusError::UnknownMethod(_))));
    }

    #[tokio::test]
    async fn unknown_operation_yields_method_not_found() {
        let (client, mut channels) = Client::new("relay", build_callback_map(vec![]), known(&["relay_missing"]));
        tokio::spawn(async move {
            while let Some(msg) = channels.outgoing_rx.recv().await {
                if channels.incoming_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        let err = client.call::<Value>("relay_missing", false, vec![], json!([])).await.unwrap_err();
        match err {
            BusError::Remote(rpc) => assert_eq!(rpc.code, crate::envelope::ErrorKind::MethodNotFound.code()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_never_produces_a_response_even_on_panic() {
        let callbacks = build_callback_map(vec![Callback::new("boom", |_| async {
            panic!("should be recovered, and still produce no response");
            #[allow(unreachable_code)]
            Ok(Value::Null)
        })]);
        let (client, mut channels) = Client::new("relay", callbacks, known(&["relay_boom"]));
        client.notify("relay_boom", false, vec![], json!([])).await.unwrap();

        let forwarded = channels.outgoing_rx.recv().await.unwrap();
        channels.incoming_tx.send(forwarded).await.unwrap();

        let nothing = tokio::time::timeout(Duration::from_millis(200), channels.outgoing_rx.recv()).await;
        assert!(nothing.is_err(), "a notification must never produce a response");
    }
}
