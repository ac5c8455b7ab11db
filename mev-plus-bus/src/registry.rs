use crate::envelope::RpcError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Names the Go original reserves for lifecycle plumbing; never exposed as bus
/// callbacks even if a module's builder accidentally includes them (spec §3).
pub const RESERVED_CALLBACK_NAMES: &[&str] =
    &["start", "stop", "connectCore", "configure", "cliCommand"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_CALLBACK_NAMES.contains(&name)
}

/// Per-call cancellation context, passed as the first parameter to a callback
/// that declares it accepts one (spec §4.2/§9). Carries the deadline the
/// handler derived for this call; the callback observes `is_expired` rather
/// than polling a channel, since in Rust cancellation is driven by dropping
/// the call's future, not by an ambient signal.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self { deadline }
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, RpcError>> + Send>>;

/// A callback registered under an operation name. Unlike the Go original, which
/// discovers callbacks via reflection over a service's exported methods, callbacks
/// here are built explicitly by the module as a static descriptor table (spec §9,
/// "runtime-reflected callbacks" redesign note) — each entry is just a boxed async
/// closure the module supplies, so there is nothing to introspect at registration
/// time.
#[derive(Clone)]
pub struct Callback {
    name: String,
    accepts_context: bool,
    handler: Arc<dyn Fn(CallContext, Vec<serde_json::Value>) -> HandlerFuture + Send + Sync>,
}

impl Callback {
    /// Build a callback whose handler does not want the cancellation context.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, RpcError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            accepts_context: false,
            handler: Arc::new(move |_ctx, args| Box::pin(handler(args))),
        }
    }

    /// Build a callback whose handler's first (non-receiver) parameter is the
    /// cancellation context (spec §4.2).
    pub fn with_context<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CallContext, Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, RpcError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            accepts_context: true,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Invoke the callback, catching panics and surfacing them as an internal
    /// error identifying the method, mirroring the Go `Callback.call` recover
    /// behaviour (spec §4.2).
    pub async fn call(&self, ctx: CallContext, args: Vec<serde_json::Value>) -> Result<serde_json::Value, RpcError> {
        let fut = (self.handler)(ctx, args);
        match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                Err(RpcError::internal(format!("RPC method {} crashed: {message}", self.name)))
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use futures::FutureExt;

/// The callback table a module publishes at registration time; keyed by operation
/// name (the part of the method after the `<module>_` prefix).
pub type CallbackMap = HashMap<String, Callback>;

/// Build a callback map from a list of callbacks, dropping any reserved name
/// (defense in depth: a module's builder should not emit these, but the bus
/// never publishes them regardless).
pub fn build_callback_map(callbacks: impl IntoIterator<Item = Callback>) -> CallbackMap {
    callbacks
        .into_iter()
        .filter(|cb| !is_reserved(cb.name()))
        .map(|cb| (cb.name().to_string(), cb))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reserved_names_are_dropped() {
        let map = build_callback_map(vec![
            Callback::new("start", |_| async { Ok(json!(null)) }),
            Callback::new("getHeader", |_| async { Ok(json!(1)) }),
        ]);
        assert!(!map.contains_key("start"));
        assert!(map.contains_key("getHeader"));
    }

    #[tokio::test]
    async fn panics_are_recovered_as_internal_errors() {
        let cb = Callback::new("boom", |_: Vec<serde_json::Value>| async {
            panic!("kaboom");
            #[allow(unreachable_code)]
            Ok(json!(null))
        });
        let err = cb.call(CallContext::new(None), vec![]).await.unwrap_err();
        assert_eq!(err.code, crate::envelope::ErrorKind::Internal.code());
        assert!(err.message.contains("boom"));
    }
}
