use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version carried by every envelope on the bus.
pub const VSN: &str = "2.0";

/// Separator between a module's name and the operation it exposes, e.g.
/// `blockAggregator_getHeader`.
pub const SERVICE_METHOD_SEPARATOR: char = '_';

/// Suffix appended to a call's method name to form the matching response's method name.
pub const RESPONSE_METHOD_SUFFIX: &str = "_response";

/// The id of an outstanding call. Only scalar ids (never objects/arrays) are valid,
/// mirroring the JSON-RPC 2.0 restriction the wire format is modeled on.
pub type RequestId = serde_json::Value;

fn is_valid_id(id: &serde_json::Value) -> bool {
    !id.is_object() && !id.is_array()
}

/// A single JSON-RPC-style error object, as carried in `Envelope::error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Predefined wire error codes from spec §4.1/§7. `Timeout` and `Unmarshal` are
/// implementation-defined positive codes, chosen to sit well clear of the
/// JSON-RPC reserved range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    Timeout,
    Unmarshal,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::Timeout => 1,
            Self::Unmarshal => 2,
        }
    }
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { code: kind.code(), message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("targetted module [{method}] not found"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "timeout")
    }
}

/// The envelope exchanged on the in-process module bus. Structurally a JSON-RPC
/// 2.0-like object; see spec §4.1. The bus never crosses a process boundary, so
/// `params`/`result` are carried as `serde_json::Value` rather than a wire-encoded
/// byte string, but every predicate below holds exactly as specified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub notify_all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notify_exclusion: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

impl Envelope {
    fn bare() -> Self {
        Self {
            version: VSN.to_string(),
            id: None,
            method: String::new(),
            params: None,
            result: None,
            error: None,
            notify_all: false,
            notify_exclusion: Vec::new(),
            origin: String::new(),
        }
    }

    /// Construct a call envelope addressed at `method`, with positional `params`.
    pub fn call(id: RequestId, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { id: Some(id), method: method.into(), params: Some(params), ..Self::bare() }
    }

    /// Construct a notification envelope: identical to a call but with no id,
    /// so the bus never expects (or waits for) a response.
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { id: None, method: method.into(), params: Some(params), ..Self::bare() }
    }

    pub fn has_valid_version(&self) -> bool {
        self.version == VSN
    }

    pub fn has_valid_id(&self) -> bool {
        self.id.as_ref().is_some_and(is_valid_id)
    }

    pub fn is_call(&self) -> bool {
        self.has_valid_version() && self.has_valid_id() && !self.method.is_empty()
    }

    pub fn is_notification(&self) -> bool {
        self.has_valid_version() && self.id.is_none() && !self.method.is_empty()
    }

    pub fn is_response(&self) -> bool {
        self.has_valid_version()
            && self.has_valid_id()
            && self.params.is_none()
            && self.method.ends_with(RESPONSE_METHOD_SUFFIX)
    }

    /// The substring of `method` up to the first separator, e.g. `blockAggregator`
    /// for `blockAggregator_getHeader`.
    pub fn namespace(&self) -> &str {
        self.method.split_once(SERVICE_METHOD_SEPARATOR).map(|(ns, _)| ns).unwrap_or(&self.method)
    }

    /// The substring of `method` after the first separator, e.g. `getHeader` for
    /// `blockAggregator_getHeader`.
    pub fn operation(&self) -> &str {
        self.method.split_once(SERVICE_METHOD_SEPARATOR).map(|(_, op)| op).unwrap_or("")
    }

    fn response_method(&self) -> String {
        if self.method.ends_with(RESPONSE_METHOD_SUFFIX) {
            self.method.clone()
        } else {
            format!("{}{RESPONSE_METHOD_SUFFIX}", self.method)
        }
    }

    /// Build a successful response to this call, copying id and origin.
    pub fn respond(&self, result: serde_json::Value) -> Self {
        Self {
            version: VSN.to_string(),
            id: self.id.clone(),
            method: self.response_method(),
            params: None,
            result: Some(result),
            error: None,
            notify_all: false,
            notify_exclusion: Vec::new(),
            origin: self.origin.clone(),
        }
    }

    /// Build an error response to this call, copying id and origin.
    pub fn error_response(&self, err: RpcError) -> Self {
        Self {
            version: VSN.to_string(),
            id: self.id.clone(),
            method: self.response_method(),
            params: None,
            result: None,
            error: Some(err),
            notify_all: false,
            notify_exclusion: Vec::new(),
            origin: self.origin.clone(),
        }
    }

    /// A notify-all copy of this message: id cleared (notifications cannot expect
    /// responses), `result`/`error`/`params` preserved, per spec §4.5.
    pub fn notify_all_copy(&self) -> Self {
        Self {
            version: self.version.clone(),
            id: None,
            method: self.method.clone(),
            params: self.params.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            notify_all: self.notify_all,
            notify_exclusion: self.notify_exclusion.clone(),
            origin: self.origin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_predicate() {
        let env = Envelope::call(json!(1), "relay_getHeader", json!([1, "0x", "0x"]));
        assert!(env.is_call());
        assert!(!env.is_notification());
        assert!(!env.is_response());
        assert_eq!(env.namespace(), "relay");
        assert_eq!(env.operation(), "getHeader");
    }

    #[test]
    fn notification_predicate() {
        let env = Envelope::notification("core_ping", json!(["tok"]));
        assert!(env.is_notification());
        assert!(!env.is_call());
        assert!(!env.is_response());
    }

    #[test]
    fn response_roundtrip_preserves_id_and_method_suffix() {
        let call = Envelope::call(json!(42), "relay_getHeader", json!([]));
        let resp = call.respond(json!({"ok": true}));
        assert!(resp.is_response());
        assert_eq!(resp.id, call.id);
        assert_eq!(resp.method, "relay_getHeader_response");

        let err_resp = call.error_response(RpcError::method_not_found("relay_getHeader"));
        assert_eq!(err_resp.id, call.id);
        assert_eq!(err_resp.method, "relay_getHeader_response");
        assert!(err_resp.error.is_some());
    }

    #[test]
    fn notify_all_copy_clears_id() {
        let mut env = Envelope::call(json!(7), "blockAggregator_getHeader", json!([]));
        env.notify_all = true;
        let copy = env.notify_all_copy();
        assert!(copy.id.is_none());
        assert_eq!(copy.method, env.method);
    }
}
