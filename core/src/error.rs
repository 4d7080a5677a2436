//! Error types for the proxy.
//!
//! # Design
//! `RequestError` is the only failure the proxy manufactures itself: the
//! server answered, but not with 2xx. Everything else describes why no usable
//! answer exists. Transport failures are carried as the transport produced
//! them, body codec failures as `Decode`, and a body that decoded fine but
//! does not fit the route's declared response shape as `InvalidResponse`.

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Whatever the transport failed with, boxed but otherwise untouched.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by `Proxy` operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request never produced a response.
    #[error(transparent)]
    Transport(TransportError),

    /// The response body did not parse under the codec its content type
    /// selected.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] CodecError),

    /// The request body or query could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),

    /// The payload does not fit the route, e.g. a missing path parameter.
    #[error("invalid request for {route}: {reason}")]
    InvalidRequest { route: String, reason: String },

    /// The decoded body does not match the route's response shape.
    #[error("response body does not match the declared shape: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl ProxyError {
    /// The typed HTTP failure, if that is what this is.
    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            ProxyError::Request(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors raised by body codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed extended JSON: {0}")]
    Extended(String),
}

/// A non-2xx HTTP response.
///
/// `code` and `message` come from the string members of the same name when
/// the decoded body is an object; `code` falls back to the empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    pub status: u16,
    pub code: String,
    pub message: Option<String>,
    /// The decoded error body as received.
    pub body: Value,
}

impl RequestError {
    pub fn new(status: u16, code: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message,
            body: Value::Undefined,
        }
    }

    pub fn from_body(status: u16, body: Value) -> Self {
        let member = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        let code = member("code").unwrap_or_default();
        let message = member("message");
        Self {
            status,
            code,
            message,
            body,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message}"),
            None if !self.code.is_empty() => write!(f, "{}", self.code),
            None => write!(f, "request failed with status {}", self.status),
        }
    }
}

impl std::error::Error for RequestError {}
