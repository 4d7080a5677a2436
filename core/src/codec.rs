//! Body codecs and the content-type table that selects them.
//!
//! # Design
//! A `Codec` turns a `Value` into wire text and back. `CodecRegistry` maps a
//! content-type essence (`application/json`, without parameters) to the codec
//! that reads it. Anything the table does not know decodes to the raw text as
//! `Value::String`, so new formats are added by registering a codec rather
//! than by branching in the decode pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::date::{naive_iso_date, DatePromoter};
use crate::error::CodecError;
use crate::extended::{ExtendedCodec, EXTENDED_CONTENT_TYPE};
use crate::value::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Paired encode/decode logic for one wire format.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Value sent as `Content-Type` for bodies this codec encodes.
    fn content_type(&self) -> &str;

    /// Encode a body. `Ok(None)` means the value has no representation in
    /// this format and no body should be sent.
    fn encode(&self, value: &Value) -> Result<Option<String>, CodecError>;

    fn decode(&self, text: &str) -> Result<Value, CodecError>;
}

/// Plain JSON with date promotion on decode.
#[derive(Clone, Copy)]
pub struct JsonCodec {
    promote: DatePromoter,
}

impl JsonCodec {
    pub fn with_promoter(promote: DatePromoter) -> Self {
        Self { promote }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::with_promoter(naive_iso_date)
    }
}

impl fmt::Debug for JsonCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish_non_exhaustive()
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, value: &Value) -> Result<Option<String>, CodecError> {
        if value.is_undefined() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(value)?))
    }

    fn decode(&self, text: &str) -> Result<Value, CodecError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Value::from_json(json, Some(self.promote)))
    }
}

/// Strip parameters and normalize case: `Application/JSON; charset=utf-8`
/// becomes `application/json`.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Content-type essence to codec.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// A table that knows no formats; every body decodes as raw text.
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, content_type: &str, codec: impl Codec + 'static) {
        self.register_shared(content_type, Arc::new(codec));
    }

    pub fn register_shared(&mut self, content_type: &str, codec: Arc<dyn Codec>) {
        self.codecs.insert(essence(content_type), codec);
    }

    pub fn lookup(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(&essence(content_type))
    }

    /// Decode a response body. Empty bodies are `Value::Undefined` whatever
    /// the content type.
    pub fn decode(&self, content_type: Option<&str>, text: &str) -> Result<Value, CodecError> {
        if text.is_empty() {
            return Ok(Value::Undefined);
        }
        match content_type.and_then(|ct| self.lookup(ct)) {
            Some(codec) => {
                trace!(content_type = codec.content_type(), "decoding response body");
                codec.decode(text)
            }
            None => {
                trace!(?content_type, "no codec registered, passing body through as text");
                Ok(Value::String(text.to_string()))
            }
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(JSON_CONTENT_TYPE, JsonCodec::default());
        registry.register(EXTENDED_CONTENT_TYPE, ExtendedCodec);
        registry
    }
}
