//! Extended JSON: plain JSON plus type annotations.
//!
//! Wire shape:
//!
//! ```json
//! {"json": {"at": "2021-12-03T09:58:55.483Z", "gone": null},
//!  "meta": {"values": {"at": "Date", "gone": "undefined"}}}
//! ```
//!
//! `json` is the plain rendering of the value. `meta.values` maps the path of
//! every annotated node to its real type; path segments are object keys or
//! array indices joined with `.`, with `.` and `\` inside keys escaped by a
//! backslash. An annotation on the value itself lives in `meta.root`. `meta`
//! is left out when nothing needs annotating.

use chrono::{DateTime, Utc};
use serde_json::{json, Map as JsonMap};

use crate::codec::Codec;
use crate::error::CodecError;
use crate::value::{format_date, Value};

pub const EXTENDED_CONTENT_TYPE: &str = "application/x-extended-json";

const DATE: &str = "Date";
const UNDEFINED: &str = "undefined";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedCodec;

impl Codec for ExtendedCodec {
    fn content_type(&self) -> &str {
        EXTENDED_CONTENT_TYPE
    }

    fn encode(&self, value: &Value) -> Result<Option<String>, CodecError> {
        let mut values = JsonMap::new();
        let mut path = Vec::new();
        let plain = render(value, &mut path, &mut values);

        let mut meta = JsonMap::new();
        if let Some(root) = annotation_of(value) {
            meta.insert("root".into(), root.into());
        }
        if !values.is_empty() {
            meta.insert("values".into(), values.into());
        }

        let mut envelope = json!({ "json": plain });
        if !meta.is_empty() {
            envelope["meta"] = meta.into();
        }
        Ok(Some(serde_json::to_string(&envelope)?))
    }

    fn decode(&self, text: &str) -> Result<Value, CodecError> {
        let envelope: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Object(mut envelope) = envelope else {
            return Err(CodecError::Extended("envelope is not an object".into()));
        };
        let plain = envelope
            .remove("json")
            .ok_or_else(|| CodecError::Extended("envelope has no `json` member".into()))?;
        let mut value = Value::from_json(plain, None);

        let Some(meta) = envelope.remove("meta") else {
            return Ok(value);
        };
        if let Some(values) = meta.get("values") {
            let values = values
                .as_object()
                .ok_or_else(|| CodecError::Extended("`meta.values` is not an object".into()))?;
            for (path, annotation) in values {
                let target = navigate(&mut value, path)?;
                apply(target, annotation, path)?;
            }
        }
        if let Some(root) = meta.get("root") {
            apply(&mut value, root, "")?;
        }
        Ok(value)
    }
}

fn annotation_of(value: &Value) -> Option<&'static str> {
    match value {
        Value::Date(_) => Some(DATE),
        Value::Undefined => Some(UNDEFINED),
        _ => None,
    }
}

/// Plain rendering that keeps undefined members (as `null`) and records an
/// annotation for every node below the root that needs one.
fn render(
    value: &Value,
    path: &mut Vec<String>,
    values: &mut JsonMap<String, serde_json::Value>,
) -> serde_json::Value {
    if !path.is_empty() {
        if let Some(annotation) = annotation_of(value) {
            values.insert(join_path(path), annotation.into());
        }
    }
    match value {
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    path.push(i.to_string());
                    let rendered = render(item, path, values);
                    path.pop();
                    rendered
                })
                .collect(),
        ),
        Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, item)| {
                    path.push(escape_segment(key));
                    let rendered = render(item, path, values);
                    path.pop();
                    (key.clone(), rendered)
                })
                .collect(),
        ),
        Value::Date(d) => serde_json::Value::String(format_date(d)),
        other => other.to_json(),
    }
}

fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '.' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn join_path(segments: &[String]) -> String {
    segments.join(".")
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn navigate<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Value, CodecError> {
    let mut current = value;
    for segment in split_path(path) {
        let next = match current {
            Value::Object(map) => map.get_mut(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            CodecError::Extended(format!("annotated path `{path}` does not exist"))
        })?;
    }
    Ok(current)
}

fn apply(target: &mut Value, annotation: &serde_json::Value, path: &str) -> Result<(), CodecError> {
    match annotation.as_str() {
        Some(DATE) => {
            let date = target
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .ok_or_else(|| CodecError::Extended(format!("`{path}` is not a valid date")))?;
            *target = Value::Date(date);
            Ok(())
        }
        Some(UNDEFINED) => {
            *target = Value::Undefined;
            Ok(())
        }
        _ => Err(CodecError::Extended(format!(
            "unknown annotation {annotation} at `{path}`"
        ))),
    }
}
