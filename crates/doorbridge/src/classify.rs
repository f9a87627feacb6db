//! Payload classification.
//!
//! Every payload on the debug topic is one of three things: a session
//! lifecycle event, an ADC sample, or free-form console output. The shape of
//! the decoded JSON decides which, with `status` taking precedence over the
//! sample keys.

use std::fmt;

use serde_json::{Map, Number, Value};
use tracing::debug;

/// Session lifecycle transition announced by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStatus {
    Started,
    Ended,
}

impl LifecycleStatus {
    /// Normalize a `status` value. Unknown strings yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("started") {
            Some(Self::Started)
        } else if value.eq_ignore_ascii_case("ended") {
            Some(Self::Ended)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dual-channel ADC reading.
///
/// Values keep their JSON number representation so they are written back
/// exactly as the device sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Elapsed-time marker from the device (milliseconds on current firmware).
    pub delta: Number,
    pub adc1_v: Number,
    pub adc2_v: Number,
}

impl Sample {
    #[cfg(test)]
    pub(crate) fn new(delta: impl Into<Number>, adc1_v: f64, adc2_v: f64) -> Option<Self> {
        Some(Self {
            delta: delta.into(),
            adc1_v: Number::from_f64(adc1_v)?,
            adc2_v: Number::from_f64(adc2_v)?,
        })
    }

    /// CSV row without the trailing newline: `delta,adc1_v,adc2_v`.
    pub fn to_csv_row(&self) -> String {
        format!("{},{},{}", self.delta, self.adc1_v, self.adc2_v)
    }
}

/// Result of classifying one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedMessage {
    Lifecycle(LifecycleStatus),
    Sample(Sample),
    /// Anything else; carried verbatim for diagnostics and otherwise ignored.
    Unstructured(String),
}

/// Why a payload could not be decoded into a key-value document.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is JSON but not an object")]
    NotAnObject,
}

/// Decode raw bytes as UTF-8 text.
pub fn decode_text(payload: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(payload)?)
}

/// Decode text as a JSON object.
pub fn decode_document(text: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Classify a sanitized payload.
///
/// Never fails: anything that is not a recognizable lifecycle event or a
/// complete sample is `Unstructured`.
pub fn classify(sanitized_text: &str) -> ClassifiedMessage {
    let document = match decode_document(sanitized_text) {
        Ok(document) => document,
        Err(e) => {
            debug!("unstructured payload ({}): {:?}", e, sanitized_text);
            return ClassifiedMessage::Unstructured(sanitized_text.to_string());
        }
    };

    classify_document(&document)
        .unwrap_or_else(|| ClassifiedMessage::Unstructured(sanitized_text.to_string()))
}

fn classify_document(document: &Map<String, Value>) -> Option<ClassifiedMessage> {
    if let Some(status) = document.get("status") {
        let parsed = status.as_str().and_then(LifecycleStatus::parse);
        if parsed.is_none() {
            debug!("ignoring unrecognized status value: {}", status);
        }
        return parsed.map(ClassifiedMessage::Lifecycle);
    }

    if document.contains_key("adc1_v") && document.contains_key("adc2_v") {
        let number = |key: &str| document.get(key).and_then(Value::as_number).cloned();

        return match (number("delta"), number("adc1_v"), number("adc2_v")) {
            (Some(delta), Some(adc1_v), Some(adc2_v)) => Some(ClassifiedMessage::Sample(Sample {
                delta,
                adc1_v,
                adc2_v,
            })),
            _ => {
                debug!("sample-shaped document with missing or non-numeric fields");
                None
            }
        };
    }

    None
}
