// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON encode/decode entry points.
//!
//! Every model type in this crate serializes through `serde`; the
//! helpers here funnel the result into one error shape carrying the
//! position a decode failed at, so transports can log and drop
//! malformed frames uniformly.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A canonical-JSON encode or decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error at {line}:{column}: {reason}")]
pub struct DecodeError {
    /// 1-based line of the failure, 0 when unknown.
    pub line: usize,
    /// 1-based column of the failure, 0 when unknown.
    pub column: usize,
    /// Human-readable failure description.
    pub reason: String,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            line: err.line(),
            column: err.column(),
            reason: err.to_string(),
        }
    }
}

/// Encode a model value to a JSON tree.
pub fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, DecodeError> {
    Ok(serde_json::to_value(value)?)
}

/// Decode a model value from a JSON tree.
pub fn decode<T: DeserializeOwned>(json: serde_json::Value) -> Result<T, DecodeError> {
    Ok(serde_json::from_value(json)?)
}

/// Encode a model value to JSON text.
pub fn to_text<T: Serialize>(value: &T) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a model value from JSON text.
pub fn from_text<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    Ok(serde_json::from_str(text)?)
}
