// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod url;

pub use events::{AcknowledgeEvent, DeltaEvent, Event, HistoryEvent, ReloadEvent};
pub use url::{Scheme, SessionUrl, SessionUrlError};

use thiserror::Error;

/// Errors arising from frame encoding/decoding or protocol-level
/// violations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization or deserialization failure, including
    /// unknown event tags.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A protocol-level invariant was violated (for example an
    /// `Unknown` spec type inside a delta).
    #[error("protocol violation: {0}")]
    Violation(String),
}

/// Stateless codec turning [`Event`]s into websocket text frames and
/// back.
///
/// # Examples
///
/// ```
/// use srl_protocol::{Event, EventCodec, HistoryEvent};
///
/// let frame = EventCodec::encode(&Event::History(HistoryEvent {})).unwrap();
/// assert_eq!(frame, r#"{"event":"History::Event","body":{}}"#);
/// assert!(matches!(EventCodec::decode(&frame).unwrap(), Event::History(_)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EventCodec;

impl EventCodec {
    /// Serialize an [`Event`] to a JSON text frame.
    pub fn encode(event: &Event) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(event)?)
    }

    /// Parse a JSON text frame into an [`Event`].
    ///
    /// Malformed JSON, unknown event tags, and bodies violating the
    /// protocol all fail here; callers log and drop the frame.
    pub fn decode(text: &str) -> Result<Event, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_tag_is_an_error() {
        let err = EventCodec::decode(r#"{"event":"Gossip::Event","body":{}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(EventCodec::decode("not json at all").is_err());
        assert!(EventCodec::decode(r#"{"event":"Delta::Event"}"#).is_err());
    }
}
