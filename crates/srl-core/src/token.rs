// SPDX-License-Identifier: MIT OR Apache-2.0
//! Interned short strings used as field names and enumerated values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An interned short string.
///
/// Tokens name spec fields (`active`, `primChildren`, ...) and carry
/// enumerated string values on the wire. Cloning is O(1); equality and
/// ordering compare the underlying string.
///
/// # Examples
///
/// ```
/// use srl_core::Token;
///
/// let token = Token::new("primChildren");
/// assert_eq!(token, "primChildren");
/// assert_eq!(token.to_string(), "primChildren");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(Arc<str>);

impl Token {
    /// Create a token from any string-like input.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// The token's string content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Serialize for Token {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

/// Well-known field names with protocol-level meaning.
pub mod fields {
    /// Prim activation flag; remote writes trigger a resync notice.
    pub const ACTIVE: &str = "active";
    /// Free-form metadata dictionary; may carry the editing `owner`.
    pub const CUSTOM_DATA: &str = "customData";
    /// Key inside `customData` naming the current prim owner.
    pub const OWNER: &str = "owner";
    /// Ordered child list of a prim; merged rather than overwritten.
    pub const PRIM_CHILDREN: &str = "primChildren";
    /// Ordered sublayer list of a layer.
    pub const SUB_LAYERS: &str = "subLayers";
    /// Field carrying the `time -> value` sample map of an attribute.
    pub const TIME_SAMPLES: &str = "timeSamples";
    /// Name fragment marking transform fields; these are always
    /// force-applied, even over unacknowledged local edits.
    pub const XFORM_OP_PREFIX: &str = "xformOp:";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_equality_and_display() {
        let a = Token::new("active");
        let b = Token::from("active".to_string());
        assert_eq!(a, b);
        assert_eq!(a, fields::ACTIVE);
        assert_eq!(format!("{a}"), "active");
    }

    #[test]
    fn token_serde_is_plain_string() {
        let token = Token::new("subLayers");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json, serde_json::json!("subLayers"));
        let back: Token = serde_json::from_value(json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn default_token_is_empty() {
        assert!(Token::default().is_empty());
    }
}
