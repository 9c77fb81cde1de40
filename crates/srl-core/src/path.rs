// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical scene identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while validating a scene path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A non-empty path must start with `/`.
    #[error("path is not absolute: {0:?}")]
    NotAbsolute(String),
    /// Paths never contain whitespace or empty components.
    #[error("malformed path component in {0:?}")]
    MalformedComponent(String),
}

/// A hierarchical scene identifier such as `/World/Cube` or
/// `/World/Cube.size`.
///
/// Paths are string-equivalent: ordering, hashing and equality all
/// follow the underlying string. The default value is the *null* path
/// (empty string), which only appears as the decoding of an empty JSON
/// string and never inside a layer store.
///
/// # Examples
///
/// ```
/// use srl_core::ScenePath;
///
/// let prim = ScenePath::new("/World/Cube").unwrap();
/// let prop = ScenePath::new("/World/Cube.size").unwrap();
/// assert!(prim.is_prim_path());
/// assert!(prop.is_property_path());
/// assert_eq!(prop.name_token(), "size");
/// assert!(ScenePath::absolute_root().is_absolute_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScenePath(Arc<str>);

impl ScenePath {
    /// Parse and validate a path string.
    ///
    /// The empty string yields the null path; any other input must be
    /// absolute (start with `/`) and free of whitespace and empty
    /// interior components.
    pub fn new(value: impl AsRef<str>) -> Result<Self, PathError> {
        let s = value.as_ref();
        if s.is_empty() {
            return Ok(Self::default());
        }
        if !s.starts_with('/') {
            return Err(PathError::NotAbsolute(s.to_string()));
        }
        if s != "/" {
            let body = &s[1..];
            if body
                .split('/')
                .any(|part| part.is_empty() || part.contains(char::is_whitespace))
            {
                return Err(PathError::MalformedComponent(s.to_string()));
            }
        }
        Ok(Self(Arc::from(s)))
    }

    /// The absolute root path `/`.
    #[must_use]
    pub fn absolute_root() -> Self {
        Self(Arc::from("/"))
    }

    /// The path's string form. The null path is the empty string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the null path.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` for the absolute root `/`.
    #[must_use]
    pub fn is_absolute_root(&self) -> bool {
        &*self.0 == "/"
    }

    /// Returns `true` for a prim path: absolute, below the root, and
    /// without a property suffix.
    #[must_use]
    pub fn is_prim_path(&self) -> bool {
        !self.is_null() && !self.is_absolute_root() && !self.last_component().contains('.')
    }

    /// Returns `true` for a property path such as `/World/Cube.size`.
    #[must_use]
    pub fn is_property_path(&self) -> bool {
        !self.is_null() && !self.is_absolute_root() && self.last_component().contains('.')
    }

    /// The final name component: the property name for property paths,
    /// the prim name otherwise. Empty for the root and the null path.
    #[must_use]
    pub fn name_token(&self) -> &str {
        let last = self.last_component();
        match last.rsplit_once('.') {
            Some((_, name)) => name,
            None => last,
        }
    }

    /// The prim part of a property path, or the path itself for prim
    /// paths.
    #[must_use]
    pub fn prim_path(&self) -> ScenePath {
        if self.is_property_path() {
            if let Some((prim, _)) = self.0.rsplit_once('.') {
                return Self(Arc::from(prim));
            }
        }
        self.clone()
    }

    fn last_component(&self) -> &str {
        if self.is_null() || self.is_absolute_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScenePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ScenePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ScenePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let root = ScenePath::absolute_root();
        assert!(root.is_absolute_root());
        assert!(!root.is_prim_path());
        assert!(!root.is_property_path());

        let prim = ScenePath::new("/World/Cube").unwrap();
        assert!(prim.is_prim_path());
        assert!(!prim.is_property_path());
        assert_eq!(prim.name_token(), "Cube");

        let prop = ScenePath::new("/World/Cube.xformOp:translate").unwrap();
        assert!(prop.is_property_path());
        assert!(!prop.is_prim_path());
        assert_eq!(prop.name_token(), "xformOp:translate");
        assert_eq!(prop.prim_path(), prim.prim_path().prim_path());
        assert_eq!(prop.prim_path().as_str(), "/World/Cube");
    }

    #[test]
    fn null_path_round_trip() {
        let null: ScenePath = serde_json::from_value(serde_json::json!("")).unwrap();
        assert!(null.is_null());
        assert_eq!(serde_json::to_value(&null).unwrap(), serde_json::json!(""));
    }

    #[test]
    fn rejects_relative_and_malformed() {
        assert!(ScenePath::new("World/Cube").is_err());
        assert!(ScenePath::new("//Cube").is_err());
        assert!(ScenePath::new("/has space").is_err());
    }

    #[test]
    fn ordering_is_string_order() {
        let a = ScenePath::new("/A").unwrap();
        let b = ScenePath::new("/B").unwrap();
        assert!(a < b);
    }
}
