// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spec types and the per-spec field table.

use crate::token::Token;
use crate::value::Value;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SpecType
// ---------------------------------------------------------------------------

/// Kind of a spec entry, carried on the wire as an integer code.
///
/// `Unknown` marks the absence of a spec; it never travels inside a
/// `Delta::Event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecType {
    /// No spec / unrecognized.
    #[default]
    Unknown,
    /// A typed attribute of a prim.
    Attribute,
    /// An attribute connection.
    Connection,
    /// An expression.
    Expression,
    /// A mapper.
    Mapper,
    /// A mapper argument.
    MapperArg,
    /// A scene primitive.
    Prim,
    /// The absolute root `/`.
    PseudoRoot,
    /// A relationship.
    Relationship,
    /// A variant.
    Variant,
    /// A variant set.
    VariantSet,
}

impl SpecType {
    /// The integer wire code of this spec type.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            SpecType::Unknown => 0,
            SpecType::Attribute => 1,
            SpecType::Connection => 2,
            SpecType::Expression => 3,
            SpecType::Mapper => 4,
            SpecType::MapperArg => 5,
            SpecType::Prim => 6,
            SpecType::PseudoRoot => 7,
            SpecType::Relationship => 8,
            SpecType::Variant => 9,
            SpecType::VariantSet => 10,
        }
    }

    /// Decode an integer wire code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => SpecType::Unknown,
            1 => SpecType::Attribute,
            2 => SpecType::Connection,
            3 => SpecType::Expression,
            4 => SpecType::Mapper,
            5 => SpecType::MapperArg,
            6 => SpecType::Prim,
            7 => SpecType::PseudoRoot,
            8 => SpecType::Relationship,
            9 => SpecType::Variant,
            10 => SpecType::VariantSet,
            _ => return None,
        })
    }
}

impl Serialize for SpecType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for SpecType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        SpecType::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown spec type code {code}")))
    }
}

// ---------------------------------------------------------------------------
// Field / SpecData
// ---------------------------------------------------------------------------

/// A single `(name, value)` field entry of a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub key: Token,
    /// Field value.
    pub value: Value,
}

/// A spec: its type plus an insertion-ordered field list.
///
/// Field lookup is a linear scan; specs carry few fields in practice
/// and the order of container fields such as `primChildren` is
/// meaningful.
///
/// A spec with zero fields acts as an acknowledge marker when it
/// arrives in a remote frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecData {
    /// The spec's type.
    #[serde(rename = "specType")]
    pub spec_type: SpecType,
    /// Insertion-ordered field entries.
    pub fields: Vec<Field>,
}

impl SpecData {
    /// An empty spec of the given type.
    #[must_use]
    pub fn new(spec_type: SpecType) -> Self {
        Self {
            spec_type,
            fields: Vec::new(),
        }
    }

    /// Look up a field value by name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|entry| entry.key == *key)
            .map(|entry| &entry.value)
    }

    /// Mutable field lookup by name.
    pub fn field_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|entry| entry.key == *key)
            .map(|entry| &mut entry.value)
    }

    /// Update an existing field in place or append a new one.
    pub fn set_field(&mut self, key: Token, value: Value) {
        match self.fields.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => self.fields.push(Field { key, value }),
        }
    }

    /// Remove a field by name. Returns `true` if it was present.
    pub fn remove_field(&mut self, key: &str) -> bool {
        match self.fields.iter().position(|entry| entry.key == *key) {
            Some(index) => {
                self.fields.remove(index);
                true
            }
            None => false,
        }
    }

    /// Field names in insertion order.
    #[must_use]
    pub fn field_names(&self) -> Vec<Token> {
        self.fields.iter().map(|entry| entry.key.clone()).collect()
    }

    /// A zero-field spec arriving remotely acknowledges a path rather
    /// than updating it.
    #[must_use]
    pub fn is_ack_marker(&self) -> bool {
        self.fields.is_empty()
    }
}
