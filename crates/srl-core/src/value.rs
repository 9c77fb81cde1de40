// SPDX-License-Identifier: MIT OR Apache-2.0
//! The closed set of typed scene values and their canonical JSON form.

use crate::path::ScenePath;
use crate::spec::SpecType;
use crate::token::Token;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// An asset path carrying both the authored and the resolved form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetPath {
    /// The path as authored.
    pub asset: String,
    /// The path after resolution, empty when unresolved.
    pub resolved: String,
}

/// Time offset and scale applied to a referenced layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerOffset {
    /// Additive time offset.
    pub offset: f64,
    /// Multiplicative time scale.
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

/// A composition reference: an asset, a target prim and a layer offset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced asset path.
    pub asset: String,
    /// Target prim inside the referenced asset.
    #[serde(rename = "prim")]
    pub prim_path: ScenePath,
    /// Layer offset applied to the reference.
    #[serde(rename = "offset")]
    pub layer_offset: LayerOffset,
}

/// A 4x4 double matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4d(pub [f64; 16]);

impl Matrix4d {
    /// The identity matrix.
    #[must_use]
    pub fn identity() -> Self {
        let mut cells = [0.0; 16];
        for i in 0..4 {
            cells[i * 4 + i] = 1.0;
        }
        Self(cells)
    }
}

impl Default for Matrix4d {
    fn default() -> Self {
        Self::identity()
    }
}

/// Prim specifier code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Specifier {
    /// A concrete definition.
    #[default]
    Def,
    /// An override.
    Over,
    /// An abstract class.
    Class,
}

impl Specifier {
    fn code(self) -> i32 {
        match self {
            Specifier::Def => 0,
            Specifier::Over => 1,
            Specifier::Class => 2,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Specifier::Def,
            1 => Specifier::Over,
            2 => Specifier::Class,
            _ => return None,
        })
    }
}

impl Serialize for Specifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for Specifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        Specifier::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown specifier code {code}")))
    }
}

/// Attribute variability code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variability {
    /// May vary over time.
    #[default]
    Varying,
    /// A single value for all time.
    Uniform,
}

impl Variability {
    fn code(self) -> i32 {
        match self {
            Variability::Varying => 0,
            Variability::Uniform => 1,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Variability::Varying,
            1 => Variability::Uniform,
            _ => return None,
        })
    }
}

impl Serialize for Variability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for Variability {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        Variability::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown variability code {code}")))
    }
}

/// Sentinel blocking any weaker value for a field; its body is an
/// empty JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueBlock {}

// ---------------------------------------------------------------------------
// ListOp
// ---------------------------------------------------------------------------

/// A list edit over items of type `T`.
///
/// The wire form always carries all six buckets (`explicit`, `added`,
/// `prepended`, `appended`, `deleted`, `ordered`). Decoding treats a
/// non-empty `explicit` bucket as an explicit op and otherwise
/// rebuilds an edit op from `prepended`/`appended`/`deleted`; the
/// `added` and `ordered` buckets are dropped on decode.
///
/// # Examples
///
/// ```
/// use srl_core::{ListOp, Token};
///
/// let op = ListOp::explicit(vec![Token::new("a"), Token::new("b")]);
/// let json = serde_json::to_value(&op).unwrap();
/// assert_eq!(json["explicit"], serde_json::json!(["a", "b"]));
/// assert_eq!(json["ordered"], serde_json::json!([]));
/// let back: ListOp<Token> = serde_json::from_value(json).unwrap();
/// assert_eq!(back, op);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ListOp<T> {
    /// Replaces the composed list outright.
    Explicit(Vec<T>),
    /// Incremental edits against the composed list.
    Edits {
        /// Items moved or inserted at the front.
        prepended: Vec<T>,
        /// Items moved or inserted at the back.
        appended: Vec<T>,
        /// Items removed.
        deleted: Vec<T>,
    },
}

impl<T> ListOp<T> {
    /// An explicit op replacing the whole list.
    #[must_use]
    pub fn explicit(items: Vec<T>) -> Self {
        ListOp::Explicit(items)
    }

    /// An edit op from the three decodable buckets.
    #[must_use]
    pub fn edits(prepended: Vec<T>, appended: Vec<T>, deleted: Vec<T>) -> Self {
        ListOp::Edits {
            prepended,
            appended,
            deleted,
        }
    }
}

impl<T> Default for ListOp<T> {
    fn default() -> Self {
        ListOp::Edits {
            prepended: Vec::new(),
            appended: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T: Serialize> Serialize for ListOp<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let empty: [T; 0] = [];
        let mut map = serializer.serialize_map(Some(6))?;
        match self {
            ListOp::Explicit(items) => {
                map.serialize_entry("explicit", items)?;
                map.serialize_entry("added", &empty[..])?;
                map.serialize_entry("prepended", &empty[..])?;
                map.serialize_entry("appended", &empty[..])?;
                map.serialize_entry("deleted", &empty[..])?;
                map.serialize_entry("ordered", &empty[..])?;
            }
            ListOp::Edits {
                prepended,
                appended,
                deleted,
            } => {
                map.serialize_entry("explicit", &empty[..])?;
                map.serialize_entry("added", &empty[..])?;
                map.serialize_entry("prepended", prepended)?;
                map.serialize_entry("appended", appended)?;
                map.serialize_entry("deleted", deleted)?;
                map.serialize_entry("ordered", &empty[..])?;
            }
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ListOp<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire<T> {
            #[serde(default = "Vec::new")]
            explicit: Vec<T>,
            #[serde(default = "Vec::new")]
            prepended: Vec<T>,
            #[serde(default = "Vec::new")]
            appended: Vec<T>,
            #[serde(default = "Vec::new")]
            deleted: Vec<T>,
        }

        // 'added' and 'ordered' are ignored by construction: the wire
        // struct simply has no fields for them.
        let wire = Wire::<T>::deserialize(deserializer)?;
        if wire.explicit.is_empty() {
            Ok(ListOp::Edits {
                prepended: wire.prepended,
                appended: wire.appended,
                deleted: wire.deleted,
            })
        } else {
            Ok(ListOp::Explicit(wire.explicit))
        }
    }
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// A string-keyed value map preserving insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary(Vec<(String, Value)>);

impl Dictionary {
    /// An empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Replacement keeps the key's original
    /// position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

impl Serialize for Dictionary {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DictVisitor;

        impl<'de> serde::de::Visitor<'de> for DictVisitor {
            type Value = Dictionary;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a JSON object of scene values")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Dictionary, A::Error> {
                let mut dict = Dictionary::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    dict.insert(key, value);
                }
                Ok(dict)
            }
        }

        deserializer.deserialize_map(DictVisitor)
    }
}

// ---------------------------------------------------------------------------
// TimeSampleMap
// ---------------------------------------------------------------------------

/// A `time -> value` sample map, kept sorted by time.
///
/// Times must be finite; the wire form is an array of `[time, value]`
/// pairs in ascending time order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSampleMap(Vec<(f64, Value)>);

impl TimeSampleMap {
    /// An empty sample map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample times in ascending order.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        self.0.iter().map(|(t, _)| *t).collect()
    }

    /// The value sampled exactly at `time`.
    #[must_use]
    pub fn get(&self, time: f64) -> Option<&Value> {
        self.0.iter().find(|(t, _)| *t == time).map(|(_, v)| v)
    }

    /// Insert or replace the sample at `time`, keeping the map sorted.
    pub fn set(&mut self, time: f64, value: Value) {
        match self.0.iter_mut().find(|(t, _)| *t == time) {
            Some(entry) => entry.1 = value,
            None => {
                let index = self.0.partition_point(|(t, _)| *t < time);
                self.0.insert(index, (time, value));
            }
        }
    }

    /// Remove the sample at `time`. Returns `true` if it was present.
    pub fn erase(&mut self, time: f64) -> bool {
        match self.0.iter().position(|(t, _)| *t == time) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    /// The samples bracketing `time`.
    ///
    /// Returns equal endpoints when `time` is at-or-before the first
    /// sample, at-or-after the last sample, or exactly on a sample;
    /// otherwise the two neighboring sample times. `None` when empty.
    #[must_use]
    pub fn bracketing(&self, time: f64) -> Option<(f64, f64)> {
        let (first, _) = self.0.first()?;
        let (last, _) = self.0.last()?;
        if time <= *first {
            return Some((*first, *first));
        }
        if time >= *last {
            return Some((*last, *last));
        }
        let index = self.0.partition_point(|(t, _)| *t < time);
        let upper = self.0[index].0;
        if upper == time {
            return Some((time, time));
        }
        Some((self.0[index - 1].0, upper))
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Samples in ascending time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Value)> {
        self.0.iter().map(|(t, v)| (*t, v))
    }
}

impl FromIterator<(f64, Value)> for TimeSampleMap {
    fn from_iter<I: IntoIterator<Item = (f64, Value)>>(iter: I) -> Self {
        let mut map = TimeSampleMap::new();
        for (time, value) in iter {
            map.set(time, value);
        }
        map
    }
}

impl Serialize for TimeSampleMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (time, value) in &self.0 {
            seq.serialize_element(&(*time, value))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for TimeSampleMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(f64, Value)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A typed scene value.
///
/// The set is closed: every variant has a fixed canonical type tag,
/// and decoding any other tag fails. The canonical JSON form is
/// `{ "type": <tag>, "data": <body> }`.
///
/// # Examples
///
/// ```
/// use srl_core::Value;
///
/// let value = Value::Vec3f([1.0, 2.0, 3.0]);
/// let json = serde_json::to_value(&value).unwrap();
/// assert_eq!(json, serde_json::json!({ "type": "vec3f", "data": [1.0, 2.0, 3.0] }));
/// assert_eq!(serde_json::from_value::<Value>(json).unwrap(), value);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// Boolean.
    #[serde(rename = "bool")]
    Bool(bool),
    /// 32-bit integer.
    #[serde(rename = "int")]
    Int(i32),
    /// 64-bit integer.
    #[serde(rename = "int64")]
    Int64(i64),
    /// 32-bit float.
    #[serde(rename = "float")]
    Float(f32),
    /// 64-bit float.
    #[serde(rename = "double")]
    Double(f64),
    /// UTF-8 string.
    #[serde(rename = "string")]
    String(String),
    /// Interned token.
    #[serde(rename = "token")]
    Token(Token),
    /// 2D float vector.
    #[serde(rename = "vec2f")]
    Vec2f([f32; 2]),
    /// 2D double vector.
    #[serde(rename = "vec2d")]
    Vec2d([f64; 2]),
    /// 3D float vector.
    #[serde(rename = "vec3f")]
    Vec3f([f32; 3]),
    /// 3D double vector.
    #[serde(rename = "vec3d")]
    Vec3d([f64; 3]),
    /// 4x4 double matrix, row-major.
    #[serde(rename = "matrix4d")]
    Matrix4d(Matrix4d),
    /// Array of 32-bit integers.
    #[serde(rename = "int[]")]
    IntArray(Vec<i32>),
    /// Array of 32-bit floats.
    #[serde(rename = "float[]")]
    FloatArray(Vec<f32>),
    /// Array of 64-bit floats.
    #[serde(rename = "double[]")]
    DoubleArray(Vec<f64>),
    /// Array of tokens.
    #[serde(rename = "token[]")]
    TokenArray(Vec<Token>),
    /// Array of 2D float vectors.
    #[serde(rename = "vec2f[]")]
    Vec2fArray(Vec<[f32; 2]>),
    /// Array of 3D float vectors.
    #[serde(rename = "vec3f[]")]
    Vec3fArray(Vec<[f32; 3]>),
    /// Ordered token vector, used by container fields such as
    /// `primChildren`.
    #[serde(rename = "token-vector")]
    TokenVector(Vec<Token>),
    /// Ordered path vector.
    #[serde(rename = "path-vector")]
    PathVector(Vec<ScenePath>),
    /// A scene path; the empty string is the null path.
    #[serde(rename = "path")]
    Path(ScenePath),
    /// Asset path pair.
    #[serde(rename = "asset")]
    AssetPath(AssetPath),
    /// Composition reference.
    #[serde(rename = "reference")]
    Reference(Reference),
    /// Layer offset.
    #[serde(rename = "layer-offset")]
    LayerOffset(LayerOffset),
    /// List-op over tokens.
    #[serde(rename = "token-list-op")]
    TokenListOp(ListOp<Token>),
    /// List-op over paths.
    #[serde(rename = "path-list-op")]
    PathListOp(ListOp<ScenePath>),
    /// List-op over references.
    #[serde(rename = "reference-list-op")]
    ReferenceListOp(ListOp<Reference>),
    /// String-keyed dictionary, insertion-ordered.
    #[serde(rename = "dict")]
    Dictionary(Dictionary),
    /// Value-block sentinel.
    #[serde(rename = "block")]
    Block(ValueBlock),
    /// Prim specifier code.
    #[serde(rename = "specifier")]
    Specifier(Specifier),
    /// Attribute variability code.
    #[serde(rename = "variability")]
    Variability(Variability),
    /// A spec type carried as a value.
    #[serde(rename = "spec-type")]
    SpecTypeValue(SpecType),
    /// Time-sample map.
    #[serde(rename = "time-samples")]
    TimeSamples(TimeSampleMap),
}

impl Value {
    /// The value-block sentinel.
    #[must_use]
    pub fn block() -> Self {
        Value::Block(ValueBlock {})
    }

    /// Returns `true` for the value-block sentinel.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, Value::Block(_))
    }

    /// Borrow the token vector, if this is one.
    #[must_use]
    pub fn as_token_vector(&self) -> Option<&Vec<Token>> {
        match self {
            Value::TokenVector(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the dictionary, if this is one.
    #[must_use]
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Borrow the string, if this is one.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the time-sample map, if this is one.
    #[must_use]
    pub fn as_time_samples(&self) -> Option<&TimeSampleMap> {
        match self {
            Value::TimeSamples(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the time-sample map, if this is one.
    pub fn as_time_samples_mut(&mut self) -> Option<&mut TimeSampleMap> {
        match self {
            Value::TimeSamples(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
