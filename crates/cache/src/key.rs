//! Cache-key normalization.
//!
//! Client construction parameters arrive as heterogeneous, possibly nested
//! values. Two call sites that mean the same client must address the same
//! cache slot, so everything is frozen into [`CacheValue`] — a canonical
//! tree where maps are sorted by key, sets are sorted sequences, and floats
//! are compared by bit pattern. [`ClientCacheKey`] combines frozen
//! positional and keyword parts with a human-readable label that never
//! participates in equality or hashing.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value as JsonValue;

/// An `f64` frozen by bit pattern so it can participate in `Eq`, `Ord`
/// and `Hash`. NaN is canonicalized and `-0.0` folds into `0.0`, so equal
/// inputs always normalize to equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FloatBits(u64);

impl From<f64> for FloatBits {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self(f64::NAN.to_bits())
        } else if value == 0.0 {
            Self(0.0_f64.to_bits())
        } else {
            Self(value.to_bits())
        }
    }
}

impl FloatBits {
    /// The floating-point value this key position was frozen from.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// A normalized, hashable construction-parameter value.
///
/// Mapping-like inputs become sorted maps and set-like inputs become
/// sorted sequences, so equality is independent of input ordering.
/// Ordered sequences keep their order — position is meaningful there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheValue {
    /// Absent / null. Stripped from trailing positionals and dropped from
    /// keyword entries during key construction.
    Null,
    /// Boolean flag
    Bool(bool),
    /// Integer parameter
    Int(i64),
    /// Floating-point parameter, frozen by bits
    Float(FloatBits),
    /// String parameter
    Str(String),
    /// Ordered sequence; element order preserved
    Seq(Vec<CacheValue>),
    /// Unordered collection, stored sorted
    Set(Vec<CacheValue>),
    /// Mapping, stored sorted by key
    Map(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    /// Freeze an arbitrary JSON-shaped parameter tree.
    ///
    /// Objects become sorted maps, arrays stay ordered sequences. Numbers
    /// keep integer identity when they have one.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(FloatBits::from(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Array(items) => Self::Seq(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Build a set-valued entry: elements are sorted, so insertion order
    /// never leaks into the key.
    pub fn set(items: impl IntoIterator<Item = CacheValue>) -> Self {
        let mut items: Vec<CacheValue> = items.into_iter().collect();
        items.sort();
        Self::Set(items)
    }

    /// Build a map-valued entry from `(name, value)` pairs.
    pub fn map(entries: impl IntoIterator<Item = (String, CacheValue)>) -> Self {
        Self::Map(entries.into_iter().collect())
    }

    fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for CacheValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        Self::Float(FloatBits::from(value))
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(bits) => write!(f, "{}", bits.as_f64()),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Seq(items) | Self::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Conversion of configuration-like objects into their normalized form.
///
/// Implementors flatten the options a user actually provided into a
/// [`CacheValue::Map`], so two configurations built with equivalent options
/// in different order normalize identically.
pub trait Normalize {
    /// Produce the frozen representation of this value.
    fn normalize(&self) -> CacheValue;
}

impl Normalize for CacheValue {
    fn normalize(&self) -> CacheValue {
        self.clone()
    }
}

/// Normalized identity of one client-construction call.
///
/// Equality and hashing cover the normalized positional and keyword parts
/// only. The label exists purely for diagnostics; two keys with different
/// labels but equal normalized parts are the same key.
#[derive(Debug, Clone)]
pub struct ClientCacheKey {
    positional: Vec<CacheValue>,
    keyword: BTreeMap<String, CacheValue>,
    label: String,
}

impl ClientCacheKey {
    /// Build a key from positional and keyword construction parameters.
    ///
    /// Trailing null positionals are stripped (they are semantically
    /// equivalent to omission) and null-valued keyword entries are dropped.
    /// Keyword ordering is irrelevant: entries land in a sorted map.
    pub fn new(
        positional: impl IntoIterator<Item = CacheValue>,
        keyword: impl IntoIterator<Item = (String, CacheValue)>,
    ) -> Self {
        let mut positional: Vec<CacheValue> = positional.into_iter().collect();
        while positional.last().is_some_and(CacheValue::is_null) {
            positional.pop();
        }

        let keyword: BTreeMap<String, CacheValue> = keyword
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();

        let label = Self::render_label(&positional, &keyword);
        Self {
            positional,
            keyword,
            label,
        }
    }

    /// Convenience constructor for the common `client(service, ...)` shape.
    pub fn for_service(
        service: &str,
        keyword: impl IntoIterator<Item = (String, CacheValue)>,
    ) -> Self {
        Self::new([CacheValue::from(service)], keyword)
    }

    /// The diagnostic label, e.g. `client('s3', region_name='eu-west-1')`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Normalized positional parameters.
    pub fn positional(&self) -> &[CacheValue] {
        &self.positional
    }

    /// Normalized keyword parameters, sorted by name.
    pub fn keyword(&self) -> &BTreeMap<String, CacheValue> {
        &self.keyword
    }

    fn render_label(positional: &[CacheValue], keyword: &BTreeMap<String, CacheValue>) -> String {
        let mut parts: Vec<String> = positional.iter().map(ToString::to_string).collect();
        parts.extend(keyword.iter().map(|(k, v)| format!("{k}={v}")));
        format!("client({})", parts.join(", "))
    }
}

impl PartialEq for ClientCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.positional == other.positional && self.keyword == other.keyword
    }
}

impl Eq for ClientCacheKey {}

impl Hash for ClientCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.positional.hash(state);
        self.keyword.hash(state);
    }
}

impl fmt::Display for ClientCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
