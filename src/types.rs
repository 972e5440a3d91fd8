//! Semantic type model for flattened JSON scalars.
//!
//! Every value that survives flattening is one of five scalar kinds. A column's
//! knowledge about its values is a [`TypeSet`], and combining two observations is
//! plain set union.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One flattened row: column name to scalar value, in column discovery order.
pub type FlatRecord = Map<String, Value>;

/// Type identifier for a flattened JSON scalar
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Boolean,
    Integer,
    Float,
    String,
}

impl TypeTag {
    /// All tags in canonical order.
    pub const ALL: [TypeTag; 5] = [
        TypeTag::Null,
        TypeTag::Boolean,
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::String,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown type tag `{}`", s))
    }
}

/// Map a scalar JSON value to its tag.
///
/// Arrays and objects are eliminated by flattening and have no tag; `None` is
/// returned for them. Integers beyond the signed 64-bit range are tagged
/// `String` so they are stored as exact text rather than overflowing a
/// `BIGINT` column.
pub fn classify(value: &Value) -> Option<TypeTag> {
    match value {
        Value::Null => Some(TypeTag::Null),
        Value::Bool(_) => Some(TypeTag::Boolean),
        Value::Number(n) => {
            if n.is_i64() {
                Some(TypeTag::Integer)
            } else if n.is_u64() {
                Some(TypeTag::String)
            } else {
                Some(TypeTag::Float)
            }
        }
        Value::String(_) => Some(TypeTag::String),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Name of the JSON kind of a value, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A set of type tags, iterated in canonical order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypeSet(u8);

impl TypeSet {
    pub fn empty() -> Self {
        TypeSet(0)
    }

    pub fn single(tag: TypeTag) -> Self {
        TypeSet(tag.bit())
    }

    pub fn insert(&mut self, tag: TypeTag) {
        self.0 |= tag.bit();
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    /// The set without `null`.
    pub fn concrete(self) -> TypeSet {
        TypeSet(self.0 & !TypeTag::Null.bit())
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeTag> + '_ {
        TypeTag::ALL.into_iter().filter(move |tag| self.contains(*tag))
    }
}

impl FromIterator<TypeTag> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeTag>>(iter: I) -> Self {
        let mut set = TypeSet::empty();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(TypeTag::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl Serialize for TypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for TypeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<TypeTag>::deserialize(deserializer)?;
        Ok(tags.into_iter().collect())
    }
}

/// Combine two type observations. Total, commutative and associative; the empty
/// set is the identity.
pub fn merge(a: TypeSet, b: TypeSet) -> TypeSet {
    a.union(b)
}

/// True when more than one concrete (non-null) type was observed.
pub fn is_multi_choice(types: TypeSet) -> bool {
    types.concrete().len() > 1
}

/// Pick the single output type for a set of observations.
///
/// `string` dominates every other concrete tag since any scalar can be rendered
/// as text without loss. `null` alone never widens a column.
pub fn resolve_multi_choice(types: TypeSet) -> TypeTag {
    let concrete = types.concrete();
    match concrete.len() {
        0 => TypeTag::Null,
        1 => concrete.iter().next().unwrap_or(TypeTag::Null),
        _ => TypeTag::String,
    }
}
