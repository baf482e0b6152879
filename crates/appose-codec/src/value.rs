//! The value tree the codec walks, plus the two sentinel descriptor types.

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::dtype::DType;

/// A shared-memory reference as it appears on the wire: just enough to
/// attach to the segment (`name` + `size`), never the mapping itself.
///
/// Constructing an actual mapped [`appose_shm::SharedMemory`] from a
/// `ShmRef` happens one layer up, in the `appose` crate — this crate has no
/// platform-specific dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmRef {
    /// System-wide unique name of the segment.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// An ndarray reference as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NDArrayRef {
    /// Element type.
    pub dtype: DType,
    /// Ordered, positive dimension sizes.
    pub shape: Vec<u64>,
    /// Backing shared-memory reference.
    pub shm: ShmRef,
}

/// A decoded (or to-be-encoded) value tree.
///
/// Mirrors JSON's shape exactly, with two additions: [`Value::Shm`] and
/// [`Value::NDArray`], which round-trip through the `appose_type` sentinel
/// objects defined by the wire protocol instead of being ordinary maps.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// JSON `true`/`false`.
    Bool(bool),
    /// A JSON number with no fractional part or exponent that fits in 64
    /// bits.
    Int(i64),
    /// Any other JSON number, preserved at full precision.
    Decimal(Decimal),
    /// A JSON string.
    Str(String),
    /// A JSON array.
    Array(Vec<Value>),
    /// A JSON object, in original key order.
    Map(IndexMap<String, Value>),
    /// A `{"appose_type":"shm",...}` sentinel.
    Shm(ShmRef),
    /// A `{"appose_type":"ndarray",...}` sentinel.
    NDArray(NDArrayRef),
}

impl Value {
    /// Build a [`Value::Map`] from an iterator of key/value pairs.
    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Map(entries.into_iter().collect())
    }

    /// View this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// View this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// View this value as an i64, if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
