//! Numeric dtype tags carried by ndarray sentinels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the numeric element types an [`crate::NDArrayRef`] may declare.
///
/// Wire representation is the lowercase tag name (`"int8"`, `"float32"`,
/// `"complex128"`, `"bool"`, …) — exactly the set from the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bool,
}

impl DType {
    /// Size in bytes of one element of this dtype.
    pub fn size_of(self) -> u64 {
        match self {
            DType::Int8 | DType::Uint8 | DType::Bool => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    /// Parse the wire tag, returning `None` for anything outside the set.
    pub fn parse(tag: &str) -> Option<DType> {
        Some(match tag {
            "int8" => DType::Int8,
            "uint8" => DType::Uint8,
            "int16" => DType::Int16,
            "uint16" => DType::Uint16,
            "int32" => DType::Int32,
            "uint32" => DType::Uint32,
            "int64" => DType::Int64,
            "uint64" => DType::Uint64,
            "float16" => DType::Float16,
            "float32" => DType::Float32,
            "float64" => DType::Float64,
            "complex64" => DType::Complex64,
            "complex128" => DType::Complex128,
            "bool" => DType::Bool,
            _ => return None,
        })
    }

    /// The wire tag for this dtype.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Uint16 => "uint16",
            DType::Int32 => "int32",
            DType::Uint32 => "uint32",
            DType::Int64 => "int64",
            DType::Uint64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory layout of an ndarray's elements.
///
/// Not part of the wire sentinel (the protocol does not carry an order
/// field — see `DESIGN.md`); this is local metadata a caller attaches when
/// constructing an [`crate::NDArrayRef`] from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrder {
    /// Row-major (C) order.
    #[default]
    COrder,
    /// Column-major (Fortran) order.
    FortranOrder,
}
