//! JSON line encoding/decoding, including the `shm`/`ndarray` sentinels.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Map as JsonMap;

use crate::dtype::DType;
use crate::error::CodecError;
use crate::value::{NDArrayRef, ShmRef, Value};

const SENTINEL_KEY: &str = "appose_type";

/// Serialize a value tree to a single newline-terminated JSON line.
pub fn encode(value: &Value) -> Result<String, CodecError> {
    let json = to_json(value)?;
    let mut line = serde_json::to_string(&json).map_err(CodecError::Serialize)?;
    line.push('\n');
    Ok(line)
}

/// Deserialize a single line of JSON into a value tree.
///
/// Fails with [`CodecError::MultipleLines`] if `line` contains more than one
/// non-blank physical line.
pub fn decode(line: &str) -> Result<Value, CodecError> {
    let lines: Vec<&str> = line.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != 1 {
        return Err(CodecError::MultipleLines(lines.len()));
    }
    let raw: serde_json::Value = serde_json::from_str(lines[0]).map_err(CodecError::Deserialize)?;
    from_json(raw)
}

fn to_json(value: &Value) -> Result<serde_json::Value, CodecError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Decimal(d) => {
            let number: serde_json::Number =
                serde_json::from_str(&d.to_string()).map_err(CodecError::Serialize)?;
            serde_json::Value::Number(number)
        }
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_json(item)?);
            }
            serde_json::Value::Array(out)
        }
        Value::Map(map) => {
            let mut obj = JsonMap::new();
            for (k, v) in map {
                obj.insert(k.clone(), to_json(v)?);
            }
            serde_json::Value::Object(obj)
        }
        Value::Shm(shm) => serde_json::Value::Object(shm_sentinel(shm)),
        Value::NDArray(nd) => {
            let mut obj = JsonMap::new();
            obj.insert(
                SENTINEL_KEY.to_string(),
                serde_json::Value::String("ndarray".into()),
            );
            obj.insert(
                "dtype".to_string(),
                serde_json::Value::String(nd.dtype.as_str().to_string()),
            );
            obj.insert(
                "shape".to_string(),
                serde_json::Value::Array(
                    nd.shape
                        .iter()
                        .map(|d| serde_json::Value::Number((*d).into()))
                        .collect(),
                ),
            );
            obj.insert("shm".to_string(), serde_json::Value::Object(shm_sentinel(&nd.shm)));
            serde_json::Value::Object(obj)
        }
    })
}

fn shm_sentinel(shm: &ShmRef) -> JsonMap<String, serde_json::Value> {
    let mut obj = JsonMap::new();
    obj.insert(
        SENTINEL_KEY.to_string(),
        serde_json::Value::String("shm".into()),
    );
    obj.insert("name".to_string(), serde_json::Value::String(shm.name.clone()));
    obj.insert("size".to_string(), serde_json::Value::Number(shm.size.into()));
    obj
}

fn from_json(value: serde_json::Value) -> Result<Value, CodecError> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => decode_number(n)?,
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item)?);
            }
            Value::Array(out)
        }
        serde_json::Value::Object(map) => {
            match map.get(SENTINEL_KEY).and_then(|v| v.as_str()) {
                Some("shm") => Value::Shm(decode_shm_sentinel(&map)?),
                Some("ndarray") => Value::NDArray(decode_ndarray_sentinel(map)?),
                Some(other) => {
                    return Err(CodecError::MalformedSentinel {
                        kind: "unknown",
                        reason: format!("unrecognized appose_type: {other}"),
                    });
                }
                None => {
                    let mut out = indexmap::IndexMap::with_capacity(map.len());
                    for (k, v) in map {
                        out.insert(k, from_json(v)?);
                    }
                    Value::Map(out)
                }
            }
        }
    })
}

fn decode_number(n: serde_json::Number) -> Result<Value, CodecError> {
    let text = n.to_string();
    let is_fractional = text.contains('.') || text.contains('e') || text.contains('E');
    if !is_fractional {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
    }
    let decimal = Decimal::from_str(&text)
        .map_err(|e| CodecError::MalformedSentinel {
            kind: "number",
            reason: format!("not representable as a decimal: {e}"),
        })?;
    Ok(Value::Decimal(decimal))
}

fn decode_shm_sentinel(map: &JsonMap<String, serde_json::Value>) -> Result<ShmRef, CodecError> {
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CodecError::MalformedSentinel {
            kind: "shm",
            reason: "missing string field 'name'".into(),
        })?
        .to_string();
    let size = map
        .get("size")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| CodecError::MalformedSentinel {
            kind: "shm",
            reason: "missing integer field 'size'".into(),
        })?;
    if size == 0 {
        return Err(CodecError::NonPositiveSize(format!(
            "shm '{name}' has size {size}"
        )));
    }
    Ok(ShmRef { name, size })
}

fn decode_ndarray_sentinel(
    mut map: JsonMap<String, serde_json::Value>,
) -> Result<NDArrayRef, CodecError> {
    let dtype_tag = map
        .get("dtype")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CodecError::MalformedSentinel {
            kind: "ndarray",
            reason: "missing string field 'dtype'".into(),
        })?
        .to_string();
    let dtype = DType::parse(&dtype_tag).ok_or(CodecError::UnknownDType(dtype_tag))?;

    let shape_value = map.get("shape").ok_or_else(|| CodecError::MalformedSentinel {
        kind: "ndarray",
        reason: "missing field 'shape'".into(),
    })?;
    let shape_items = shape_value
        .as_array()
        .ok_or_else(|| CodecError::MalformedSentinel {
            kind: "ndarray",
            reason: "'shape' must be an array".into(),
        })?;
    let mut shape = Vec::with_capacity(shape_items.len());
    for item in shape_items {
        let dim = item.as_u64().ok_or_else(|| CodecError::MalformedSentinel {
            kind: "ndarray",
            reason: "shape dimensions must be integers".into(),
        })?;
        if dim == 0 {
            return Err(CodecError::NonPositiveSize(format!(
                "ndarray shape dimension is {dim}"
            )));
        }
        shape.push(dim);
    }
    if shape.is_empty() {
        return Err(CodecError::MalformedSentinel {
            kind: "ndarray",
            reason: "'shape' must not be empty".into(),
        });
    }

    let shm_value = map
        .remove("shm")
        .ok_or_else(|| CodecError::MalformedSentinel {
            kind: "ndarray",
            reason: "missing field 'shm'".into(),
        })?;
    let shm_obj = match shm_value {
        serde_json::Value::Object(o) => o,
        _ => {
            return Err(CodecError::MalformedSentinel {
                kind: "ndarray",
                reason: "'shm' must be an object".into(),
            });
        }
    };
    let shm = decode_shm_sentinel(&shm_obj)?;

    Ok(NDArrayRef { dtype, shape, shm })
}
