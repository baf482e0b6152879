use appose_codec::{decode, encode, CodecError, DType, NDArrayRef, ShmRef, Value};
use rust_decimal::Decimal;
use std::str::FromStr;

fn roundtrip(v: &Value) -> Value {
    let line = encode(v).unwrap();
    decode(line.trim()).unwrap()
}

#[test]
fn encode_produces_single_trailing_newline() {
    let line = encode(&Value::Int(11)).unwrap();
    assert_eq!(line, "11\n");
}

#[test]
fn round_trip_primitives() {
    assert_eq!(roundtrip(&Value::Null), Value::Null);
    assert_eq!(roundtrip(&Value::Bool(true)), Value::Bool(true));
    assert_eq!(roundtrip(&Value::Int(-42)), Value::Int(-42));
    assert_eq!(roundtrip(&Value::Int(i64::MAX)), Value::Int(i64::MAX));
    assert_eq!(
        roundtrip(&Value::Str("hello\nworld".into())),
        Value::Str("hello\nworld".into())
    );
}

#[test]
fn fractional_numbers_decode_to_decimal() {
    let decoded = decode("3.14159265358979323846").unwrap();
    match decoded {
        Value::Decimal(d) => assert_eq!(d, Decimal::from_str("3.14159265358979323846").unwrap()),
        other => panic!("expected Decimal, got {other:?}"),
    }
}

#[test]
fn integers_decode_to_int_not_decimal() {
    assert_eq!(decode("5").unwrap(), Value::Int(5));
    assert_eq!(decode("-5").unwrap(), Value::Int(-5));
}

#[test]
fn round_trip_array_and_map_preserves_key_order() {
    let v = Value::map([
        ("z".to_string(), Value::Int(1)),
        ("a".to_string(), Value::Int(2)),
        ("m".to_string(), Value::Array(vec![Value::Int(1), Value::Int(2)])),
    ]);
    let decoded = roundtrip(&v);
    let map = decoded.as_map().unwrap();
    let keys: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

#[test]
fn shm_sentinel_round_trips() {
    let shm = ShmRef {
        name: "/appose-abc123".into(),
        size: 4096,
    };
    let v = Value::Shm(shm.clone());
    let decoded = roundtrip(&v);
    assert_eq!(decoded, Value::Shm(shm));
}

#[test]
fn ndarray_sentinel_round_trips() {
    let nd = NDArrayRef {
        dtype: DType::Float32,
        shape: vec![2, 20, 25],
        shm: ShmRef {
            name: "/appose-nd".into(),
            size: 2 * 20 * 25 * 4,
        },
    };
    let v = Value::NDArray(nd.clone());
    let decoded = roundtrip(&v);
    assert_eq!(decoded, Value::NDArray(nd));
}

#[test]
fn decode_rejects_multiple_lines() {
    let err = decode("1\n2").unwrap_err();
    assert!(matches!(err, CodecError::MultipleLines(2)));
}

#[test]
fn decode_rejects_malformed_shm_sentinel_missing_name() {
    let err = decode(r#"{"appose_type":"shm","size":10}"#).unwrap_err();
    assert!(matches!(err, CodecError::MalformedSentinel { kind: "shm", .. }));
}

#[test]
fn decode_rejects_nonpositive_shm_size() {
    let err = decode(r#"{"appose_type":"shm","name":"/x","size":0}"#).unwrap_err();
    assert!(matches!(err, CodecError::NonPositiveSize(_)));
}

#[test]
fn decode_rejects_unknown_dtype() {
    let err = decode(
        r#"{"appose_type":"ndarray","dtype":"int128","shape":[2],"shm":{"appose_type":"shm","name":"/x","size":16}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, CodecError::UnknownDType(ref t) if t == "int128"));
}

#[test]
fn decode_rejects_nonpositive_ndarray_shape() {
    let err = decode(
        r#"{"appose_type":"ndarray","dtype":"int8","shape":[0],"shm":{"appose_type":"shm","name":"/x","size":16}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, CodecError::NonPositiveSize(_)));
}

#[test]
fn decode_rejects_unattachable_shm_inside_ndarray() {
    let err = decode(
        r#"{"appose_type":"ndarray","dtype":"int8","shape":[2],"shm":{"appose_type":"shm","size":16}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, CodecError::MalformedSentinel { kind: "shm", .. }));
}

#[test]
fn task_response_tree_round_trips() {
    let v = Value::map([
        ("task".to_string(), Value::Str("abc-123".into())),
        ("responseType".to_string(), Value::Str("COMPLETION".into())),
        (
            "outputs".to_string(),
            Value::map([("result".to_string(), Value::Int(91))]),
        ),
    ]);
    assert_eq!(roundtrip(&v), v);
}
