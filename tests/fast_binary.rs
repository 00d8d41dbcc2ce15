mod common;
use common::*;
use std::sync::{Arc, LazyLock};

static SIMPLE: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Simple")
        .field(FieldDescriptor::new(1, "booleanValue", Descriptor::Bool))
        .field(FieldDescriptor::new(2, "integerValue", Descriptor::I32))
        .field(FieldDescriptor::new(3, "text", Descriptor::String))
        .build()
});

#[logfn]
#[rstest]
fn test_fast_binary_wire_bytes(_runner: TestRunner) {
    let s = FastBinarySerializer::default();
    let mut b = Message::builder(&SIMPLE);
    b.set(1, true).set(2, 42).set(3, "ab");
    let msg = b.build();
    let bytes = s.to_vec(&msg).expect("serialize");
    // bool in the tag, zigzag 42, length-prefixed string, stop
    assert_eq!(bytes, vec![0x09, 0x12, 0x54, 0x1c, 0x02, b'a', b'b', 0x00]);
    assert_eq!(s.from_slice(&bytes, &SIMPLE).expect("deserialize"), msg);

    let mut b = Message::builder(&SIMPLE);
    b.set(1, false).set(2, -1);
    assert_eq!(s.to_vec(&b.build()).expect("serialize"), vec![0x08, 0x12, 0x01, 0x00]);
}

#[logfn]
#[rstest]
fn test_fast_binary_collections(_runner: TestRunner) {
    let s = FastBinarySerializer::default();
    let mut b = Message::builder(&CONTAINERS);
    b.set(11, Value::List(vec![1.into(), 2.into()]));
    b.set(13, Value::Map(vec![("k".into(), 3.into())]));
    let msg = b.build();
    let bytes = s.to_vec(&msg).expect("serialize");
    let expected = vec![
        // integerList: collection tag, 2 items with id 0
        0x5e, 0x02, 0x02, 0x02, 0x02, 0x04,
        // stringMap: count is twice the entries, key id 1, value id 2
        0x6e, 0x02, 0x0c, 0x01, b'k', 0x12, 0x06,
        0x00,
    ];
    assert_eq!(bytes, expected);
    assert_eq!(s.from_slice(&bytes, &CONTAINERS).expect("deserialize"), msg);
}

#[logfn]
#[rstest]
fn test_fast_binary_odd_map_count(_runner: TestRunner) {
    let bytes = vec![0x6e, 0x01, 0x0c, 0x01, b'k', 0x00];
    let err = FastBinarySerializer::default()
        .from_slice(&bytes, &CONTAINERS)
        .expect_err("odd count");
    assert!(matches!(err, SerializerError::Protocol(_)), "{:?}", err);
}

#[logfn]
#[rstest]
fn test_fast_binary_unknown_fields(_runner: TestRunner) {
    // field 9 varint 300, field 10 fixed64, field 11 message {1: true}, then integerValue
    let mut bytes = vec![0x4a, 0xac, 0x02, 0x53];
    bytes.extend_from_slice(&1.5f64.to_le_bytes());
    bytes.extend_from_slice(&[0x5d, 0x09, 0x00, 0x12, 0x54, 0x00]);
    let lenient = FastBinarySerializer::default().from_slice(&bytes, &SIMPLE).expect("lenient");
    assert_eq!(lenient.get(2), Some(&Value::I32(42)));
    assert_eq!(lenient.present_count(), 1);

    let err = FastBinarySerializer::strict().from_slice(&bytes, &SIMPLE).expect_err("strict");
    assert!(matches!(err, SerializerError::UnknownField { .. }), "{:?}", err);
}

/// Unknown message field 9 holding `levels` messages nested in each other.
fn nested_unknown_messages(levels: usize) -> Vec<u8> {
    let mut bytes = vec![(9 << 3) | 5];
    bytes.extend(std::iter::repeat_n((1 << 3) | 5, levels));
    bytes.extend(std::iter::repeat_n(0x00, levels + 2));
    bytes
}

#[logfn]
#[rstest]
fn test_fast_binary_skip_nesting_limit(_runner: TestRunner) {
    let s = FastBinarySerializer::default();
    let read = s.from_slice(&nested_unknown_messages(10), &COMPACT).expect("shallow");
    assert_eq!(read.present_count(), 0);

    let err = s.from_slice(&nested_unknown_messages(200_000), &COMPACT).expect_err("deep");
    assert!(matches!(err, SerializerError::Protocol(_)), "{:?}", err);

    // collections of collections
    let mut bytes = vec![(9 << 3) | 6];
    bytes.extend(std::iter::repeat_n([0x01, 0x06], 200_000).flatten());
    assert!(s.from_slice(&bytes, &COMPACT).is_err());
}

#[logfn]
#[rstest]
fn test_fast_binary_wire_type_mismatch(_runner: TestRunner) {
    // integerValue written as binary
    let bytes = vec![0x14, 0x01, b'x', 0x09, 0x00];
    let lenient = FastBinarySerializer::default().from_slice(&bytes, &SIMPLE).expect("lenient");
    assert!(!lenient.has(2));
    assert_eq!(lenient.get(1), Some(&Value::Bool(true)));
    let err = FastBinarySerializer::strict().from_slice(&bytes, &SIMPLE).expect_err("strict");
    assert!(matches!(err, SerializerError::TypeMismatch { .. }), "{:?}", err);
}

#[logfn]
#[rstest]
fn test_fast_binary_out_of_range(_runner: TestRunner) {
    let mut bytes = vec![0x12];
    let mut v = Vec::new();
    // zigzag of 1 << 40 does not fit an i32
    let mut n: u64 = 1 << 41;
    while n >= 0x80 {
        v.push((n as u8) | 0x80);
        n >>= 7;
    }
    v.push(n as u8);
    bytes.extend(v);
    bytes.push(0x00);
    let err = FastBinarySerializer::default().from_slice(&bytes, &SIMPLE).expect_err("range");
    assert!(matches!(err, SerializerError::Protocol(_)), "{:?}", err);
}

#[logfn]
#[rstest]
fn test_fast_binary_call(_runner: TestRunner) {
    let s = FastBinarySerializer::default();
    let call = ServiceCall::new("calculate", CallType::Call, 44, calculate("ADD", 1, 2));
    let bytes = s.call_to_vec(&call).expect("serialize");
    assert_eq!(bytes[0], (9 << 3) | 1);
    assert_eq!(&bytes[1..10], b"calculate");
    assert_eq!(bytes[10], 88);
    assert_eq!(s.call_from_slice(&bytes, &CALCULATOR).expect("deserialize"), call);
}

#[logfn]
#[rstest]
fn test_fast_binary_truncated(_runner: TestRunner) {
    let s = FastBinarySerializer::default();
    let mut b = Message::builder(&SIMPLE);
    b.set(3, "truncated");
    let bytes = s.to_vec(&b.build()).expect("serialize");
    for len in 0..bytes.len() {
        assert!(s.from_slice(&bytes[..len], &SIMPLE).is_err(), "len {}", len);
    }
}
