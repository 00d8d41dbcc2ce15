#![allow(dead_code)]

pub use captains_log::*;
pub use occams_codec::*;
pub use rstest::*;
use std::fmt;
use std::sync::{Arc, LazyLock};

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "")
    }
}

pub struct TestRunner {}

impl TestRunner {
    pub fn new() -> Self {
        recipe::raw_file_logger("/tmp/codec_test.log", Level::Trace).test().build().expect("log");
        Self {}
    }
}

/// Every format in lenient and strict form.
pub fn serializers() -> Vec<Arc<dyn Serializer>> {
    vec![
        Arc::new(BinarySerializer::default()),
        Arc::new(BinarySerializer::strict()),
        Arc::new(FastBinarySerializer::default()),
        Arc::new(FastBinarySerializer::strict()),
        Arc::new(JsonSerializer::default()),
        Arc::new(JsonSerializer::strict()),
        Arc::new(JsonSerializer::named()),
        Arc::new(PrettySerializer::default()),
        Arc::new(PrettySerializer::compact()),
        Arc::new(PrettySerializer::new(PrettyConfig { strict: true, ..Default::default() })),
    ]
}

pub static OPERATOR: LazyLock<Arc<EnumDescriptor>> = LazyLock::new(|| {
    EnumDescriptor::new("calculator.Operator", &[(1, "ADD"), (2, "SUBTRACT"), (3, "MULTIPLY")])
});

pub fn op(name: &str) -> EnumValue {
    OPERATOR.find_by_name(name).expect("operator")
}

/// `{1: name, 2: id, 3: label}`, written as an array in JSON when fields 1..n are set.
pub static COMPACT: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Compact")
        .compactible()
        .field(FieldDescriptor::new(1, "name", Descriptor::String))
        .field(FieldDescriptor::new(2, "id", Descriptor::I32))
        .field(FieldDescriptor::new(3, "label", Descriptor::String))
        .build()
});

pub static UNION: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Choice")
        .union()
        .field(FieldDescriptor::new(1, "text", Descriptor::String))
        .field(FieldDescriptor::new(2, "number", Descriptor::I64))
        .field(FieldDescriptor::new(3, "flag", Descriptor::Bool))
        .build()
});

pub static REQUIRED: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Required")
        .field(FieldDescriptor::new(1, "id", Descriptor::I32).required())
        .field(FieldDescriptor::new(2, "name", Descriptor::String).optional())
        .build()
});

/// A field of every type.
pub static CONTAINERS: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Containers")
        .field(FieldDescriptor::new(1, "booleanValue", Descriptor::Bool))
        .field(FieldDescriptor::new(2, "byteValue", Descriptor::Byte))
        .field(FieldDescriptor::new(3, "shortValue", Descriptor::I16))
        .field(FieldDescriptor::new(4, "integerValue", Descriptor::I32))
        .field(FieldDescriptor::new(5, "longValue", Descriptor::I64))
        .field(FieldDescriptor::new(6, "doubleValue", Descriptor::Double))
        .field(FieldDescriptor::new(7, "stringValue", Descriptor::String))
        .field(FieldDescriptor::new(8, "binaryValue", Descriptor::Binary))
        .field(FieldDescriptor::new(9, "enumValue", Descriptor::Enum(OPERATOR.clone())))
        .field(FieldDescriptor::new(10, "compactValue", Descriptor::Message(COMPACT.clone())))
        .field(FieldDescriptor::new(11, "integerList", Descriptor::list(Descriptor::I32)))
        .field(FieldDescriptor::new(12, "stringSet", Descriptor::set(Descriptor::String)))
        .field(FieldDescriptor::new(
            13,
            "stringMap",
            Descriptor::map(Descriptor::String, Descriptor::I32),
        ))
        .field(FieldDescriptor::new(
            14,
            "enumMap",
            Descriptor::map(Descriptor::Enum(OPERATOR.clone()), Descriptor::String),
        ))
        .field(FieldDescriptor::new(
            15,
            "messageList",
            Descriptor::list(Descriptor::Message(COMPACT.clone())),
        ))
        .field(FieldDescriptor::new(16, "unionValue", Descriptor::Message(UNION.clone())))
        .field(FieldDescriptor::new(17, "voidValue", Descriptor::Void))
        .field(FieldDescriptor::new(
            18,
            "nestedList",
            Descriptor::list(Descriptor::list(Descriptor::I32)),
        ))
        .field(FieldDescriptor::new(
            19,
            "longMap",
            Descriptor::map(Descriptor::I64, Descriptor::Double),
        ))
        .build()
});

pub fn compact(name: &str, id: i32) -> Message {
    let mut b = Message::builder(&COMPACT);
    b.set(1, name).set(2, id);
    b.build()
}

/// A message with every field of [CONTAINERS] set.
pub fn full_message() -> Message {
    let mut union = Message::builder(&UNION);
    union.set(2, 1234567890123i64);
    let mut b = Message::builder(&CONTAINERS);
    b.set(1, true)
        .set(2, -7i8)
        .set(3, 1234i16)
        .set(4, -42i32)
        .set(5, 1i64 << 40)
        .set(6, 3.25f64)
        .set(7, "æøå \"quoted\"\n\ttabbed \u{1}")
        .set(8, vec![0u8, 1, 2, 0xfe, 0xff])
        .set(9, op("MULTIPLY"))
        .set(10, compact("nested", 7))
        .set(11, Value::List(vec![1.into(), (-2).into(), 300000.into()]))
        .set(12, Value::Set(vec!["a".into(), "b".into()]))
        .set(13, Value::Map(vec![("one".into(), 1.into()), ("two".into(), 2.into())]))
        .set(14, Value::Map(vec![(op("ADD").into(), "plus".into())]))
        .set(
            15,
            Value::List(vec![compact("first", 1).into(), {
                let mut c = Message::builder(&COMPACT);
                c.set(3, "label only");
                c.build().into()
            }]),
        )
        .set(16, union.build())
        .set(17, Value::Void)
        .set(
            18,
            Value::List(vec![
                Value::List(vec![1.into(), 2.into()]),
                Value::List(vec![]),
                Value::List((0..12).map(Value::from).collect()),
            ]),
        )
        .set(19, Value::Map(vec![(Value::I64(-1), Value::Double(0.5))]));
    b.build()
}

pub static CALCULATE_REQUEST: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("calculator.calculate___request")
        .field(FieldDescriptor::new(1, "op", Descriptor::Enum(OPERATOR.clone())))
        .field(FieldDescriptor::new(2, "a", Descriptor::I32))
        .field(FieldDescriptor::new(3, "b", Descriptor::I32))
        .build()
});

pub static CALCULATE_RESPONSE: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("calculator.calculate___response")
        .union()
        .field(FieldDescriptor::new(1, "success", Descriptor::I64))
        .field(FieldDescriptor::new(2, "error", Descriptor::String))
        .build()
});

pub static PING_REQUEST: LazyLock<Arc<MessageDescriptor>> =
    LazyLock::new(|| MessageDescriptor::builder("calculator.ping___request").build());

pub static CALCULATOR: LazyLock<ServiceDescriptor> = LazyLock::new(|| {
    ServiceDescriptor::new("calculator.Calculator")
        .method("calculate", CALCULATE_REQUEST.clone(), Some(CALCULATE_RESPONSE.clone()))
        .method("iamalive", PING_REQUEST.clone(), None)
});

pub fn calculate(op_name: &str, a: i32, b: i32) -> Message {
    let mut m = Message::builder(&CALCULATE_REQUEST);
    m.set(1, op(op_name)).set(2, a).set(3, b);
    m.build()
}

pub fn success(result: i64) -> Message {
    let mut m = Message::builder(&CALCULATE_RESPONSE);
    m.set(1, result);
    m.build()
}

pub static OPERATOR_V1: LazyLock<Arc<EnumDescriptor>> =
    LazyLock::new(|| EnumDescriptor::new("calculator.Operator", &[(1, "ADD"), (2, "SUBTRACT")]));

/// The older version of [VERSION_2], with fewer fields and enum values.
pub static VERSION_1: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("compat.Versioned")
        .field(FieldDescriptor::new(1, "name", Descriptor::String))
        .field(FieldDescriptor::new(2, "count", Descriptor::I32))
        .field(FieldDescriptor::new(5, "op", Descriptor::Enum(OPERATOR_V1.clone())))
        .field(FieldDescriptor::new(
            8,
            "ops",
            Descriptor::list(Descriptor::Enum(OPERATOR_V1.clone())),
        ))
        .build()
});

pub static VERSION_2: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("compat.Versioned")
        .field(FieldDescriptor::new(1, "name", Descriptor::String))
        .field(FieldDescriptor::new(2, "count", Descriptor::I32))
        .field(FieldDescriptor::new(3, "tags", Descriptor::list(Descriptor::String)))
        .field(FieldDescriptor::new(4, "nested", Descriptor::Message(COMPACT.clone())))
        .field(FieldDescriptor::new(5, "op", Descriptor::Enum(OPERATOR.clone())))
        .field(FieldDescriptor::new(6, "data", Descriptor::Binary))
        .field(FieldDescriptor::new(
            7,
            "scores",
            Descriptor::map(Descriptor::String, Descriptor::Double),
        ))
        .field(FieldDescriptor::new(8, "ops", Descriptor::list(Descriptor::Enum(OPERATOR.clone()))))
        .build()
});

/// A [VERSION_2] message with only known-to-v1 enum values.
pub fn version_2() -> Message {
    let mut b = Message::builder(&VERSION_2);
    b.set(1, "evolved")
        .set(2, 12)
        .set(3, Value::List(vec!["x".into(), "y".into()]))
        .set(4, compact("inner", 3))
        .set(5, op("SUBTRACT"))
        .set(6, vec![9u8, 8, 7])
        .set(7, Value::Map(vec![("a".into(), 1.5.into())]))
        .set(8, Value::List(vec![op("ADD").into()]));
    b.build()
}
