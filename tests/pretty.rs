mod common;
use common::*;
use std::sync::{Arc, LazyLock};

static SIMPLE: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("test.Simple")
        .field(FieldDescriptor::new(1, "booleanValue", Descriptor::Bool))
        .field(FieldDescriptor::new(2, "integerValue", Descriptor::I32))
        .build()
});

fn simple() -> Message {
    let mut b = Message::builder(&SIMPLE);
    b.set(1, true).set(2, 42);
    b.build()
}

fn write(s: &PrettySerializer, m: &Message) -> String {
    String::from_utf8(s.to_vec(m).expect("serialize")).expect("utf-8")
}

fn read(
    s: &PrettySerializer,
    text: &str,
    descriptor: &Arc<MessageDescriptor>,
) -> occams_codec::Result<Message> {
    s.from_slice(text.as_bytes(), descriptor)
}

fn tokenizer_error(e: SerializerError) -> TokenizerError {
    match e.root() {
        SerializerError::Tokenizer(t) => t.clone(),
        e => panic!("not a tokenizer error: {:?}", e),
    }
}

#[logfn]
#[rstest]
#[case(PrettyConfig::default(), "{\n  booleanValue: true\n  integerValue: 42\n}")]
#[case(PrettyConfig::compact(), "{booleanValue:true,integerValue:42}")]
#[case(
    PrettyConfig { prefix_with_name: true, ..Default::default() },
    "test.Simple {\n  booleanValue: true\n  integerValue: 42\n}"
)]
#[case(
    PrettyConfig { enclose_outer: false, ..Default::default() },
    "booleanValue: true\nintegerValue: 42"
)]
fn test_pretty_layout(_runner: TestRunner, #[case] config: PrettyConfig, #[case] expected: &str) {
    let s = PrettySerializer::new(config);
    let text = write(&s, &simple());
    assert_eq!(text, expected);
    assert_eq!(read(&s, &text, &SIMPLE).expect("deserialize"), simple());
    // output is stable
    let again = read(&s, &text, &SIMPLE).expect("deserialize");
    assert_eq!(write(&s, &again), text);
}

#[logfn]
#[rstest]
fn test_pretty_reads_hand_written_text(_runner: TestRunner) {
    let text = "{booleanValue: true, integerValue: 42}";
    let lenient = PrettySerializer::default();
    let strict = PrettySerializer::new(PrettyConfig { strict: true, ..Default::default() });
    for s in [&lenient, &strict] {
        let m = read(s, text, &SIMPLE).expect("deserialize");
        assert_eq!(m, simple());
    }
    let m = read(&lenient, text, &SIMPLE).expect("deserialize");
    assert_eq!(write(&PrettySerializer::compact(), &m), "{booleanValue:true,integerValue:42}");
}

#[logfn]
#[rstest]
fn test_pretty_nested_layout(_runner: TestRunner) {
    let mut b = Message::builder(&CONTAINERS);
    b.set(4, 4)
        .set(10, compact("n", 7))
        .set(11, Value::List(vec![1.into(), 2.into(), 3.into()]))
        .set(13, Value::Map(vec![("a".into(), 1.into())]))
        .set(
            15,
            Value::List(vec![compact("first", 1).into(), {
                let mut c = Message::builder(&COMPACT);
                c.set(3, "label only");
                c.build().into()
            }]),
        )
        .set(12, Value::Set(vec![]));
    let m = b.build();
    let expected = r#"{
  integerValue: 4
  compactValue: {
    name: "n"
    id: 7
  }
  integerList: [1, 2, 3]
  stringSet: []
  stringMap: {
    "a": 1
  }
  messageList: [
    {
      name: "first"
      id: 1
    },
    {
      label: "label only"
    }
  ]
}"#;
    let s = PrettySerializer::default();
    assert_eq!(write(&s, &m), expected);
    assert_eq!(read(&s, expected, &CONTAINERS).expect("deserialize"), m);
}

#[logfn]
#[rstest]
fn test_pretty_long_list(_runner: TestRunner) {
    let mut b = Message::builder(&CONTAINERS);
    b.set(11, Value::List((1..=11).map(Value::from).collect()));
    let m = b.build();
    let text = write(&PrettySerializer::compact(), &m);
    assert_eq!(text, "{integerList:[1,2,3,4,5,6,7,8,9,10,11]}");
    let s = PrettySerializer::default();
    let text = write(&s, &m);
    assert!(text.starts_with("{\n  integerList: [\n    1,\n    2,\n"), "{}", text);
    assert_eq!(read(&s, &text, &CONTAINERS).expect("deserialize"), m);
}

#[logfn]
#[rstest]
fn test_pretty_empty_message(_runner: TestRunner) {
    let empty = Message::builder(&SIMPLE).build();
    let s = PrettySerializer::default();
    assert_eq!(write(&s, &empty), "{}");
    assert_eq!(read(&s, "{}", &SIMPLE).expect("deserialize"), empty);

    let bare = PrettySerializer::new(PrettyConfig { enclose_outer: false, ..Default::default() });
    assert_eq!(write(&bare, &empty), "");
    assert_eq!(read(&bare, "", &SIMPLE).expect("deserialize"), empty);
    assert_eq!(read(&bare, "  # nothing here\n", &SIMPLE).expect("deserialize"), empty);
    assert!(read(&s, "", &SIMPLE).is_err());
}

#[logfn]
#[rstest]
fn test_pretty_strings_and_binary(_runner: TestRunner) {
    let mut b = Message::builder(&CONTAINERS);
    b.set(7, "a\"b\\c\nd\u{1}").set(8, vec![0u8, 1, 2, 0xfe, 0xff]);
    let m = b.build();
    let s = PrettySerializer::compact();
    let text = write(&s, &m);
    assert_eq!(text, r#"{stringValue:"a\"b\\c\nd\u0001",binaryValue:b64(AAEC/v8)}"#);
    assert_eq!(read(&s, &text, &CONTAINERS).expect("deserialize"), m);

    let text = "{ binaryValue: hex(00 01 02\n fe ff) stringValue: 'a\"b\\\\c\\nd\\001' }";
    let other = read(&s, text, &CONTAINERS).expect("deserialize");
    assert_eq!(other, m);
    let padded = read(&s, "{ binaryValue: b64( AAEC/v8= ) }", &CONTAINERS).expect("deserialize");
    assert_eq!(padded.get(8), m.get(8));
}

#[logfn]
#[rstest]
fn test_pretty_invalid_escape(_runner: TestRunner) {
    let text = r#"{ stringValue: "a\qb" }"#;
    let lenient = read(&PrettySerializer::default(), text, &CONTAINERS).expect("lenient");
    assert_eq!(lenient.get(7), Some(&Value::String("a?b".to_string())));
    let strict = PrettySerializer::new(PrettyConfig { strict: true, ..Default::default() });
    let e = tokenizer_error(read(&strict, text, &CONTAINERS).expect_err("strict"));
    assert_eq!((e.line, e.column), (1, 16));
}

#[logfn]
#[rstest]
#[case("yes", true)]
#[case("N", false)]
#[case("1", true)]
#[case("false", false)]
#[case("T", true)]
fn test_pretty_bool_forms(_runner: TestRunner, #[case] token: &str, #[case] expected: bool) {
    let m = read(&PrettySerializer::default(), &format!("{{ booleanValue: {} }}", token), &SIMPLE)
        .expect("deserialize");
    assert_eq!(m.get(1), Some(&Value::Bool(expected)));
}

#[logfn]
#[rstest]
#[case("integerValue: 0x1f", 4, Value::I32(31))]
#[case("integerValue: 017", 4, Value::I32(15))]
#[case("integerValue: -2147483648", 4, Value::I32(i32::MIN))]
#[case("byteValue: -128", 2, Value::Byte(-128))]
#[case("doubleValue: 1e3", 6, Value::Double(1000.0))]
#[case("doubleValue: 7", 6, Value::Double(7.0))]
#[case("enumValue: 3", 9, Value::Enum(op("MULTIPLY")))]
#[case("enumValue: SUBTRACT", 9, Value::Enum(op("SUBTRACT")))]
#[case("voidValue: yes", 17, Value::Void)]
fn test_pretty_value_forms(
    _runner: TestRunner,
    #[case] field: &str,
    #[case] id: u16,
    #[case] expected: Value,
) {
    let text = format!("{{ {} }}", field);
    let m = read(&PrettySerializer::default(), &text, &CONTAINERS).expect("deserialize");
    assert_eq!(m.get(id), Some(&expected));
}

#[logfn]
#[rstest]
#[case("{ byteValue: 128 }", "out of bounds")]
#[case("{ shortValue: 40000 }", "out of bounds")]
#[case("{ integerValue: 1.5 }", "Invalid i32 value")]
#[case("{ booleanValue: maybe }", "Invalid boolean value")]
#[case("{ voidValue: false }", "Invalid void value")]
#[case("{ stringValue: abc }", "Expected string literal")]
#[case("{ binaryValue: b32(abc) }", "Unrecognized binary format")]
#[case("{ binaryValue: hex(abc) }", "Invalid hex binary")]
#[case("{ stringSet: \"a\" }", "Expected list start")]
fn test_pretty_invalid_values(_runner: TestRunner, #[case] text: &str, #[case] message: &str) {
    let err = read(&PrettySerializer::default(), text, &CONTAINERS).expect_err("invalid");
    let e = tokenizer_error(err);
    assert!(e.message.contains(message), "{}", e);
}

#[logfn]
#[rstest]
fn test_pretty_unknown_field(_runner: TestRunner) {
    let text = "{\n  integerValue: 4\n  nope: 1\n}";
    let err = read(&PrettySerializer::default(), text, &CONTAINERS).expect_err("unknown");
    let e = tokenizer_error(err);
    assert_eq!((e.line, e.column, e.length), (3, 3, 4));
    assert!(e.message.contains("No such field nope"), "{}", e);
    assert_eq!(e.as_long_string(), format!("{}\n  nope: 1\n--^^^^", e));
}

#[logfn]
#[rstest]
fn test_pretty_unknown_enum(_runner: TestRunner) {
    let text = "{ enumValue: DIVIDE enumMap: { ADD: \"plus\" DIVIDE: \"div\" } }";
    let m = read(&PrettySerializer::default(), text, &CONTAINERS).expect("lenient");
    assert!(!m.has(9));
    assert_eq!(m.get(14), Some(&Value::Map(vec![(op("ADD").into(), "plus".into())])));
    let strict = PrettySerializer::new(PrettyConfig { strict: true, ..Default::default() });
    let e = tokenizer_error(read(&strict, text, &CONTAINERS).expect_err("strict"));
    assert!(e.message.contains("DIVIDE"), "{}", e);
}

#[logfn]
#[rstest]
fn test_pretty_separators_and_comments(_runner: TestRunner) {
    let text = r#"
# leading comment
{
  integerList: [1; 2, 3,]  # trailing comment
  stringMap: { "a": 1, "b": 2; },
  compactValue: { name: "x"; id: 1 };
}"#;
    let m = read(&PrettySerializer::default(), text, &CONTAINERS).expect("deserialize");
    assert_eq!(m.get(11), Some(&Value::List(vec![1.into(), 2.into(), 3.into()])));
    assert_eq!(m.get(13).and_then(Value::as_entries).map(|e| e.len()), Some(2));
    assert_eq!(m.get(10), Some(&Value::Message(compact("x", 1))));
}

#[logfn]
#[rstest]
fn test_pretty_repeated_list_entries(_runner: TestRunner) {
    let s = PrettySerializer::new(PrettyConfig {
        repeated_list_entries: true,
        ..PrettyConfig::compact()
    });
    let mut b = Message::builder(&CONTAINERS);
    b.set(11, Value::List(vec![1.into(), 2.into()]))
        .set(18, Value::List(vec![Value::List(vec![3.into()])]));
    let m = b.build();
    let text = write(&s, &m);
    assert_eq!(text, "{integerList:1,integerList:2,nestedList:[[3]]}");
    assert_eq!(read(&s, &text, &CONTAINERS).expect("deserialize"), m);

    // both forms accepted by any configuration
    let text = "{ integerList: 1 integerList: [2] integerList: 3 }";
    let mixed = read(&PrettySerializer::default(), text, &CONTAINERS).expect("deserialize");
    assert_eq!(mixed.get(11), Some(&Value::List(vec![1.into(), 2.into(), 3.into()])));
}

#[logfn]
#[rstest]
fn test_pretty_unterminated(_runner: TestRunner) {
    let err = read(&PrettySerializer::default(), "{\n  integerValue: 4\n", &CONTAINERS);
    let e = tokenizer_error(err.expect_err("eof"));
    assert!(e.message.contains("end of file"), "{}", e);
    let err = read(&PrettySerializer::default(), "integerValue: 4", &CONTAINERS);
    let e = tokenizer_error(err.expect_err("no brace"));
    assert!(e.message.contains("Expected message start"), "{}", e);
}

#[logfn]
#[rstest]
fn test_pretty_strict_required(_runner: TestRunner) {
    let strict = PrettySerializer::new(PrettyConfig { strict: true, ..Default::default() });
    let err = read(&strict, "{ name: \"x\" }", &REQUIRED).expect_err("missing");
    assert!(matches!(err, SerializerError::MissingRequired { .. }), "{:?}", err);
    assert!(read(&PrettySerializer::default(), "{ name: \"x\" }", &REQUIRED).is_ok());
}

#[logfn]
#[rstest]
fn test_pretty_message_stream(_runner: TestRunner) {
    let s = PrettySerializer::default();
    let mut buf = s.to_vec(&simple()).expect("serialize");
    buf.push(b'\n');
    buf.extend(s.to_vec(&compact("next", 2)).expect("serialize"));
    let mut input: &[u8] = &buf;
    assert_eq!(s.deserialize(&mut input, &SIMPLE).expect("first"), simple());
    assert_eq!(s.deserialize(&mut input, &COMPACT).expect("second"), compact("next", 2));
    assert!(input.is_empty());
}

#[logfn]
#[rstest]
fn test_pretty_non_finite_double(_runner: TestRunner) {
    let mut b = Message::builder(&CONTAINERS);
    b.set(6, f64::NAN);
    assert!(PrettySerializer::default().to_vec(&b.build()).is_err());
}

#[logfn]
#[rstest]
fn test_pretty_call(_runner: TestRunner) {
    let s = PrettySerializer::default();
    let call = ServiceCall::new("calculate", CallType::Call, 44, calculate("ADD", 1, 2));
    let bytes = s.call_to_vec(&call).expect("serialize");
    assert_eq!(
        String::from_utf8_lossy(&bytes),
        "44: CALL calculate({\n  op: ADD\n  a: 1\n  b: 2\n})\n"
    );
    assert_eq!(s.call_from_slice(&bytes, &CALCULATOR).expect("deserialize"), call);

    let lower = s
        .call_from_slice(b"44: call calculate({ op: ADD, a: 1, b: 2 })", &CALCULATOR)
        .expect("lower case call type");
    assert_eq!(lower, call);
}

#[logfn]
#[rstest]
fn test_pretty_call_errors(_runner: TestRunner) {
    let s = PrettySerializer::default();
    let err = s.call_from_slice(b"7: CALL divide({})", &CALCULATOR).expect_err("unknown method");
    assert_eq!(err.exception_type(), ApplicationExceptionType::UnknownMethod);
    assert_eq!(err.method_name(), Some("divide"));
    assert_eq!(err.sequence(), Some(7));
    assert_eq!(err.call_type(), Some(CallType::Call));

    let err = s.call_from_slice(b"7: SEND calculate({})", &CALCULATOR).expect_err("call type");
    assert_eq!(err.exception_type(), ApplicationExceptionType::InvalidMessageType);

    let err = s
        .call_from_slice(b"7: CALL calculate({ a: 1 }", &CALCULATOR)
        .expect_err("unterminated");
    assert_eq!(err.exception_type(), ApplicationExceptionType::ProtocolError);
    assert_eq!(err.method_name(), Some("calculate"));
}
