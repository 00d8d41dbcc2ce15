use super::{CountingWriter, Serializer, check_depth, prealloc};
use crate::descriptor::{Descriptor, MessageDescriptor};
use crate::error::{CallContext, Result, SerializerError};
use crate::message::Message;
use crate::service::{
    ApplicationException, ApplicationExceptionType, CallType, ServiceCall, ServiceDescriptor,
};
use crate::value::Value;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub const BINARY_MIME_TYPE: &str = "application/vnd.apache.thrift.binary";
pub const THRIFT_MIME_TYPE: &str = "application/x-thrift";

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const MAX_METHOD_NAME_LEN: i32 = 255;

/// Wire type tags.
mod wire {
    pub const STOP: u8 = 0;
    pub const VOID: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const I16: u8 = 6;
    pub const I32: u8 = 8;
    pub const I64: u8 = 10;
    pub const STRING: u8 = 11;
    pub const STRUCT: u8 = 12;
    pub const MAP: u8 = 13;
    pub const SET: u8 = 14;
    pub const LIST: u8 = 15;

    pub fn name(tag: u8) -> &'static str {
        match tag {
            STOP => "stop",
            VOID => "void",
            BOOL => "bool",
            BYTE => "byte",
            DOUBLE => "double",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            STRING => "string",
            STRUCT => "struct",
            MAP => "map",
            SET => "set",
            LIST => "list",
            _ => "unknown",
        }
    }
}

fn wire_tag(descriptor: &Descriptor) -> u8 {
    match descriptor {
        Descriptor::Void => wire::VOID,
        Descriptor::Bool => wire::BOOL,
        Descriptor::Byte => wire::BYTE,
        Descriptor::I16 => wire::I16,
        Descriptor::I32 | Descriptor::Enum(_) => wire::I32,
        Descriptor::I64 => wire::I64,
        Descriptor::Double => wire::DOUBLE,
        Descriptor::String | Descriptor::Binary => wire::STRING,
        Descriptor::Message(_) => wire::STRUCT,
        Descriptor::Map(..) => wire::MAP,
        Descriptor::Set(_) => wire::SET,
        Descriptor::List(_) => wire::LIST,
    }
}

#[derive(Debug, Clone)]
pub struct BinaryConfig {
    /// Fail on unknown fields, unknown enum values, mismatched wire types and missing
    /// required fields, instead of skipping them.
    ///
    /// default: false
    pub strict: bool,

    /// Write the versioned service call header. The legacy form has no version and
    /// is only read when not strict.
    ///
    /// default: true
    pub versioned: bool,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self { strict: false, versioned: true }
    }
}

/// The thrift binary protocol.
///
/// Each field is written as a one byte type tag, a big-endian i16 field id and the value.
/// A message ends with a zero byte.
#[derive(Debug, Clone, Default)]
pub struct BinarySerializer {
    config: BinaryConfig,
}

impl BinarySerializer {
    #[inline]
    pub fn new(config: BinaryConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn strict() -> Self {
        Self::new(BinaryConfig { strict: true, ..Default::default() })
    }

    #[inline]
    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }

    fn read_call(
        &self, input: &mut dyn Read, service: &ServiceDescriptor, ctx: &mut CallContext,
    ) -> Result<ServiceCall> {
        let header = read_i32(input)?;
        let type_key;
        if header <= 0 {
            let version = header as u32 & VERSION_MASK;
            if version != VERSION_1 {
                return Err(SerializerError::application(
                    ApplicationExceptionType::InvalidProtocol,
                    format!("bad protocol version: {:04x}", version >> 16),
                ));
            }
            type_key = (header & 0xff) as u8;
            let name_len = read_i32(input)?;
            check_method_name_len(name_len)?;
            ctx.method = Some(read_method_name(input, name_len)?);
        } else {
            if self.config.strict {
                return Err(SerializerError::application(
                    ApplicationExceptionType::InvalidProtocol,
                    "missing protocol version",
                ));
            }
            check_method_name_len(header)?;
            ctx.method = Some(read_method_name(input, header)?);
            type_key = read_u8(input)?;
        }
        ctx.sequence = read_i32(input)?;
        let call_type = CallType::from_id(type_key as i64).ok_or_else(|| {
            SerializerError::application(
                ApplicationExceptionType::InvalidMessageType,
                format!("invalid call type {}", type_key),
            )
        })?;
        ctx.call_type = Some(call_type);
        let method = ctx.method.clone().unwrap_or_default();
        trace!("binary call {} {} seq {}", call_type, method, ctx.sequence);

        let descriptor = if call_type == CallType::Exception {
            ApplicationException::descriptor().clone()
        } else {
            let m = service.find_method(&method).ok_or_else(|| {
                SerializerError::application(
                    ApplicationExceptionType::UnknownMethod,
                    format!("no such method {} on {}", method, service.name()),
                )
            })?;
            service.payload_descriptor(m, call_type).ok_or_else(|| {
                SerializerError::application(
                    ApplicationExceptionType::InvalidMessageType,
                    format!("no response type for {} on {}", method, service.name()),
                )
            })?
        };
        let message = self.read_message(input, &descriptor, 0)?;
        Ok(ServiceCall { method, call_type, sequence: ctx.sequence, message })
    }

    fn read_message(
        &self,
        input: &mut dyn Read,
        descriptor: &Arc<MessageDescriptor>,
        depth: usize,
    ) -> Result<Message> {
        check_depth(depth)?;
        let mut builder = Message::builder(descriptor);
        loop {
            let tag = read_u8(input)?;
            if tag == wire::STOP {
                break;
            }
            let id = read_i16(input)?;
            let field = if id > 0 { descriptor.field_by_id(id as u16) } else { None };
            let Some(field) = field else {
                if self.config.strict {
                    return Err(SerializerError::UnknownField {
                        message: descriptor.name().to_string(),
                        field: id.to_string(),
                    });
                }
                debug!("skip unknown field {} ({}) in {}", id, wire::name(tag), descriptor.name());
                skip_value(input, tag, depth + 1)?;
                continue;
            };
            let expected = wire_tag(field.descriptor());
            if tag != expected {
                if self.config.strict {
                    return Err(SerializerError::TypeMismatch {
                        context: format!("{}.{}", descriptor.name(), field.name()),
                        expected: wire::name(expected).to_string(),
                        actual: wire::name(tag).to_string(),
                    });
                }
                debug!(
                    "skip field {}.{} with wire type {}, expected {}",
                    descriptor.name(),
                    field.name(),
                    wire::name(tag),
                    wire::name(expected)
                );
                skip_value(input, tag, depth + 1)?;
                continue;
            }
            if let Some(value) = self.read_value(input, field.descriptor(), depth + 1)? {
                builder.set(field.id(), value);
            }
        }
        if self.config.strict {
            builder.validate()?;
        }
        Ok(builder.build())
    }

    /// Returns None when the value was read but dropped as unknown.
    fn read_value(
        &self,
        input: &mut dyn Read,
        descriptor: &Descriptor,
        depth: usize,
    ) -> Result<Option<Value>> {
        let value = match descriptor {
            Descriptor::Void => Value::Void,
            Descriptor::Bool => Value::Bool(read_u8(input)? != 0),
            Descriptor::Byte => Value::Byte(read_u8(input)? as i8),
            Descriptor::I16 => Value::I16(read_i16(input)?),
            Descriptor::I32 => Value::I32(read_i32(input)?),
            Descriptor::I64 => Value::I64(read_i64(input)?),
            Descriptor::Double => Value::Double(f64::from_bits(read_i64(input)? as u64)),
            Descriptor::String => {
                let bytes = read_bytes(input)?;
                Value::String(
                    String::from_utf8(bytes)
                        .map_err(|e| {
                            SerializerError::protocol(format!("invalid utf-8 string: {}", e))
                        })?,
                )
            }
            Descriptor::Binary => Value::Binary(read_bytes(input)?),
            Descriptor::Enum(e) => {
                let id = read_i32(input)?;
                match e.find_by_id(id) {
                    Some(v) => Value::Enum(v),
                    None if self.config.strict => {
                        return Err(SerializerError::UnknownEnumValue {
                            name: e.name().to_string(),
                            value: id.to_string(),
                        });
                    }
                    None => {
                        debug!("drop unknown {} value {}", e.name(), id);
                        return Ok(None);
                    }
                }
            }
            Descriptor::Message(m) => Value::Message(self.read_message(input, m, depth)?),
            Descriptor::List(item) | Descriptor::Set(item) => {
                let elem_tag = read_u8(input)?;
                let count = read_count(input)?;
                if !self.check_elem_tag(descriptor, item, elem_tag)? {
                    for _ in 0..count {
                        skip_value(input, elem_tag, depth + 1)?;
                    }
                    return Ok(None);
                }
                let mut items = prealloc(count);
                for _ in 0..count {
                    if let Some(v) = self.read_value(input, item, depth + 1)? {
                        items.push(v);
                    }
                }
                if matches!(descriptor, Descriptor::Set(_)) {
                    Value::Set(items)
                } else {
                    Value::List(items)
                }
            }
            Descriptor::Map(k, v) => {
                let key_tag = read_u8(input)?;
                let value_tag = read_u8(input)?;
                let count = read_count(input)?;
                let key_ok = self.check_elem_tag(descriptor, k, key_tag)?;
                if !(key_ok && self.check_elem_tag(descriptor, v, value_tag)?) {
                    for _ in 0..count {
                        skip_value(input, key_tag, depth + 1)?;
                        skip_value(input, value_tag, depth + 1)?;
                    }
                    return Ok(None);
                }
                let mut entries = prealloc(count);
                for _ in 0..count {
                    let key = self.read_value(input, k, depth + 1)?;
                    let value = self.read_value(input, v, depth + 1)?;
                    if let (Some(key), Some(value)) = (key, value) {
                        entries.push((key, value));
                    }
                }
                Value::Map(entries)
            }
        };
        Ok(Some(value))
    }

    /// Ok(false) when a mismatched container element type is to be skipped.
    fn check_elem_tag(&self, container: &Descriptor, item: &Descriptor, tag: u8) -> Result<bool> {
        let expected = wire_tag(item);
        if tag == expected {
            return Ok(true);
        }
        if self.config.strict {
            return Err(SerializerError::TypeMismatch {
                context: container.name(),
                expected: wire::name(expected).to_string(),
                actual: wire::name(tag).to_string(),
            });
        }
        debug!("skip {} with element wire type {}", container.name(), wire::name(tag));
        Ok(false)
    }
}

impl Serializer for BinarySerializer {
    fn serialize(&self, out: &mut dyn Write, message: &Message) -> Result<usize> {
        let mut w = CountingWriter::new(out);
        write_message(&mut w, message)?;
        Ok(w.count())
    }

    fn serialize_call(&self, out: &mut dyn Write, call: &ServiceCall) -> Result<usize> {
        let mut w = CountingWriter::new(out);
        let name = call.method.as_bytes();
        if self.config.versioned {
            w.write_all(&((VERSION_1 | call.call_type.id() as u32) as i32).to_be_bytes())?;
            w.write_all(&(name.len() as i32).to_be_bytes())?;
            w.write_all(name)?;
        } else {
            w.write_all(&(name.len() as i32).to_be_bytes())?;
            w.write_all(name)?;
            w.write_all(&[call.call_type.id()])?;
        }
        w.write_all(&call.sequence.to_be_bytes())?;
        write_message(&mut w, &call.message)?;
        trace!(
            "binary call {} {} seq {}: {} bytes",
            call.call_type,
            call.method,
            call.sequence,
            w.count()
        );
        Ok(w.count())
    }

    fn deserialize(
        &self,
        input: &mut dyn Read,
        descriptor: &Arc<MessageDescriptor>,
    ) -> Result<Message> {
        self.read_message(input, descriptor, 0)
    }

    fn deserialize_call(
        &self,
        input: &mut dyn Read,
        service: &ServiceDescriptor,
    ) -> Result<ServiceCall> {
        let mut ctx = CallContext::default();
        match self.read_call(input, service, &mut ctx) {
            Ok(call) => Ok(call),
            Err(e) => Err(e.with_call(ctx)),
        }
    }

    #[inline]
    fn is_binary_protocol(&self) -> bool {
        true
    }

    #[inline]
    fn mime_type(&self) -> &'static str {
        BINARY_MIME_TYPE
    }
}

fn write_message(w: &mut dyn Write, message: &Message) -> Result<()> {
    for (field, value) in message.present_fields() {
        w.write_all(&[wire_tag(field.descriptor())])?;
        w.write_all(&(field.id() as i16).to_be_bytes())?;
        write_value(w, field.descriptor(), value)?;
    }
    w.write_all(&[wire::STOP])?;
    Ok(())
}

fn write_len(w: &mut dyn Write, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| SerializerError::protocol(format!("length {} too large", len)))?;
    w.write_all(&len.to_be_bytes())?;
    Ok(())
}

fn write_value(w: &mut dyn Write, descriptor: &Descriptor, value: &Value) -> Result<()> {
    match (descriptor, value) {
        (Descriptor::Void, _) => {}
        (Descriptor::Bool, Value::Bool(b)) => w.write_all(&[*b as u8])?,
        (Descriptor::Byte, Value::Byte(v)) => w.write_all(&[*v as u8])?,
        (Descriptor::I16, Value::I16(v)) => w.write_all(&v.to_be_bytes())?,
        (Descriptor::I32, Value::I32(v)) => w.write_all(&v.to_be_bytes())?,
        (Descriptor::I64, Value::I64(v)) => w.write_all(&v.to_be_bytes())?,
        (Descriptor::Double, Value::Double(v)) => w.write_all(&v.to_bits().to_be_bytes())?,
        (Descriptor::String, Value::String(s)) => {
            write_len(w, s.len())?;
            w.write_all(s.as_bytes())?;
        }
        (Descriptor::Binary, Value::Binary(b)) => {
            write_len(w, b.len())?;
            w.write_all(b)?;
        }
        (Descriptor::Enum(_), Value::Enum(v)) => w.write_all(&v.id.to_be_bytes())?,
        (Descriptor::Message(_), Value::Message(m)) => write_message(w, m)?,
        (Descriptor::List(item), Value::List(items))
        | (Descriptor::Set(item), Value::Set(items)) => {
            w.write_all(&[wire_tag(item)])?;
            write_len(w, items.len())?;
            for v in items {
                write_value(w, item, v)?;
            }
        }
        (Descriptor::Map(k, v), Value::Map(entries)) => {
            w.write_all(&[wire_tag(k), wire_tag(v)])?;
            write_len(w, entries.len())?;
            for (key, value) in entries {
                write_value(w, k, key)?;
                write_value(w, v, value)?;
            }
        }
        (d, v) => {
            return Err(SerializerError::TypeMismatch {
                context: "write".to_string(),
                expected: d.name(),
                actual: format!("{:?}", v),
            });
        }
    }
    Ok(())
}

/// Consume one value of the given wire type without interpreting it.
fn skip_value(input: &mut dyn Read, tag: u8, depth: usize) -> Result<()> {
    check_depth(depth)?;
    match tag {
        wire::VOID => {}
        wire::BOOL | wire::BYTE => skip_bytes(input, 1)?,
        wire::I16 => skip_bytes(input, 2)?,
        wire::I32 => skip_bytes(input, 4)?,
        wire::I64 | wire::DOUBLE => skip_bytes(input, 8)?,
        wire::STRING => {
            let len = read_count(input)?;
            skip_bytes(input, len as u64)?;
        }
        wire::STRUCT => loop {
            let t = read_u8(input)?;
            if t == wire::STOP {
                break;
            }
            read_i16(input)?;
            skip_value(input, t, depth + 1)?;
        },
        wire::MAP => {
            let key_tag = read_u8(input)?;
            let value_tag = read_u8(input)?;
            for _ in 0..read_count(input)? {
                skip_value(input, key_tag, depth + 1)?;
                skip_value(input, value_tag, depth + 1)?;
            }
        }
        wire::SET | wire::LIST => {
            let elem_tag = read_u8(input)?;
            for _ in 0..read_count(input)? {
                skip_value(input, elem_tag, depth + 1)?;
            }
        }
        t => return Err(SerializerError::protocol(format!("unknown data type: {}", t))),
    }
    Ok(())
}

fn skip_bytes(input: &mut dyn Read, len: u64) -> Result<()> {
    let n = io::copy(&mut (&mut *input).take(len), &mut io::sink())?;
    if n < len {
        return Err(SerializerError::unexpected_eof("skipped value"));
    }
    Ok(())
}

fn check_method_name_len(len: i32) -> Result<()> {
    if !(1..=MAX_METHOD_NAME_LEN).contains(&len) {
        return Err(SerializerError::application(
            ApplicationExceptionType::ProtocolError,
            format!("invalid method name length {}", len),
        ));
    }
    Ok(())
}

fn read_method_name(input: &mut dyn Read, len: i32) -> Result<String> {
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| SerializerError::protocol("method name is not utf-8"))
}

#[inline]
fn read_u8(input: &mut dyn Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

#[inline]
fn read_i16(input: &mut dyn Read) -> Result<i16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

#[inline]
fn read_i32(input: &mut dyn Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

#[inline]
fn read_i64(input: &mut dyn Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_count(input: &mut dyn Read) -> Result<usize> {
    let n = read_i32(input)?;
    usize::try_from(n).map_err(|_| SerializerError::protocol(format!("negative length {}", n)))
}

/// Reads into a buffer grown as data arrives, so a bogus length fails on end of stream.
fn read_bytes(input: &mut dyn Read) -> Result<Vec<u8>> {
    let len = read_count(input)?;
    let mut buf = prealloc(len);
    (&mut *input).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(SerializerError::unexpected_eof("binary"));
    }
    Ok(buf)
}
