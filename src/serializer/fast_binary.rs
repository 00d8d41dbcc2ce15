use super::varint::{read_varint, read_zigzag, write_varint, write_zigzag};
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

pub const FAST_BINARY_MIME_TYPE: &str = "application/vnd.morimekta.providence.binary";

const MAX_METHOD_NAME_LEN: u64 = 255;

/// The 3-bit wire types embedded in each tag.
mod wire {
    pub const NONE: u8 = 0;
    pub const TRUE: u8 = 1;
    pub const VARINT: u8 = 2;
    pub const FIXED_64: u8 = 3;
    pub const BINARY: u8 = 4;
    pub const MESSAGE: u8 = 5;
    pub const COLLECTION: u8 = 6;

    pub fn name(t: u8) -> &'static str {
        match t {
            NONE => "none",
            TRUE => "true",
            VARINT => "varint",
            FIXED_64 => "fixed_64",
            BINARY => "binary",
            MESSAGE => "message",
            COLLECTION => "collection",
            _ => "unknown",
        }
    }
}

const LIST_ITEM_ID: u64 = 0;
const MAP_KEY_ID: u64 = 1;
const MAP_VALUE_ID: u64 = 2;

/// If a value with the wire type may be read under the descriptor.
fn accepts(descriptor: &Descriptor, wt: u8) -> bool {
    match descriptor {
        Descriptor::Bool => wt == wire::NONE || wt == wire::TRUE,
        Descriptor::Void => wt == wire::TRUE,
        Descriptor::Byte
        | Descriptor::I16
        | Descriptor::I32
        | Descriptor::I64
        | Descriptor::Enum(_) => wt == wire::VARINT,
        Descriptor::Double => wt == wire::FIXED_64,
        Descriptor::String | Descriptor::Binary => wt == wire::BINARY,
        Descriptor::Message(_) => wt == wire::MESSAGE,
        Descriptor::List(_) | Descriptor::Set(_) | Descriptor::Map(..) => wt == wire::COLLECTION,
    }
}

#[derive(Debug, Clone, Default)]
pub struct FastBinaryConfig {
    /// Fail on unknown fields, unknown enum values, mismatched wire types and missing
    /// required fields, instead of skipping them.
    ///
    /// default: false
    pub strict: bool,
}

/// A dense varint-tagged binary format.
///
/// Every value is prefixed by a varint tag `(id << 3) | wire_type`. Integers are zigzag
/// varints, booleans live in the tag itself.
#[derive(Debug, Clone, Default)]
pub struct FastBinarySerializer {
    config: FastBinaryConfig,
}

impl FastBinarySerializer {
    #[inline]
    pub fn new(config: FastBinaryConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn strict() -> Self {
        Self::new(FastBinaryConfig { strict: true })
    }

    fn read_call(
        &self, input: &mut dyn Read, service: &ServiceDescriptor, ctx: &mut CallContext,
    ) -> Result<ServiceCall> {
        let tag = read_varint(input)?;
        let len = tag >> 3;
        let type_key = (tag & 0x07) as u8;
        if len < 1 || len > MAX_METHOD_NAME_LEN {
            return Err(SerializerError::application(
                ApplicationExceptionType::ProtocolError,
                format!("invalid method name length {}", len),
            ));
        }
        let mut name = vec![0u8; len as usize];
        input.read_exact(&mut name)?;
        let method = String::from_utf8(name)
            .map_err(|_| SerializerError::protocol("method name is not utf-8"))?;
        ctx.method = Some(method.clone());
        let sequence = read_zigzag(input)?;
        ctx.sequence = i32::try_from(sequence)
            .map_err(|_| SerializerError::protocol(format!("sequence {} out of range", sequence)))?;
        let call_type = CallType::from_id(type_key as i64).ok_or_else(|| {
            SerializerError::application(
                ApplicationExceptionType::InvalidMessageType,
                format!("invalid call type {}", type_key),
            )
        })?;
        ctx.call_type = Some(call_type);
        trace!("fast binary call {} {} seq {}", call_type, method, ctx.sequence);

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
            let tag = read_varint(input)?;
            if tag == 0 {
                break;
            }
            let id = tag >> 3;
            let wt = (tag & 0x07) as u8;
            let field = u16::try_from(id).ok().and_then(|id| descriptor.field_by_id(id));
            let Some(field) = field else {
                if self.config.strict {
                    return Err(SerializerError::UnknownField {
                        message: descriptor.name().to_string(),
                        field: id.to_string(),
                    });
                }
                debug!("skip unknown field {} ({}) in {}", id, wire::name(wt), descriptor.name());
                skip_value(input, wt, depth + 1)?;
                continue;
            };
            if !self.check_wire_type(field.descriptor(), wt, field.name())? {
                skip_value(input, wt, depth + 1)?;
                continue;
            }
            if let Some(value) = self.read_value(input, wt, field.descriptor(), depth + 1)? {
                builder.set(field.id(), value);
            }
        }
        if self.config.strict {
            builder.validate()?;
        }
        Ok(builder.build())
    }

    /// Ok(false) when the value is to be skipped.
    fn check_wire_type(&self, descriptor: &Descriptor, wt: u8, context: &str) -> Result<bool> {
        if accepts(descriptor, wt) {
            return Ok(true);
        }
        if self.config.strict {
            return Err(SerializerError::TypeMismatch {
                context: context.to_string(),
                expected: descriptor.name(),
                actual: wire::name(wt).to_string(),
            });
        }
        debug!("skip {} with wire type {} for {}", context, wire::name(wt), descriptor.name());
        Ok(false)
    }

    fn read_value(
        &self,
        input: &mut dyn Read,
        wt: u8,
        descriptor: &Descriptor,
        depth: usize,
    ) -> Result<Option<Value>> {
        let value = match descriptor {
            Descriptor::Void => Value::Void,
            Descriptor::Bool => Value::Bool(wt == wire::TRUE),
            Descriptor::Byte => Value::Byte(read_ranged(input, "byte")?),
            Descriptor::I16 => Value::I16(read_ranged(input, "i16")?),
            Descriptor::I32 => Value::I32(read_ranged(input, "i32")?),
            Descriptor::I64 => Value::I64(read_zigzag(input)?),
            Descriptor::Double => {
                let mut buf = [0u8; 8];
                input.read_exact(&mut buf)?;
                Value::Double(f64::from_le_bytes(buf))
            }
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
                let id: i32 = read_ranged(input, "enum")?;
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
                let count = read_count(input)?;
                let mut items = prealloc(count);
                for _ in 0..count {
                    let inner = (read_varint(input)? & 0x07) as u8;
                    if !self.check_wire_type(item, inner, "collection item")? {
                        skip_value(input, inner, depth + 1)?;
                        continue;
                    }
                    if let Some(v) = self.read_value(input, inner, item, depth + 1)? {
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
                let count = read_count(input)?;
                if count % 2 != 0 {
                    return Err(SerializerError::protocol(format!("odd map item count {}", count)));
                }
                let mut entries = prealloc(count / 2);
                for _ in 0..count / 2 {
                    let key = self.read_item(input, k, "map key", depth + 1)?;
                    let value = self.read_item(input, v, "map value", depth + 1)?;
                    if let (Some(key), Some(value)) = (key, value) {
                        entries.push((key, value));
                    }
                }
                Value::Map(entries)
            }
        };
        Ok(Some(value))
    }

    fn read_item(
        &self,
        input: &mut dyn Read,
        descriptor: &Descriptor,
        context: &str,
        depth: usize,
    ) -> Result<Option<Value>> {
        let wt = (read_varint(input)? & 0x07) as u8;
        if !self.check_wire_type(descriptor, wt, context)? {
            skip_value(input, wt, depth)?;
            return Ok(None);
        }
        self.read_value(input, wt, descriptor, depth)
    }
}

impl Serializer for FastBinarySerializer {
    fn serialize(&self, out: &mut dyn Write, message: &Message) -> Result<usize> {
        let mut w = CountingWriter::new(out);
        write_message(&mut w, message)?;
        Ok(w.count())
    }

    fn serialize_call(&self, out: &mut dyn Write, call: &ServiceCall) -> Result<usize> {
        let mut w = CountingWriter::new(out);
        let name = call.method.as_bytes();
        write_varint(&mut w, ((name.len() as u64) << 3) | call.call_type.id() as u64)?;
        w.write_all(name)?;
        write_zigzag(&mut w, call.sequence as i64)?;
        write_message(&mut w, &call.message)?;
        trace!(
            "fast binary call {} {} seq {}: {} bytes",
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
        FAST_BINARY_MIME_TYPE
    }
}

fn write_message(w: &mut dyn Write, message: &Message) -> Result<()> {
    for (field, value) in message.present_fields() {
        write_item(w, field.id() as u64, field.descriptor(), value)?;
    }
    write_varint(w, 0)?;
    Ok(())
}

#[inline]
fn write_tag(w: &mut dyn Write, id: u64, wt: u8) -> io::Result<usize> {
    write_varint(w, (id << 3) | wt as u64)
}

fn write_bytes(w: &mut dyn Write, id: u64, b: &[u8]) -> Result<()> {
    write_tag(w, id, wire::BINARY)?;
    write_varint(w, b.len() as u64)?;
    w.write_all(b)?;
    Ok(())
}

/// Write the tag carrying `id` and the value.
fn write_item(w: &mut dyn Write, id: u64, descriptor: &Descriptor, value: &Value) -> Result<()> {
    match (descriptor, value) {
        (Descriptor::Void, _) => {
            write_tag(w, id, wire::TRUE)?;
        }
        (Descriptor::Bool, Value::Bool(b)) => {
            write_tag(w, id, if *b { wire::TRUE } else { wire::NONE })?;
        }
        (Descriptor::Byte, Value::Byte(v)) => {
            write_tag(w, id, wire::VARINT)?;
            write_zigzag(w, *v as i64)?;
        }
        (Descriptor::I16, Value::I16(v)) => {
            write_tag(w, id, wire::VARINT)?;
            write_zigzag(w, *v as i64)?;
        }
        (Descriptor::I32, Value::I32(v)) => {
            write_tag(w, id, wire::VARINT)?;
            write_zigzag(w, *v as i64)?;
        }
        (Descriptor::I64, Value::I64(v)) => {
            write_tag(w, id, wire::VARINT)?;
            write_zigzag(w, *v)?;
        }
        (Descriptor::Enum(_), Value::Enum(v)) => {
            write_tag(w, id, wire::VARINT)?;
            write_zigzag(w, v.id as i64)?;
        }
        (Descriptor::Double, Value::Double(v)) => {
            write_tag(w, id, wire::FIXED_64)?;
            w.write_all(&v.to_le_bytes())?;
        }
        (Descriptor::String, Value::String(s)) => write_bytes(w, id, s.as_bytes())?,
        (Descriptor::Binary, Value::Binary(b)) => write_bytes(w, id, b)?,
        (Descriptor::Message(_), Value::Message(m)) => {
            write_tag(w, id, wire::MESSAGE)?;
            write_message(w, m)?;
        }
        (Descriptor::List(item), Value::List(items))
        | (Descriptor::Set(item), Value::Set(items)) => {
            write_tag(w, id, wire::COLLECTION)?;
            write_varint(w, items.len() as u64)?;
            for v in items {
                write_item(w, LIST_ITEM_ID, item, v)?;
            }
        }
        (Descriptor::Map(k, v), Value::Map(entries)) => {
            write_tag(w, id, wire::COLLECTION)?;
            write_varint(w, entries.len() as u64 * 2)?;
            for (key, value) in entries {
                write_item(w, MAP_KEY_ID, k, key)?;
                write_item(w, MAP_VALUE_ID, v, value)?;
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

/// Consume one value by its wire type. Varints are discarded without knowing their width.
fn skip_value(input: &mut dyn Read, wt: u8, depth: usize) -> Result<()> {
    check_depth(depth)?;
    match wt {
        wire::NONE | wire::TRUE => {}
        wire::VARINT => {
            read_varint(input)?;
        }
        wire::FIXED_64 => skip_bytes(input, 8)?,
        wire::BINARY => {
            let len = read_varint(input)?;
            skip_bytes(input, len)?;
        }
        wire::MESSAGE => loop {
            let tag = read_varint(input)?;
            if tag == 0 {
                break;
            }
            skip_value(input, (tag & 0x07) as u8, depth + 1)?;
        },
        wire::COLLECTION => {
            let count = read_varint(input)?;
            for _ in 0..count {
                let tag = read_varint(input)?;
                skip_value(input, (tag & 0x07) as u8, depth + 1)?;
            }
        }
        t => return Err(SerializerError::protocol(format!("unknown wire type {}", t))),
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

/// Read a zigzag varint and check that it fits the target width.
fn read_ranged<T: TryFrom<i64>>(input: &mut dyn Read, what: &str) -> Result<T> {
    let v = read_zigzag(input)?;
    T::try_from(v)
        .map_err(|_| SerializerError::protocol(format!("{} value out of range: {}", what, v)))
}

fn read_count(input: &mut dyn Read) -> Result<usize> {
    let n = read_varint(input)?;
    usize::try_from(n).map_err(|_| SerializerError::protocol(format!("invalid count {}", n)))
}

fn read_bytes(input: &mut dyn Read) -> Result<Vec<u8>> {
    let len = read_count(input)?;
    let mut buf = prealloc(len);
    (&mut *input).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(SerializerError::unexpected_eof("binary"));
    }
    Ok(buf)
}
