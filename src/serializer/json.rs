use super::{CountingWriter, Serializer};
use crate::descriptor::{Descriptor, MessageDescriptor};
use crate::error::{CallContext, Result, SerializerError};
use crate::message::Message;
use crate::service::{
    ApplicationException, ApplicationExceptionType, CallType, ServiceCall, ServiceDescriptor,
};
use crate::value::Value;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use serde_json::{Map, Number, Value as Json};
use std::io::{Read, Write};
use std::sync::Arc;

pub const JSON_MIME_TYPE: &str = "application/vnd.morimekta.providence.json";
pub const NAMED_JSON_MIME_TYPE: &str = "application/json";

/// How fields and enum values are identified in JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    /// The numeric field id or enum value id.
    Id,
    Name,
}

#[derive(Debug, Clone)]
pub struct JsonConfig {
    /// Fail on unknown fields, unknown enum values, null container entries and missing
    /// required fields, instead of skipping them.
    ///
    /// default: false
    pub strict: bool,

    /// Object keys of structs.
    ///
    /// default: IdType::Id
    pub field_ids: IdType,

    /// Enum values and the service call type.
    ///
    /// default: IdType::Id
    pub enum_values: IdType,

    /// Indent the output.
    ///
    /// default: false
    pub pretty: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self { strict: false, field_ids: IdType::Id, enum_values: IdType::Id, pretty: false }
    }
}

impl JsonConfig {
    /// Field names and enum names, as plain JSON consumers expect.
    pub fn named() -> Self {
        Self { field_ids: IdType::Name, enum_values: IdType::Name, ..Default::default() }
    }
}

fn json_kind(j: &Json) -> &'static str {
    match j {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(context: &str, descriptor: &Descriptor, j: &Json) -> SerializerError {
    SerializerError::TypeMismatch {
        context: context.to_string(),
        expected: descriptor.name(),
        actual: format!("{} {}", json_kind(j), j),
    }
}

fn decode_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|e| SerializerError::protocol(format!("invalid base64: {}", e)))
}

/// Type-safe JSON.
///
/// Structs are objects keyed by field id or name. A compactible struct with fields
/// `1..=n` set is written as an array instead.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    config: JsonConfig,
}

impl JsonSerializer {
    #[inline]
    pub fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn strict() -> Self {
        Self::new(JsonConfig { strict: true, ..Default::default() })
    }

    #[inline]
    pub fn named() -> Self {
        Self::new(JsonConfig::named())
    }

    #[inline]
    pub fn config(&self) -> &JsonConfig {
        &self.config
    }

    fn write_json(&self, out: &mut dyn Write, json: &Json) -> Result<usize> {
        let mut w = CountingWriter::new(out);
        if self.config.pretty {
            serde_json::to_writer_pretty(&mut w, json)?;
        } else {
            serde_json::to_writer(&mut w, json)?;
        }
        Ok(w.count())
    }

    fn message_to_json(&self, message: &Message) -> Result<Json> {
        if message.is_compact() {
            let mut items = Vec::with_capacity(message.present_count());
            for (field, value) in message.present_fields() {
                items.push(self.value_to_json(field.descriptor(), value)?);
            }
            return Ok(Json::Array(items));
        }
        let mut map = Map::new();
        for (field, value) in message.present_fields() {
            let key = match self.config.field_ids {
                IdType::Id => field.id().to_string(),
                IdType::Name => field.name().to_string(),
            };
            map.insert(key, self.value_to_json(field.descriptor(), value)?);
        }
        Ok(Json::Object(map))
    }

    fn value_to_json(&self, descriptor: &Descriptor, value: &Value) -> Result<Json> {
        let json = match (descriptor, value) {
            (Descriptor::Void, _) => Json::Bool(true),
            (Descriptor::Bool, Value::Bool(b)) => Json::Bool(*b),
            (Descriptor::Byte, Value::Byte(v)) => Json::from(*v),
            (Descriptor::I16, Value::I16(v)) => Json::from(*v),
            (Descriptor::I32, Value::I32(v)) => Json::from(*v),
            (Descriptor::I64, Value::I64(v)) => Json::from(*v),
            (Descriptor::Double, Value::Double(d)) => Json::Number(
                Number::from_f64(*d)
                    .ok_or_else(|| {
                        SerializerError::protocol(format!("cannot write {} as json", d))
                    })?,
            ),
            (Descriptor::String, Value::String(s)) => Json::String(s.clone()),
            (Descriptor::Binary, Value::Binary(b)) => Json::String(STANDARD.encode(b)),
            (Descriptor::Enum(_), Value::Enum(v)) => match self.config.enum_values {
                IdType::Id => Json::from(v.id),
                IdType::Name => Json::String(v.name.to_string()),
            },
            (Descriptor::Message(_), Value::Message(m)) => self.message_to_json(m)?,
            (Descriptor::List(item), Value::List(items))
            | (Descriptor::Set(item), Value::Set(items)) => {
                let mut array = Vec::with_capacity(items.len());
                for v in items {
                    array.push(self.value_to_json(item, v)?);
                }
                Json::Array(array)
            }
            (Descriptor::Map(k, v), Value::Map(entries)) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(self.map_key(k, key)?, self.value_to_json(v, value)?);
                }
                Json::Object(map)
            }
            (d, v) => {
                return Err(SerializerError::TypeMismatch {
                    context: "write".to_string(),
                    expected: d.name(),
                    actual: format!("{:?}", v),
                });
            }
        };
        Ok(json)
    }

    /// JSON object keys are always strings, so every key type has a string form.
    fn map_key(&self, descriptor: &Descriptor, key: &Value) -> Result<String> {
        let s = match (descriptor, key) {
            (Descriptor::String, Value::String(s)) => s.clone(),
            (Descriptor::Bool, Value::Bool(b)) => b.to_string(),
            (Descriptor::Byte, Value::Byte(v)) => v.to_string(),
            (Descriptor::I16, Value::I16(v)) => v.to_string(),
            (Descriptor::I32, Value::I32(v)) => v.to_string(),
            (Descriptor::I64, Value::I64(v)) => v.to_string(),
            (Descriptor::Binary, Value::Binary(b)) => STANDARD.encode(b),
            (Descriptor::Double, Value::Double(_))
            | (Descriptor::Enum(_), Value::Enum(_)) => match self.value_to_json(descriptor, key)? {
                Json::String(s) => s,
                j => j.to_string(),
            },
            (Descriptor::Message(d), Value::Message(m)) => {
                if !d.is_simple() {
                    return Err(SerializerError::protocol(format!(
                        "{} is not a simple message, and cannot be a map key",
                        d.name()
                    )));
                }
                self.message_to_json(m)?.to_string()
            }
            (d, _) => {
                return Err(SerializerError::protocol(format!("invalid map key type {}", d.name())));
            }
        };
        Ok(s)
    }

    fn read_json(&self, input: &mut dyn Read) -> Result<Json> {
        let mut stream = serde_json::Deserializer::from_reader(input).into_iter::<Json>();
        match stream.next() {
            Some(json) => Ok(json?),
            None => Err(SerializerError::unexpected_eof("json")),
        }
    }

    fn message_from_json(
        &self,
        json: &Json,
        descriptor: &Arc<MessageDescriptor>,
    ) -> Result<Message> {
        let mut builder = Message::builder(descriptor);
        match json {
            Json::Object(map) => {
                for (key, j) in map {
                    let field = match key.parse::<u16>() {
                        Ok(id) => descriptor.field_by_id(id),
                        Err(_) => descriptor.field_by_name(key),
                    };
                    let Some(field) = field else {
                        if self.config.strict {
                            return Err(SerializerError::UnknownField {
                                message: descriptor.name().to_string(),
                                field: key.clone(),
                            });
                        }
                        debug!("skip unknown field {} in {}", key, descriptor.name());
                        continue;
                    };
                    if j.is_null() {
                        continue;
                    }
                    if let Some(v) = self.value_from_json(j, field.descriptor(), field.name())? {
                        builder.set(field.id(), v);
                    }
                }
            }
            Json::Array(items) if descriptor.is_compactible() => {
                for (i, j) in items.iter().enumerate() {
                    let field = u16::try_from(i + 1).ok().and_then(|id| descriptor.field_by_id(id));
                    let Some(field) = field else {
                        if self.config.strict {
                            return Err(SerializerError::UnknownField {
                                message: descriptor.name().to_string(),
                                field: (i + 1).to_string(),
                            });
                        }
                        debug!("skip compact field {} in {}", i + 1, descriptor.name());
                        continue;
                    };
                    if j.is_null() {
                        continue;
                    }
                    if let Some(v) = self.value_from_json(j, field.descriptor(), field.name())? {
                        builder.set(field.id(), v);
                    }
                }
            }
            j => {
                let expected = Descriptor::Message(descriptor.clone());
                return Err(mismatch(descriptor.name(), &expected, j));
            }
        }
        if self.config.strict {
            builder.validate()?;
        }
        Ok(builder.build())
    }

    /// Returns None for a value dropped as unknown.
    fn value_from_json(
        &self,
        j: &Json,
        descriptor: &Descriptor,
        context: &str,
    ) -> Result<Option<Value>> {
        let value = match descriptor {
            Descriptor::Void => match j {
                Json::Bool(true) => Value::Void,
                _ => return Err(mismatch(context, descriptor, j)),
            },
            Descriptor::Bool => match j {
                Json::Bool(b) => Value::Bool(*b),
                Json::Number(n) if n.as_i64() == Some(0) => Value::Bool(false),
                Json::Number(n) if n.as_i64() == Some(1) => Value::Bool(true),
                _ => return Err(mismatch(context, descriptor, j)),
            },
            Descriptor::Byte => Value::Byte(int_from_json(j, descriptor, context)?),
            Descriptor::I16 => Value::I16(int_from_json(j, descriptor, context)?),
            Descriptor::I32 => Value::I32(int_from_json(j, descriptor, context)?),
            Descriptor::I64 => Value::I64(int_from_json(j, descriptor, context)?),
            Descriptor::Double => match j.as_f64() {
                Some(d) => Value::Double(d),
                None => return Err(mismatch(context, descriptor, j)),
            },
            Descriptor::String => match j {
                Json::String(s) => Value::String(s.clone()),
                _ => return Err(mismatch(context, descriptor, j)),
            },
            Descriptor::Binary => match j {
                Json::String(s) => Value::Binary(decode_base64(s)?),
                _ => return Err(mismatch(context, descriptor, j)),
            },
            Descriptor::Enum(e) => {
                let found = match j {
                    Json::Number(n) => n
                        .as_i64()
                        .and_then(|id| i32::try_from(id).ok())
                        .and_then(|id| e.find_by_id(id)),
                    Json::String(s) => e.find_by_name(s),
                    _ => return Err(mismatch(context, descriptor, j)),
                };
                match found {
                    Some(v) => Value::Enum(v),
                    None if self.config.strict => {
                        return Err(SerializerError::UnknownEnumValue {
                            name: e.name().to_string(),
                            value: j.to_string(),
                        });
                    }
                    None => {
                        debug!("drop unknown {} value {}", e.name(), j);
                        return Ok(None);
                    }
                }
            }
            Descriptor::Message(m) => Value::Message(self.message_from_json(j, m)?),
            Descriptor::List(item) | Descriptor::Set(item) => {
                let Json::Array(array) = j else {
                    return Err(mismatch(context, descriptor, j));
                };
                let mut items = Vec::with_capacity(array.len());
                for elem in array {
                    if elem.is_null() {
                        if self.config.strict {
                            let message = format!("null value in {}", context);
                            return Err(SerializerError::protocol(message));
                        }
                        continue;
                    }
                    if let Some(v) = self.value_from_json(elem, item, context)? {
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
                let Json::Object(map) = j else {
                    return Err(mismatch(context, descriptor, j));
                };
                let mut entries = Vec::with_capacity(map.len());
                for (key, elem) in map {
                    if elem.is_null() {
                        if self.config.strict {
                            let message = format!("null value in {}", context);
                            return Err(SerializerError::protocol(message));
                        }
                        continue;
                    }
                    let key = self.parse_map_key(key, k, context)?;
                    let value = self.value_from_json(elem, v, context)?;
                    if let (Some(key), Some(value)) = (key, value) {
                        entries.push((key, value));
                    }
                }
                Value::Map(entries)
            }
        };
        Ok(Some(value))
    }

    fn parse_map_key(
        &self,
        key: &str,
        descriptor: &Descriptor,
        context: &str,
    ) -> Result<Option<Value>> {
        let bad_key = || {
            let name = descriptor.name();
            SerializerError::protocol(format!("invalid {} key {:?} in {}", name, key, context))
        };
        let value = match descriptor {
            Descriptor::String => Value::String(key.to_string()),
            Descriptor::Bool => match key {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(bad_key()),
            },
            Descriptor::Byte => Value::Byte(key.parse().map_err(|_| bad_key())?),
            Descriptor::I16 => Value::I16(key.parse().map_err(|_| bad_key())?),
            Descriptor::I32 => Value::I32(key.parse().map_err(|_| bad_key())?),
            Descriptor::I64 => Value::I64(key.parse().map_err(|_| bad_key())?),
            Descriptor::Double => Value::Double(key.parse().map_err(|_| bad_key())?),
            Descriptor::Binary => Value::Binary(decode_base64(key)?),
            Descriptor::Enum(_) => {
                let j = match key.parse::<i64>() {
                    Ok(id) => Json::from(id),
                    Err(_) => Json::String(key.to_string()),
                };
                return self.value_from_json(&j, descriptor, context);
            }
            Descriptor::Message(m) if m.is_simple() => {
                let j: Json = serde_json::from_str(key)?;
                Value::Message(self.message_from_json(&j, m)?)
            }
            d => {
                return Err(SerializerError::protocol(format!("invalid map key type {}", d.name())));
            }
        };
        Ok(Some(value))
    }

    fn read_call(
        &self,
        input: &mut dyn Read,
        service: &ServiceDescriptor,
        ctx: &mut CallContext,
    ) -> Result<ServiceCall> {
        let json = self.read_json(input)?;
        let parts = match &json {
            Json::Array(parts) if parts.len() == 4 => parts,
            j => {
                return Err(SerializerError::protocol(format!(
                    "expected service call array of 4 elements, got {}",
                    json_kind(j)
                )));
            }
        };
        let method = parts[0]
            .as_str()
            .ok_or_else(|| SerializerError::protocol("method name is not a string"))?
            .to_string();
        ctx.method = Some(method.clone());
        let call_type = match &parts[1] {
            Json::Number(n) => n.as_i64().and_then(CallType::from_id),
            Json::String(s) => CallType::from_name(s),
            _ => None,
        }
        .ok_or_else(|| {
            SerializerError::application(
                ApplicationExceptionType::InvalidMessageType,
                format!("invalid call type {}", parts[1]),
            )
        })?;
        ctx.call_type = Some(call_type);
        ctx.sequence = parts[2]
            .as_i64()
            .and_then(|s| i32::try_from(s).ok())
            .ok_or_else(|| SerializerError::protocol(format!("invalid sequence {}", parts[2])))?;
        trace!("json call {} {} seq {}", call_type, method, ctx.sequence);

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
        let message = self.message_from_json(&parts[3], &descriptor)?;
        Ok(ServiceCall { method, call_type, sequence: ctx.sequence, message })
    }
}

/// An integer number that fits the target width.
fn int_from_json<T: TryFrom<i64>>(j: &Json, descriptor: &Descriptor, context: &str) -> Result<T> {
    let Some(v) = j.as_i64() else {
        return Err(mismatch(context, descriptor, j));
    };
    T::try_from(v).map_err(|_| {
        let name = descriptor.name();
        SerializerError::protocol(format!("{} value {} out of range for {}", name, v, context))
    })
}

impl Serializer for JsonSerializer {
    fn serialize(&self, out: &mut dyn Write, message: &Message) -> Result<usize> {
        let json = self.message_to_json(message)?;
        self.write_json(out, &json)
    }

    fn serialize_call(&self, out: &mut dyn Write, call: &ServiceCall) -> Result<usize> {
        let call_type = match self.config.enum_values {
            IdType::Id => Json::from(call.call_type.id()),
            IdType::Name => Json::String(call.call_type.name().to_string()),
        };
        let json = Json::Array(vec![
            Json::String(call.method.clone()),
            call_type,
            Json::from(call.sequence),
            self.message_to_json(&call.message)?,
        ]);
        trace!("json call {} {} seq {}", call.call_type, call.method, call.sequence);
        self.write_json(out, &json)
    }

    fn deserialize(
        &self,
        input: &mut dyn Read,
        descriptor: &Arc<MessageDescriptor>,
    ) -> Result<Message> {
        let json = self.read_json(input)?;
        self.message_from_json(&json, descriptor)
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
        false
    }

    fn mime_type(&self) -> &'static str {
        match self.config.field_ids {
            IdType::Id => JSON_MIME_TYPE,
            IdType::Name => NAMED_JSON_MIME_TYPE,
        }
    }
}
