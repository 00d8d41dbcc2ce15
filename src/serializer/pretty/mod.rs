//! A human-readable text format.
//!
//! ```text
//! {
//!   name: "Olav"
//!   tags: [1, 2, 3]
//!   data: b64(AAEC)
//! }
//! ```
//!
//! Service calls are written as `sequence: CALLTYPE method({ ... })` on their own line.

use super::{CountingWriter, Serializer};
use crate::descriptor::{Descriptor, MessageDescriptor};
use crate::error::{CallContext, Result, SerializerError};
use crate::message::{Message, MessageBuilder};
use crate::service::{
    ApplicationException, ApplicationExceptionType, CallType, ServiceCall, ServiceDescriptor,
};
use crate::value::Value;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use std::io::{Read, Write};
use std::sync::Arc;

pub mod token;
pub mod tokenizer;
mod writer;

use token::*;
use tokenizer::Tokenizer;
use writer::IndentedWriter;

pub const PRETTY_MIME_TYPE: &str = "text/plain";

/// Lists of bool and number values up to this size are written on a single line.
const MAX_ONE_LINE_LIST: usize = 10;

#[derive(Debug, Clone)]
pub struct PrettyConfig {
    /// Added per nesting level.
    ///
    /// default: two spaces
    pub indent: String,

    /// Written after each `:` separator.
    ///
    /// default: " "
    pub space: String,

    /// default: "\n"
    pub newline: String,

    /// Written between struct fields and map entries.
    ///
    /// default: ""
    pub entry_sep: String,

    /// Wrap the outermost message in braces. A message is always enclosed when the
    /// name prefix is written.
    ///
    /// default: true
    pub enclose_outer: bool,

    /// Write the qualified type name before the outermost message.
    ///
    /// default: false
    pub prefix_with_name: bool,

    /// Write each element of a list field as its own `field: value` entry.
    /// Both forms are accepted on read.
    ///
    /// default: false
    pub repeated_list_entries: bool,

    /// Fail on unknown enum values, invalid escapes and missing required fields.
    /// Unknown field names always fail.
    ///
    /// default: false
    pub strict: bool,
}

impl Default for PrettyConfig {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            space: " ".to_string(),
            newline: "\n".to_string(),
            entry_sep: String::new(),
            enclose_outer: true,
            prefix_with_name: false,
            repeated_list_entries: false,
            strict: false,
        }
    }
}

impl PrettyConfig {
    /// Everything on one line, with comma separated fields.
    pub fn compact() -> Self {
        Self {
            indent: String::new(),
            space: String::new(),
            newline: String::new(),
            entry_sep: LINE_SEP_1.to_string(),
            ..Default::default()
        }
    }
}

fn escape_string(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c < ' ' || c == '\u{7f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
}

/// List fields whose elements are written one entry each in repeated mode.
fn repeated_item(descriptor: &Descriptor) -> Option<&Descriptor> {
    match descriptor {
        Descriptor::List(item) if !matches!(**item, Descriptor::List(_) | Descriptor::Set(_)) => {
            Some(item.as_ref())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrettySerializer {
    config: PrettyConfig,
}

impl PrettySerializer {
    #[inline]
    pub fn new(config: PrettyConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn compact() -> Self {
        Self::new(PrettyConfig::compact())
    }

    #[inline]
    pub fn config(&self) -> &PrettyConfig {
        &self.config
    }

    /// Write `name: value` after the entry separator.
    fn append_entry(
        &self, w: &mut IndentedWriter, first: &mut bool, enclose: bool, name: &str,
        descriptor: &Descriptor, value: &Value,
    ) -> Result<()> {
        if *first {
            *first = false;
            if enclose {
                w.appendln()?;
            }
        } else {
            w.append(&self.config.entry_sep)?;
            w.appendln()?;
        }
        w.append(name)?;
        w.append_char(KEY_VALUE_SEP)?;
        w.append(&self.config.space)?;
        self.append_value(w, descriptor, value)
    }

    fn append_message(
        &self,
        w: &mut IndentedWriter,
        message: &Message,
        enclose: bool,
    ) -> Result<()> {
        if message.present_count() == 0 {
            if enclose {
                w.append_char(MESSAGE_START)?;
                w.append_char(MESSAGE_END)?;
            }
            return Ok(());
        }
        if enclose {
            w.append_char(MESSAGE_START)?;
            w.begin(&self.config.indent);
        }
        let mut first = true;
        for (field, value) in message.present_fields() {
            match (self.config.repeated_list_entries, repeated_item(field.descriptor()), value) {
                (true, Some(item), Value::List(items)) if !items.is_empty() => {
                    for v in items {
                        self.append_entry(w, &mut first, enclose, field.name(), item, v)?;
                    }
                }
                _ => {
                    let (name, descriptor) = (field.name(), field.descriptor());
                    self.append_entry(w, &mut first, enclose, name, descriptor, value)?
                }
            }
        }
        if enclose {
            w.end();
            w.appendln()?;
            w.append_char(MESSAGE_END)?;
        }
        Ok(())
    }

    fn append_value(
        &self,
        w: &mut IndentedWriter,
        descriptor: &Descriptor,
        value: &Value,
    ) -> Result<()> {
        match (descriptor, value) {
            (Descriptor::Void, _) => w.append("true")?,
            (Descriptor::Bool, Value::Bool(b)) => w.append(if *b { "true" } else { "false" })?,
            (Descriptor::Byte, Value::Byte(v)) => w.append(&v.to_string())?,
            (Descriptor::I16, Value::I16(v)) => w.append(&v.to_string())?,
            (Descriptor::I32, Value::I32(v)) => w.append(&v.to_string())?,
            (Descriptor::I64, Value::I64(v)) => w.append(&v.to_string())?,
            (Descriptor::Double, Value::Double(d)) => {
                if !d.is_finite() {
                    let message = format!("cannot write {} as pretty text", d);
                    return Err(SerializerError::protocol(message));
                }
                w.append(&format!("{:?}", d))?;
            }
            (Descriptor::String, Value::String(s)) => {
                let mut quoted = String::with_capacity(s.len() + 2);
                quoted.push('"');
                escape_string(s, &mut quoted);
                quoted.push('"');
                w.append(&quoted)?;
            }
            (Descriptor::Binary, Value::Binary(b)) => {
                w.append(B64)?;
                w.append_char(PARAMS_START)?;
                w.append(&STANDARD_NO_PAD.encode(b))?;
                w.append_char(PARAMS_END)?;
            }
            (Descriptor::Enum(_), Value::Enum(v)) => w.append(&v.name)?,
            (Descriptor::Message(_), Value::Message(m)) => self.append_message(w, m, true)?,
            (Descriptor::List(item), Value::List(items))
            | (Descriptor::Set(item), Value::Set(items)) => {
                if items.is_empty() {
                    w.append_char(LIST_START)?;
                    w.append_char(LIST_END)?;
                } else if item.is_primitive() && items.len() <= MAX_ONE_LINE_LIST {
                    w.append_char(LIST_START)?;
                    for (i, v) in items.iter().enumerate() {
                        if i > 0 {
                            w.append_char(LINE_SEP_1)?;
                            w.append(&self.config.space)?;
                        }
                        self.append_value(w, item, v)?;
                    }
                    w.append_char(LIST_END)?;
                } else {
                    w.append_char(LIST_START)?;
                    w.begin(&self.config.indent);
                    for (i, v) in items.iter().enumerate() {
                        if i > 0 {
                            w.append_char(LINE_SEP_1)?;
                        }
                        w.appendln()?;
                        self.append_value(w, item, v)?;
                    }
                    w.end();
                    w.appendln()?;
                    w.append_char(LIST_END)?;
                }
            }
            (Descriptor::Map(k, v), Value::Map(entries)) => {
                if entries.is_empty() {
                    w.append_char(MESSAGE_START)?;
                    w.append_char(MESSAGE_END)?;
                    return Ok(());
                }
                w.append_char(MESSAGE_START)?;
                w.begin(&self.config.indent);
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        w.append(&self.config.entry_sep)?;
                    }
                    w.appendln()?;
                    self.append_value(w, k, key)?;
                    w.append_char(KEY_VALUE_SEP)?;
                    w.append(&self.config.space)?;
                    self.append_value(w, v, value)?;
                }
                w.end();
                w.appendln()?;
                w.append_char(MESSAGE_END)?;
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

    /// Read fields up to the closing brace, or to end of input when not `require_end`.
    fn read_message(
        &self, tokenizer: &mut Tokenizer, descriptor: &Arc<MessageDescriptor>, require_end: bool,
    ) -> Result<Message> {
        let mut builder = Message::builder(descriptor);
        loop {
            let token = if require_end {
                tokenizer.expect("field name or message end")?
            } else {
                match tokenizer.next()? {
                    Some(token) => token,
                    None => break,
                }
            };
            if token.is_symbol(MESSAGE_END) && require_end {
                break;
            }
            if !token.is_identifier() {
                let message = format!("Expected field name, got '{}'", token);
                return Err(tokenizer.failure(&token, message).into());
            }
            tokenizer.expect_symbol("field value separator", &[KEY_VALUE_SEP])?;
            let Some(field) = descriptor.field_by_name(token.as_str()) else {
                return Err(tokenizer
                    .failure(&token, format!("No such field {} in {}", token, descriptor.name()))
                    .into());
            };
            let value_token = tokenizer.expect("field value")?;
            match repeated_item(field.descriptor()) {
                Some(item) if !value_token.is_symbol(LIST_START) => {
                    if let Some(v) = self.read_value(tokenizer, value_token, item)? {
                        builder.add_to_list(field.id(), v);
                    }
                }
                _ => {
                    if let Some(v) = self.read_value(tokenizer, value_token, field.descriptor())? {
                        set_or_extend(&mut builder, field.id(), v);
                    }
                }
            }
            if tokenizer.has_next()? {
                let sep = tokenizer.peek("")?;
                if sep.is_symbol(LINE_SEP_1) || sep.is_symbol(LINE_SEP_2) {
                    tokenizer.next()?;
                }
            }
        }
        if self.config.strict {
            builder.validate()?;
        }
        Ok(builder.build())
    }

    /// Returns None for an unknown enum value skipped when not strict.
    fn read_value(
        &self,
        tokenizer: &mut Tokenizer,
        token: Token,
        descriptor: &Descriptor,
    ) -> Result<Option<Value>> {
        let value = match descriptor {
            Descriptor::Void => match token.as_str().to_ascii_lowercase().as_str() {
                "t" | "true" | "y" | "yes" => Value::Void,
                _ => {
                    let message = format!("Invalid void value {}", token);
                    return Err(tokenizer.failure(&token, message).into());
                }
            },
            Descriptor::Bool => match token.as_str().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Value::Bool(true),
                "0" | "f" | "false" | "n" | "no" => Value::Bool(false),
                _ => {
                    let message = format!("Invalid boolean value {}", token);
                    return Err(tokenizer.failure(&token, message).into());
                }
            },
            Descriptor::Byte => Value::Byte(read_int(tokenizer, &token, "byte")?),
            Descriptor::I16 => Value::I16(read_int(tokenizer, &token, "i16")?),
            Descriptor::I32 => Value::I32(read_int(tokenizer, &token, "i32")?),
            Descriptor::I64 => Value::I64(read_int(tokenizer, &token, "i64")?),
            Descriptor::Double => {
                if !token.is_number() {
                    let message = format!("Invalid double value {}", token);
                    return Err(tokenizer.failure(&token, message).into());
                }
                Value::Double(token.parse_double().map_err(|e| tokenizer.failure(&token, e))?)
            }
            Descriptor::String => {
                if !token.is_string_literal() {
                    return Err(tokenizer
                        .failure(&token, format!("Expected string literal, got '{}'", token))
                        .into());
                }
                let decoded = token.decode_literal(self.config.strict);
                Value::String(decoded.map_err(|e| tokenizer.failure(&token, e))?)
            }
            Descriptor::Binary => Value::Binary(self.read_binary(tokenizer, &token)?),
            Descriptor::Enum(e) => {
                let found = if token.is_integer() {
                    token
                        .parse_integer()
                        .ok()
                        .and_then(|id| i32::try_from(id).ok())
                        .and_then(|id| e.find_by_id(id))
                } else if token.is_identifier() {
                    e.find_by_name(token.as_str())
                } else {
                    let message = format!("Invalid {} value {}", e.name(), token);
                    return Err(tokenizer.failure(&token, message).into());
                };
                match found {
                    Some(v) => Value::Enum(v),
                    None if self.config.strict => {
                        return Err(tokenizer
                            .failure(&token, format!("No such {} value {}", e.name(), token))
                            .into());
                    }
                    None => {
                        debug!("drop unknown {} value {}", e.name(), token);
                        return Ok(None);
                    }
                }
            }
            Descriptor::Message(m) => {
                if !token.is_symbol(MESSAGE_START) {
                    return Err(tokenizer
                        .failure(&token, format!("Expected message start, got '{}'", token))
                        .into());
                }
                Value::Message(self.read_message(tokenizer, m, true)?)
            }
            Descriptor::Map(k, v) => {
                if !token.is_symbol(MESSAGE_START) {
                    let message = format!("Expected map start, got '{}'", token);
                    return Err(tokenizer.failure(&token, message).into());
                }
                let mut entries = Vec::new();
                loop {
                    let t = tokenizer.expect("map end or key")?;
                    if t.is_symbol(MESSAGE_END) {
                        break;
                    }
                    let key = self.read_value(tokenizer, t, k)?;
                    tokenizer.expect_symbol("map key value separator", &[KEY_VALUE_SEP])?;
                    let t = tokenizer.expect("map value")?;
                    let value = self.read_value(tokenizer, t, v)?;
                    if let (Some(key), Some(value)) = (key, value) {
                        entries.push((key, value));
                    }
                    let sep = tokenizer.peek("map separator or end")?;
                    if sep.is_symbol(LINE_SEP_1) || sep.is_symbol(LINE_SEP_2) {
                        tokenizer.next()?;
                    }
                }
                Value::Map(entries)
            }
            Descriptor::List(item) | Descriptor::Set(item) => {
                if !token.is_symbol(LIST_START) {
                    let message = format!("Expected list start, got '{}'", token);
                    return Err(tokenizer.failure(&token, message).into());
                }
                let mut items = Vec::new();
                loop {
                    let t = tokenizer.expect("list end or value")?;
                    if t.is_symbol(LIST_END) {
                        break;
                    }
                    if let Some(v) = self.read_value(tokenizer, t, item)? {
                        items.push(v);
                    }
                    let sep = tokenizer.peek("list separator or end")?;
                    if sep.is_symbol(LINE_SEP_1) || sep.is_symbol(LINE_SEP_2) {
                        tokenizer.next()?;
                    }
                }
                if matches!(descriptor, Descriptor::Set(_)) {
                    Value::Set(items)
                } else {
                    Value::List(items)
                }
            }
        };
        Ok(Some(value))
    }

    /// `b64(...)` or `hex(...)`. Whitespace and base64 padding in the content are ignored.
    fn read_binary(&self, tokenizer: &mut Tokenizer, token: &Token) -> Result<Vec<u8>> {
        if token.as_str() != B64 && token.as_str() != HEX {
            return Err(tokenizer
                .failure(token, format!("Unrecognized binary format {}", token))
                .into());
        }
        tokenizer.expect_symbol("binary content start", &[PARAMS_START])?;
        let content: String = tokenizer
            .read_binary(PARAMS_END)?
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .collect();
        let decoded = if token.as_str() == B64 {
            STANDARD_NO_PAD.decode(&content).map_err(|e| e.to_string())
        } else {
            hex::decode(&content).map_err(|e| e.to_string())
        };
        decoded.map_err(|e| {
            tokenizer.failure(token, format!("Invalid {} binary: {}", token, e)).into()
        })
    }

    fn read_call(
        &self, input: &mut dyn Read, service: &ServiceDescriptor, ctx: &mut CallContext,
    ) -> Result<ServiceCall> {
        let mut tokenizer = Tokenizer::read(input, false)?;
        let mut token = tokenizer.expect("sequence or call type")?;
        if token.is_integer() {
            let seq = token.parse_integer().map_err(|e| tokenizer.failure(&token, e))?;
            ctx.sequence = i32::try_from(seq)
                .map_err(|_| tokenizer.failure(&token, format!("Sequence {} out of range", seq)))?;
            tokenizer.expect_symbol("sequence separator", &[KEY_VALUE_SEP])?;
            token = tokenizer.expect_identifier("call type")?;
        }
        let call_type = CallType::from_name(token.as_str()).ok_or_else(|| {
            SerializerError::application(
                ApplicationExceptionType::InvalidMessageType,
                tokenizer.failure(&token, format!("No such call type {}", token)).to_string(),
            )
        })?;
        ctx.call_type = Some(call_type);
        let name = tokenizer.expect_identifier("method name")?;
        let method = name.as_str().to_string();
        ctx.method = Some(method.clone());
        trace!("pretty call {} {} seq {}", call_type, method, ctx.sequence);

        let descriptor = if call_type == CallType::Exception {
            ApplicationException::descriptor().clone()
        } else {
            let m = service.find_method(&method).ok_or_else(|| {
                SerializerError::application(
                    ApplicationExceptionType::UnknownMethod,
                    tokenizer
                        .failure(&name, format!("No such method {} on {}", method, service.name()))
                        .to_string(),
                )
            })?;
            service.payload_descriptor(m, call_type).ok_or_else(|| {
                SerializerError::application(
                    ApplicationExceptionType::InvalidMessageType,
                    format!("no response type for {} on {}", method, service.name()),
                )
            })?
        };
        tokenizer.expect_symbol("call params start", &[PARAMS_START])?;
        tokenizer.expect_symbol("message start", &[MESSAGE_START])?;
        let message = self.read_message(&mut tokenizer, &descriptor, true)?;
        tokenizer.expect_symbol("call params end", &[PARAMS_END])?;
        Ok(ServiceCall { method, call_type, sequence: ctx.sequence, message })
    }
}

/// Repeated list entries may already have started the list.
fn set_or_extend(builder: &mut MessageBuilder, id: u16, value: Value) {
    match value {
        Value::List(items) if builder.has(id) => {
            for v in items {
                builder.add_to_list(id, v);
            }
        }
        v => {
            builder.set(id, v);
        }
    }
}

fn read_int<T: TryFrom<i64>>(tokenizer: &Tokenizer, token: &Token, what: &str) -> Result<T> {
    if !token.is_integer() {
        return Err(tokenizer.failure(token, format!("Invalid {} value: {}", what, token)).into());
    }
    let v = token.parse_integer().map_err(|e| tokenizer.failure(token, e))?;
    T::try_from(v).map_err(|_| {
        tokenizer.failure(token, format!("{} value out of bounds: {}", what, token)).into()
    })
}

impl Serializer for PrettySerializer {
    fn serialize(&self, out: &mut dyn Write, message: &Message) -> Result<usize> {
        let mut counter = CountingWriter::new(out);
        {
            let mut w = IndentedWriter::new(&mut counter, &self.config.newline);
            if self.config.prefix_with_name {
                w.append(message.descriptor().name())?;
                w.append(&self.config.space)?;
            }
            let enclose = self.config.enclose_outer || self.config.prefix_with_name;
            self.append_message(&mut w, message, enclose)?;
        }
        Ok(counter.count())
    }

    fn serialize_call(&self, out: &mut dyn Write, call: &ServiceCall) -> Result<usize> {
        let mut counter = CountingWriter::new(out);
        {
            let mut w = IndentedWriter::new(&mut counter, &self.config.newline);
            w.append(&format!(
                "{}{}{}{} {}",
                call.sequence,
                KEY_VALUE_SEP,
                self.config.space,
                call.call_type.name().to_ascii_uppercase(),
                call.method
            ))?;
            w.append_char(PARAMS_START)?;
            self.append_message(&mut w, &call.message, true)?;
            w.append_char(PARAMS_END)?;
            w.newline()?;
        }
        Ok(counter.count())
    }

    fn deserialize(
        &self,
        input: &mut dyn Read,
        descriptor: &Arc<MessageDescriptor>,
    ) -> Result<Message> {
        let mut tokenizer = Tokenizer::read(input, self.config.enclose_outer)?;
        if !self.config.enclose_outer && !tokenizer.has_next()? {
            return Ok(Message::builder(descriptor).build());
        }
        let first = tokenizer.peek("start of message")?.clone();
        let named = first.is_qualified_identifier() && first.as_str() == descriptor.name();
        let require_end = if named {
            tokenizer.next()?;
            tokenizer.expect_symbol("message start", &[MESSAGE_START])?;
            true
        } else if first.is_symbol(MESSAGE_START) {
            tokenizer.next()?;
            true
        } else if self.config.enclose_outer {
            return Err(tokenizer
                .failure(&first, format!("Expected message start, got '{}'", first))
                .into());
        } else {
            false
        };
        self.read_message(&mut tokenizer, descriptor, require_end)
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

    #[inline]
    fn mime_type(&self) -> &'static str {
        PRETTY_MIME_TYPE
    }
}
