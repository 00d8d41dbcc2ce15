//! Service call envelopes and the application exception payload.

use crate::descriptor::{Descriptor, EnumDescriptor, FieldDescriptor, MessageDescriptor};
use crate::message::Message;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl CallType {
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Call),
            2 => Some(Self::Reply),
            3 => Some(Self::Exception),
            4 => Some(Self::Oneway),
            _ => None,
        }
    }

    /// Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Call, Self::Reply, Self::Exception, Self::Oneway]
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Reply => "reply",
            Self::Exception => "exception",
            Self::Oneway => "oneway",
        }
    }
}

impl fmt::Display for CallType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One RPC envelope: method, call type, sequence number and the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub method: String,
    pub call_type: CallType,
    pub sequence: i32,
    pub message: Message,
}

impl ServiceCall {
    pub fn new(method: &str, call_type: CallType, sequence: i32, message: Message) -> Self {
        Self { method: method.to_string(), call_type, sequence, message }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceMethod {
    pub name: String,
    pub request: Arc<MessageDescriptor>,
    /// None for oneway methods.
    pub response: Option<Arc<MessageDescriptor>>,
}

#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<ServiceMethod>,
}

impl ServiceDescriptor {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), methods: Vec::new() }
    }

    pub fn method(
        mut self, name: &str, request: Arc<MessageDescriptor>,
        response: Option<Arc<MessageDescriptor>>,
    ) -> Self {
        self.methods.push(ServiceMethod { name: name.to_string(), request, response });
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn methods(&self) -> &[ServiceMethod] {
        &self.methods
    }

    pub fn find_method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The payload type for a call of `call_type` to `method`.
    pub fn payload_descriptor(
        &self, method: &ServiceMethod, call_type: CallType,
    ) -> Option<Arc<MessageDescriptor>> {
        match call_type {
            CallType::Call | CallType::Oneway => Some(method.request.clone()),
            CallType::Reply => method.response.clone(),
            CallType::Exception => Some(ApplicationException::descriptor().clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationExceptionType {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
    InvalidTransform = 8,
    InvalidProtocol = 9,
    UnsupportedClientType = 10,
}

const EXCEPTION_TYPES: [(ApplicationExceptionType, &str); 11] = [
    (ApplicationExceptionType::Unknown, "UNKNOWN"),
    (ApplicationExceptionType::UnknownMethod, "UNKNOWN_METHOD"),
    (ApplicationExceptionType::InvalidMessageType, "INVALID_MESSAGE_TYPE"),
    (ApplicationExceptionType::WrongMethodName, "WRONG_METHOD_NAME"),
    (ApplicationExceptionType::BadSequenceId, "BAD_SEQUENCE_ID"),
    (ApplicationExceptionType::MissingResult, "MISSING_RESULT"),
    (ApplicationExceptionType::InternalError, "INTERNAL_ERROR"),
    (ApplicationExceptionType::ProtocolError, "PROTOCOL_ERROR"),
    (ApplicationExceptionType::InvalidTransform, "INVALID_TRANSFORM"),
    (ApplicationExceptionType::InvalidProtocol, "INVALID_PROTOCOL"),
    (ApplicationExceptionType::UnsupportedClientType, "UNSUPPORTED_CLIENT_TYPE"),
];

impl ApplicationExceptionType {
    #[inline]
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        EXCEPTION_TYPES.iter().find(|(t, _)| t.id() == id).map(|(t, _)| *t)
    }

    pub fn name(self) -> &'static str {
        EXCEPTION_TYPES[self as usize].1
    }
}

static EXCEPTION_TYPE_DESCRIPTOR: LazyLock<Arc<EnumDescriptor>> = LazyLock::new(|| {
    let values: Vec<(i32, &str)> = EXCEPTION_TYPES.iter().map(|(t, n)| (t.id(), *n)).collect();
    EnumDescriptor::new("service.ApplicationExceptionType", &values)
});

static EXCEPTION_DESCRIPTOR: LazyLock<Arc<MessageDescriptor>> = LazyLock::new(|| {
    MessageDescriptor::builder("service.ApplicationException")
        .exception()
        .field(FieldDescriptor::new(1, "message", Descriptor::String).optional())
        .field(
            FieldDescriptor::new(2, "id", Descriptor::Enum(EXCEPTION_TYPE_DESCRIPTOR.clone()))
                .optional(),
        )
        .build()
});

/// The payload of an EXCEPTION service call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationException {
    pub message: Option<String>,
    pub kind: ApplicationExceptionType,
}

impl ApplicationException {
    pub fn new<S: Into<String>>(kind: ApplicationExceptionType, message: S) -> Self {
        Self { message: Some(message.into()), kind }
    }

    #[inline]
    pub fn descriptor() -> &'static Arc<MessageDescriptor> {
        &EXCEPTION_DESCRIPTOR
    }

    #[inline]
    pub fn type_descriptor() -> &'static Arc<EnumDescriptor> {
        &EXCEPTION_TYPE_DESCRIPTOR
    }

    pub fn to_message(&self) -> Message {
        let mut b = Message::builder(Self::descriptor());
        if let Some(msg) = &self.message {
            b.set(1, msg.as_str());
        }
        if let Some(v) = EXCEPTION_TYPE_DESCRIPTOR.find_by_id(self.kind.id()) {
            b.set(2, v);
        }
        b.build()
    }

    /// Unset or unknown type ids read as UNKNOWN.
    pub fn from_message(message: &Message) -> Self {
        let kind = message
            .get(2)
            .and_then(Value::as_enum)
            .and_then(|v| ApplicationExceptionType::from_id(v.id))
            .unwrap_or(ApplicationExceptionType::Unknown);
        Self { message: message.get(1).and_then(Value::as_str).map(str::to_string), kind }
    }
}

impl fmt::Display for ApplicationException {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message.as_deref().unwrap_or(""))
    }
}
