#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # occams-codec
//!
//! Message codecs driven by runtime type descriptors.
//!
//! A [`MessageDescriptor`] describes the fields of a message type. Values are held in a
//! generic [`Message`], and any [`Serializer`] can write and read them:
//!
//! - [`BinarySerializer`]: the thrift-compatible binary protocol.
//! - [`FastBinarySerializer`]: a dense varint based binary format.
//! - [`JsonSerializer`]: JSON with field ids or names as keys.
//! - [`PrettySerializer`]: an indented, human-readable text format.
//!
//! Readers skip fields they do not know about, so a message written with a newer version
//! of a schema can be read with an older one, and the other way around.
//!
//! Service calls (a method name, call type, sequence number and message) are framed by
//! each serializer with `serialize_call` / `deserialize_call`. Use [`SerializerProvider`]
//! to pick a serializer by MIME type.

#[macro_use]
extern crate log;

pub mod descriptor;
pub mod error;
pub mod message;
mod provider;
pub mod serializer;
pub mod service;
pub mod value;

pub use descriptor::{
    Descriptor, EnumDescriptor, EnumValue, FieldDescriptor, MAX_FIELD_ID, MessageDescriptor,
    MessageVariant, Requirement, TypeTag,
};
pub use error::{CallContext, Result, SerializerError, TokenizerError};
pub use message::{Message, MessageBuilder};
pub use provider::*;
pub use serializer::*;
pub use service::{
    ApplicationException, ApplicationExceptionType, CallType, ServiceCall, ServiceDescriptor,
    ServiceMethod,
};
pub use value::Value;
