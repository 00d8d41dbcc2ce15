//! The serializer contract and its four implementations.

use crate::descriptor::MessageDescriptor;
use crate::error::{Result, SerializerError};
use crate::message::Message;
use crate::service::{ServiceCall, ServiceDescriptor};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

mod binary;
pub use binary::*;
mod fast_binary;
pub use fast_binary::*;
mod json;
pub use json::*;
pub mod pretty;
pub use pretty::{PRETTY_MIME_TYPE, PrettyConfig, PrettySerializer};
pub(crate) mod varint;

/// A two-directional message codec.
///
/// The serializer is immutable and holds only its configuration, so one instance may be
/// shared between threads and used for any number of messages.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Write the message, returning the number of bytes written.
    fn serialize(&self, out: &mut dyn Write, message: &Message) -> Result<usize>;

    fn serialize_call(&self, out: &mut dyn Write, call: &ServiceCall) -> Result<usize>;

    /// Read one message of the given type. Bytes after the message are left unread
    /// where the format allows it.
    fn deserialize(&self, input: &mut dyn Read, descriptor: &Arc<MessageDescriptor>)
    -> Result<Message>;

    /// Failures carry the method name, call type and sequence known at the failure point.
    fn deserialize_call(&self, input: &mut dyn Read, service: &ServiceDescriptor)
    -> Result<ServiceCall>;

    fn is_binary_protocol(&self) -> bool;

    fn mime_type(&self) -> &'static str;

    fn to_vec(&self, message: &Message) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(&mut buf, message)?;
        Ok(buf)
    }

    fn from_slice(&self, mut buf: &[u8], descriptor: &Arc<MessageDescriptor>) -> Result<Message> {
        self.deserialize(&mut buf, descriptor)
    }

    fn call_to_vec(&self, call: &ServiceCall) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize_call(&mut buf, call)?;
        Ok(buf)
    }

    fn call_from_slice(&self, mut buf: &[u8], service: &ServiceDescriptor) -> Result<ServiceCall> {
        self.deserialize_call(&mut buf, service)
    }
}

/// Counts the bytes passed through to the inner writer.
pub(crate) struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    count: usize,
}

impl<'a> CountingWriter<'a> {
    #[inline]
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner, count: 0 }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Write for CountingWriter<'_> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n;
        Ok(n)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Upper bound of elements reserved up front for a container count read from the wire.
pub(crate) const MAX_PREALLOC: usize = 1024;

#[inline]
pub(crate) fn prealloc<T>(count: usize) -> Vec<T> {
    Vec::with_capacity(count.min(MAX_PREALLOC))
}

/// Nesting limit for messages and containers read from the wire.
pub(crate) const MAX_DEPTH: usize = 64;

#[inline]
pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(SerializerError::protocol(format!("nesting deeper than {} levels", MAX_DEPTH)));
    }
    Ok(())
}
