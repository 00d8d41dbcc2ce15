use crate::descriptor::{FieldDescriptor, MessageDescriptor, Requirement};
use crate::error::{Result, SerializerError};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An immutable struct, union or exception instance.
///
/// Values are keyed by field id. Only set fields are stored.
#[derive(Clone)]
pub struct Message {
    descriptor: Arc<MessageDescriptor>,
    values: BTreeMap<u16, Value>,
}

impl Message {
    #[inline]
    pub fn builder(descriptor: &Arc<MessageDescriptor>) -> MessageBuilder {
        MessageBuilder { descriptor: descriptor.clone(), values: BTreeMap::new() }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn has(&self, id: u16) -> bool {
        self.values.contains_key(&id)
    }

    #[inline]
    pub fn get(&self, id: u16) -> Option<&Value> {
        self.values.get(&id)
    }

    /// The set value, falling back to the field default.
    pub fn get_or_default(&self, id: u16) -> Option<&Value> {
        self.values
            .get(&id)
            .or_else(|| self.descriptor.field_by_id(id).and_then(|f| f.default_value()))
    }

    /// Number of elements for containers, 1 for other set fields and 0 when unset.
    pub fn count(&self, id: u16) -> usize {
        match self.values.get(&id) {
            None => 0,
            Some(Value::List(items)) | Some(Value::Set(items)) => items.len(),
            Some(Value::Map(entries)) => entries.len(),
            Some(_) => 1,
        }
    }

    /// Number of set fields.
    #[inline]
    pub fn present_count(&self) -> usize {
        self.values.len()
    }

    /// The active field of a union.
    pub fn union_field(&self) -> Option<&FieldDescriptor> {
        if !self.descriptor.is_union() {
            return None;
        }
        let id = *self.values.keys().next()?;
        self.descriptor.field_by_id(id)
    }

    /// Set fields in declaration order.
    pub fn present_fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.descriptor
            .fields()
            .iter()
            .filter_map(move |f| self.values.get(&f.id()).map(|v| (f, v)))
    }

    /// The set fields are exactly ids 1 to n of a compactible struct.
    pub fn is_compact(&self) -> bool {
        if !self.descriptor.is_compactible() {
            return false;
        }
        self.values.keys().enumerate().all(|(i, id)| *id as usize == i + 1)
    }

    #[inline]
    pub fn mutate(&self) -> MessageBuilder {
        MessageBuilder { descriptor: self.descriptor.clone(), values: self.values.clone() }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.descriptor, &other.descriptor)
            || self.descriptor.name() == other.descriptor.name())
            && self.values == other.values
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct(self.descriptor.name());
        for (field, value) in self.present_fields() {
            s.field(field.name(), value);
        }
        s.finish()
    }
}

/// Single-owner builder for [Message].
pub struct MessageBuilder {
    descriptor: Arc<MessageDescriptor>,
    values: BTreeMap<u16, Value>,
}

impl MessageBuilder {
    #[inline]
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Set a field. Setting a field of a union clears the previously set one.
    pub fn set<V: Into<Value>>(&mut self, id: u16, value: V) -> &mut Self {
        let value = value.into();
        debug_assert!(
            self.descriptor.field_by_id(id).is_some_and(|f| value.matches(f.descriptor())),
            "invalid value for field {} in {}",
            id,
            self.descriptor.name()
        );
        if self.descriptor.is_union() {
            self.values.clear();
        }
        self.values.insert(id, value);
        self
    }

    /// Append to a list field, creating the list when unset.
    pub fn add_to_list<V: Into<Value>>(&mut self, id: u16, value: V) -> &mut Self {
        let value = value.into();
        if let Some(Value::List(items)) = self.values.get_mut(&id) {
            items.push(value);
            return self;
        }
        self.set(id, Value::List(vec![value]))
    }

    pub fn clear(&mut self, id: u16) -> &mut Self {
        self.values.remove(&id);
        self
    }

    #[inline]
    pub fn has(&self, id: u16) -> bool {
        self.values.contains_key(&id)
    }

    #[inline]
    pub fn get(&self, id: u16) -> Option<&Value> {
        self.values.get(&id)
    }

    /// Check that all required fields are set, and that a union has exactly one field.
    pub fn validate(&self) -> Result<()> {
        if self.descriptor.is_union() {
            if self.values.len() != 1 {
                return Err(SerializerError::protocol(format!(
                    "union {} must have exactly one field set, got {}",
                    self.descriptor.name(),
                    self.values.len()
                )));
            }
            return Ok(());
        }
        let missing: Vec<String> = self
            .descriptor
            .fields()
            .iter()
            .filter(|f| f.requirement() == Requirement::Required && !self.has(f.id()))
            .map(|f| f.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SerializerError::MissingRequired {
                message: self.descriptor.name().to_string(),
                fields: missing,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn build(self) -> Message {
        Message { descriptor: self.descriptor, values: self.values }
    }
}
