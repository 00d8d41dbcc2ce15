//! Runtime type descriptors.
//!
//! Descriptors are created once, wrapped in [Arc] and shared by every message and every
//! serializer that touches them. They never change after construction.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// The closed set of type tags a [Descriptor] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    Enum,
    Message,
    List,
    Set,
    Map,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Bool => "bool",
            TypeTag::Byte => "byte",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Binary => "binary",
            TypeTag::Enum => "enum",
            TypeTag::Message => "message",
            TypeTag::List => "list",
            TypeTag::Set => "set",
            TypeTag::Map => "map",
        }
    }
}

impl fmt::Display for TypeTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type descriptor of a field, a container element or a map key/value.
#[derive(Clone)]
pub enum Descriptor {
    Void,
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    Enum(Arc<EnumDescriptor>),
    Message(Arc<MessageDescriptor>),
    List(Box<Descriptor>),
    Set(Box<Descriptor>),
    Map(Box<Descriptor>, Box<Descriptor>),
}

impl Descriptor {
    #[inline]
    pub fn list(item: Descriptor) -> Self {
        Descriptor::List(Box::new(item))
    }

    #[inline]
    pub fn set(item: Descriptor) -> Self {
        Descriptor::Set(Box::new(item))
    }

    #[inline]
    pub fn map(key: Descriptor, value: Descriptor) -> Self {
        Descriptor::Map(Box::new(key), Box::new(value))
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Descriptor::Void => TypeTag::Void,
            Descriptor::Bool => TypeTag::Bool,
            Descriptor::Byte => TypeTag::Byte,
            Descriptor::I16 => TypeTag::I16,
            Descriptor::I32 => TypeTag::I32,
            Descriptor::I64 => TypeTag::I64,
            Descriptor::Double => TypeTag::Double,
            Descriptor::String => TypeTag::String,
            Descriptor::Binary => TypeTag::Binary,
            Descriptor::Enum(_) => TypeTag::Enum,
            Descriptor::Message(_) => TypeTag::Message,
            Descriptor::List(_) => TypeTag::List,
            Descriptor::Set(_) => TypeTag::Set,
            Descriptor::Map(..) => TypeTag::Map,
        }
    }

    /// Bool and the numeric types. Strings, binary and enums are not counted.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Descriptor::Bool
                | Descriptor::Byte
                | Descriptor::I16
                | Descriptor::I32
                | Descriptor::I64
                | Descriptor::Double
        )
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Descriptor::List(_) | Descriptor::Set(_) | Descriptor::Map(..))
    }

    /// Type name as it would be written in an IDL, e.g. `map<string,list<i32>>`.
    pub fn name(&self) -> String {
        match self {
            Descriptor::Enum(e) => e.name().to_string(),
            Descriptor::Message(m) => m.name().to_string(),
            Descriptor::List(item) => format!("list<{}>", item.name()),
            Descriptor::Set(item) => format!("set<{}>", item.name()),
            Descriptor::Map(k, v) => format!("map<{},{}>", k.name(), v.name()),
            _ => self.tag().name().to_string(),
        }
    }
}

impl fmt::Debug for Descriptor {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A single named value of an enum type.
#[derive(Debug, Clone, Eq, Hash)]
pub struct EnumValue {
    pub id: i32,
    pub name: Arc<str>,
}

impl EnumValue {
    pub fn new(id: i32, name: &str) -> Self {
        Self { id, name: Arc::from(name) }
    }
}

impl PartialEq for EnumValue {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for EnumValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub struct EnumDescriptor {
    name: String,
    values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn new(name: &str, values: &[(i32, &str)]) -> Arc<Self> {
        let values = values.iter().map(|(id, n)| EnumValue::new(*id, n)).collect();
        Arc::new(Self { name: name.to_string(), values })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn find_by_id(&self, id: i32) -> Option<EnumValue> {
        self.values.iter().find(|v| v.id == id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<EnumValue> {
        self.values.iter().find(|v| &*v.name == name).cloned()
    }
}

impl fmt::Debug for EnumDescriptor {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "enum {}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    /// Absent values read as the field default, if one is given.
    Default,
}

/// Largest field id, as the compact binary format carries ids in an i16.
pub const MAX_FIELD_ID: u16 = i16::MAX as u16;

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    id: u16,
    name: String,
    requirement: Requirement,
    descriptor: Descriptor,
    default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(id: u16, name: &str, descriptor: Descriptor) -> Self {
        Self {
            id,
            name: name.to_string(),
            requirement: Requirement::Default,
            descriptor,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.requirement = Requirement::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.requirement = Requirement::Optional;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.requirement = Requirement::Default;
        self.default = Some(value);
        self
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    #[inline]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVariant {
    Struct,
    Union,
    Exception,
}

/// Descriptor of a struct, union or exception type.
pub struct MessageDescriptor {
    name: String,
    variant: MessageVariant,
    fields: Vec<FieldDescriptor>,
    compactible: bool,
}

impl MessageDescriptor {
    pub fn builder(name: &str) -> MessageDescriptorBuilder {
        MessageDescriptorBuilder {
            name: name.to_string(),
            variant: MessageVariant::Struct,
            fields: Vec::new(),
            compactible: false,
        }
    }

    /// The qualified type name, e.g. `calculator.Operation`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn variant(&self) -> MessageVariant {
        self.variant
    }

    #[inline]
    pub fn is_union(&self) -> bool {
        self.variant == MessageVariant::Union
    }

    /// Fields in declaration order, which is the order every serializer writes them in.
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// If the struct may be written as a positional JSON array.
    #[inline]
    pub fn is_compactible(&self) -> bool {
        self.compactible
    }

    pub fn field_by_id(&self, id: u16) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A simple message has no container or message fields, and may be used as a map key.
    pub fn is_simple(&self) -> bool {
        self.fields
            .iter()
            .all(|f| {
                !f.descriptor.is_container() && !matches!(f.descriptor, Descriptor::Message(_))
            })
    }
}

impl fmt::Debug for MessageDescriptor {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {}", self.variant, self.name)
    }
}

pub struct MessageDescriptorBuilder {
    name: String,
    variant: MessageVariant,
    fields: Vec<FieldDescriptor>,
    compactible: bool,
}

impl MessageDescriptorBuilder {
    pub fn union(mut self) -> Self {
        self.variant = MessageVariant::Union;
        self
    }

    pub fn exception(mut self) -> Self {
        self.variant = MessageVariant::Exception;
        self
    }

    pub fn compactible(mut self) -> Self {
        self.compactible = true;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        assert!(
            (1..=MAX_FIELD_ID).contains(&field.id),
            "field id {} out of range in {}",
            field.id,
            self.name
        );
        debug_assert!(
            self.fields.iter().all(|f| f.id != field.id && f.name != field.name),
            "duplicate field {} in {}",
            field.name,
            self.name
        );
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Arc<MessageDescriptor> {
        Arc::new(MessageDescriptor {
            name: self.name,
            variant: self.variant,
            fields: self.fields,
            compactible: self.compactible,
        })
    }
}
