use crate::descriptor::{Descriptor, EnumValue};
use crate::message::Message;

/// A dynamically typed field value.
///
/// Set and map values keep insertion order, but compare equal regardless of order.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Enum(EnumValue),
    Message(Message),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// If the value may be stored under the descriptor. Containers are checked element-wise.
    pub fn matches(&self, descriptor: &Descriptor) -> bool {
        match (self, descriptor) {
            (Value::Void, Descriptor::Void)
            | (Value::Bool(_), Descriptor::Bool)
            | (Value::Byte(_), Descriptor::Byte)
            | (Value::I16(_), Descriptor::I16)
            | (Value::I32(_), Descriptor::I32)
            | (Value::I64(_), Descriptor::I64)
            | (Value::Double(_), Descriptor::Double)
            | (Value::String(_), Descriptor::String)
            | (Value::Binary(_), Descriptor::Binary) => true,
            (Value::Enum(v), Descriptor::Enum(e)) => e.find_by_id(v.id).is_some(),
            (Value::Message(m), Descriptor::Message(d)) => m.descriptor().name() == d.name(),
            (Value::List(items), Descriptor::List(item))
            | (Value::Set(items), Descriptor::Set(item)) => items.iter().all(|i| i.matches(item)),
            (Value::Map(entries), Descriptor::Map(k, v)) => {
                entries.iter().all(|(key, value)| key.matches(k) && value.matches(v))
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer width, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::Enum(v) => Some(v.id as i64),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Elements of a list or a set.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

fn unordered_eq<T, F: Fn(&T, &T) -> bool>(a: &[T], b: &[T], eq: F) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in a {
        for (i, y) in b.iter().enumerate() {
            if !used[i] && eq(x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => unordered_eq(a, b, |x, y| x == y),
            (Value::Map(a), Value::Map(b)) => {
                unordered_eq(a, b, |(k1, v1), (k2, v2)| k1 == k2 && v1 == v2)
            }
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($t: ty, $variant: ident) => {
        impl From<$t> for Value {
            #[inline]
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from!(bool, Bool);
impl_from!(i8, Byte);
impl_from!(i16, I16);
impl_from!(i32, I32);
impl_from!(i64, I64);
impl_from!(f64, Double);
impl_from!(String, String);
impl_from!(Vec<u8>, Binary);
impl_from!(EnumValue, Enum);
impl_from!(Message, Message);

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
