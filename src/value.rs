//! Typed values and trigger states carried by graph nodes.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A literal value held or produced by a node.
///
/// `Double` compares and hashes by bit pattern so any `Value` can key the
/// slate-wide constant cache.
#[derive(Debug, Clone)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float, compared by bit pattern.
    Double(f64),
    /// An owned string.
    Text(String),
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
        }
    }

    /// Returns the boolean if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a `Double`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(1);
                i.hash(state);
            }
            Value::Double(d) => {
                state.write_u8(2);
                d.to_bits().hash(state);
            }
            Value::Text(s) => {
                state.write_u8(3);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Type tag for a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Double,
    /// Owned string.
    Text,
}

impl ValueType {
    /// The default value of this type, used for extern placeholders.
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Double => Value::Double(0.0),
            ValueType::Text => Value::Text(String::new()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// What a node carries: a typed value or a one-cycle trigger flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A typed value.
    Value(Value),
    /// A trigger whose `provoked` flag is cleared at the end of each cycle.
    Trigger {
        /// Whether the trigger has fired this cycle.
        provoked: bool,
    },
}

impl Payload {
    /// The type tag of this payload.
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Value(v) => PayloadType::Value(v.value_type()),
            Payload::Trigger { .. } => PayloadType::Trigger,
        }
    }

    /// Returns the inner value for value payloads.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Trigger { .. } => None,
        }
    }

    /// Returns the provoked flag for trigger payloads.
    pub fn provoked(&self) -> Option<bool> {
        match self {
            Payload::Value(_) => None,
            Payload::Trigger { provoked } => Some(*provoked),
        }
    }
}

/// Type tag for a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// A typed value.
    Value(ValueType),
    /// A trigger flag.
    Trigger,
}

impl PayloadType {
    /// The placeholder payload an extern of this type starts with.
    pub fn default_payload(&self) -> Payload {
        match self {
            PayloadType::Value(ty) => Payload::Value(ty.default_value()),
            PayloadType::Trigger => Payload::Trigger { provoked: false },
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadType::Value(ty) => write!(f, "{}", ty),
            PayloadType::Trigger => write!(f, "trigger"),
        }
    }
}

/// Conversion out of a [`Value`], used by the typed [`Report`](crate::Report)
/// getters.
pub trait FromValue: Sized {
    /// Extracts `Self` from a value of the matching type.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_double()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn double_equality_is_bitwise() {
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(hash_of(&Value::Double(2.5)), hash_of(&Value::Double(2.5)));
    }

    #[test]
    fn values_of_different_types_never_compare_equal() {
        assert_ne!(Value::Int(1), Value::Double(1.0));
        assert_ne!(Value::Bool(false), Value::Int(0));
    }

    #[test]
    fn default_values_match_their_types() {
        for ty in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Double,
            ValueType::Text,
        ] {
            assert_eq!(ty.default_value().value_type(), ty);
        }
    }

    #[test]
    fn from_value_round_trips() {
        assert_eq!(i64::from_value(&Value::Int(7)), Some(7));
        assert_eq!(bool::from_value(&Value::Bool(true)), Some(true));
        assert_eq!(String::from_value(&Value::Text("x".into())), Some("x".into()));
        assert_eq!(i64::from_value(&Value::Bool(true)), None);
    }
}
