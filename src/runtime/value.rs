use std::{any::Any, fmt, sync::Arc};

use thiserror::Error;

use crate::signatures::{ClassName, TypeSignature};

/// Opaque handle to a host object.
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// A value crossing the boundary between generated code and injected logic.
///
/// Primitives are carried unboxed; generated code boxes them into their wrapper classes before
/// calling the bridge and unboxes results on the way back.
#[derive(Clone, Default)]
pub enum Value {
    /// No value, the result of a `void` method
    #[default]
    Void,
    /// The null reference
    Null,
    /// `boolean`
    Bool(bool),
    /// `char`, a UTF-16 code unit
    Char(u16),
    /// `byte`
    Byte(i8),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `java.lang.String`
    Str(Arc<str>),
    /// Any other object
    Ref(ObjectRef),
    /// An array of values
    Array(Arc<[Value]>),
}

impl Value {
    /// The value an uninitialized field or skipped call of type `ty` yields: zero, false, null
    /// or nothing.
    #[must_use]
    pub fn default_for(ty: &TypeSignature) -> Self {
        match ty {
            TypeSignature::Void => Value::Void,
            TypeSignature::Boolean => Value::Bool(false),
            TypeSignature::Char => Value::Char(0),
            TypeSignature::Byte => Value::Byte(0),
            TypeSignature::Short => Value::Short(0),
            TypeSignature::Int => Value::Int(0),
            TypeSignature::Long => Value::Long(0),
            TypeSignature::Float => Value::Float(0.0),
            TypeSignature::Double => Value::Double(0.0),
            TypeSignature::Reference(_) | TypeSignature::Array { .. } => Value::Null,
        }
    }

    /// Wrap a host object.
    pub fn object<T: Any + Send + Sync>(object: T) -> Self {
        Value::Ref(Arc::new(object))
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The `int` payload, widening `byte`, `short` and `char`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Byte(v) => Some(i32::from(*v)),
            Value::Short(v) => Some(i32::from(*v)),
            Value::Char(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// The `long` payload, widening integral kinds.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            other => other.as_int().map(i64::from),
        }
    }

    /// The `double` payload, widening `float`.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// The `boolean` payload.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Downcast a host object.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Ref(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns true if the value can be stored in a slot of type `ty`.
    #[must_use]
    pub fn fits(&self, ty: &TypeSignature) -> bool {
        match (self, ty) {
            (Value::Void, TypeSignature::Void) => true,
            (Value::Null | Value::Str(_) | Value::Ref(_) | Value::Array(_), t) => t.is_reference(),
            (Value::Bool(_), TypeSignature::Boolean)
            | (Value::Char(_), TypeSignature::Char)
            | (Value::Byte(_), TypeSignature::Byte)
            | (Value::Short(_), TypeSignature::Short)
            | (Value::Int(_), TypeSignature::Int)
            | (Value::Long(_), TypeSignature::Long)
            | (Value::Float(_), TypeSignature::Float)
            | (Value::Double(_), TypeSignature::Double) => true,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'\\u{v:04x}'"),
            Value::Byte(v) => write!(f, "{v}b"),
            Value::Short(v) => write!(f, "{v}s"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}d"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Ref(_) => f.write_str("<object>"),
            Value::Array(values) => f.debug_list().entries(values.iter()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(Arc::from(value))
    }
}

/// An exception raised by an intercepted method or by injected logic.
///
/// Carries the thrown class and message so the host can rethrow an equivalent exception,
/// preserving the error's type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{class}: {message}")]
pub struct Thrown {
    /// Class of the thrown exception
    pub class: ClassName,
    /// Detail message, empty if none
    pub message: String,
}

impl Thrown {
    /// An exception of class `class`.
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Thrown {
            class: ClassName::new(class),
            message: message.into(),
        }
    }

    /// A `java.lang.RuntimeException`.
    pub fn runtime(message: impl Into<String>) -> Self {
        Thrown::new("java/lang/RuntimeException", message)
    }
}

/// Result of one intercepted call: the value returned to the caller or the exception thrown at
/// it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The call completed with a value
    Returned(Value),
    /// The call raised an exception
    Raised(Thrown),
}

impl Outcome {
    /// The returned value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Returned(value) => Some(value),
            Outcome::Raised(_) => None,
        }
    }

    /// The raised exception, if any.
    #[must_use]
    pub fn thrown(&self) -> Option<&Thrown> {
        match self {
            Outcome::Returned(_) => None,
            Outcome::Raised(thrown) => Some(thrown),
        }
    }

    /// Convert into a standard `Result`.
    ///
    /// # Errors
    /// Returns the raised exception.
    pub fn into_result(self) -> std::result::Result<Value, Thrown> {
        match self {
            Outcome::Returned(value) => Ok(value),
            Outcome::Raised(thrown) => Err(thrown),
        }
    }
}

impl From<std::result::Result<Value, Thrown>> for Outcome {
    fn from(value: std::result::Result<Value, Thrown>) -> Self {
        match value {
            Ok(value) => Outcome::Returned(value),
            Err(thrown) => Outcome::Raised(thrown),
        }
    }
}
