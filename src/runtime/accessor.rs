//! Capability objects handed to injected logic.
//!
//! An [`Invoker`] is the "call the original" or "return the prior value" capability given to
//! replacements and recoveries. [`FieldAccessor`] and [`MethodAccessor`] are the narrow views of
//! pre-declared members an added method body receives; generated accessor thunks implement the
//! same interfaces on the class side.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use crate::runtime::value::{Thrown, Value};

/// Invokes a method on behalf of injected logic.
pub trait Invoker: Send + Sync {
    /// Invoke with `receiver` (null for static methods) and `args`.
    ///
    /// # Errors
    /// Returns the exception raised by the invoked code.
    fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value, Thrown>;
}

impl<F> Invoker for F
where
    F: Fn(&Value, &[Value]) -> Result<Value, Thrown> + Send + Sync,
{
    fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value, Thrown> {
        self(receiver, args)
    }
}

/// An invoker that never calls anything and returns a previously computed value.
#[derive(Debug, Clone)]
pub struct PriorValue(pub Value);

impl Invoker for PriorValue {
    fn invoke(&self, _receiver: &Value, _args: &[Value]) -> Result<Value, Thrown> {
        Ok(self.0.clone())
    }
}

/// Read and write access to one field.
///
/// Writes are buffered: `set` records a pending value and marks the accessor dirty; the caller
/// of the added method stores dirty values back into the real field once the body returns.
pub trait FieldAccessor: Send + Sync {
    /// Current value, the pending one if the accessor is dirty.
    fn get(&self) -> Value;

    /// Record a new value.
    fn set(&self, value: Value);

    /// Returns true once `set` was called.
    fn is_dirty(&self) -> bool;
}

/// Invocation access to one method.
pub trait MethodAccessor: Send + Sync {
    /// Invoke with positional arguments.
    ///
    /// # Errors
    /// Returns the exception raised by the method.
    fn invoke(&self, args: &[Value]) -> Result<Value, Thrown>;
}

impl<F> MethodAccessor for F
where
    F: Fn(&[Value]) -> Result<Value, Thrown> + Send + Sync,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, Thrown> {
        self(args)
    }
}

/// A [`FieldAccessor`] over a value held in memory.
pub struct FieldCell {
    value: RwLock<Value>,
    dirty: AtomicBool,
}

impl FieldCell {
    /// A clean accessor holding `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        FieldCell {
            value: RwLock::new(value),
            dirty: AtomicBool::new(false),
        }
    }
}

impl FieldAccessor for FieldCell {
    fn get(&self) -> Value {
        self.value
            .read()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |v| v.clone())
    }

    fn set(&self, value: Value) {
        match self.value.write() {
            Ok(mut slot) => *slot = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
        self.dirty.store(true, Ordering::Release);
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// The field and method accessor maps passed to an added method body, keyed by the identifiers
/// the method declared.
#[derive(Default, Clone)]
pub struct Accessors {
    fields: BTreeMap<String, Arc<dyn FieldAccessor>>,
    methods: BTreeMap<String, Arc<dyn MethodAccessor>>,
}

impl Accessors {
    /// Empty maps.
    #[must_use]
    pub fn new() -> Self {
        Accessors::default()
    }

    /// Add a field accessor.
    pub fn with_field(mut self, name: &str, accessor: Arc<dyn FieldAccessor>) -> Self {
        self.fields.insert(name.to_string(), accessor);
        self
    }

    /// Add a method accessor.
    pub fn with_method(mut self, name: &str, accessor: Arc<dyn MethodAccessor>) -> Self {
        self.methods.insert(name.to_string(), accessor);
        self
    }

    /// The accessor of field `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<dyn FieldAccessor>> {
        self.fields.get(name)
    }

    /// The accessor of method `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Arc<dyn MethodAccessor>> {
        self.methods.get(name)
    }

    /// Names of the fields written during the call.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, accessor)| accessor.is_dirty())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessors")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
