use std::{fmt, sync::Arc};

use crate::{
    classfile::{constpool::LiteralValue, flags::AccessFlags},
    inject::kinds::{Delta, InjectionKind, Target},
    runtime::{Accessors, Invoker, Thrown, Value},
    signatures::{ClassName, MethodDescriptor, TypeSignature},
    sites::MethodSite,
};

/// Decides whether a call is skipped: `(receiver, args, site) -> skip`.
pub type IgnorePredicate =
    Arc<dyn Fn(&Value, &[Value], &MethodSite) -> Result<bool, Thrown> + Send + Sync>;

/// Rewrites the arguments: `(receiver, args, site) -> args`.
pub type PreHookFn =
    Arc<dyn Fn(&Value, Vec<Value>, &MethodSite) -> Result<Vec<Value>, Thrown> + Send + Sync>;

/// Rewrites the return value: `(receiver, args, value, site) -> value`.
pub type PostHookFn =
    Arc<dyn Fn(&Value, &[Value], Value, &MethodSite) -> Result<Value, Thrown> + Send + Sync>;

/// Substitutes the call: `(receiver, args, original, site) -> value`.
pub type ReplaceFn = Arc<
    dyn Fn(&Value, &[Value], &dyn Invoker, &MethodSite) -> Result<Value, Thrown> + Send + Sync,
>;

/// Handles a raised call: `(receiver, args, error, fallback, site) -> value`.
pub type RecoveryFn = Arc<
    dyn Fn(&Value, &[Value], &Thrown, &dyn Invoker, &MethodSite) -> Result<Value, Thrown>
        + Send
        + Sync,
>;

/// Produces the initial value of an added field: `(receiver) -> value`.
pub type InitializerFn = Arc<dyn Fn(&Value) -> Result<Value, Thrown> + Send + Sync>;

/// Body of an added method: `(receiver, args, accessors) -> value`.
pub type MethodBodyFn =
    Arc<dyn Fn(&Value, &[Value], &Accessors) -> Result<Value, Thrown> + Send + Sync>;

/// How an added field gets its first value.
#[derive(Clone, Default)]
pub enum InitialValue {
    /// Left at the type's default
    #[default]
    None,
    /// A literal known at declaration time
    Constant(LiteralValue),
    /// Computed when the class (static) or instance is initialized
    Computed(InitializerFn),
}

impl fmt::Debug for InitialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialValue::None => f.write_str("None"),
            InitialValue::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            InitialValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A field to add to a class.
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    /// Modifiers
    pub access: AccessFlags,
    /// Field name, unique within the class
    pub name: String,
    /// Declared type
    pub ty: TypeSignature,
    /// Initial value
    pub initial: InitialValue,
}

impl FieldDeclaration {
    /// A field without an initial value.
    pub fn new(access: AccessFlags, name: &str, ty: TypeSignature) -> Self {
        FieldDeclaration {
            access,
            name: name.to_string(),
            ty,
            initial: InitialValue::None,
        }
    }

    /// Initialize with a literal.
    #[must_use]
    pub fn with_constant(mut self, value: LiteralValue) -> Self {
        self.initial = InitialValue::Constant(value);
        self
    }

    /// Initialize with a computed value.
    #[must_use]
    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        self.initial = InitialValue::Computed(Arc::new(initializer));
        self
    }

    /// Returns true for a static field whose value can be a `ConstantValue` attribute.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.access.is_static() && matches!(self.initial, InitialValue::Constant(_))
    }
}

/// A method the body of an added method may call through its accessor map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Method name, also the accessor key
    pub name: String,
    /// Descriptor selecting the overload
    pub descriptor: MethodDescriptor,
}

/// A method to add to a class.
#[derive(Clone)]
pub struct MethodDeclaration {
    /// Modifiers
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Parameter and return types
    pub descriptor: MethodDescriptor,
    /// Declared thrown classes
    pub throws: Vec<ClassName>,
    /// The logic the generated method delegates to
    pub body: MethodBodyFn,
    /// Fields the body reads or writes, by name
    pub fields: Vec<String>,
    /// Methods the body invokes
    pub methods: Vec<MethodReference>,
}

impl MethodDeclaration {
    /// A method delegating to `body`, with no accessors.
    pub fn new<F>(access: AccessFlags, name: &str, descriptor: MethodDescriptor, body: F) -> Self
    where
        F: Fn(&Value, &[Value], &Accessors) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        MethodDeclaration {
            access,
            name: name.to_string(),
            descriptor,
            throws: Vec::new(),
            body: Arc::new(body),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Declare a thrown class.
    #[must_use]
    pub fn throws(mut self, class: ClassName) -> Self {
        self.throws.push(class);
        self
    }

    /// Request a field accessor.
    #[must_use]
    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    /// Request a method accessor.
    #[must_use]
    pub fn method(mut self, name: &str, descriptor: MethodDescriptor) -> Self {
        self.methods.push(MethodReference {
            name: name.to_string(),
            descriptor,
        });
        self
    }
}

impl fmt::Debug for MethodDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDeclaration")
            .field("access", &self.access)
            .field("name", &self.name)
            .field("descriptor", &self.descriptor.descriptor())
            .field("throws", &self.throws)
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// A declared change to one site.
///
/// Injections are immutable once built and cheap to clone; the callbacks they carry are shared.
#[derive(Clone)]
pub enum Injection {
    /// Declare a field on the class
    AddField(FieldDeclaration),
    /// Declare a method on the class
    AddMethod(MethodDeclaration),
    /// Skip the call, returning the default value, when the predicate holds
    IgnoreMethod(IgnorePredicate),
    /// Rewrite the arguments before the call
    PreHook(PreHookFn),
    /// Rewrite the return value after the call
    PostHook(PostHookFn),
    /// Substitute the call
    ReplaceMethod(ReplaceFn),
    /// Supply the result when the call raises
    ErrorRecovery(RecoveryFn),
    /// Explicitly leave a site of the given kind unchanged
    None(Target),
}

impl Injection {
    /// Add a field.
    #[must_use]
    pub fn add_field(declaration: FieldDeclaration) -> Self {
        Injection::AddField(declaration)
    }

    /// Add a method.
    #[must_use]
    pub fn add_method(declaration: MethodDeclaration) -> Self {
        Injection::AddMethod(declaration)
    }

    /// Skip calls for which `predicate` returns true.
    pub fn ignore<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &[Value], &MethodSite) -> Result<bool, Thrown> + Send + Sync + 'static,
    {
        Injection::IgnoreMethod(Arc::new(predicate))
    }

    /// Rewrite arguments with `hook`.
    pub fn pre_hook<F>(hook: F) -> Self
    where
        F: Fn(&Value, Vec<Value>, &MethodSite) -> Result<Vec<Value>, Thrown>
            + Send
            + Sync
            + 'static,
    {
        Injection::PreHook(Arc::new(hook))
    }

    /// Rewrite return values with `hook`.
    pub fn post_hook<F>(hook: F) -> Self
    where
        F: Fn(&Value, &[Value], Value, &MethodSite) -> Result<Value, Thrown>
            + Send
            + Sync
            + 'static,
    {
        Injection::PostHook(Arc::new(hook))
    }

    /// Substitute calls with `replacement`.
    pub fn replace<F>(replacement: F) -> Self
    where
        F: Fn(&Value, &[Value], &dyn Invoker, &MethodSite) -> Result<Value, Thrown>
            + Send
            + Sync
            + 'static,
    {
        Injection::ReplaceMethod(Arc::new(replacement))
    }

    /// Recover raised calls with `recovery`.
    pub fn recover<F>(recovery: F) -> Self
    where
        F: Fn(&Value, &[Value], &Thrown, &dyn Invoker, &MethodSite) -> Result<Value, Thrown>
            + Send
            + Sync
            + 'static,
    {
        Injection::ErrorRecovery(Arc::new(recovery))
    }

    /// The variant of this injection.
    #[must_use]
    pub fn kind(&self) -> InjectionKind {
        match self {
            Injection::AddField(_) => InjectionKind::AddField,
            Injection::AddMethod(_) => InjectionKind::AddMethod,
            Injection::IgnoreMethod(_) => InjectionKind::IgnoreMethod,
            Injection::PreHook(_) => InjectionKind::PreHook,
            Injection::PostHook(_) => InjectionKind::PostHook,
            Injection::ReplaceMethod(_) => InjectionKind::ReplaceMethod,
            Injection::ErrorRecovery(_) => InjectionKind::ErrorRecovery,
            Injection::None(_) => InjectionKind::None,
        }
    }

    /// The kind of site this injection applies to.
    #[must_use]
    pub fn target(&self) -> Target {
        match self {
            Injection::None(target) => *target,
            other => other.kind().target().unwrap_or(Target::Method),
        }
    }

    /// The effect classification.
    #[must_use]
    pub fn delta(&self) -> Delta {
        self.kind().delta()
    }

    /// Position in the fixed application order.
    #[must_use]
    pub fn rank(&self) -> u8 {
        self.kind().rank()
    }

    /// Returns true for [`Injection::None`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Injection::None(_))
    }
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Injection::AddField(field) => f.debug_tuple("AddField").field(field).finish(),
            Injection::AddMethod(method) => f.debug_tuple("AddMethod").field(method).finish(),
            Injection::None(target) => f.debug_tuple("None").field(target).finish(),
            other => write!(f, "{}(..)", other.kind()),
        }
    }
}

/// Sort injections into application order.
///
/// The sort is stable: injections of equal rank keep the order they were produced in.
pub fn sort_by_rank(injections: &mut [Injection]) {
    injections.sort_by_key(Injection::rank);
}
