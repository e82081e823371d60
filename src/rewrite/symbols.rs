//! Names and descriptors generated code links against.

use crate::signatures::{ClassName, MethodDescriptor, TypeSignature};

/// Runtime entry points, bound by the host to [`crate::runtime::Bridge`].
pub const BRIDGE: &str = "classweave/runtime/Bridge";
/// Interface implemented by field accessor thunks.
pub const FIELD_ACCESSOR: &str = "classweave/runtime/FieldAccessor";
/// Interface implemented by method accessor and call thunks.
pub const METHOD_ACCESSOR: &str = "classweave/runtime/MethodAccessor";

/// Suffix of the method an intercepted body is moved to.
pub const ORIGINAL_SUFFIX: &str = "$cw$original";
/// Prefix of the static field holding an initializer token.
pub const HOLDER_PREFIX: &str = "$cw$init$";
/// Marker between an owner name and a helper name.
pub const HELPER_MARKER: &str = "cw$";

/// Receiver field of instance thunks.
pub const TARGET_FIELD: &str = "target";
/// Write flag of field accessor thunks.
pub const DIRTY_FIELD: &str = "dirty";

fn class(name: &str) -> TypeSignature {
    TypeSignature::class(name)
}

fn objects() -> TypeSignature {
    TypeSignature::object().array_of(1)
}

pub(crate) fn bridge() -> ClassName {
    ClassName::new(BRIDGE)
}

pub(crate) fn map() -> ClassName {
    ClassName::new("java/util/Map")
}

pub(crate) fn hash_map() -> ClassName {
    ClassName::new("java/util/HashMap")
}

/// `Bridge.intercept(String, Object, Object[], MethodAccessor) -> Object`
pub(crate) fn intercept() -> MethodDescriptor {
    MethodDescriptor::new(
        vec![
            TypeSignature::string(),
            TypeSignature::object(),
            objects(),
            class(METHOD_ACCESSOR),
        ],
        TypeSignature::object(),
    )
}

/// `Bridge.invokeAdded(String, Object, Object[], Map, Map) -> Object`
pub(crate) fn invoke_added() -> MethodDescriptor {
    MethodDescriptor::new(
        vec![
            TypeSignature::string(),
            TypeSignature::object(),
            objects(),
            class("java/util/Map"),
            class("java/util/Map"),
        ],
        TypeSignature::object(),
    )
}

/// `Bridge.initialValue(String, Object) -> Object`
pub(crate) fn initial_value() -> MethodDescriptor {
    MethodDescriptor::new(
        vec![TypeSignature::string(), TypeSignature::object()],
        TypeSignature::object(),
    )
}

/// `MethodAccessor.invoke(Object[]) -> Object`
pub(crate) fn accessor_invoke() -> MethodDescriptor {
    MethodDescriptor::new(vec![objects()], TypeSignature::object())
}

/// `FieldAccessor.get() -> Object`
pub(crate) fn accessor_get() -> MethodDescriptor {
    MethodDescriptor::new(Vec::new(), TypeSignature::object())
}

/// `FieldAccessor.set(Object)`
pub(crate) fn accessor_set() -> MethodDescriptor {
    MethodDescriptor::new(vec![TypeSignature::object()], TypeSignature::Void)
}

/// `FieldAccessor.isDirty() -> boolean`
pub(crate) fn accessor_dirty() -> MethodDescriptor {
    MethodDescriptor::new(Vec::new(), TypeSignature::Boolean)
}

/// `Map.put(Object, Object) -> Object`
pub(crate) fn map_put() -> MethodDescriptor {
    MethodDescriptor::new(
        vec![TypeSignature::object(), TypeSignature::object()],
        TypeSignature::object(),
    )
}

/// `()V`
pub(crate) fn no_args() -> MethodDescriptor {
    MethodDescriptor::new(Vec::new(), TypeSignature::Void)
}

/// Name of the method the body of `name` moves to, `name$cw$original`.
#[must_use]
pub fn original_name(name: &str) -> String {
    format!("{name}{ORIGINAL_SUFFIX}")
}

/// Name of the token holder of added field `field`.
#[must_use]
pub fn holder_name(field: &str) -> String {
    format!("{HOLDER_PREFIX}{field}")
}
