use std::{fmt, sync::Arc};

use crate::{
    classfile::{constpool::LiteralValue, flags::AccessFlags, MemberInfo},
    inject::Target,
    signatures::{MethodDescriptor, TypeInfo, TypeParameter, TypeSignature},
    sites::{
        annotation::AnnotationSite,
        arena::{FieldData, MethodData, ParameterSite, SiteArena},
        class::ClassSite,
        Site, SiteKey,
    },
};

/// A declared field.
#[derive(Clone)]
pub struct FieldSite {
    arena: Arc<SiteArena>,
    index: u16,
}

impl FieldSite {
    pub(crate) fn new(arena: Arc<SiteArena>, index: u16) -> Self {
        FieldSite { arena, index }
    }

    fn data(&self) -> &FieldData {
        &self.arena.fields()[usize::from(self.index)]
    }

    pub(crate) fn info(&self) -> &MemberInfo {
        &self.arena.class.fields[usize::from(self.index)]
    }

    /// Declaring class.
    #[must_use]
    pub fn owner(&self) -> ClassSite {
        ClassSite {
            arena: self.arena.clone(),
        }
    }

    /// Position in the declaring class's field table.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Erased type from the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &TypeSignature {
        &self.arena.field_types[usize::from(self.index)]
    }

    /// Declared type, generic when the field carries a signature.
    #[must_use]
    pub fn ty(&self) -> &TypeInfo {
        &self.data().ty
    }

    /// Compile-time constant of a static final field.
    #[must_use]
    pub fn constant(&self) -> Option<&LiteralValue> {
        self.data().constant.as_ref()
    }

    /// Returns true if the field belongs to the class rather than an instance.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.info().access.is_static()
    }
}

impl Site for FieldSite {
    fn target(&self) -> Target {
        Target::Field
    }

    fn access(&self) -> AccessFlags {
        self.info().access
    }

    fn name(&self) -> &str {
        &self.arena.field_names[usize::from(self.index)]
    }

    fn annotations(&self) -> &[AnnotationSite] {
        &self.data().annotations
    }

    fn key(&self) -> SiteKey {
        SiteKey::Field(self.arena.id, self.index)
    }
}

impl PartialEq for FieldSite {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.access() == other.access()
            && self.descriptor() == other.descriptor()
            && self.ty() == other.ty()
            && self.constant() == other.constant()
            && self.annotations() == other.annotations()
    }
}

impl fmt::Display for FieldSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.arena.name, self.name())
    }
}

impl fmt::Debug for FieldSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSite")
            .field("owner", &self.arena.name.internal())
            .field("name", &self.name())
            .field("descriptor", &self.descriptor().descriptor())
            .finish()
    }
}

/// A declared method, constructor or static initializer.
#[derive(Clone)]
pub struct MethodSite {
    arena: Arc<SiteArena>,
    index: u16,
}

impl MethodSite {
    pub(crate) fn new(arena: Arc<SiteArena>, index: u16) -> Self {
        MethodSite { arena, index }
    }

    fn data(&self) -> &MethodData {
        &self.arena.methods()[usize::from(self.index)]
    }

    pub(crate) fn info(&self) -> &MemberInfo {
        &self.arena.class.methods[usize::from(self.index)]
    }

    /// Declaring class.
    #[must_use]
    pub fn owner(&self) -> ClassSite {
        ClassSite {
            arena: self.arena.clone(),
        }
    }

    /// Position in the declaring class's method table.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Erased parameter and return types.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.arena.method_descriptors[usize::from(self.index)]
    }

    /// Erased return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeSignature {
        &self.descriptor().ret
    }

    /// Return type, generic when the method carries a signature.
    #[must_use]
    pub fn generic_return_type(&self) -> &TypeInfo {
        &self.data().return_type
    }

    /// Formal parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSite] {
        &self.data().parameters
    }

    /// Declared thrown types.
    #[must_use]
    pub fn throws(&self) -> &[TypeInfo] {
        &self.data().throws
    }

    /// Declared method type parameters.
    #[must_use]
    pub fn type_parameters(&self) -> &[TypeParameter] {
        &self.data().type_parameters
    }

    /// Returns true for `<init>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name() == "<init>"
    }

    /// Returns true for `<clinit>`.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name() == "<clinit>"
    }

    /// Returns true if the method belongs to the class rather than an instance.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.info().access.is_static()
    }

    /// Returns true if the method has bytecode.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.info().code().is_some()
    }
}

impl Site for MethodSite {
    fn target(&self) -> Target {
        Target::Method
    }

    fn access(&self) -> AccessFlags {
        self.info().access
    }

    fn name(&self) -> &str {
        &self.arena.method_names[usize::from(self.index)]
    }

    fn annotations(&self) -> &[AnnotationSite] {
        &self.data().annotations
    }

    fn key(&self) -> SiteKey {
        SiteKey::Method(self.arena.id, self.index)
    }
}

impl PartialEq for MethodSite {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.access() == other.access()
            && self.descriptor() == other.descriptor()
            && self.generic_return_type() == other.generic_return_type()
            && self.parameters() == other.parameters()
            && self.throws() == other.throws()
            && self.type_parameters() == other.type_parameters()
            && self.annotations() == other.annotations()
    }
}

impl fmt::Display for MethodSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.arena.name, self.name(), self.descriptor())
    }
}

impl fmt::Debug for MethodSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSite")
            .field("owner", &self.arena.name.internal())
            .field("name", &self.name())
            .field("descriptor", &self.descriptor().descriptor())
            .finish()
    }
}
