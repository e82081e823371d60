use std::{fmt, sync::Arc};

use strum::{Display, EnumIter};

use crate::{
    classfile::{attributes::DecodeOptions, flags::AccessFlags, ClassFile},
    inject::Target,
    signatures::{ClassName, TypeInfo, TypeParameter},
    sites::{
        annotation::AnnotationSite,
        arena::{ArtifactId, SiteArena, Woven},
        member::{FieldSite, MethodSite},
        Materializer, Site, SiteCache, SiteKey,
    },
    Result,
};

/// Shape of a class declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ClassKind {
    /// A concrete class
    Class,
    /// An interface
    Interface,
    /// An enum class
    Enum,
    /// An abstract class
    AbstractClass,
    /// An annotation interface
    Annotation,
}

impl ClassKind {
    /// Kind of a class with modifiers `access`.
    #[must_use]
    pub fn from_access(access: AccessFlags) -> Self {
        if access.contains(AccessFlags::ANNOTATION) {
            ClassKind::Annotation
        } else if access.contains(AccessFlags::INTERFACE) {
            ClassKind::Interface
        } else if access.contains(AccessFlags::ENUM) {
            ClassKind::Enum
        } else if access.contains(AccessFlags::ABSTRACT) {
            ClassKind::AbstractClass
        } else {
            ClassKind::Class
        }
    }
}

/// The runtime package a class belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSite {
    name: String,
}

impl PackageSite {
    /// Package in internal form, `java/util`; empty for the unnamed package.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package in source form, `java.util`.
    #[must_use]
    pub fn binary_name(&self) -> String {
        self.name.replace('/', ".")
    }

    /// Returns true for the unnamed package.
    #[must_use]
    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }
}

/// Read-only structural view of one class artifact.
///
/// A `ClassSite` is a cheap handle: cloning it shares the underlying arena. Member collections
/// and annotations are extracted on first access and memoized; two handles over the same arena
/// see the same data.
///
/// Equality is structural: two sites are equal when their declarations (names, modifiers, types,
/// members and annotations) match, whichever artifact they were materialized from.
#[derive(Clone)]
pub struct ClassSite {
    pub(crate) arena: Arc<SiteArena>,
}

impl ClassSite {
    /// Materialize a class image with default decoding limits.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the image cannot be decoded.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with(data, &DecodeOptions::default())
    }

    /// Materialize a class image.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the image cannot be decoded.
    pub fn from_bytes_with(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        Ok(ClassSite {
            arena: Arc::new(SiteArena::decode(data, options)?),
        })
    }

    /// Wrap an already decoded class. `id` should identify the bytes it was decoded from.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if a member name or descriptor is invalid.
    pub fn from_class(id: ArtifactId, class: ClassFile) -> Result<Self> {
        Ok(ClassSite {
            arena: Arc::new(SiteArena::build(id, class).map_err(crate::Error::into_malformed)?),
        })
    }

    /// Identity of the artifact this site was materialized from.
    #[must_use]
    pub fn artifact(&self) -> ArtifactId {
        self.arena.id
    }

    /// The decoded class image.
    #[must_use]
    pub fn class_file(&self) -> &ClassFile {
        &self.arena.class
    }

    /// Class file major version.
    #[must_use]
    pub fn major_version(&self) -> u16 {
        self.arena.class.major_version
    }

    /// Name of the class.
    #[must_use]
    pub fn class_name(&self) -> &ClassName {
        &self.arena.name
    }

    /// Shape of the declaration.
    #[must_use]
    pub fn kind(&self) -> ClassKind {
        ClassKind::from_access(self.arena.class.access)
    }

    /// Returns true for interfaces and annotation interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.arena.class.access.contains(AccessFlags::INTERFACE)
    }

    /// Owning package.
    #[must_use]
    pub fn package(&self) -> PackageSite {
        PackageSite {
            name: self.arena.name.package().to_string(),
        }
    }

    /// Name of the superclass, `None` only for `java.lang.Object` and module descriptors.
    #[must_use]
    pub fn super_name(&self) -> Option<&ClassName> {
        self.arena.super_name.as_ref()
    }

    /// Superclass type, generic when the class carries a signature.
    #[must_use]
    pub fn superclass(&self) -> Option<&TypeInfo> {
        self.arena.generics().superclass.as_ref()
    }

    /// Names of the direct superinterfaces.
    #[must_use]
    pub fn interface_names(&self) -> &[ClassName] {
        &self.arena.interfaces
    }

    /// Direct superinterface types, generic when the class carries a signature.
    #[must_use]
    pub fn interfaces(&self) -> &[TypeInfo] {
        &self.arena.generics().interfaces
    }

    /// Declared type parameters.
    #[must_use]
    pub fn type_parameters(&self) -> &[TypeParameter] {
        &self.arena.generics().type_parameters
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<FieldSite> {
        (0..self.arena.field_names.len())
            .map(|index| FieldSite::new(self.arena.clone(), index as u16))
            .collect()
    }

    /// Declared methods and constructors in declaration order.
    #[must_use]
    pub fn methods(&self) -> Vec<MethodSite> {
        (0..self.arena.method_names.len())
            .map(|index| MethodSite::new(self.arena.clone(), index as u16))
            .collect()
    }

    /// The field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldSite> {
        self.arena
            .field_names
            .iter()
            .position(|n| n == name)
            .map(|index| FieldSite::new(self.arena.clone(), index as u16))
    }

    /// The method named `name` with descriptor `descriptor`.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<MethodSite> {
        self.arena
            .method_names
            .iter()
            .zip(&self.arena.method_descriptors)
            .position(|(n, d)| n == name && d.descriptor() == descriptor)
            .map(|index| MethodSite::new(self.arena.clone(), index as u16))
    }

    /// Every overload named `name`.
    #[must_use]
    pub fn methods_named(&self, name: &str) -> Vec<MethodSite> {
        self.methods()
            .into_iter()
            .filter(|m| m.name() == name)
            .collect()
    }

    /// Instance constructors.
    #[must_use]
    pub fn constructors(&self) -> Vec<MethodSite> {
        self.methods_named("<init>")
    }

    /// Name of the lexically enclosing class, for nested, local and anonymous classes.
    #[must_use]
    pub fn enclosing_name(&self) -> Option<&ClassName> {
        self.arena.enclosing()
    }

    /// The enclosing class, if `cache` holds it.
    ///
    /// The site refers to its enclosing class by name only and never keeps it alive.
    #[must_use]
    pub fn enclosing(&self, cache: &SiteCache) -> Option<ClassSite> {
        self.enclosing_name().and_then(|name| cache.by_name(name))
    }

    /// Stamp left by a previous rewrite.
    #[must_use]
    pub fn woven(&self) -> Option<Woven> {
        self.arena.woven()
    }

    /// Resolve to a live type, if the materializer knows one.
    pub fn materialize<M: Materializer>(&self, materializer: &M) -> Option<M::Class> {
        materializer.class(self)
    }

    /// Returns true if both handles share one arena.
    #[must_use]
    pub fn ptr_eq(&self, other: &ClassSite) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena)
    }
}

impl Site for ClassSite {
    fn target(&self) -> Target {
        Target::Class
    }

    fn access(&self) -> AccessFlags {
        self.arena.class.access
    }

    fn name(&self) -> &str {
        self.arena.name.internal()
    }

    fn annotations(&self) -> &[AnnotationSite] {
        self.arena.annotations()
    }

    fn key(&self) -> SiteKey {
        SiteKey::Class(self.arena.id)
    }
}

impl PartialEq for ClassSite {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.class_name() == other.class_name()
            && self.access() == other.access()
            && self.super_name() == other.super_name()
            && self.interface_names() == other.interface_names()
            && self.superclass() == other.superclass()
            && self.interfaces() == other.interfaces()
            && self.type_parameters() == other.type_parameters()
            && self.annotations() == other.annotations()
            && self.fields() == other.fields()
            && self.methods() == other.methods()
    }
}

impl fmt::Display for ClassSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arena.name)
    }
}

impl fmt::Debug for ClassSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSite")
            .field("name", &self.arena.name.internal())
            .field("kind", &self.kind())
            .field("artifact", &self.arena.id)
            .finish_non_exhaustive()
    }
}
