//! Structural, read-only model of a class and its members.
//!
//! Visitors never see bytecode. They inspect sites: a [`ClassSite`] describes one class
//! artifact, [`FieldSite`] and [`MethodSite`] its declared members, [`ParameterSite`] and
//! [`AnnotationSite`] the details hanging off them. The model is independent of the binary
//! encoding; it is built from a decoded [`crate::classfile::ClassFile`] but exposes only names,
//! modifiers, types and annotations.
//!
//! # Materialization
//!
//! [`ClassSite::from_bytes`] decodes an image and validates every member name and descriptor;
//! an image that fails either step is a [`crate::Error::MalformedArtifact`]. Everything else
//! is extracted lazily on first access and memoized per artifact. Elements that cannot be
//! resolved (a generic signature that does not parse, an annotation value pointing at the wrong
//! constant) do not fail materialization; they resolve to [`crate::signatures::TypeInfo::Unknown`]
//! or [`AnnotationValue::Unknown`].
//!
//! # Ownership
//!
//! Each artifact owns one arena. Site handles hold the arena through an `Arc` and address members
//! by index; members reach their owner through the same `Arc`. The enclosing class of a nested
//! class is recorded by name and resolved through a [`SiteCache`], so no site keeps another
//! artifact alive.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::sites::{ClassSite, Site};
//!
//! let bytes = std::fs::read("Sample.class")?;
//! let class = ClassSite::from_bytes(&bytes)?;
//! for method in class.methods() {
//!     let params: Vec<_> = method.parameters().iter().map(|p| p.name()).collect();
//!     println!("{} {:?}", method, params);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod annotation;
mod arena;
mod cache;
mod class;
mod member;

pub use annotation::{AnnotationSite, AnnotationValue};
pub use arena::{ArtifactId, ParameterSite, Woven};
pub use cache::SiteCache;
pub use class::{ClassKind, ClassSite, PackageSite};
pub use member::{FieldSite, MethodSite};

use crate::{classfile::flags::AccessFlags, inject::Target};

/// Identity of a site within one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteKey {
    /// A class artifact
    Class(ArtifactId),
    /// Field `index` of an artifact
    Field(ArtifactId, u16),
    /// Method `index` of an artifact
    Method(ArtifactId, u16),
}

impl SiteKey {
    /// The artifact the site belongs to.
    #[must_use]
    pub fn artifact(&self) -> ArtifactId {
        match self {
            SiteKey::Class(id) | SiteKey::Field(id, _) | SiteKey::Method(id, _) => *id,
        }
    }
}

/// Properties shared by class, field and method sites.
pub trait Site {
    /// Kind of site, matched against an injection's target.
    fn target(&self) -> Target;

    /// Declared modifiers.
    fn access(&self) -> AccessFlags;

    /// Declared name; internal form for classes.
    fn name(&self) -> &str;

    /// Declaration annotations, runtime-visible first.
    fn annotations(&self) -> &[AnnotationSite];

    /// Identity of the site.
    fn key(&self) -> SiteKey;

    /// Returns true if the site is not present in source.
    fn is_synthetic(&self) -> bool {
        let access = self.access();
        access.contains(AccessFlags::SYNTHETIC)
            || (self.target() == Target::Method && access.contains(AccessFlags::BRIDGE))
    }

    /// The annotation of type `type_name` (internal form), if present.
    fn annotation(&self, type_name: &str) -> Option<&AnnotationSite> {
        self.annotations()
            .iter()
            .find(|a| a.type_name().internal() == type_name)
    }
}

/// Resolves sites back to live runtime objects when a runtime is available.
pub trait Materializer {
    /// Live class handle
    type Class;
    /// Live annotation instance
    type Annotation;

    /// The live class for `site`, if it is loaded.
    fn class(&self, site: &ClassSite) -> Option<Self::Class>;

    /// The live annotation for `site`.
    fn annotation(&self, _site: &AnnotationSite) -> Option<Self::Annotation> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        signatures::{TypeInfo, TypeSignature},
        test::{generic_class_bytes, sample_class_bytes},
    };

    #[test]
    fn members_are_lazy_and_memoized() -> crate::Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        assert!(!class.arena.methods_extracted());
        assert_eq!(class.class_name().internal(), "demo/Sample");

        let compute = class.method("compute", "(I)I").unwrap();
        assert!(!class.arena.methods_extracted());
        let first = compute.parameters();
        assert!(class.arena.methods_extracted());
        let second = class.method("compute", "(I)I").unwrap();
        assert!(std::ptr::eq(first, second.parameters()));
        assert!(std::ptr::eq(compute.owner().annotations(), class.annotations()));
        Ok(())
    }

    #[test]
    fn class_shape() -> crate::Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        assert_eq!(class.kind(), ClassKind::Class);
        assert_eq!(class.package().binary_name(), "demo");
        assert_eq!(class.super_name().map(|n| n.internal()), Some("java/lang/Object"));
        assert_eq!(class.constructors().len(), 2);
        assert_eq!(class.key(), SiteKey::Class(class.artifact()));
        assert!(class.woven().is_none());

        let marker = class.annotation("demo/Marker").unwrap();
        assert!(marker.is_visible());
        assert_eq!(marker.value("value"), Some(&AnnotationValue::Int(1)));
        Ok(())
    }

    #[test]
    fn fields_and_constants() -> crate::Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        let names: Vec<_> = class.fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, ["count", "LIMIT", "names"]);

        let limit = class.field("LIMIT").unwrap();
        assert!(limit.is_static());
        assert_eq!(
            limit.constant(),
            Some(&crate::classfile::constpool::LiteralValue::Int(10))
        );

        let list = class.field("names").unwrap();
        assert_eq!(list.descriptor(), &TypeSignature::class("java/util/List"));
        assert!(list.ty().is_generic());
        assert_eq!(list.owner().class_name(), class.class_name());
        Ok(())
    }

    #[test]
    fn parameter_names_from_both_sources() -> crate::Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        let compute = class.method("compute", "(I)I").unwrap();
        assert_eq!(compute.parameters()[0].name(), Some("value"));
        assert_eq!(compute.return_type(), &TypeSignature::Int);

        let greet = class
            .method("greet", "(Ljava/lang/String;)Ljava/lang/String;")
            .unwrap();
        assert!(greet.is_static());
        assert_eq!(greet.parameters()[0].name(), Some("who"));
        assert!(!greet.parameters()[0].is_varargs());
        Ok(())
    }

    #[test]
    fn unresolvable_generics_become_unknown() -> crate::Result<()> {
        let class = ClassSite::from_bytes(&generic_class_bytes())?;
        assert_eq!(class.type_parameters().len(), 1);
        assert!(matches!(
            class.interfaces()[0],
            TypeInfo::Parameterized { .. }
        ));

        let broken = class.methods_named("broken").pop().unwrap();
        assert_eq!(broken.parameters()[0].ty(), &TypeInfo::Unknown);
        assert_eq!(broken.parameters()[0].descriptor(), &TypeSignature::object());
        assert_eq!(broken.generic_return_type(), &TypeInfo::Unknown);
        Ok(())
    }

    #[test]
    fn malformed_descriptor_fails_materialization() {
        let mut class = crate::test::sample_class();
        let bad = class.constant_pool.add_utf8("(Q)V");
        class.methods[0].descriptor = bad;
        let bytes = class.to_bytes().unwrap();
        assert!(ClassSite::from_bytes(&bytes).unwrap_err().is_malformed());
    }

    #[test]
    fn materialization_is_structurally_idempotent() -> crate::Result<()> {
        let bytes = sample_class_bytes();
        let first = ClassSite::from_bytes(&bytes)?;
        let second = ClassSite::from_bytes(&bytes)?;
        assert!(!first.ptr_eq(&second));
        assert_eq!(first, second);
        assert_eq!(first.methods(), second.methods());
        Ok(())
    }

    #[test]
    fn cache_returns_the_same_arena() -> crate::Result<()> {
        let cache = SiteCache::new();
        let bytes = sample_class_bytes();
        let first = cache.materialize(&bytes)?;
        let second = cache.materialize(&bytes)?;
        assert!(first.ptr_eq(&second));
        assert_eq!(cache.len(), 1);
        assert!(cache
            .by_name(first.class_name())
            .is_some_and(|site| site.ptr_eq(&first)));

        cache.evict(&first.artifact());
        assert!(cache.is_empty());
        assert!(cache.by_name(first.class_name()).is_none());
        assert_eq!(first.methods().len(), second.methods().len());
        Ok(())
    }

    #[test]
    fn nested_class_resolves_enclosing_through_cache() -> crate::Result<()> {
        let cache = SiteCache::new();
        let outer = cache.materialize(&sample_class_bytes())?;
        let inner = cache.materialize(&crate::test::inner_class_bytes())?;
        assert_eq!(inner.enclosing_name(), Some(outer.class_name()));
        assert!(inner.enclosing(&cache).is_some_and(|site| site.ptr_eq(&outer)));
        assert!(outer.enclosing_name().is_none());
        Ok(())
    }
}
