//! Boundary between the pipeline and the class format it rewrites.
//!
//! The pipeline needs three capabilities from a backend: turning bytes into a
//! [`crate::sites::ClassSite`] ([`ClassDecoder`]), turning a site plus a
//! [`crate::rewrite::RewritePlan`] back into bytes ([`ClassEncoder`]), and making new bytes the
//! active definition of a class ([`ClassDefiner`]). All three are object safe so an injector can
//! hold them as trait objects.
//!
//! [`JvmBackend`] implements decoding and encoding with this crate's class file codec.
//! [`ClassSpace`] is an in-memory definer that validates images and tracks definitions by name,
//! standing in for a class loader in tests and offline tools.

mod space;

pub use space::{ClassHandle, ClassSpace, DefineMode};

use crate::{
    classfile::attributes::DecodeOptions,
    inject::InjectionKinds,
    rewrite::{rewrite, RewriteOutput, RewritePlan},
    sites::{ClassSite, SiteCache},
    Result,
};

/// Decodes binary class images into sites.
pub trait ClassDecoder: Send + Sync {
    /// Materialize `bytes`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] for any image that cannot be decoded.
    fn decode(&self, bytes: &[u8]) -> Result<ClassSite>;

    /// Forget anything kept for `class` once the pipeline is done with it.
    ///
    /// Handles already given out stay usable.
    fn release(&self, _class: &ClassSite) {}
}

/// Generates rewritten class images.
pub trait ClassEncoder: Send + Sync {
    /// Injection kinds this encoder can realize.
    fn supported(&self) -> InjectionKinds;

    /// Apply `plan` to `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleConfiguration`] or [`crate::Error::NotSupported`] when
    /// the plan cannot be realized on this class.
    fn encode(&self, class: &ClassSite, plan: &RewritePlan) -> Result<RewriteOutput>;
}

/// Installs class definitions.
pub trait ClassDefiner: Send + Sync {
    /// How definitions relate to existing ones.
    fn mode(&self) -> DefineMode;

    /// Make `bytes` a class definition.
    ///
    /// In-place definers replace `existing` when given; new-class definers ignore it.
    ///
    /// # Errors
    /// Returns [`crate::Error::LoadFailure`] if the image is rejected.
    fn define(&self, bytes: &[u8], existing: Option<&ClassHandle>) -> Result<ClassHandle>;
}

/// Decoder and encoder over the crate's own class file codec.
pub struct JvmBackend {
    cache: SiteCache,
    supported: InjectionKinds,
}

impl JvmBackend {
    /// A backend supporting every injection kind.
    #[must_use]
    pub fn new(options: DecodeOptions) -> Self {
        JvmBackend {
            cache: SiteCache::with_options(options),
            supported: InjectionKinds::all(),
        }
    }

    /// Restrict the injection kinds the backend reports as supported.
    #[must_use]
    pub fn with_supported(mut self, supported: InjectionKinds) -> Self {
        self.supported = supported;
        self
    }

    /// Sites decoded so far.
    pub fn cache(&self) -> &SiteCache {
        &self.cache
    }
}

impl Default for JvmBackend {
    fn default() -> Self {
        JvmBackend::new(DecodeOptions::default())
    }
}

impl ClassDecoder for JvmBackend {
    fn decode(&self, bytes: &[u8]) -> Result<ClassSite> {
        self.cache.materialize(bytes)
    }

    fn release(&self, class: &ClassSite) {
        self.cache.evict(&class.artifact());
    }
}

impl ClassEncoder for JvmBackend {
    fn supported(&self) -> InjectionKinds {
        self.supported
    }

    fn encode(&self, class: &ClassSite, plan: &RewritePlan) -> Result<RewriteOutput> {
        rewrite(class, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rewrite::RewriteOptions, test::sample_class_bytes};

    #[test]
    fn decoding_is_memoized() -> Result<()> {
        let backend = JvmBackend::default();
        let bytes = sample_class_bytes();
        let first = backend.decode(&bytes)?;
        let second = backend.decode(&bytes)?;
        assert!(first.ptr_eq(&second));
        assert_eq!(backend.cache().len(), 1);
        Ok(())
    }

    #[test]
    fn released_sites_leave_the_cache() -> Result<()> {
        let backend = JvmBackend::default();
        let site = backend.decode(&sample_class_bytes())?;
        backend.release(&site);
        assert!(backend.cache().is_empty());
        assert!(!site.methods().is_empty());
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() {
        let backend = JvmBackend::default();
        assert!(matches!(
            backend.decode(&[0xCA, 0xFE, 0xBA]),
            Err(crate::Error::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn empty_plan_encodes_to_an_equal_class() -> Result<()> {
        let backend = JvmBackend::default();
        let class = backend.decode(&sample_class_bytes())?;
        let plan = RewritePlan::empty(&class, RewriteOptions::default());
        let output = backend.encode(&class, &plan)?;
        let decoded = ClassSite::from_bytes(&output.primary)?;
        assert_eq!(decoded, class);
        Ok(())
    }
}
