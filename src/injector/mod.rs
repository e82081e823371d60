//! The pipeline facade.
//!
//! An [`Injector`] owns a visitor set, a callback registry and a backend. [`Injector::transform`]
//! runs the whole pipeline for one class image: decode, compose, plan, generate. The images it
//! returns only work together with the injector's [`Bridge`], since generated code resolves its
//! callbacks through the registry by token.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classweave::prelude::*;
//!
//! let registry = Arc::new(CallbackRegistry::new());
//! let mut injector = Injector::new("audit", registry.clone());
//! injector.add_visitor(Arc::new(FnVisitor::new("audit").on_method(|site| {
//!     (site.name() == "compute").then(|| Injection::post_hook(|_, _, value, _| Ok(value)))
//! })));
//!
//! let output = injector.transform(&std::fs::read("Sample.class")?)?;
//! println!("{} helper class(es)", output.helpers.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;

pub use config::InjectorConfig;

use std::{fmt, sync::Arc};

use rayon::prelude::*;

use crate::{
    backend::{ClassDecoder, ClassDefiner, ClassEncoder, ClassHandle, JvmBackend},
    rewrite::{RewriteOptions, RewritePlan},
    runtime::{Bridge, CallbackRegistry},
    signatures::ClassName,
    sites::ClassSite,
    visitor::{Composer, InjectionVisitor, PlanCache, VisitorSet},
    Result,
};

/// Images produced by [`Injector::transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// The class, rewritten if anything applied to it
    pub primary: Vec<u8>,
    /// Helper classes that must be defined before the primary class
    pub helpers: Vec<(ClassName, Vec<u8>)>,
    /// Whether `primary` differs from the input
    pub modified: bool,
    /// Number of injections realized
    pub injections: usize,
}

/// Handles of a transformed and defined class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedClass {
    /// The primary class
    pub class: ClassHandle,
    /// Its helper classes, in definition order
    pub helpers: Vec<ClassHandle>,
    /// Whether the class was rewritten
    pub modified: bool,
}

/// Decode, compose, plan and generate, with one visitor set and one registry.
pub struct Injector {
    name: String,
    config: InjectorConfig,
    registry: Arc<CallbackRegistry>,
    visitors: VisitorSet,
    plans: PlanCache,
    decoder: Arc<dyn ClassDecoder>,
    encoder: Arc<dyn ClassEncoder>,
}

impl Injector {
    /// An injector named `name` with the default configuration.
    ///
    /// The name is recorded in the stamp of every class it rewrites.
    #[must_use]
    pub fn new(name: &str, registry: Arc<CallbackRegistry>) -> Self {
        Self::with_config(name, registry, InjectorConfig::default())
    }

    /// An injector named `name` using `config`.
    #[must_use]
    pub fn with_config(name: &str, registry: Arc<CallbackRegistry>, config: InjectorConfig) -> Self {
        let backend = Arc::new(JvmBackend::new(config.decode_options()));
        Injector {
            name: name.to_string(),
            config,
            registry,
            visitors: VisitorSet::new(),
            plans: PlanCache::new(),
            decoder: backend.clone(),
            encoder: backend,
        }
    }

    /// Replace the backend decoding and encoding classes.
    #[must_use]
    pub fn with_backend<B>(mut self, backend: B) -> Self
    where
        B: ClassDecoder + ClassEncoder + 'static,
    {
        self.with_shared_backend(Arc::new(backend))
    }

    /// Share `backend` for decoding and encoding with other holders.
    #[must_use]
    pub fn with_shared_backend<B>(mut self, backend: Arc<B>) -> Self
    where
        B: ClassDecoder + ClassEncoder + 'static,
    {
        self.decoder = backend.clone();
        self.encoder = backend;
        self
    }

    /// Append a visitor. Composition results cached so far are not reused afterwards.
    pub fn add_visitor(&mut self, visitor: Arc<dyn InjectionVisitor>) {
        self.visitors.push(visitor);
        self.plans.clear();
    }

    /// Name recorded in stamps.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    /// Registry the generated code resolves its tokens in.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Runtime entry points for classes this injector generates.
    #[must_use]
    pub fn bridge(&self) -> Bridge {
        Bridge::new(self.registry.clone())
    }

    /// Composition results cached so far.
    #[must_use]
    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    fn passthrough(bytes: &[u8]) -> TransformOutput {
        TransformOutput {
            primary: bytes.to_vec(),
            helpers: Vec::new(),
            modified: false,
            injections: 0,
        }
    }

    fn already_woven(&self, site: &ClassSite) -> bool {
        self.config.stamp_output
            && site
                .woven()
                .is_some_and(|stamp| stamp.injector == self.name)
    }

    /// Run the pipeline for one class image.
    ///
    /// Images without any applicable injection, and images this injector already stamped, are
    /// returned unchanged.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] for undecodable input (and for output that
    /// fails to decode when `verify_output` is set), [`crate::Error::IncompatibleConfiguration`]
    /// when a visitor asks for something this class or backend cannot do, and
    /// [`crate::Error::NotSupported`] for bodies the codec cannot re-encode.
    pub fn transform(&self, bytes: &[u8]) -> Result<TransformOutput> {
        let site = self.decoder.decode(bytes)?;
        let result = self.weave(&site, bytes);
        self.decoder.release(&site);
        result
    }

    fn weave(&self, site: &ClassSite, bytes: &[u8]) -> Result<TransformOutput> {
        if self.already_woven(site) {
            log::debug!("{} is already woven by '{}'", site, self.name);
            return Ok(Self::passthrough(bytes));
        }

        let composition = Composer::new(&self.visitors, self.encoder.supported(), &self.plans)
            .skip_synthetic(self.config.skip_synthetic_members)
            .compose_all(site)?;
        if composition.is_empty() {
            log::trace!("nothing to weave into {}", site);
            return Ok(Self::passthrough(bytes));
        }

        let options = RewriteOptions {
            emit_nest_attributes: self.config.emit_nest_attributes,
            stamp: self.config.stamp_output.then(|| self.name.clone()),
        };
        let plan = RewritePlan::build(&composition, &self.registry, options)?;
        let output = self.encoder.encode(site, &plan)?;

        if self.config.verify_output {
            let options = self.config.decode_options();
            ClassSite::from_bytes_with(&output.primary, &options)?;
            for (_, helper) in &output.helpers {
                ClassSite::from_bytes_with(helper, &options)?;
            }
        }

        log::debug!(
            "wove {} injection(s) into {}, {} helper(s)",
            plan.injection_count(),
            site,
            output.helpers.len()
        );
        Ok(TransformOutput {
            primary: output.primary,
            helpers: output.helpers,
            modified: true,
            injections: plan.injection_count(),
        })
    }

    /// Transform one image and define it, helpers first.
    ///
    /// `existing` is handed to the definer for the primary class.
    ///
    /// # Errors
    /// Everything [`Injector::transform`] returns, and [`crate::Error::LoadFailure`] from the
    /// definer.
    pub fn transform_and_define(
        &self,
        bytes: &[u8],
        definer: &dyn ClassDefiner,
        existing: Option<&ClassHandle>,
    ) -> Result<DefinedClass> {
        let output = self.transform(bytes)?;
        let mut helpers = Vec::with_capacity(output.helpers.len());
        for (_, helper) in &output.helpers {
            helpers.push(definer.define(helper, None)?);
        }
        let class = definer.define(&output.primary, existing)?;
        Ok(DefinedClass {
            class,
            helpers,
            modified: output.modified,
        })
    }

    /// Transform many images. Results are independent and keep the input order.
    pub fn transform_batch<B>(&self, images: &[B]) -> Vec<Result<TransformOutput>>
    where
        B: AsRef<[u8]> + Sync,
    {
        if self.config.parallel_batch {
            images
                .par_iter()
                .map(|image| self.transform(image.as_ref()))
                .collect()
        } else {
            images
                .iter()
                .map(|image| self.transform(image.as_ref()))
                .collect()
        }
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("visitors", &self.visitors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{ClassSpace, DefineMode},
        inject::{Injection, InjectionKinds},
        sites::Site,
        test::{modern_sample_bytes, sample_class_bytes},
        visitor::FnVisitor,
    };

    fn hooked(config: InjectorConfig) -> Injector {
        let mut injector = Injector::with_config("tests", Arc::new(CallbackRegistry::new()), config);
        injector.add_visitor(Arc::new(FnVisitor::new("hook").on_method(|site| {
            (site.name() == "compute").then(|| Injection::post_hook(|_, _, v, _| Ok(v)))
        })));
        injector
    }

    #[test]
    fn untouched_class_passes_through() -> Result<()> {
        let injector = Injector::new("tests", Arc::new(CallbackRegistry::new()));
        let bytes = sample_class_bytes();
        let output = injector.transform(&bytes)?;
        assert!(!output.modified);
        assert_eq!(output.primary, bytes);
        Ok(())
    }

    #[test]
    fn stamped_class_is_not_woven_twice() -> Result<()> {
        let injector = hooked(InjectorConfig::strict());
        let first = injector.transform(&sample_class_bytes())?;
        assert!(first.modified);
        assert_eq!(first.injections, 1);
        assert_eq!(first.helpers.len(), 1);
        assert_eq!(injector.registry().len(), 1);

        let second = injector.transform(&first.primary)?;
        assert!(!second.modified);
        assert_eq!(second.primary, first.primary);
        assert_eq!(injector.registry().len(), 1);
        Ok(())
    }

    #[test]
    fn transformed_sites_are_not_retained() -> Result<()> {
        let backend = Arc::new(JvmBackend::default());
        let injector = hooked(InjectorConfig::default()).with_shared_backend(backend.clone());

        assert!(injector.transform(&sample_class_bytes())?.modified);
        assert!(injector.transform(b"\xCA\xFE\xBA\xBE").is_err());
        assert!(injector.transform(&modern_sample_bytes())?.modified);
        assert!(backend.cache().is_empty());

        // Composition is keyed by content, so a repeat reuses the cached plan entries.
        let cached = injector.plans().len();
        assert!(injector.transform(&sample_class_bytes())?.modified);
        assert_eq!(injector.plans().len(), cached);
        Ok(())
    }

    #[test]
    fn unsupported_kinds_are_incompatible() {
        let injector = hooked(InjectorConfig::default())
            .with_backend(JvmBackend::default().with_supported(InjectionKinds::ADDITIONS));
        assert!(matches!(
            injector.transform(&sample_class_bytes()),
            Err(crate::Error::IncompatibleConfiguration(_))
        ));
    }

    #[test]
    fn defines_helpers_before_the_class() -> Result<()> {
        let injector = hooked(InjectorConfig::default());
        let space = ClassSpace::new(DefineMode::InPlace);
        let original = space.define(&modern_sample_bytes(), None)?;

        let defined = injector.transform_and_define(&modern_sample_bytes(), &space, Some(&original))?;
        assert!(defined.modified);
        assert_eq!(defined.class.id(), original.id());
        assert_eq!(defined.class.generation(), 1);
        assert_eq!(defined.helpers.len(), 1);
        assert_eq!(space.len(), 2);
        Ok(())
    }

    #[test]
    fn batches_keep_their_order() {
        let injector = hooked(InjectorConfig::default());
        let images = vec![sample_class_bytes(), b"garbage".to_vec(), modern_sample_bytes()];
        let results = injector.transform_batch(&images);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().is_ok_and(|o| o.modified));
        assert!(results[1].is_err());
        assert!(results[2].as_ref().is_ok_and(|o| o.modified));
    }
}
