use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    inject::{sort_by_rank, Injection, InjectionKinds, Target},
    sites::{ClassSite, FieldSite, MethodSite, Site, SiteKey},
    visitor::set::{VisitorSet, VisitorSetId},
    Result,
};

/// Ordered injections composed for one site.
pub type Composed = Arc<[Injection]>;

/// Composition results keyed by site and visitor set.
///
/// Population is build-or-fetch: two threads composing the same key may both run the visitors,
/// but the first result stored is the one every caller receives from then on.
#[derive(Default)]
pub struct PlanCache {
    entries: DashMap<(SiteKey, VisitorSetId), Composed>,
}

impl PlanCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        PlanCache::default()
    }

    /// The cached result for `key`, or the result of `compose`, stored for later callers.
    ///
    /// # Errors
    /// Returns whatever `compose` returns; failures are not cached.
    pub fn get_or_compose<F>(&self, key: (SiteKey, VisitorSetId), compose: F) -> Result<Composed>
    where
        F: FnOnce() -> Result<Vec<Injection>>,
    {
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.value().clone());
        }
        Ok(self.store(key, compose()?.into()))
    }

    /// Store `composed` under `key` unless a result is already there; returns the stored result.
    fn store(&self, key: (SiteKey, VisitorSetId), composed: Composed) -> Composed {
        self.entries.entry(key).or_insert(composed).value().clone()
    }

    /// The cached result for `key`.
    #[must_use]
    pub fn get(&self, key: &(SiteKey, VisitorSetId)) -> Option<Composed> {
        self.entries.get(key).map(|hit| hit.value().clone())
    }

    /// Number of cached sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Everything the visitors asked for on one class and its members.
#[derive(Debug, Clone)]
pub struct Composition {
    /// The class the injections apply to
    pub class: ClassSite,
    /// Class-level injections, in application order
    pub additions: Composed,
    /// Field-level injections of fields that received any
    pub fields: Vec<(FieldSite, Composed)>,
    /// Method-level injections of methods that received any
    pub methods: Vec<(MethodSite, Composed)>,
}

impl Composition {
    /// Total number of injections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.additions.len()
            + self.fields.iter().map(|(_, i)| i.len()).sum::<usize>()
            + self.methods.iter().map(|(_, i)| i.len()).sum::<usize>()
    }

    /// Returns true if no visitor asked for anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merges the decisions of a visitor set into ordered, validated injection lists.
///
/// For each site, every visitor whose capabilities cover the site's kind is asked once. The
/// injections returned are checked against the site kind and against the kinds the backend can
/// realize, [`Injection::None`] is dropped, and the rest is sorted by rank. Sorting is stable, so
/// injections of equal rank stay in registration order.
pub struct Composer<'a> {
    visitors: &'a VisitorSet,
    supported: InjectionKinds,
    cache: &'a PlanCache,
    skip_synthetic: bool,
}

impl<'a> Composer<'a> {
    /// A composer over `visitors`, rejecting kinds outside `supported`, memoizing in `cache`.
    #[must_use]
    pub fn new(visitors: &'a VisitorSet, supported: InjectionKinds, cache: &'a PlanCache) -> Self {
        Composer {
            visitors,
            supported,
            cache,
            skip_synthetic: false,
        }
    }

    /// Do not show synthetic and bridge members to visitors.
    #[must_use]
    pub fn skip_synthetic(mut self, skip: bool) -> Self {
        self.skip_synthetic = skip;
        self
    }

    /// Compose the class-level injections of `site`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleConfiguration`] if a visitor returns an injection that
    /// does not target classes or that the backend does not support.
    pub fn compose_class(&self, site: &ClassSite) -> Result<Composed> {
        self.compose(site, |visitor| visitor.visit_class(site))
    }

    /// Compose the injections of field `site`.
    ///
    /// # Errors
    /// See [`Composer::compose_class`].
    pub fn compose_field(&self, site: &FieldSite) -> Result<Composed> {
        self.compose(site, |visitor| visitor.visit_field(site))
    }

    /// Compose the injections of method `site`.
    ///
    /// # Errors
    /// See [`Composer::compose_class`].
    pub fn compose_method(&self, site: &MethodSite) -> Result<Composed> {
        self.compose(site, |visitor| visitor.visit_method(site))
    }

    /// Compose the class and each of its members.
    ///
    /// The cache is only written once every site has composed; a class with one rejected site
    /// leaves no entries behind.
    ///
    /// # Errors
    /// See [`Composer::compose_class`].
    pub fn compose_all(&self, class: &ClassSite) -> Result<Composition> {
        let additions = self.stage(class, |visitor| visitor.visit_class(class))?;

        let mut fields = Vec::new();
        if self.visitors.handles(Target::Field) {
            for field in class.fields() {
                if self.skipped(&field) {
                    continue;
                }
                let composed = self.stage(&field, |visitor| visitor.visit_field(&field))?;
                fields.push((field, composed));
            }
        }

        let mut methods = Vec::new();
        if self.visitors.handles(Target::Method) {
            for method in class.methods() {
                if self.skipped(&method) {
                    continue;
                }
                let composed = self.stage(&method, |visitor| visitor.visit_method(&method))?;
                methods.push((method, composed));
            }
        }

        Ok(Composition {
            class: class.clone(),
            additions: self.commit(class, additions),
            fields: self.commit_members(fields),
            methods: self.commit_members(methods),
        })
    }

    fn commit<S: Site>(&self, site: &S, composed: Composed) -> Composed {
        self.cache.store((site.key(), self.visitors.id()), composed)
    }

    fn commit_members<S: Site>(&self, staged: Vec<(S, Composed)>) -> Vec<(S, Composed)> {
        staged
            .into_iter()
            .map(|(site, composed)| {
                let composed = self.commit(&site, composed);
                (site, composed)
            })
            .filter(|(_, composed)| !composed.is_empty())
            .collect()
    }

    /// The cached result for `site`, or a fresh composition that is not cached yet.
    fn stage<S, F>(&self, site: &S, visit: F) -> Result<Composed>
    where
        S: Site,
        F: Fn(&dyn crate::visitor::InjectionVisitor) -> Option<Injection>,
    {
        match self.cache.get(&(site.key(), self.visitors.id())) {
            Some(hit) => Ok(hit),
            None => Ok(self.visit_all(site, visit)?.into()),
        }
    }

    fn skipped(&self, site: &dyn Site) -> bool {
        let skip = self.skip_synthetic && site.is_synthetic();
        if skip {
            log::warn!("not offering synthetic member '{}' to visitors", site.name());
        }
        skip
    }

    fn compose<S, F>(&self, site: &S, visit: F) -> Result<Composed>
    where
        S: Site,
        F: Fn(&dyn crate::visitor::InjectionVisitor) -> Option<Injection>,
    {
        self.cache
            .get_or_compose((site.key(), self.visitors.id()), || self.visit_all(site, visit))
    }

    fn visit_all<S, F>(&self, site: &S, visit: F) -> Result<Vec<Injection>>
    where
        S: Site,
        F: Fn(&dyn crate::visitor::InjectionVisitor) -> Option<Injection>,
    {
        let target = site.target();
        let mut injections = Vec::new();
        for visitor in self.visitors.for_target(target) {
            let Some(injection) = visit(visitor) else {
                continue;
            };
            if injection.target() != target {
                return Err(incompatible_error!(
                    "visitor '{}' returned a {} injection for {} '{}'",
                    visitor.name(),
                    injection.target(),
                    target,
                    site.name()
                ));
            }
            if injection.is_none() {
                continue;
            }
            if !self.supported.supports(injection.kind()) {
                return Err(incompatible_error!(
                    "visitor '{}' returned {} for '{}', which the backend cannot realize",
                    visitor.name(),
                    injection.kind(),
                    site.name()
                ));
            }
            injections.push(injection);
        }
        sort_by_rank(&mut injections);
        log::trace!(
            "composed {} injection(s) for {} '{}'",
            injections.len(),
            target,
            site.name()
        );
        Ok(injections)
    }
}

impl fmt::Debug for Composer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("visitors", &self.visitors.id())
            .field("supported", &self.supported)
            .field("skip_synthetic", &self.skip_synthetic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        classfile::flags::AccessFlags,
        inject::{FieldDeclaration, InjectionKind},
        signatures::TypeSignature,
        test::sample_site,
        visitor::FnVisitor,
        Error,
    };

    fn compute_only(site: &MethodSite) -> bool {
        site.name() == "compute"
    }

    #[test]
    fn orders_by_rank_not_registration() -> Result<()> {
        let set: VisitorSet = [
            FnVisitor::new("post").on_method(|s| {
                compute_only(s).then(|| Injection::post_hook(|_, _, v, _| Ok(v)))
            }),
            FnVisitor::new("recover").on_method(|s| {
                compute_only(s).then(|| Injection::recover(|_, _, e, _, _| Err(e.clone())))
            }),
            FnVisitor::new("replace").on_method(|s| {
                compute_only(s).then(|| Injection::replace(|r, a, o, _| o.invoke(r, a)))
            }),
            FnVisitor::new("pre").on_method(|s| {
                compute_only(s).then(|| Injection::pre_hook(|_, a, _| Ok(a)))
            }),
            FnVisitor::new("ignore").on_method(|s| {
                compute_only(s).then(|| Injection::ignore(|_, _, _| Ok(false)))
            }),
        ]
        .into_iter()
        .map(|v| Arc::new(v) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let composer = Composer::new(&set, InjectionKinds::all(), &cache);
        let composition = composer.compose_all(&sample_site())?;
        assert_eq!(composition.methods.len(), 1);

        let kinds: Vec<_> = composition.methods[0].1.iter().map(Injection::kind).collect();
        assert_eq!(
            kinds,
            [
                InjectionKind::IgnoreMethod,
                InjectionKind::PreHook,
                InjectionKind::ErrorRecovery,
                InjectionKind::ReplaceMethod,
                InjectionKind::PostHook,
            ]
        );
        Ok(())
    }

    #[test]
    fn visitors_run_once_per_cached_site() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let set: VisitorSet = std::iter::once(Arc::new(FnVisitor::new("count").on_method(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            },
        )) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let composer = Composer::new(&set, InjectionKinds::all(), &cache);
        let class = sample_site();
        composer.compose_all(&class)?;
        let first = calls.load(Ordering::SeqCst);
        assert_eq!(first, class.methods().len());

        composer.compose_all(&class)?;
        assert_eq!(calls.load(Ordering::SeqCst), first);
        assert_eq!(cache.len(), first + 1);
        Ok(())
    }

    #[test]
    fn target_mismatch_is_incompatible() {
        let set: VisitorSet = std::iter::once(Arc::new(FnVisitor::new("wrong").on_method(|_| {
            Some(Injection::add_field(FieldDeclaration::new(
                AccessFlags::PRIVATE,
                "x",
                TypeSignature::Int,
            )))
        })) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let composer = Composer::new(&set, InjectionKinds::all(), &cache);
        let err = composer.compose_all(&sample_site()).unwrap_err();
        assert!(matches!(err, Error::IncompatibleConfiguration(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn rejected_member_leaves_cache_untouched() {
        let set: VisitorSet = std::iter::once(Arc::new(
            FnVisitor::new("half")
                .on_class(|_| Some(Injection::None(Target::Class)))
                .on_method(|s| {
                    compute_only(s).then(|| Injection::post_hook(|_, _, v, _| Ok(v)))
                }),
        ) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let composer = Composer::new(&set, InjectionKinds::ADD_FIELD, &cache);
        let class = sample_site();
        let err = composer.compose_all(&class).unwrap_err();
        assert!(matches!(err, Error::IncompatibleConfiguration(_)));
        assert!(cache.is_empty());

        let composer = Composer::new(&set, InjectionKinds::all(), &cache);
        let composition = composer.compose_all(&class).unwrap();
        assert_eq!(composition.methods.len(), 1);
        assert_eq!(cache.len(), class.methods().len() + 1);
    }

    #[test]
    fn unsupported_kind_is_incompatible() {
        let set: VisitorSet = std::iter::once(Arc::new(FnVisitor::new("field").on_class(|_| {
            Some(Injection::add_field(FieldDeclaration::new(
                AccessFlags::PRIVATE,
                "x",
                TypeSignature::Int,
            )))
        })) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let replace_only = InjectionKinds::REPLACE_METHOD;
        let composer = Composer::new(&set, replace_only, &cache);
        let err = composer.compose_class(&sample_site()).unwrap_err();
        assert!(matches!(err, Error::IncompatibleConfiguration(_)));
    }

    #[test]
    fn none_injections_are_dropped() -> Result<()> {
        let set: VisitorSet = std::iter::once(Arc::new(
            FnVisitor::new("noop")
                .on_class(|_| Some(Injection::None(Target::Class)))
                .on_method(|_| Some(Injection::None(Target::Method))),
        ) as Arc<dyn crate::visitor::InjectionVisitor>)
        .collect();

        let cache = PlanCache::new();
        let composition = Composer::new(&set, InjectionKinds::empty(), &cache)
            .compose_all(&sample_site())?;
        assert!(composition.is_empty());
        Ok(())
    }
}
