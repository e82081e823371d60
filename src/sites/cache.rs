use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    classfile::attributes::DecodeOptions,
    signatures::ClassName,
    sites::{
        arena::{ArtifactId, SiteArena},
        class::ClassSite,
    },
    Result,
};

/// Concurrent materialization cache keyed by artifact identity.
///
/// Lookups are build-or-fetch: two threads materializing the same bytes may both decode them,
/// but only the first arena inserted is kept and both callers receive it. A cached site is
/// therefore referentially the same for every caller until it is evicted.
#[derive(Default)]
pub struct SiteCache {
    arenas: DashMap<ArtifactId, Arc<SiteArena>>,
    names: DashMap<ClassName, ArtifactId>,
    options: DecodeOptions,
}

impl SiteCache {
    /// An empty cache with default decoding limits.
    #[must_use]
    pub fn new() -> Self {
        SiteCache::default()
    }

    /// An empty cache decoding with `options`.
    #[must_use]
    pub fn with_options(options: DecodeOptions) -> Self {
        SiteCache {
            options,
            ..SiteCache::default()
        }
    }

    /// Materialize `data`, or return the site already materialized from identical bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the image cannot be decoded.
    pub fn materialize(&self, data: &[u8]) -> Result<ClassSite> {
        let id = ArtifactId::of(data);
        if let Some(existing) = self.arenas.get(&id) {
            return Ok(ClassSite {
                arena: existing.value().clone(),
            });
        }

        let built = ClassSite::from_bytes_with(data, &self.options)?;
        Ok(self.insert(&built))
    }

    /// Add a site materialized elsewhere; returns the cached site for its artifact.
    pub fn insert(&self, site: &ClassSite) -> ClassSite {
        let arena = self
            .arenas
            .entry(site.artifact())
            .or_insert_with(|| site.arena.clone())
            .value()
            .clone();
        self.names.insert(arena.name.clone(), arena.id);
        ClassSite { arena }
    }

    /// Site of artifact `id`.
    #[must_use]
    pub fn get(&self, id: &ArtifactId) -> Option<ClassSite> {
        self.arenas.get(id).map(|arena| ClassSite {
            arena: arena.value().clone(),
        })
    }

    /// Most recently cached site of class `name`.
    #[must_use]
    pub fn by_name(&self, name: &ClassName) -> Option<ClassSite> {
        let id = *self.names.get(name)?.value();
        self.get(&id)
    }

    /// Drop the site of artifact `id`; outstanding handles stay valid.
    pub fn evict(&self, id: &ArtifactId) {
        if let Some((_, arena)) = self.arenas.remove(id) {
            self.names.remove_if(&arena.name, |_, cached| cached == id);
        }
    }

    /// Number of cached artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }
}

impl std::fmt::Debug for SiteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteCache")
            .field("artifacts", &self.arenas.len())
            .finish()
    }
}
