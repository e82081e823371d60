use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    inject::Target,
    visitor::visit::{Capabilities, InjectionVisitor},
};

static NEXT_SET: AtomicU64 = AtomicU64::new(1);

/// Identity of one visitor collection; changes whenever the collection does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitorSetId(u64);

/// An ordered visitor collection with its capability registry.
///
/// Capabilities are queried once per visitor when it joins the set; composition then walks the
/// per-kind index lists and never asks a visitor what it is again.
pub struct VisitorSet {
    id: VisitorSetId,
    visitors: Vec<Arc<dyn InjectionVisitor>>,
    class: Vec<usize>,
    field: Vec<usize>,
    method: Vec<usize>,
}

impl VisitorSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        VisitorSet {
            id: Self::next_id(),
            visitors: Vec::new(),
            class: Vec::new(),
            field: Vec::new(),
            method: Vec::new(),
        }
    }

    fn next_id() -> VisitorSetId {
        VisitorSetId(NEXT_SET.fetch_add(1, Ordering::Relaxed))
    }

    /// Append `visitor`. The set receives a new identity.
    pub fn push(&mut self, visitor: Arc<dyn InjectionVisitor>) {
        let index = self.visitors.len();
        let capabilities = visitor.capabilities();
        if capabilities.contains(Capabilities::CLASS) {
            self.class.push(index);
        }
        if capabilities.contains(Capabilities::FIELD) {
            self.field.push(index);
        }
        if capabilities.contains(Capabilities::METHOD) {
            self.method.push(index);
        }
        self.visitors.push(visitor);
        self.id = Self::next_id();
    }

    /// Current identity.
    #[must_use]
    pub fn id(&self) -> VisitorSetId {
        self.id
    }

    /// Number of visitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    /// Returns true if the set has no visitors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Visitors handling sites of kind `target`, in registration order.
    pub fn for_target(&self, target: Target) -> impl Iterator<Item = &dyn InjectionVisitor> + '_ {
        let indices = match target {
            Target::Class => &self.class,
            Target::Field => &self.field,
            Target::Method => &self.method,
        };
        indices.iter().map(|&i| self.visitors[i].as_ref())
    }

    /// Returns true if some visitor handles sites of kind `target`.
    #[must_use]
    pub fn handles(&self, target: Target) -> bool {
        self.for_target(target).next().is_some()
    }
}

impl Default for VisitorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Arc<dyn InjectionVisitor>> for VisitorSet {
    fn from_iter<T: IntoIterator<Item = Arc<dyn InjectionVisitor>>>(iter: T) -> Self {
        let mut set = VisitorSet::new();
        for visitor in iter {
            set.push(visitor);
        }
        set
    }
}

impl fmt::Debug for VisitorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitorSet")
            .field("id", &self.id)
            .field(
                "visitors",
                &self.visitors.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitor::FnVisitor;

    #[test]
    fn capability_registry_routes_by_target() {
        let mut set = VisitorSet::new();
        let empty = set.id();
        set.push(Arc::new(FnVisitor::new("classes").on_class(|_| None)));
        set.push(Arc::new(
            FnVisitor::new("both").on_class(|_| None).on_method(|_| None),
        ));
        assert_ne!(set.id(), empty);

        let names: Vec<_> = set.for_target(Target::Class).map(|v| v.name().to_string()).collect();
        assert_eq!(names, ["classes", "both"]);
        let names: Vec<_> = set.for_target(Target::Method).map(|v| v.name().to_string()).collect();
        assert_eq!(names, ["both"]);
        assert!(!set.handles(Target::Field));
    }

    #[test]
    fn identities_are_distinct() {
        let a = VisitorSet::new();
        let b = VisitorSet::new();
        assert_ne!(a.id(), b.id());
        let collected: VisitorSet = std::iter::empty().collect();
        assert!(collected.is_empty());
    }
}
