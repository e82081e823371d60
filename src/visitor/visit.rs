use std::fmt;

use bitflags::bitflags;

use crate::{
    inject::{Injection, Target},
    sites::{ClassSite, FieldSite, MethodSite},
};

bitflags! {
    /// The kinds of site a visitor wants to be shown.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Class sites
        const CLASS = 0x01;
        /// Field sites
        const FIELD = 0x02;
        /// Method, constructor and static initializer sites
        const METHOD = 0x04;
    }
}

impl Capabilities {
    /// The capability needed to visit sites of kind `target`.
    #[must_use]
    pub fn of(target: Target) -> Self {
        match target {
            Target::Class => Capabilities::CLASS,
            Target::Field => Capabilities::FIELD,
            Target::Method => Capabilities::METHOD,
        }
    }
}

/// Reacts to sites by declaring at most one injection per site.
///
/// Visitors must be thread-safe: a batch transform may show different classes to the same
/// visitor from several threads at once. A visitor is shown a site only if its
/// [`InjectionVisitor::capabilities`] include the site's kind, and is shown each site of a given
/// artifact at most once while the plan for that artifact is cached.
///
/// # Returning injections
///
/// The injection's target must match the kind of site visited: a class visitor may return
/// [`Injection::AddField`] or [`Injection::AddMethod`], a method visitor any interception. A
/// mismatch, or a variant the active backend cannot realize, fails composition with
/// [`crate::Error::IncompatibleConfiguration`]. Returning `None` or [`Injection::None`] leaves the
/// site untouched.
pub trait InjectionVisitor: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Kinds of site this visitor handles.
    fn capabilities(&self) -> Capabilities;

    /// React to a class.
    fn visit_class(&self, _site: &ClassSite) -> Option<Injection> {
        None
    }

    /// React to a field.
    fn visit_field(&self, _site: &FieldSite) -> Option<Injection> {
        None
    }

    /// React to a method.
    fn visit_method(&self, _site: &MethodSite) -> Option<Injection> {
        None
    }
}

type ClassFn = Box<dyn Fn(&ClassSite) -> Option<Injection> + Send + Sync>;
type FieldFn = Box<dyn Fn(&FieldSite) -> Option<Injection> + Send + Sync>;
type MethodFn = Box<dyn Fn(&MethodSite) -> Option<Injection> + Send + Sync>;

/// A visitor assembled from closures.
///
/// Its capabilities are exactly the site kinds a closure was supplied for.
///
/// ```rust
/// use classweave::inject::Injection;
/// use classweave::sites::Site;
/// use classweave::visitor::{Capabilities, FnVisitor, InjectionVisitor};
///
/// let visitor = FnVisitor::new("trace-compute").on_method(|site| {
///     (site.name() == "compute").then(|| Injection::post_hook(|_, _, value, _| Ok(value)))
/// });
/// assert_eq!(visitor.capabilities(), Capabilities::METHOD);
/// ```
pub struct FnVisitor {
    name: String,
    class: Option<ClassFn>,
    field: Option<FieldFn>,
    method: Option<MethodFn>,
}

impl FnVisitor {
    /// A visitor that handles nothing yet.
    #[must_use]
    pub fn new(name: &str) -> Self {
        FnVisitor {
            name: name.to_string(),
            class: None,
            field: None,
            method: None,
        }
    }

    /// Handle class sites with `f`.
    #[must_use]
    pub fn on_class<F>(mut self, f: F) -> Self
    where
        F: Fn(&ClassSite) -> Option<Injection> + Send + Sync + 'static,
    {
        self.class = Some(Box::new(f));
        self
    }

    /// Handle field sites with `f`.
    #[must_use]
    pub fn on_field<F>(mut self, f: F) -> Self
    where
        F: Fn(&FieldSite) -> Option<Injection> + Send + Sync + 'static,
    {
        self.field = Some(Box::new(f));
        self
    }

    /// Handle method sites with `f`.
    #[must_use]
    pub fn on_method<F>(mut self, f: F) -> Self
    where
        F: Fn(&MethodSite) -> Option<Injection> + Send + Sync + 'static,
    {
        self.method = Some(Box::new(f));
        self
    }
}

impl InjectionVisitor for FnVisitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::empty();
        capabilities.set(Capabilities::CLASS, self.class.is_some());
        capabilities.set(Capabilities::FIELD, self.field.is_some());
        capabilities.set(Capabilities::METHOD, self.method.is_some());
        capabilities
    }

    fn visit_class(&self, site: &ClassSite) -> Option<Injection> {
        self.class.as_ref().and_then(|f| f(site))
    }

    fn visit_field(&self, site: &FieldSite) -> Option<Injection> {
        self.field.as_ref().and_then(|f| f(site))
    }

    fn visit_method(&self, site: &MethodSite) -> Option<Injection> {
        self.method.as_ref().and_then(|f| f(site))
    }
}

impl fmt::Debug for FnVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnVisitor")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
