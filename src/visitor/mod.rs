//! Visitors and the composition engine.
//!
//! Callers describe what should change by registering [`InjectionVisitor`]s. The [`Composer`]
//! shows every site of a class to each visitor whose [`Capabilities`] cover it, collects what they
//! return and turns it into one ordered, validated list per site. The result for a class is a
//! [`Composition`], which the rewrite engine turns into a plan.
//!
//! Composition results are memoized in a [`PlanCache`] keyed by site identity and
//! [`VisitorSetId`], so visitors see each site of an artifact at most once while its result stays
//! cached, however often the class is transformed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classweave::inject::{Injection, InjectionKinds};
//! use classweave::sites::{ClassSite, Site};
//! use classweave::visitor::{Composer, FnVisitor, InjectionVisitor, PlanCache, VisitorSet};
//!
//! let mut visitors = VisitorSet::new();
//! visitors.push(Arc::new(FnVisitor::new("audit").on_method(|site| {
//!     site.name().starts_with("get").then(|| Injection::post_hook(|_, _, value, _| Ok(value)))
//! })));
//!
//! let class = ClassSite::from_bytes(&std::fs::read("Sample.class")?)?;
//! let cache = PlanCache::new();
//! let composition = Composer::new(&visitors, InjectionKinds::all(), &cache).compose_all(&class)?;
//! println!("{} injection(s)", composition.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod composer;
mod set;
mod visit;

pub use composer::{Composed, Composer, Composition, PlanCache};
pub use set::{VisitorSet, VisitorSetId};
pub use visit::{Capabilities, FnVisitor, InjectionVisitor};
