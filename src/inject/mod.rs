//! The injection model: what a visitor may ask the pipeline to change.
//!
//! An [`Injection`] is a closed, tagged description of one change to one site. Class-level
//! injections add members ([`FieldDeclaration`], [`MethodDeclaration`]); method-level
//! injections intercept calls. Each variant has a fixed [`Target`], a [`Delta`] and a rank that
//! decides where it runs relative to the other injections on the same method:
//!
//! | rank | kinds |
//! |---|---|
//! | 0 | [`InjectionKind::IgnoreMethod`] and any other removal |
//! | 1 | [`InjectionKind::PreHook`] |
//! | 2 | other modifications and additions |
//! | 3 | [`InjectionKind::ReplaceMethod`], [`InjectionKind::ErrorRecovery`] |
//! | 4 | [`InjectionKind::PostHook`] |
//!
//! Callbacks are shared `Arc` closures, so an injection can be cloned into a plan, a cache and the
//! callback registry without copying user state.
//!
//! # Examples
//!
//! ```rust
//! use classweave::inject::{Delta, Injection, InjectionKind};
//! use classweave::runtime::Value;
//!
//! let doubled = Injection::post_hook(|_, _, value, _| {
//!     Ok(Value::Int(value.as_int().unwrap_or(0) * 2))
//! });
//! assert_eq!(doubled.kind(), InjectionKind::PostHook);
//! assert_eq!(doubled.delta(), Delta::Modification);
//! ```

mod injection;
mod kinds;

pub use injection::{
    sort_by_rank, FieldDeclaration, IgnorePredicate, InitialValue, InitializerFn, Injection,
    MethodBodyFn, MethodDeclaration, MethodReference, PostHookFn, PreHookFn, RecoveryFn,
    ReplaceFn,
};
pub use kinds::{Delta, InjectionKind, InjectionKinds, Target};
