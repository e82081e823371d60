//! Run-time side of rewritten classes.
//!
//! Rewritten bytecode only contains the plumbing of an injection: argument packing, a token and a
//! call into the bridge. Everything the visitor supplied runs here, in Rust, through the types of
//! this module:
//!
//! - [`Value`], [`Thrown`] and [`Outcome`] - what crosses the boundary
//! - [`InterceptChain`] - the ignore / pre-hook / replace / post-hook / recovery state machine
//! - [`Invoker`], [`FieldAccessor`], [`MethodAccessor`] - capabilities handed to injected logic
//! - [`CallbackRegistry`] and [`Bridge`] - token lookup for generated code
//!
//! Runtime failures of an intercepted call never become [`crate::Error`]s. They travel as
//! [`Outcome::Raised`] and are handled only by error-recovery injections; a registry miss, on the
//! other hand, is a pipeline error that no injection can recover from.

mod accessor;
mod intercept;
mod registry;
mod value;

pub use accessor::{Accessors, FieldAccessor, FieldCell, Invoker, MethodAccessor, PriorValue};
pub use intercept::{CallState, InterceptChain};
pub use registry::{Bridge, Callback, CallbackRegistry};
pub use value::{ObjectRef, Outcome, Thrown, Value};
