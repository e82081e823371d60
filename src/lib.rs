// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/mod.rs' uses mmap to map a class file into memory

//! # classweave
//!
//! Declarative bytecode injection for compiled JVM classes. Callers register visitors that
//! look at a structural model of a class and answer with injections (add a field, add a
//! method, hook, replace, suppress or recover a method); `classweave` composes every answer into
//! one plan per class and rewrites the class file to realize all of them at once.
//!
//! ## Features
//!
//! - **Structural site model** - lazily materialized, memoized per artifact, no bytecode exposed
//! - **Deterministic composition** - injections ordered by kind, never by registration order
//! - **Branch-free code generation** - wrappers, initializers and accessor thunks that need no
//!   stack map frames
//! - **Typed runtime** - interception runs as an explicit state machine over
//!   [`runtime::Outcome`], callbacks are resolved by token through a [`runtime::CallbackRegistry`]
//! - **Batch weaving** - independent classes are transformed in parallel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classweave::prelude::*;
//!
//! let registry = Arc::new(CallbackRegistry::new());
//! let mut injector = Injector::new("tracing", registry);
//! injector.add_visitor(Arc::new(FnVisitor::new("args").on_method(|site| {
//!     (site.name() == "compute").then(|| {
//!         Injection::pre_hook(|_, mut args, _| {
//!             if let Some(Value::Int(x)) = args.first_mut() {
//!                 *x += 1;
//!             }
//!             Ok(args)
//!         })
//!     })
//! })));
//!
//! let output = injector.transform(&std::fs::read("Sample.class")?)?;
//! assert!(output.modified);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] and [`bytecode`] - the class file codec and a label-based instruction IR
//! - [`signatures`] - type names, descriptors and generic signatures
//! - [`sites`] - the read-only model visitors inspect
//! - [`inject`] - the injection variants and their ordering
//! - [`visitor`] - visitors and the composition engine
//! - [`rewrite`] - rewrite plans and code generation
//! - [`runtime`] - what generated code calls into
//! - [`backend`] - decode, encode and define boundaries
//! - [`Injector`] - the pipeline in one call
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use classweave::{Error, sites::ClassSite};
//!
//! match ClassSite::from_bytes(&std::fs::read("Broken.class")?) {
//!     Ok(site) => println!("{} methods", site.methods().len()),
//!     Err(Error::MalformedArtifact { message, .. }) => println!("malformed: {}", message),
//!     Err(e) => println!("error: {}", e),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench --bench weave
//! cargo +nightly fuzz run classfile --release
//! ```

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use classweave::prelude::*;
///
/// let site = ClassSite::from_bytes(&std::fs::read("Sample.class")?)?;
/// println!("{} is a {}", site, site.kind());
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod prelude;

pub mod bytecode;
pub mod classfile;
pub mod signatures;
pub mod sites;

pub mod inject;
pub mod runtime;
pub mod visitor;

pub mod backend;
pub mod rewrite;

mod injector;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// Decoding failures surface as [`Error::MalformedArtifact`], plans the backend cannot realize
/// as [`Error::IncompatibleConfiguration`], rejected images as [`Error::LoadFailure`].
pub use error::Error;

/// The pipeline facade and its configuration.
pub use injector::{DefinedClass, Injector, InjectorConfig, TransformOutput};

/// Low-level big-endian cursor used by every decoder in the crate.
///
/// # Example
///
/// ```rust
/// use classweave::Parser;
///
/// let mut parser = Parser::new(&[0xCA, 0xFE, 0xBA, 0xBE]);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// # Ok::<(), classweave::Error>(())
/// ```
pub use file::parser::Parser;
