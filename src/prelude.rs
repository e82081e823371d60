//! # classweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classweave library. Import this module to get quick access to everything needed to
//! write visitors and run the pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The pipeline facade, its configuration and its outputs
pub use crate::{DefinedClass, Injector, InjectorConfig, TransformOutput};

/// Decode, encode and define boundaries with their reference implementations
pub use crate::backend::{
    ClassDecoder, ClassDefiner, ClassEncoder, ClassHandle, ClassSpace, DefineMode, JvmBackend,
};

// ================================================================================================
// Site Model
// ================================================================================================

/// Read-only structural model of classes and their members
pub use crate::sites::{
    AnnotationSite, AnnotationValue, ClassKind, ClassSite, FieldSite, Materializer, MethodSite,
    PackageSite, ParameterSite, Site, SiteCache, Woven,
};

/// Types, names and descriptors
pub use crate::signatures::{ClassName, MethodDescriptor, TypeInfo, TypeSignature};

/// Access flags shared by classes and members
pub use crate::classfile::flags::AccessFlags;

// ================================================================================================
// Injections and Visitors
// ================================================================================================

/// Injection variants and their classification
pub use crate::inject::{
    Delta, FieldDeclaration, InitialValue, Injection, InjectionKind, InjectionKinds,
    MethodDeclaration, Target,
};

/// Visitors and the composition engine
pub use crate::visitor::{
    Capabilities, Composer, Composition, FnVisitor, InjectionVisitor, PlanCache, VisitorSet,
};

// ================================================================================================
// Runtime
// ================================================================================================

/// Values, outcomes and the capabilities handed to callbacks
pub use crate::runtime::{
    Accessors, Bridge, CallbackRegistry, FieldAccessor, FieldCell, InterceptChain, Invoker,
    MethodAccessor, Outcome, PriorValue, Thrown, Value,
};

// ================================================================================================
// Code Generation
// ================================================================================================

/// Rewrite plans and the code generator
pub use crate::rewrite::{rewrite, RewriteOptions, RewriteOutput, RewritePlan};

/// Class file codec entry point
pub use crate::classfile::ClassFile;
