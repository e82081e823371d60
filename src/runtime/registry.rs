//! Token-addressed storage for the callbacks generated code calls back into.
//!
//! Closures cannot be written into a class image. The rewrite engine therefore registers every
//! callback a rewritten class needs in a [`CallbackRegistry`] and embeds only the returned token
//! (a string constant) in the generated bytecode. At run time the generated code passes the token
//! to the [`Bridge`], which looks the callback up and runs it.
//!
//! # Lifecycle
//!
//! Entries are inserted while a class is being rewritten, before its image is returned to the
//! caller, and are read while the defined class executes. Tokens are never reused and entries are
//! never removed, so a lookup either finds the entry registered for that token or fails with
//! [`crate::Error::UnresolvedInjectionReference`].
//!
//! # Thread Safety
//!
//! Storage is a lock-free `SkipMap`; token numbers come from an atomic counter. Registration and
//! lookup may run concurrently from any thread.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_skiplist::SkipMap;

use crate::{
    inject::{InitializerFn, MethodBodyFn},
    runtime::{
        accessor::{Accessors, Invoker},
        intercept::InterceptChain,
        value::{Outcome, Value},
    },
    Error, Result,
};

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// A callback generated code can reach by token.
#[derive(Clone)]
pub enum Callback {
    /// The interception chain of one method
    Intercept(Arc<InterceptChain>),
    /// The body of one added method
    Added(MethodBodyFn),
    /// The initializer of one added field
    Initial(InitializerFn),
}

impl Callback {
    fn describe(&self) -> &'static str {
        match self {
            Callback::Intercept(_) => "interception",
            Callback::Added(_) => "added method",
            Callback::Initial(_) => "field initializer",
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Intercept(chain) => f.debug_tuple("Intercept").field(chain).finish(),
            other => write!(f, "{}(..)", other.describe()),
        }
    }
}

/// Process-scoped map from token to callback.
///
/// Create one per embedding and pass it explicitly to the injector that fills it and to the
/// [`Bridge`] that reads it.
pub struct CallbackRegistry {
    id: u64,
    next_token: AtomicU64,
    entries: SkipMap<String, Callback>,
}

impl CallbackRegistry {
    /// Create an empty registry with a process-unique identity.
    #[must_use]
    pub fn new() -> Self {
        CallbackRegistry {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            next_token: AtomicU64::new(0),
            entries: SkipMap::new(),
        }
    }

    /// Identity of this registry, embedded in every token it issues.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Store `callback` under a fresh token and return the token.
    pub fn register(&self, callback: Callback) -> String {
        let number = self.next_token.fetch_add(1, Ordering::Relaxed);
        let token = format!("cw{}:{number}", self.id);
        log::trace!("registered {} as {token}", callback.describe());
        self.entries.insert(token.clone(), callback);
        token
    }

    /// Look up the callback stored under `token`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedInjectionReference`] if nothing was registered under it.
    pub fn resolve(&self, token: &str) -> Result<Callback> {
        self.entries
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnresolvedInjectionReference(token.to_string()))
    }

    /// Returns true if `token` was issued by this registry.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Runtime entry points of generated code.
///
/// Each method mirrors one static method of the `classweave/runtime/Bridge` class the rewritten
/// bytecode calls. A host embedding implements those natives by forwarding to this handle.
#[derive(Debug, Clone)]
pub struct Bridge {
    registry: Arc<CallbackRegistry>,
}

impl Bridge {
    /// A bridge over `registry`.
    #[must_use]
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Bridge { registry }
    }

    /// The registry tokens are resolved against.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Run the interception chain behind `token` for one call.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedInjectionReference`] if `token` does not name an interception.
    /// Failures of the call itself are reported in the [`Outcome`].
    pub fn intercept(
        &self,
        token: &str,
        receiver: &Value,
        args: Vec<Value>,
        original: &dyn Invoker,
    ) -> Result<Outcome> {
        match self.registry.resolve(token)? {
            Callback::Intercept(chain) => Ok(chain.invoke(receiver, args, original)),
            other => Err(mismatch(token, "interception", &other)),
        }
    }

    /// Run the body of the added method behind `token`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedInjectionReference`] if `token` does not name an added method.
    pub fn invoke_added(
        &self,
        token: &str,
        receiver: &Value,
        args: &[Value],
        accessors: &Accessors,
    ) -> Result<Outcome> {
        match self.registry.resolve(token)? {
            Callback::Added(body) => Ok(body(receiver, args, accessors).into()),
            other => Err(mismatch(token, "added method", &other)),
        }
    }

    /// Compute the initial value of the added field behind `token`.
    ///
    /// `receiver` is the instance under construction, null for static fields.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedInjectionReference`] if `token` does not name an initializer.
    pub fn initial_value(&self, token: &str, receiver: &Value) -> Result<Outcome> {
        match self.registry.resolve(token)? {
            Callback::Initial(initializer) => Ok(initializer(receiver).into()),
            other => Err(mismatch(token, "field initializer", &other)),
        }
    }
}

fn mismatch(token: &str, expected: &str, found: &Callback) -> Error {
    Error::UnresolvedInjectionReference(format!(
        "{token} names a {}, expected a {expected}",
        found.describe()
    ))
}
