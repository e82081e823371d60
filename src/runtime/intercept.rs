//! The interception state machine run for every call to an intercepted method.
//!
//! Generated wrapper code does not contain the injected logic. It hands the call to
//! [`crate::runtime::Bridge::intercept`], which resolves the method's [`InterceptChain`] and runs
//! it with an invoker for the original body. The chain applies the method's injections in their
//! fixed order:
//!
//! 1. Ignore predicates, in order. The first that holds ends the call with the default value of
//!    the return type; no hook runs and the original body is not invoked.
//! 2. Pre-hooks, in order, each receiving the arguments the previous one returned.
//! 3. Replacements, in order. The first receives the original body as its invoker, every later
//!    one a [`PriorValue`] invoker returning the previous replacement's value. Without any
//!    replacement the original body runs once.
//! 4. Post-hooks, in order, each receiving the value the previous step produced.
//! 5. When any step raises, recoveries run in order. Each receives the error, the arguments and
//!    either the original body (no value computed yet) or the last computed value. The first
//!    recovery that returns supplies the result; when all raise, the last error propagates.
//!    Without recoveries the original error propagates unchanged.
//!
//! ```text
//! Start -> Ignored ----------------------------------------------> Returned
//! Start -> PreHooksApplied -> Replaced | Invoked -> PostHooksApplied -> Returned
//!                 any step raises -> Failed -> Recovering -> Returned | Propagated
//! ```

use strum::Display;

use crate::{
    inject::{IgnorePredicate, Injection, PostHookFn, PreHookFn, RecoveryFn, ReplaceFn, Target},
    runtime::{
        accessor::{Invoker, PriorValue},
        value::{Outcome, Thrown, Value},
    },
    sites::MethodSite,
    Result,
};

/// States one intercepted call passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Call entered
    Start,
    /// An ignore predicate held
    Ignored,
    /// Arguments final
    PreHooksApplied,
    /// A replacement produced the value
    Replaced,
    /// The original body produced the value
    Invoked,
    /// Return value final
    PostHooksApplied,
    /// A step raised
    Failed,
    /// Recoveries are running
    Recovering,
    /// The call completed with a value
    Returned,
    /// The call completed by raising
    Propagated,
}

/// The injections of one method, grouped by role in application order.
pub struct InterceptChain {
    site: MethodSite,
    ignores: Vec<IgnorePredicate>,
    pre_hooks: Vec<PreHookFn>,
    replacements: Vec<ReplaceFn>,
    post_hooks: Vec<PostHookFn>,
    recoveries: Vec<RecoveryFn>,
}

impl InterceptChain {
    /// Group `injections`, already in application order, into a chain for `site`.
    ///
    /// [`Injection::None`] entries are skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleConfiguration`] if an injection does not target a
    /// method.
    pub fn new(site: MethodSite, injections: &[Injection]) -> Result<Self> {
        let mut chain = InterceptChain {
            site,
            ignores: Vec::new(),
            pre_hooks: Vec::new(),
            replacements: Vec::new(),
            post_hooks: Vec::new(),
            recoveries: Vec::new(),
        };

        for injection in injections {
            match injection {
                Injection::IgnoreMethod(predicate) => chain.ignores.push(predicate.clone()),
                Injection::PreHook(hook) => chain.pre_hooks.push(hook.clone()),
                Injection::ReplaceMethod(replace) => chain.replacements.push(replace.clone()),
                Injection::PostHook(hook) => chain.post_hooks.push(hook.clone()),
                Injection::ErrorRecovery(recover) => chain.recoveries.push(recover.clone()),
                Injection::None(Target::Method) => {}
                other => {
                    return Err(incompatible_error!(
                        "{} cannot intercept method {}",
                        other.kind(),
                        chain.site
                    ))
                }
            }
        }

        Ok(chain)
    }

    /// The intercepted method.
    #[must_use]
    pub fn site(&self) -> &MethodSite {
        &self.site
    }

    /// Number of injections in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ignores.len()
            + self.pre_hooks.len()
            + self.replacements.len()
            + self.post_hooks.len()
            + self.recoveries.len()
    }

    /// Returns true if the chain has no injections and calls pass straight through.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one call.
    pub fn invoke(&self, receiver: &Value, args: Vec<Value>, original: &dyn Invoker) -> Outcome {
        self.run(receiver, args, original, &mut |_| {})
    }

    /// Run one call and report the states it passed through.
    pub fn invoke_traced(
        &self,
        receiver: &Value,
        args: Vec<Value>,
        original: &dyn Invoker,
    ) -> (Outcome, Vec<CallState>) {
        let mut trace = Vec::new();
        let outcome = self.run(receiver, args, original, &mut |state| trace.push(state));
        (outcome, trace)
    }

    fn run(
        &self,
        receiver: &Value,
        args: Vec<Value>,
        original: &dyn Invoker,
        enter: &mut dyn FnMut(CallState),
    ) -> Outcome {
        enter(CallState::Start);

        let mut progress = Progress {
            args,
            value: None,
        };
        let result = self.attempt(receiver, &mut progress, original, enter);

        match result {
            Ok(value) => {
                enter(CallState::Returned);
                Outcome::Returned(value)
            }
            Err(thrown) => {
                enter(CallState::Failed);
                let outcome = self.recover(receiver, &progress, thrown, original, enter);
                match outcome {
                    Outcome::Returned(_) => enter(CallState::Returned),
                    Outcome::Raised(_) => enter(CallState::Propagated),
                }
                outcome
            }
        }
    }

    fn attempt(
        &self,
        receiver: &Value,
        progress: &mut Progress,
        original: &dyn Invoker,
        enter: &mut dyn FnMut(CallState),
    ) -> std::result::Result<Value, Thrown> {
        for ignore in &self.ignores {
            if ignore(receiver, &progress.args, &self.site)? {
                enter(CallState::Ignored);
                return Ok(Value::default_for(self.site.return_type()));
            }
        }

        for hook in &self.pre_hooks {
            // A raising hook leaves the last accepted arguments for recoveries.
            progress.args = hook(receiver, progress.args.clone(), &self.site)?;
        }
        enter(CallState::PreHooksApplied);

        if self.replacements.is_empty() {
            progress.value = Some(original.invoke(receiver, &progress.args)?);
            enter(CallState::Invoked);
        } else {
            for replace in &self.replacements {
                let value = match progress.value.take() {
                    None => replace(receiver, &progress.args, original, &self.site)?,
                    Some(prior) => {
                        // Keep the prior value visible to recoveries if this replacement raises.
                        progress.value = Some(prior.clone());
                        replace(receiver, &progress.args, &PriorValue(prior), &self.site)?
                    }
                };
                progress.value = Some(value);
            }
            enter(CallState::Replaced);
        }

        for hook in &self.post_hooks {
            let current = progress.value.clone().unwrap_or_default();
            let value = hook(receiver, &progress.args, current, &self.site)?;
            progress.value = Some(value);
        }
        enter(CallState::PostHooksApplied);

        Ok(progress.value.take().unwrap_or_default())
    }

    fn recover(
        &self,
        receiver: &Value,
        progress: &Progress,
        thrown: Thrown,
        original: &dyn Invoker,
        enter: &mut dyn FnMut(CallState),
    ) -> Outcome {
        if self.recoveries.is_empty() {
            return Outcome::Raised(thrown);
        }
        enter(CallState::Recovering);

        let prior = progress.value.clone().map(PriorValue);
        let fallback: &dyn Invoker = match &prior {
            Some(prior) => prior,
            None => original,
        };

        let mut last = thrown.clone();
        for recover in &self.recoveries {
            match recover(receiver, &progress.args, &thrown, fallback, &self.site) {
                Ok(value) => return Outcome::Returned(value),
                Err(error) => {
                    log::trace!("recovery for {} raised {error}", self.site);
                    last = error;
                }
            }
        }
        Outcome::Raised(last)
    }
}

impl std::fmt::Debug for InterceptChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptChain")
            .field("site", &self.site.to_string())
            .field("ignores", &self.ignores.len())
            .field("pre_hooks", &self.pre_hooks.len())
            .field("replacements", &self.replacements.len())
            .field("post_hooks", &self.post_hooks.len())
            .field("recoveries", &self.recoveries.len())
            .finish()
    }
}

struct Progress {
    args: Vec<Value>,
    value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;
    use crate::test::sample_method_site;

    fn int_arg(args: &[Value]) -> i32 {
        args.first().and_then(Value::as_int).unwrap_or_default()
    }

    fn counting_original(calls: Arc<AtomicUsize>) -> impl Invoker {
        move |_: &Value, args: &[Value]| -> std::result::Result<Value, Thrown> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(int_arg(args) * 10))
        }
    }

    fn chain(injections: Vec<Injection>) -> InterceptChain {
        let mut injections = injections;
        crate::inject::sort_by_rank(&mut injections);
        InterceptChain::new(sample_method_site("compute"), &injections).unwrap()
    }

    #[test]
    fn passthrough_invokes_original_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(Vec::new());
        let original = counting_original(calls.clone());
        let (outcome, trace) = chain.invoke_traced(&Value::Null, vec![Value::Int(4)], &original);
        assert_eq!(outcome, Outcome::Returned(Value::Int(40)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            trace,
            vec![
                CallState::Start,
                CallState::PreHooksApplied,
                CallState::Invoked,
                CallState::PostHooksApplied,
                CallState::Returned,
            ]
        );
    }

    #[test]
    fn ignore_skips_everything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let pre = hooks.clone();
        let post = hooks.clone();
        let chain = chain(vec![
            Injection::post_hook(move |_, _, value, _| {
                post.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }),
            Injection::ignore(|_, _, _| Ok(false)),
            Injection::ignore(|_, args, _| Ok(int_arg(args) < 0)),
            Injection::pre_hook(move |_, args, _| {
                pre.fetch_add(1, Ordering::SeqCst);
                Ok(args)
            }),
        ]);
        let original = counting_original(calls.clone());

        let (outcome, trace) = chain.invoke_traced(&Value::Null, vec![Value::Int(-1)], &original);
        assert_eq!(outcome, Outcome::Returned(Value::Int(0)));
        assert_eq!(
            trace,
            vec![CallState::Start, CallState::Ignored, CallState::Returned]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.load(Ordering::SeqCst), 0);

        let outcome = chain.invoke(&Value::Null, vec![Value::Int(2)], &original);
        assert_eq!(outcome, Outcome::Returned(Value::Int(20)));
        assert_eq!(hooks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pre_hooks_apply_in_sequence() {
        let add_one = || {
            Injection::pre_hook(|_, args, _| Ok(vec![Value::Int(int_arg(&args) + 1)]))
        };
        let double = || Injection::pre_hook(|_, args, _| Ok(vec![Value::Int(int_arg(&args) * 2)]));
        let identity = |_: &Value, args: &[Value]| -> std::result::Result<Value, Thrown> {
            Ok(args[0].clone())
        };

        let forward = chain(vec![add_one(), double()]);
        let reverse = chain(vec![double(), add_one()]);
        assert_eq!(
            forward.invoke(&Value::Null, vec![Value::Int(5)], &identity),
            Outcome::Returned(Value::Int(12))
        );
        assert_eq!(
            reverse.invoke(&Value::Null, vec![Value::Int(5)], &identity),
            Outcome::Returned(Value::Int(11))
        );
    }

    #[test]
    fn replacements_chain_without_original() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            Injection::replace(|_, args, _, _| Ok(Value::Int(int_arg(args) + 100))),
            Injection::replace(|receiver, args, prior, _| {
                let previous = prior.invoke(receiver, args)?;
                Ok(Value::Int(previous.as_int().unwrap_or_default() * 2))
            }),
        ]);
        let original = counting_original(calls.clone());
        let (outcome, trace) = chain.invoke_traced(&Value::Null, vec![Value::Int(1)], &original);
        assert_eq!(outcome, Outcome::Returned(Value::Int(202)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(trace.contains(&CallState::Replaced));
        assert!(!trace.contains(&CallState::Invoked));
    }

    #[test]
    fn first_replacement_may_call_original() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            Injection::replace(|receiver, args, original, _| {
                let value = original.invoke(receiver, args)?;
                Ok(Value::Int(value.as_int().unwrap_or_default() + 1))
            }),
            Injection::post_hook(|_, _, value, _| {
                Ok(Value::Int(value.as_int().unwrap_or_default() * 3))
            }),
        ]);
        let original = counting_original(calls.clone());
        assert_eq!(
            chain.invoke(&Value::Null, vec![Value::Int(2)], &original),
            Outcome::Returned(Value::Int(63))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recovery_chain_falls_through() {
        let failing = |_: &Value, _: &[Value]| -> std::result::Result<Value, Thrown> {
            Err(Thrown::new("java/lang/IllegalStateException", "body"))
        };

        let chain_ok = chain(vec![
            Injection::recover(|_, _, _, _, _| Err(Thrown::runtime("first"))),
            Injection::recover(|_, _, thrown, _, _| {
                assert_eq!(thrown.message, "body");
                Ok(Value::Int(7))
            }),
        ]);
        let (outcome, trace) = chain_ok.invoke_traced(&Value::Null, vec![Value::Int(1)], &failing);
        assert_eq!(outcome, Outcome::Returned(Value::Int(7)));
        assert_eq!(
            trace,
            vec![
                CallState::Start,
                CallState::PreHooksApplied,
                CallState::Failed,
                CallState::Recovering,
                CallState::Returned,
            ]
        );

        let chain_err = chain(vec![
            Injection::recover(|_, _, _, _, _| Err(Thrown::runtime("first"))),
            Injection::recover(|_, _, _, _, _| Err(Thrown::runtime("second"))),
        ]);
        let (outcome, trace) =
            chain_err.invoke_traced(&Value::Null, vec![Value::Int(1)], &failing);
        assert_eq!(outcome.thrown().map(|t| t.message.as_str()), Some("second"));
        assert_eq!(trace.last(), Some(&CallState::Propagated));
    }

    #[test]
    fn unrecovered_error_keeps_identity() {
        let failing = |_: &Value, _: &[Value]| -> std::result::Result<Value, Thrown> {
            Err(Thrown::new("java/io/IOException", "disk"))
        };
        let chain = chain(vec![Injection::post_hook(|_, _, value, _| Ok(value))]);
        let outcome = chain.invoke(&Value::Null, Vec::new(), &failing);
        assert_eq!(
            outcome,
            Outcome::Raised(Thrown::new("java/io/IOException", "disk"))
        );
    }

    #[test]
    fn recovery_after_value_gets_prior_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            Injection::post_hook(|_, _, _, _| Err(Thrown::runtime("post"))),
            Injection::recover(move |receiver, args, _, fallback, _| {
                let value = fallback.invoke(receiver, args)?;
                record.lock().unwrap().push(value.clone());
                Ok(value)
            }),
        ]);
        let original = counting_original(calls.clone());
        assert_eq!(
            chain.invoke(&Value::Null, vec![Value::Int(3)], &original),
            Outcome::Returned(Value::Int(30))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(30)]);
    }

    #[test]
    fn failed_pre_hook_keeps_arguments_for_recovery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            Injection::pre_hook(|_, args, _| Ok(vec![Value::Int(int_arg(&args) + 1)])),
            Injection::pre_hook(|_, _, _| Err(Thrown::runtime("pre failed"))),
            Injection::recover(move |receiver, args, _, fallback, _| {
                record.lock().unwrap().extend_from_slice(args);
                fallback.invoke(receiver, args)
            }),
        ]);
        let original = counting_original(calls.clone());
        let (outcome, trace) = chain.invoke_traced(&Value::Null, vec![Value::Int(7)], &original);
        assert_eq!(outcome, Outcome::Returned(Value::Int(80)));
        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(8)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!trace.contains(&CallState::PreHooksApplied));
    }

    #[test]
    fn class_injections_are_rejected() {
        let site = sample_method_site("compute");
        let result = InterceptChain::new(
            site,
            &[Injection::add_field(crate::inject::FieldDeclaration::new(
                crate::classfile::flags::AccessFlags::PRIVATE,
                "x",
                crate::signatures::TypeSignature::Int,
            ))],
        );
        assert!(matches!(
            result,
            Err(crate::Error::IncompatibleConfiguration(_))
        ));
    }
}
