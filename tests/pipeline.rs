//! The injector pipeline end to end: transform, define, re-transform.

mod common;

use std::sync::Arc;

use classweave::{classfile::flags::AccessFlags, prelude::*, rewrite::original_name};
use common::{counter_bytes, int_arg, legacy_counter_bytes, on_method, COUNTER};

fn tracing_injector(config: InjectorConfig) -> Injector {
    let mut injector = Injector::with_config("tracing", Arc::new(CallbackRegistry::new()), config);
    injector.add_visitor(on_method("plus-one", "compute", || {
        Injection::pre_hook(|_, args, _| Ok(vec![Value::Int(int_arg(&args) + 1)]))
    }));
    injector
}

#[test]
fn hooked_class_is_rewritten_and_stamped() -> Result<()> {
    let injector = tracing_injector(InjectorConfig::strict());
    let output = injector.transform(&counter_bytes()?)?;
    assert!(output.modified);
    assert_eq!(output.injections, 1);
    assert_eq!(output.helpers.len(), 1);

    let woven = ClassSite::from_bytes(&output.primary)?;
    assert!(woven.method("compute", "(I)I").is_some());
    assert!(woven.method(&original_name("compute"), "(I)I").is_some());
    assert_eq!(
        woven.woven(),
        Some(Woven {
            injector: "tracing".to_string(),
            modified: true,
        })
    );

    let (helper_name, helper) = &output.helpers[0];
    let helper = ClassSite::from_bytes(helper)?;
    assert_eq!(helper.class_name(), helper_name);
    assert!(helper_name.internal().starts_with(COUNTER));

    let again = injector.transform(&output.primary)?;
    assert!(!again.modified);
    assert_eq!(again.primary, output.primary);
    Ok(())
}

#[test]
fn redefinition_keeps_the_class_identity() -> Result<()> {
    let injector = tracing_injector(InjectorConfig::default());
    let space = ClassSpace::new(DefineMode::InPlace);
    let bytes = counter_bytes()?;
    let loaded = space.define(&bytes, None)?;

    let defined = injector.transform_and_define(&bytes, &space, Some(&loaded))?;
    assert!(defined.modified);
    assert_eq!(defined.class.id(), loaded.id());
    assert_eq!(defined.class.generation(), 1);
    assert_eq!(defined.helpers.len(), 1);

    let current = space.site(&ClassName::new(COUNTER)).unwrap();
    assert!(current.woven().is_some());
    assert_eq!(current.materialize(&space), Some(defined.class));
    Ok(())
}

#[test]
fn new_class_mode_defines_a_fresh_type() -> Result<()> {
    let injector = tracing_injector(InjectorConfig::default());
    let space = ClassSpace::new(DefineMode::NewClass);
    let defined = injector.transform_and_define(&counter_bytes()?, &space, None)?;
    assert_ne!(defined.class.name(), &ClassName::new(COUNTER));
    assert_eq!(space.len(), 2);
    Ok(())
}

#[test]
fn private_accessors_need_nest_support() -> Result<()> {
    let mut injector = Injector::new("legacy", Arc::new(CallbackRegistry::new()));
    injector.add_visitor(Arc::new(FnVisitor::new("peek").on_class(|_| {
        Some(Injection::add_method(
            MethodDeclaration::new(
                AccessFlags::PUBLIC,
                "peek",
                MethodDescriptor::new(Vec::new(), TypeSignature::Int),
                |_, _, accessors| {
                    Ok(accessors
                        .field("total")
                        .map(|total| total.get())
                        .unwrap_or_default())
                },
            )
            .field("total"),
        ))
    })));

    assert!(matches!(
        injector.transform(&legacy_counter_bytes()?),
        Err(Error::IncompatibleConfiguration(_))
    ));
    assert!(injector.transform(&counter_bytes()?)?.modified);
    Ok(())
}

#[test]
fn constructors_cannot_be_intercepted() -> Result<()> {
    let mut injector = Injector::new("ctor", Arc::new(CallbackRegistry::new()));
    injector.add_visitor(on_method("ctor", "<init>", || {
        Injection::post_hook(|_, _, value, _| Ok(value))
    }));
    assert!(matches!(
        injector.transform(&counter_bytes()?),
        Err(Error::IncompatibleConfiguration(_))
    ));
    Ok(())
}

#[test]
fn batches_are_independent() -> Result<()> {
    let injector = tracing_injector(InjectorConfig::minimal());
    let images = vec![counter_bytes()?, b"\xCA\xFE\xBA\xBE".to_vec(), legacy_counter_bytes()?];
    let results = injector.transform_batch(&images);

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().ok().unwrap();
    assert!(first.modified);
    assert!(ClassSite::from_bytes(&first.primary)?.woven().is_none());
    assert!(matches!(results[1], Err(Error::MalformedArtifact { .. })));
    assert!(results[2].as_ref().is_ok_and(|o| o.modified));
    Ok(())
}

#[test]
fn visitors_answering_nothing_leave_the_class_alone() -> Result<()> {
    let mut injector = Injector::new("quiet", Arc::new(CallbackRegistry::new()));
    injector.add_visitor(Arc::new(
        FnVisitor::new("quiet").on_method(|_| Some(Injection::None(Target::Method))),
    ));
    let bytes = counter_bytes()?;
    let output = injector.transform(&bytes)?;
    assert!(!output.modified);
    assert_eq!(output.primary, bytes);
    assert!(injector.registry().is_empty());
    Ok(())
}
