//! Class images shared by the integration tests, assembled with the public codec.
//!
//! `it/Counter` has a private `total` field, a constructor calling `super()`, a constructor
//! delegating to `this()`, an instance method `compute(I)I` returning twice its argument and a
//! static `label()Ljava/lang/String;`.

#![allow(dead_code)]

use std::sync::Arc;

use classweave::{
    bytecode::{CodeBuilder, Opcode},
    classfile::{
        attributes::{Attribute, AttributeBody, NAME},
        flags::AccessFlags,
        ClassFile, MemberInfo,
    },
    prelude::*,
    signatures::parse_method_descriptor,
};

pub const COUNTER: &str = "it/Counter";

fn method(
    class: &mut ClassFile,
    access: AccessFlags,
    name: &str,
    descriptor: &str,
    build: impl FnOnce(&mut CodeBuilder) -> Result<()>,
) -> Result<()> {
    let parsed = parse_method_descriptor(descriptor)?;
    let locals = parsed.param_slots() + u16::from(!access.is_static());

    let pool = &mut class.constant_pool;
    let mut info = MemberInfo::new(pool, access, name, descriptor);
    let mut builder = CodeBuilder::new(pool, locals);
    build(&mut builder)?;
    let body = builder.finish();
    let code = body.encode(pool)?;
    info.attributes
        .push(Attribute::new(pool, NAME::CODE, AttributeBody::Code(code)));
    class.methods.push(info);
    Ok(())
}

/// `it/Counter` at class file version `major`.
pub fn counter_class(major: u16) -> Result<ClassFile> {
    let mut class = ClassFile::new(
        COUNTER,
        Some("java/lang/Object"),
        AccessFlags::PUBLIC | AccessFlags::SUPER,
        major,
    );
    let this = ClassName::new(COUNTER);
    let object = ClassName::object();
    let void = parse_method_descriptor("()V")?;

    let total = MemberInfo::new(&mut class.constant_pool, AccessFlags::PRIVATE, "total", "I");
    class.fields.push(total);

    method(&mut class, AccessFlags::PUBLIC, "<init>", "()V", |b| {
        b.load_this()?
            .invoke_special(&object, "<init>", &void)?
            .return_value(&TypeSignature::Void)?;
        Ok(())
    })?;

    method(&mut class, AccessFlags::PUBLIC, "<init>", "(I)V", |b| {
        b.load_this()?
            .invoke_special(&this, "<init>", &void)?
            .load_this()?
            .load(&TypeSignature::Int, 1)?
            .put_field(&this, "total", &TypeSignature::Int)?
            .return_value(&TypeSignature::Void)?;
        Ok(())
    })?;

    method(&mut class, AccessFlags::PUBLIC, "compute", "(I)I", |b| {
        b.load(&TypeSignature::Int, 1)?
            .push_int(2)?
            .op(Opcode::Imul, 2, 1)?
            .return_value(&TypeSignature::Int)?;
        Ok(())
    })?;

    let string = TypeSignature::string();
    method(
        &mut class,
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        "label",
        "()Ljava/lang/String;",
        |b| {
            b.push_string("counter")?.return_value(&string)?;
            Ok(())
        },
    )?;

    Ok(class)
}

/// Encoded `it/Counter` at version 55.
pub fn counter_bytes() -> Result<Vec<u8>> {
    counter_class(55)?.to_bytes()
}

/// Encoded `it/Counter` at version 52, before nest attributes.
pub fn legacy_counter_bytes() -> Result<Vec<u8>> {
    counter_class(52)?.to_bytes()
}

/// A visitor answering every method named `name` with the injection `make` builds.
pub fn on_method<F>(label: &str, name: &'static str, make: F) -> Arc<dyn InjectionVisitor>
where
    F: Fn() -> Injection + Send + Sync + 'static,
{
    Arc::new(FnVisitor::new(label).on_method(move |site| (site.name() == name).then(&make)))
}

/// Compose `visitors` over `bytes` and plan the result against `registry`.
pub fn plan(
    bytes: &[u8],
    visitors: Vec<Arc<dyn InjectionVisitor>>,
    registry: &CallbackRegistry,
) -> Result<RewritePlan> {
    let site = ClassSite::from_bytes(bytes)?;
    let mut set = VisitorSet::new();
    for visitor in visitors {
        set.push(visitor);
    }
    let cache = PlanCache::new();
    let composition = Composer::new(&set, InjectionKinds::all(), &cache).compose_all(&site)?;
    RewritePlan::build(&composition, registry, RewriteOptions::default())
}

/// Token of the only interception in `plan`.
pub fn intercept_token(plan: &RewritePlan) -> String {
    assert_eq!(plan.intercepts().len(), 1);
    plan.intercepts()[0].token.clone()
}

/// Integer in the first argument slot.
pub fn int_arg(args: &[Value]) -> i32 {
    args.first().and_then(Value::as_int).unwrap_or_default()
}
