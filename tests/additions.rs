//! Added fields and methods, checked on the rewritten class file.

mod common;

use std::sync::Arc;

use classweave::{
    bytecode::{MethodBody, Opcode},
    classfile::{constpool::LiteralValue, flags::AccessFlags, ClassFile},
    prelude::*,
    rewrite::FieldInit,
    signatures::parse_method_descriptor,
};
use common::{counter_bytes, plan};

fn add_to_class<F>(make: F) -> Arc<dyn InjectionVisitor>
where
    F: Fn() -> Injection + Send + Sync + 'static,
{
    Arc::new(FnVisitor::new("additions").on_class(move |_| Some(make())))
}

fn constructor_code(class: &ClassFile, descriptor: &str) -> Vec<u8> {
    let index = class.find_method("<init>", descriptor).unwrap();
    class.methods[index].code().unwrap().code.clone()
}

/// Names of the fields `descriptor`'s constructor writes, in order.
fn stored_fields(class: &ClassFile, descriptor: &str) -> Result<Vec<String>> {
    let index = class.find_method("<init>", descriptor).unwrap();
    let body = MethodBody::decode(class.methods[index].code().unwrap(), &class.constant_pool)?;
    let mut stored = Vec::new();
    for instruction in body.instructions() {
        if instruction.opcode == Opcode::Putfield {
            let index = instruction.constant_index().unwrap();
            stored.push(class.constant_pool.member_ref(index)?.name);
        }
    }
    Ok(stored)
}

#[test]
fn computed_instance_field_is_set_by_the_delegated_constructor_only() -> Result<()> {
    let bytes = counter_bytes()?;
    let registry = Arc::new(CallbackRegistry::new());
    let plan = plan(
        &bytes,
        vec![add_to_class(|| {
            Injection::add_field(
                FieldDeclaration::new(AccessFlags::PRIVATE, "tag", TypeSignature::Int)
                    .with_initializer(|_| Ok(Value::Int(5))),
            )
        })],
        &registry,
    )?;

    let token = match &plan.fields()[0].init {
        FieldInit::Callback { token, .. } => token.clone(),
        other => panic!("unexpected initialization {other:?}"),
    };
    let bridge = Bridge::new(registry.clone());
    assert_eq!(
        bridge.initial_value(&token, &Value::Null)?,
        Outcome::Returned(Value::Int(5))
    );

    let site = ClassSite::from_bytes(&bytes)?;
    let output = rewrite(&site, &plan)?;
    let original = ClassFile::from_mem(bytes)?;
    let woven = ClassFile::from_mem(output.primary)?;

    assert!(woven.find_field("tag").is_some());
    assert_eq!(constructor_code(&woven, "(I)V"), constructor_code(&original, "(I)V"));
    assert_eq!(stored_fields(&woven, "(I)V")?, vec!["total".to_string()]);
    assert_eq!(stored_fields(&woven, "()V")?, vec!["tag".to_string()]);
    Ok(())
}

#[test]
fn static_constant_needs_no_initializer() -> Result<()> {
    let bytes = counter_bytes()?;
    let registry = CallbackRegistry::new();
    let plan = plan(
        &bytes,
        vec![add_to_class(|| {
            Injection::add_field(
                FieldDeclaration::new(
                    AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                    "VERSION",
                    TypeSignature::Int,
                )
                .with_constant(LiteralValue::Int(3)),
            )
        })],
        &registry,
    )?;
    assert!(registry.is_empty());

    let output = rewrite(&ClassSite::from_bytes(&bytes)?, &plan)?;
    let woven = ClassSite::from_bytes(&output.primary)?;
    let field = woven.field("VERSION").unwrap();
    assert_eq!(field.constant(), Some(&LiteralValue::Int(3)));
    assert!(woven.method("<clinit>", "()V").is_none());
    Ok(())
}

#[test]
fn added_method_reaches_declared_fields() -> Result<()> {
    let bytes = counter_bytes()?;
    let registry = Arc::new(CallbackRegistry::new());
    let plan = plan(
        &bytes,
        vec![add_to_class(|| {
            Injection::add_method(
                MethodDeclaration::new(
                    AccessFlags::PUBLIC,
                    "bump",
                    MethodDescriptor::new(vec![TypeSignature::Int], TypeSignature::Int),
                    |_, args, accessors| {
                        let total = accessors
                            .field("total")
                            .ok_or_else(|| Thrown::runtime("no accessor for total"))?;
                        let next = total.get().as_int().unwrap_or_default()
                            + args.first().and_then(Value::as_int).unwrap_or_default();
                        total.set(Value::Int(next));
                        Ok(Value::Int(next))
                    },
                )
                .field("total"),
            )
        })],
        &registry,
    )?;

    let added = &plan.added_methods()[0];
    assert_eq!(added.fields.len(), 1);
    assert_eq!(plan.helpers().len(), 1);

    let output = rewrite(&ClassSite::from_bytes(&bytes)?, &plan)?;
    assert_eq!(output.helpers.len(), 1);
    let woven = ClassSite::from_bytes(&output.primary)?;
    assert!(woven.method("bump", "(I)I").is_some());

    let total = Arc::new(FieldCell::new(Value::Int(10)));
    let accessors = Accessors::new().with_field("total", total.clone());
    let bridge = Bridge::new(registry);
    let outcome = bridge.invoke_added(&added.token, &Value::Null, &[Value::Int(5)], &accessors)?;
    assert_eq!(outcome, Outcome::Returned(Value::Int(15)));
    assert_eq!(accessors.dirty_fields(), vec!["total"]);
    Ok(())
}

#[test]
fn accessor_to_unknown_member_is_rejected() -> Result<()> {
    let bytes = counter_bytes()?;
    let result = plan(
        &bytes,
        vec![add_to_class(|| {
            Injection::add_method(
                MethodDeclaration::new(
                    AccessFlags::PUBLIC,
                    "peek",
                    parse_method_descriptor("()I").unwrap(),
                    |_, _, _| Ok(Value::Int(0)),
                )
                .field("missing"),
            )
        })],
        &CallbackRegistry::new(),
    );
    assert!(matches!(result, Err(Error::IncompatibleConfiguration(_))));
    Ok(())
}
