//! Added methods.
//!
//! An added method has no body of its own: it collects accessors for the members its
//! declaration asked for into two maps and hands them to the bridge with its arguments.

use crate::{
    bytecode::CodeBuilder,
    classfile::{
        attributes::{Attribute, AttributeBody, NAME},
        ClassFile,
    },
    rewrite::{
        plan::{AddedMethodPlan, HelperDecl},
        symbols::{bridge, hash_map, invoke_added, map, map_put, no_args},
        thunks::{constructor, emit_method},
    },
    signatures::{ClassName, TypeSignature},
    Result,
};

/// Build a `HashMap` of accessor thunks in local `slot`.
fn accessor_map(
    asm: &mut CodeBuilder<'_>,
    owner: &ClassName,
    entries: &[(String, ClassName)],
    helpers: &[HelperDecl],
    slot: u16,
) -> Result<()> {
    let map_ty = TypeSignature::Reference(map());
    let hash_map = hash_map();
    asm.new_object(&hash_map)?
        .dup()?
        .invoke_special(&hash_map, "<init>", &no_args())?
        .store(&map_ty, slot)?;

    for (name, helper) in entries {
        let is_static = helpers
            .iter()
            .find(|decl| decl.name == *helper)
            .is_some_and(|decl| decl.kind.is_static());
        asm.load(&map_ty, slot)?
            .push_string(name)?
            .new_object(helper)?
            .dup()?;
        if !is_static {
            asm.load_this()?;
        }
        asm.invoke_special(helper, "<init>", &constructor(owner, is_static))?
            .invoke_interface(&map(), "put", &map_put())?
            .pop_value(&TypeSignature::object())?;
    }
    Ok(())
}

/// Append the method described by `plan` to `class`.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] if the generated body cannot be encoded.
pub(crate) fn add(
    class: &mut ClassFile,
    owner: &ClassName,
    plan: &AddedMethodPlan,
    helpers: &[HelperDecl],
) -> Result<()> {
    let is_static = plan.is_static();
    let this_slot = u16::from(!is_static);
    let descriptor = &plan.descriptor;
    let map_ty = TypeSignature::Reference(map());

    let index = emit_method(class, plan.access, &plan.name, descriptor, |asm| {
        let fields = asm.allocate_local(&map_ty);
        let methods = asm.allocate_local(&map_ty);
        accessor_map(asm, owner, &plan.fields, helpers, fields)?;
        accessor_map(asm, owner, &plan.methods, helpers, methods)?;

        asm.push_string(&plan.token)?;
        if is_static {
            asm.push_null()?;
        } else {
            asm.load_this()?;
        }
        asm.pack_arguments(descriptor, this_slot)?
            .load(&map_ty, fields)?
            .load(&map_ty, methods)?
            .invoke_static(&bridge(), "invokeAdded", &invoke_added())?;
        if descriptor.ret.is_void() {
            asm.pop_value(&TypeSignature::object())?;
        } else {
            asm.unbox_value(&descriptor.ret)?;
        }
        asm.return_value(&descriptor.ret)?;
        Ok(())
    })?;

    if !plan.throws.is_empty() {
        let thrown = plan
            .throws
            .iter()
            .map(|name| class.constant_pool.add_class(name.internal()))
            .collect();
        let attribute = Attribute::new(
            &mut class.constant_pool,
            NAME::EXCEPTIONS,
            AttributeBody::Exceptions(thrown),
        );
        class.methods[index].attributes.push(attribute);
    }
    log::trace!("added {}{} to {}", plan.name, descriptor, owner);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{MethodBody, Opcode},
        classfile::flags::AccessFlags,
        rewrite::plan::HelperKind,
        signatures::MethodDescriptor,
        test::{sample_class, SAMPLE},
    };

    #[test]
    fn added_method_hands_maps_to_the_bridge() -> Result<()> {
        let mut class = sample_class();
        let owner = ClassName::new(SAMPLE);
        let helper = owner.nested("cw$F7");
        let helpers = [HelperDecl {
            name: helper.clone(),
            kind: HelperKind::Field {
                field: "count".into(),
                ty: TypeSignature::Int,
                is_static: false,
                is_final: false,
            },
        }];
        let plan = AddedMethodPlan {
            access: AccessFlags::PUBLIC | AccessFlags::SYNTHETIC,
            name: "describe".into(),
            descriptor: MethodDescriptor::new(vec![TypeSignature::Int], TypeSignature::string()),
            throws: vec![ClassName::new("java/io/IOException")],
            token: "cw1:2".into(),
            fields: vec![("count".into(), helper)],
            methods: Vec::new(),
        };
        add(&mut class, &owner, &plan, &helpers)?;

        let index = class
            .find_method("describe", "(I)Ljava/lang/String;")
            .unwrap();
        let method = &class.methods[index];
        let code = method.code().unwrap();
        assert_eq!(code.max_locals, 4);
        let ops: Vec<_> = MethodBody::decode(code, &class.constant_pool)?
            .instructions()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(ops.iter().filter(|&&op| op == Opcode::Invokeinterface).count(), 1);
        assert_eq!(ops[ops.len() - 3], Opcode::Invokestatic);
        assert_eq!(ops[ops.len() - 2], Opcode::Checkcast);
        assert_eq!(ops.last(), Some(&Opcode::Areturn));
        assert!(method
            .attributes
            .iter()
            .any(|a| matches!(&a.body, AttributeBody::Exceptions(thrown) if thrown.len() == 1)));
        Ok(())
    }

    #[test]
    fn static_void_method_discards_the_result() -> Result<()> {
        let mut class = sample_class();
        let owner = ClassName::new(SAMPLE);
        let plan = AddedMethodPlan {
            access: AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::SYNTHETIC,
            name: "reset".into(),
            descriptor: no_args(),
            throws: Vec::new(),
            token: "cw1:3".into(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        add(&mut class, &owner, &plan, &[])?;

        let index = class.find_method("reset", "()V").unwrap();
        let code = class.methods[index].code().unwrap();
        let ops: Vec<_> = MethodBody::decode(code, &class.constant_pool)?
            .instructions()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(&ops[ops.len() - 3..], &[Opcode::Invokestatic, Opcode::Pop, Opcode::Return]);
        assert!(ops.contains(&Opcode::AconstNull));
        Ok(())
    }
}
