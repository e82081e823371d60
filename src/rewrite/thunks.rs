//! Synthetic helper classes.
//!
//! Every helper is a small final class in the owner's package implementing one of the bridge
//! interfaces. Instance helpers capture their receiver in a `target` field at construction;
//! static helpers have a no-argument constructor. Helper code never branches.

use crate::{
    bytecode::CodeBuilder,
    classfile::{
        attributes::{Attribute, AttributeBody, NAME},
        flags::AccessFlags,
        ClassFile, MemberInfo,
    },
    rewrite::{
        plan::{HelperDecl, HelperKind},
        symbols::{
            accessor_dirty, accessor_get, accessor_invoke, accessor_set, no_args, DIRTY_FIELD,
            FIELD_ACCESSOR, METHOD_ACCESSOR, TARGET_FIELD,
        },
    },
    signatures::{ClassName, MethodDescriptor, TypeSignature},
    Result,
};

/// Constructor descriptor of a helper: `(LOwner;)V` for instance helpers, `()V` otherwise.
pub(crate) fn constructor(owner: &ClassName, is_static: bool) -> MethodDescriptor {
    if is_static {
        no_args()
    } else {
        MethodDescriptor::new(
            vec![TypeSignature::Reference(owner.clone())],
            TypeSignature::Void,
        )
    }
}

/// Assemble a method and append it to `class`.
pub(crate) fn emit_method<F>(
    class: &mut ClassFile,
    access: AccessFlags,
    name: &str,
    descriptor: &MethodDescriptor,
    build: F,
) -> Result<usize>
where
    F: FnOnce(&mut CodeBuilder) -> Result<()>,
{
    let pool = &mut class.constant_pool;
    let mut info = MemberInfo::new(pool, access, name, &descriptor.descriptor());
    let locals = descriptor.param_slots() + u16::from(!access.is_static());
    let mut asm = CodeBuilder::new(pool, locals);
    build(&mut asm)?;
    let code = asm.finish().encode(pool)?;
    info.attributes
        .push(Attribute::new(pool, NAME::CODE, AttributeBody::Code(code)));
    class.methods.push(info);
    Ok(class.methods.len() - 1)
}

fn load_target(
    asm: &mut CodeBuilder<'_>,
    helper: &ClassName,
    owner: &TypeSignature,
    is_static: bool,
) -> Result<()> {
    if !is_static {
        asm.load_this()?.get_field(helper, TARGET_FIELD, owner)?;
    }
    Ok(())
}

/// Build the class file of helper `decl` for `owner`.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] if a generated body cannot be encoded.
pub fn helper_class(
    owner: &ClassName,
    decl: &HelperDecl,
    major_version: u16,
    nest_host: bool,
) -> Result<ClassFile> {
    let mut class = ClassFile::new(
        decl.name.internal(),
        Some(ClassName::object().internal()),
        AccessFlags::FINAL | AccessFlags::SUPER | AccessFlags::SYNTHETIC,
        major_version,
    );
    let interface = match decl.kind {
        HelperKind::Field { .. } => FIELD_ACCESSOR,
        HelperKind::Call { .. } | HelperKind::Method { .. } => METHOD_ACCESSOR,
    };
    let index = class.constant_pool.add_class(interface);
    class.interfaces.push(index);

    let is_static = decl.kind.is_static();
    let this = decl.name.clone();
    let owner_ty = TypeSignature::Reference(owner.clone());
    if !is_static {
        let target = MemberInfo::new(
            &mut class.constant_pool,
            AccessFlags::PRIVATE | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
            TARGET_FIELD,
            &owner_ty.descriptor(),
        );
        class.fields.push(target);
    }

    let object = ClassName::object();
    emit_method(
        &mut class,
        AccessFlags::empty(),
        "<init>",
        &constructor(owner, is_static),
        |asm| {
            asm.load_this()?.invoke_special(&object, "<init>", &no_args())?;
            if !is_static {
                asm.load_this()?
                    .load(&owner_ty, 1)?
                    .put_field(&this, TARGET_FIELD, &owner_ty)?;
            }
            asm.return_value(&TypeSignature::Void)?;
            Ok(())
        },
    )?;

    match &decl.kind {
        HelperKind::Field {
            field,
            ty,
            is_final,
            ..
        } => {
            let dirty = MemberInfo::new(
                &mut class.constant_pool,
                AccessFlags::PRIVATE | AccessFlags::SYNTHETIC,
                DIRTY_FIELD,
                &TypeSignature::Boolean.descriptor(),
            );
            class.fields.push(dirty);

            emit_method(&mut class, AccessFlags::PUBLIC, "get", &accessor_get(), |asm| {
                load_target(asm, &this, &owner_ty, is_static)?;
                if is_static {
                    asm.get_static(owner, field, ty)?;
                } else {
                    asm.get_field(owner, field, ty)?;
                }
                asm.box_value(ty)?.return_value(&TypeSignature::object())?;
                Ok(())
            })?;

            emit_method(&mut class, AccessFlags::PUBLIC, "set", &accessor_set(), |asm| {
                if *is_final {
                    let unsupported = ClassName::new("java/lang/UnsupportedOperationException");
                    let message = format!("{}.{} is final", owner.binary_name(), field);
                    asm.new_object(&unsupported)?
                        .dup()?
                        .push_string(&message)?
                        .invoke_special(
                            &unsupported,
                            "<init>",
                            &MethodDescriptor::new(
                                vec![TypeSignature::string()],
                                TypeSignature::Void,
                            ),
                        )?
                        .throw()?;
                    return Ok(());
                }
                load_target(asm, &this, &owner_ty, is_static)?;
                asm.load(&TypeSignature::object(), 1)?.unbox_value(ty)?;
                if is_static {
                    asm.put_static(owner, field, ty)?;
                } else {
                    asm.put_field(owner, field, ty)?;
                }
                asm.load_this()?
                    .push_int(1)?
                    .put_field(&this, DIRTY_FIELD, &TypeSignature::Boolean)?
                    .return_value(&TypeSignature::Void)?;
                Ok(())
            })?;

            emit_method(
                &mut class,
                AccessFlags::PUBLIC,
                "isDirty",
                &accessor_dirty(),
                |asm| {
                    asm.load_this()?
                        .get_field(&this, DIRTY_FIELD, &TypeSignature::Boolean)?
                        .return_value(&TypeSignature::Boolean)?;
                    Ok(())
                },
            )?;
        }
        HelperKind::Call {
            method, descriptor, ..
        }
        | HelperKind::Method {
            method, descriptor, ..
        } => {
            emit_method(
                &mut class,
                AccessFlags::PUBLIC,
                "invoke",
                &accessor_invoke(),
                |asm| {
                    load_target(asm, &this, &owner_ty, is_static)?;
                    asm.unpack_arguments(descriptor, 1)?;
                    if is_static {
                        asm.invoke_static(owner, method, descriptor)?;
                    } else {
                        asm.invoke_virtual(owner, method, descriptor)?;
                    }
                    if descriptor.ret.is_void() {
                        asm.push_null()?;
                    } else {
                        asm.box_value(&descriptor.ret)?;
                    }
                    asm.return_value(&TypeSignature::object())?;
                    Ok(())
                },
            )?;
        }
    }

    if nest_host {
        let host = class.constant_pool.add_class(owner.internal());
        class.add_attribute(NAME::NEST_HOST, AttributeBody::NestHost(host));
    }
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{MethodBody, Opcode};

    fn opcodes(class: &ClassFile, name: &str) -> Vec<Opcode> {
        let index = class
            .methods
            .iter()
            .position(|m| m.name(&class.constant_pool).is_ok_and(|n| n == name))
            .unwrap();
        let code = class.methods[index].code().unwrap();
        MethodBody::decode(code, &class.constant_pool)
            .unwrap()
            .instructions()
            .map(|i| i.opcode)
            .collect()
    }

    #[test]
    fn instance_field_accessor_shape() -> Result<()> {
        let owner = ClassName::new("demo/Sample");
        let decl = HelperDecl {
            name: owner.nested("cw$F1"),
            kind: HelperKind::Field {
                field: "count".into(),
                ty: TypeSignature::Int,
                is_static: false,
                is_final: false,
            },
        };
        let class = helper_class(&owner, &decl, 55, true)?;
        let bytes = class.to_bytes()?;
        let decoded = ClassFile::from_mem(bytes)?;

        assert_eq!(decoded.name()?.internal(), "demo/Sample$cw$F1");
        assert_eq!(
            decoded.interface_names()?[0].internal(),
            "classweave/runtime/FieldAccessor"
        );
        assert!(decoded.find_field(TARGET_FIELD).is_some());
        assert!(decoded
            .find_method("<init>", "(Ldemo/Sample;)V")
            .is_some());
        assert_eq!(
            opcodes(&decoded, "get"),
            vec![
                Opcode::Aload0,
                Opcode::Getfield,
                Opcode::Getfield,
                Opcode::Invokestatic,
                Opcode::Areturn
            ]
        );
        assert!(decoded
            .attributes
            .iter()
            .any(|a| matches!(a.body, AttributeBody::NestHost(_))));
        Ok(())
    }

    #[test]
    fn final_field_setter_throws() -> Result<()> {
        let owner = ClassName::new("demo/Sample");
        let decl = HelperDecl {
            name: owner.nested("cw$F2"),
            kind: HelperKind::Field {
                field: "LIMIT".into(),
                ty: TypeSignature::Int,
                is_static: true,
                is_final: true,
            },
        };
        let class = helper_class(&owner, &decl, 52, false)?;
        assert!(class.find_method("<init>", "()V").is_some());
        assert_eq!(opcodes(&class, "set").last(), Some(&Opcode::Athrow));
        Ok(())
    }

    #[test]
    fn static_method_accessor_returns_null_for_void() -> Result<()> {
        let owner = ClassName::new("demo/Sample");
        let decl = HelperDecl {
            name: owner.nested("cw$M3"),
            kind: HelperKind::Method {
                method: "reset".into(),
                descriptor: MethodDescriptor::new(vec![TypeSignature::Long], TypeSignature::Void),
                is_static: true,
            },
        };
        let class = helper_class(&owner, &decl, 52, false)?;
        assert_eq!(
            opcodes(&class, "invoke"),
            vec![
                Opcode::Aload,
                Opcode::Iconst0,
                Opcode::Aaload,
                Opcode::Checkcast,
                Opcode::Invokevirtual,
                Opcode::Invokestatic,
                Opcode::AconstNull,
                Opcode::Areturn
            ]
        );
        Ok(())
    }
}
