//! Added fields and the initializer code they need.
//!
//! Static constants become `ConstantValue` attributes. Every other initial value is assigned by a
//! fragment spliced into the constructors (instance fields) or the static initializer (static
//! fields). Constructors are spliced right after their `super(...)` call, which is where a
//! compiler places field initializers; constructors that delegate to `this(...)` are left alone,
//! since the constructor they delegate to already runs the fragment.
//!
//! Fragments are straight-line code padded to a multiple of four bytes, which keeps switch
//! padding and lets the original `StackMapTable` survive with shifted offsets.

use crate::{
    bytecode::{CodeBuilder, Insn, Instruction, MethodBody, Opcode},
    classfile::{
        attributes::{Attribute, AttributeBody, CodeAttribute, NAME},
        constpool::ConstantPool,
        flags::AccessFlags,
        ClassFile, MemberInfo,
    },
    rewrite::{
        frames::shift_stack_map,
        plan::{FieldInit, FieldPlan},
        symbols::{bridge, initial_value, no_args},
        thunks::emit_method,
    },
    signatures::{ClassName, TypeSignature},
    Error::NotSupported,
    Result,
};

/// Declare every planned field, with token holders for computed ones.
pub(crate) fn declare(class: &mut ClassFile, fields: &[FieldPlan]) {
    for field in fields {
        let pool = &mut class.constant_pool;
        let mut info = MemberInfo::new(pool, field.access, &field.name, &field.ty.descriptor());
        match &field.init {
            FieldInit::Constant(value) => {
                let index = pool.add_literal(value);
                info.attributes.push(Attribute::new(
                    pool,
                    NAME::CONSTANT_VALUE,
                    AttributeBody::ConstantValue(index),
                ));
            }
            FieldInit::Callback { token, holder } => {
                let mut holder = MemberInfo::new(
                    pool,
                    AccessFlags::PRIVATE
                        | AccessFlags::STATIC
                        | AccessFlags::FINAL
                        | AccessFlags::SYNTHETIC,
                    holder,
                    &TypeSignature::string().descriptor(),
                );
                let index = pool.add_string(token);
                holder.attributes.push(Attribute::new(
                    pool,
                    NAME::CONSTANT_VALUE,
                    AttributeBody::ConstantValue(index),
                ));
                class.fields.push(holder);
            }
            FieldInit::Default | FieldInit::Store(_) => {}
        }
        class.fields.push(info);
    }
}

/// Emit the assignment of one field's initial value.
fn assign(asm: &mut CodeBuilder<'_>, owner: &ClassName, field: &FieldPlan) -> Result<()> {
    let is_static = field.is_static();
    match &field.init {
        FieldInit::Default | FieldInit::Constant(_) => return Ok(()),
        FieldInit::Store(value) => {
            asm.load_this()?.push_literal(value)?;
        }
        FieldInit::Callback { holder, .. } => {
            if !is_static {
                asm.load_this()?;
            }
            asm.get_static(owner, holder, &TypeSignature::string())?;
            if is_static {
                asm.push_null()?;
            } else {
                asm.load_this()?;
            }
            asm.invoke_static(&bridge(), "initialValue", &initial_value())?
                .unbox_value(&field.ty)?;
        }
    }
    if is_static {
        asm.put_static(owner, &field.name, &field.ty)?;
    } else {
        asm.put_field(owner, &field.name, &field.ty)?;
    }
    Ok(())
}

fn needs_code(field: &FieldPlan) -> bool {
    matches!(field.init, FieldInit::Store(_) | FieldInit::Callback { .. })
}

/// Build the padded initializer fragment for `fields`, or `None` if none needs code.
fn fragment(
    pool: &mut ConstantPool,
    owner: &ClassName,
    fields: &[&FieldPlan],
    locals: u16,
) -> Result<Option<(MethodBody, usize)>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let mut asm = CodeBuilder::new(pool, locals);
    for field in fields {
        assign(&mut asm, owner, field)?;
    }
    let mut body = asm.finish();
    let mut size = body.offsets()?.last().copied().unwrap_or(0);
    while size % 4 != 0 {
        body.code.push(Insn::Op(Instruction::simple(Opcode::Nop)));
        size += 1;
    }
    Ok(Some((body, size)))
}

/// Where a constructor body calls its super constructor.
enum ConstructorStart {
    /// Position right after the `super(...)` call
    Super(usize),
    /// The constructor delegates to `this(...)`
    Delegates,
}

/// Find the `super(...)` or `this(...)` call of a constructor.
///
/// An `invokespecial <init>` that does not complete an earlier `new` initializes the receiver;
/// it delegates when it names the class itself.
fn constructor_start(
    body: &MethodBody,
    pool: &ConstantPool,
    owner: &ClassName,
) -> Result<Option<ConstructorStart>> {
    let mut pending = 0usize;
    for (position, insn) in body.code.iter().enumerate() {
        let Insn::Op(op) = insn else { continue };
        match op.opcode {
            Opcode::New => pending += 1,
            Opcode::Invokespecial => {
                let Some(index) = op.constant_index() else { continue };
                let member = pool.member_ref(index)?;
                if member.name != "<init>" {
                    continue;
                }
                if pending > 0 {
                    pending -= 1;
                } else if member.owner == *owner {
                    return Ok(Some(ConstructorStart::Delegates));
                } else {
                    return Ok(Some(ConstructorStart::Super(position + 1)));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

fn stack_map(code: &CodeAttribute, pool: &ConstantPool) -> Option<(u16, Vec<u8>)> {
    code.attributes.iter().find_map(|a| match &a.body {
        AttributeBody::Raw(data)
            if pool.utf8(a.name).is_ok_and(|n| n == NAME::STACK_MAP_TABLE) =>
        {
            Some((a.name, data.clone()))
        }
        _ => None,
    })
}

/// Splice `fragment` into `code` before element `at` of its decoded body.
fn splice(
    pool: &mut ConstantPool,
    code: &CodeAttribute,
    mut body: MethodBody,
    at: usize,
    fragment: MethodBody,
    size: usize,
) -> Result<CodeAttribute> {
    let frames = stack_map(code, pool);
    let offset = if frames.is_some() {
        let offsets = body.offsets()?;
        if offsets.last().copied() != Some(code.code.len()) {
            return Err(NotSupported(
                "body with stack map frames does not re-encode to its original layout".into(),
            ));
        }
        offsets[at]
    } else {
        0
    };

    body.splice(at, fragment);
    let mut spliced = body.encode(pool)?;
    if let Some((name, data)) = frames {
        if spliced.code.len() != code.code.len() + size {
            return Err(NotSupported(
                "initializer splice changed the layout of branches".into(),
            ));
        }
        let shifted = shift_stack_map(&data, offset, size)?;
        spliced.attributes.push(Attribute {
            name,
            body: AttributeBody::Raw(shifted),
        });
    }
    Ok(spliced)
}

/// Splice instance field initializers into every non-delegating constructor.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for constructors without a recognizable super call
/// and for bodies whose stack map frames cannot be preserved.
pub(crate) fn initialize_instance(
    class: &mut ClassFile,
    owner: &ClassName,
    fields: &[FieldPlan],
) -> Result<()> {
    let pending: Vec<&FieldPlan> = fields
        .iter()
        .filter(|f| !f.is_static() && needs_code(f))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    for index in 0..class.methods.len() {
        let method = &class.methods[index];
        if method.name(&class.constant_pool)? != "<init>" {
            continue;
        }
        let Some(code) = method.code().cloned() else { continue };
        let body = MethodBody::decode(&code, &class.constant_pool)?;
        let at = match constructor_start(&body, &class.constant_pool, owner)? {
            Some(ConstructorStart::Super(at)) => at,
            Some(ConstructorStart::Delegates) => continue,
            None => {
                return Err(NotSupported(format!(
                    "constructor {} of {} has no super constructor call",
                    class.methods[index].descriptor(&class.constant_pool)?,
                    owner
                )))
            }
        };

        let pool = &mut class.constant_pool;
        let Some((fragment, size)) = fragment(pool, owner, &pending, body.max_locals)? else {
            return Ok(());
        };
        let spliced = splice(pool, &code, body, at, fragment, size)?;
        if let Some(slot) = class.methods[index].code_mut() {
            *slot = spliced;
        }
    }
    Ok(())
}

/// Run static field initializers at the start of `<clinit>`, creating it if needed.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for initializer bodies whose stack map frames cannot
/// be preserved.
pub(crate) fn initialize_static(
    class: &mut ClassFile,
    owner: &ClassName,
    fields: &[FieldPlan],
) -> Result<()> {
    let pending: Vec<&FieldPlan> = fields
        .iter()
        .filter(|f| f.is_static() && needs_code(f))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let void = no_args();
    match class.find_method("<clinit>", &void.descriptor()) {
        Some(index) => {
            let Some(code) = class.methods[index].code().cloned() else {
                return Err(malformed_error!("<clinit> of {} has no Code attribute", owner));
            };
            let body = MethodBody::decode(&code, &class.constant_pool)?;
            let pool = &mut class.constant_pool;
            let Some((fragment, size)) = fragment(pool, owner, &pending, body.max_locals)? else {
                return Ok(());
            };
            let spliced = splice(pool, &code, body, 0, fragment, size)?;
            if let Some(slot) = class.methods[index].code_mut() {
                *slot = spliced;
            }
        }
        None => {
            emit_method(
                class,
                AccessFlags::STATIC | AccessFlags::SYNTHETIC,
                "<clinit>",
                &void,
                |asm| {
                    for field in &pending {
                        assign(asm, owner, field)?;
                    }
                    asm.return_value(&TypeSignature::Void)?;
                    Ok(())
                },
            )?;
        }
    }
    Ok(())
}
