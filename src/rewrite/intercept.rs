//! Interception wrappers.
//!
//! The original method keeps its name, descriptor, annotations and signature but gets a new body
//! that hands the call to the bridge. Its old `Code` attribute moves, untouched, to a synthetic
//! package-private method the call thunk invokes when the chain reaches the original.

use crate::{
    bytecode::CodeBuilder,
    classfile::{
        attributes::AttributeBody,
        flags::AccessFlags,
        ClassFile, MemberInfo,
    },
    rewrite::{
        plan::InterceptPlan,
        symbols::{bridge, intercept},
        thunks::constructor,
    },
    signatures::{ClassName, TypeSignature},
    Result,
};

/// Visibility and shape bits the relocated body drops.
const RELOCATED_CLEARS: AccessFlags = AccessFlags::PUBLIC
    .union(AccessFlags::PROTECTED)
    .union(AccessFlags::PRIVATE)
    .union(AccessFlags::VARARGS)
    .union(AccessFlags::BRIDGE);

/// Replace the body of the intercepted method with a bridge call and relocate the original.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the method has no `Code` attribute and
/// [`crate::Error::NotSupported`] if the wrapper cannot be encoded.
pub(crate) fn weave(class: &mut ClassFile, owner: &ClassName, plan: &InterceptPlan) -> Result<()> {
    let index = usize::from(plan.site.index());
    let descriptor = plan.site.descriptor();
    let is_static = plan.site.is_static();

    let wrapper = class
        .methods
        .get(index)
        .ok_or_else(|| malformed_error!("Method index {} out of range", index))?;
    let code_at = wrapper
        .attributes
        .iter()
        .position(|a| matches!(a.body, AttributeBody::Code(_)))
        .ok_or_else(|| malformed_error!("{} has no Code attribute", plan.site))?;
    let access = wrapper.access;
    let original_code = wrapper.attributes[code_at].clone();

    let pool = &mut class.constant_pool;
    let mut relocated = MemberInfo::new(
        pool,
        access.difference(RELOCATED_CLEARS) | AccessFlags::SYNTHETIC,
        &plan.original,
        &descriptor.descriptor(),
    );
    relocated.attributes.push(original_code);

    let this_slot = u16::from(!is_static);
    let mut asm = CodeBuilder::new(pool, descriptor.param_slots() + this_slot);
    asm.push_string(&plan.token)?;
    if is_static {
        asm.push_null()?;
    } else {
        asm.load_this()?;
    }
    asm.pack_arguments(descriptor, this_slot)?
        .new_object(&plan.thunk)?
        .dup()?;
    if !is_static {
        asm.load_this()?;
    }
    asm.invoke_special(&plan.thunk, "<init>", &constructor(owner, is_static))?
        .invoke_static(&bridge(), "intercept", &intercept())?;
    if descriptor.ret.is_void() {
        asm.pop_value(&TypeSignature::object())?;
    } else {
        asm.unbox_value(&descriptor.ret)?;
    }
    asm.return_value(&descriptor.ret)?;
    let code = asm.finish().encode(pool)?;

    let wrapper = &mut class.methods[index];
    wrapper.access = access.difference(AccessFlags::SYNCHRONIZED);
    wrapper.attributes[code_at].body = AttributeBody::Code(code);
    class.methods.push(relocated);
    log::trace!(
        "intercepted {} through {} ({} injection(s))",
        plan.site,
        plan.thunk,
        plan.chain.len()
    );
    Ok(())
}

