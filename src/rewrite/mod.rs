//! Bytecode generation for one class.
//!
//! A [`RewritePlan`] is the checked form of a class's composition: every injection has been
//! validated against the class, every callback has a registry token, and every synthetic name
//! (relocated originals, token holders, helper classes) has been chosen. [`rewrite`] turns the
//! plan into bytes without consulting visitors or the registry again.
//!
//! # Generated shapes
//!
//! | Injection                | Generated code                                                  |
//! |--------------------------|-----------------------------------------------------------------|
//! | hooks, `ReplaceBody`     | wrapper calling `Bridge.intercept`, original moved aside        |
//! | `AddField` constant      | field with `ConstantValue`                                      |
//! | `AddField` literal       | `putfield` spliced after each `super(...)` call                 |
//! | `AddField` computed      | token holder plus `Bridge.initialValue` in ctors or `<clinit>`  |
//! | `AddMethod`              | method calling `Bridge.invokeAdded` with accessor maps          |
//!
//! Helper classes (call thunks and accessors) are emitted next to the primary image and share
//! its class file version. Private members are reachable from helpers only through nest
//! attributes, which are written for class files of version 55 and later.

mod fields;
mod frames;
mod intercept;
mod methods;
mod plan;
mod symbols;
mod thunks;

pub use frames::shift_stack_map;
pub use plan::{
    AddedMethodPlan, FieldInit, FieldPlan, HelperDecl, HelperKind, InterceptPlan, RewriteOptions,
    RewritePlan, NEST_VERSION,
};
pub use symbols::{
    holder_name, original_name, BRIDGE, FIELD_ACCESSOR, HELPER_MARKER, HOLDER_PREFIX,
    METHOD_ACCESSOR, ORIGINAL_SUFFIX,
};
pub use thunks::helper_class;

use crate::{
    classfile::{
        attributes::{AttributeBody, WovenStamp, NAME},
        ClassFile,
    },
    signatures::ClassName,
    sites::ClassSite,
    Result,
};

/// Images produced for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    /// The rewritten class
    pub primary: Vec<u8>,
    /// Helper classes, in plan order
    pub helpers: Vec<(ClassName, Vec<u8>)>,
}

/// Generate the images for `plan`, applied to `class`.
///
/// # Errors
/// Returns [`crate::Error::IncompatibleConfiguration`] if the plan was built for another
/// artifact, and [`crate::Error::NotSupported`] for method bodies the codec cannot re-encode
/// after splicing.
pub fn rewrite(class: &ClassSite, plan: &RewritePlan) -> Result<RewriteOutput> {
    if class.artifact() != plan.class().artifact() {
        return Err(incompatible_error!(
            "plan for {} applied to a different image of {}",
            plan.class().class_name(),
            class.class_name()
        ));
    }

    let owner = class.class_name();
    let mut file = class.class_file().clone();

    // Intercepts first: they address methods by their original index.
    for intercept in plan.intercepts() {
        intercept::weave(&mut file, owner, intercept)?;
    }
    fields::declare(&mut file, plan.fields());
    fields::initialize_instance(&mut file, owner, plan.fields())?;
    fields::initialize_static(&mut file, owner, plan.fields())?;
    for method in plan.added_methods() {
        methods::add(&mut file, owner, method, plan.helpers())?;
    }

    let nest = nest_helpers(&mut file, plan);
    if let Some(injector) = &plan.options().stamp {
        let injector = file.constant_pool.add_utf8(injector);
        file.set_attribute(
            NAME::WOVEN,
            AttributeBody::Woven(WovenStamp {
                injector,
                modified: !plan.is_empty(),
            }),
        );
    }

    let primary = file.to_bytes()?;
    let mut helpers = Vec::with_capacity(plan.helpers().len());
    for decl in plan.helpers() {
        let helper = helper_class(owner, decl, file.major_version, nest)?;
        helpers.push((decl.name.clone(), helper.to_bytes()?));
    }

    log::debug!(
        "rewrote {}: {} intercept(s), {} field(s), {} method(s), {} helper(s)",
        owner,
        plan.intercepts().len(),
        plan.fields().len(),
        plan.added_methods().len(),
        helpers.len()
    );
    Ok(RewriteOutput { primary, helpers })
}

/// Register the plan's helpers as nest members of the class, if nest attributes apply.
fn nest_helpers(file: &mut ClassFile, plan: &RewritePlan) -> bool {
    let applies = plan.options().emit_nest_attributes
        && file.major_version >= NEST_VERSION
        && !plan.helpers().is_empty()
        && !file
            .attributes
            .iter()
            .any(|a| matches!(a.body, AttributeBody::NestHost(_)));
    if !applies {
        return false;
    }

    let members: Vec<u16> = plan
        .helpers()
        .iter()
        .map(|decl| file.constant_pool.add_class(decl.name.internal()))
        .collect();
    let existing = file.attributes.iter_mut().find_map(|a| match &mut a.body {
        AttributeBody::NestMembers(list) => Some(list),
        _ => None,
    });
    match existing {
        Some(list) => list.extend(members),
        None => file.add_attribute(NAME::NEST_MEMBERS, AttributeBody::NestMembers(members)),
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bytecode::{MethodBody, Opcode},
        classfile::{constpool::LiteralValue, flags::AccessFlags},
        inject::{FieldDeclaration, InjectionKinds, Injection, MethodDeclaration},
        runtime::{CallbackRegistry, Value},
        signatures::{MethodDescriptor, TypeSignature},
        sites::{Site, Woven},
        test::{modern_sample_bytes, sample_class_bytes},
        visitor::{Composer, FnVisitor, InjectionVisitor, PlanCache, VisitorSet},
    };

    fn plan_for(
        class: &ClassSite,
        visitor: FnVisitor,
        registry: &CallbackRegistry,
        options: RewriteOptions,
    ) -> Result<RewritePlan> {
        let visitor: Arc<dyn InjectionVisitor> = Arc::new(visitor);
        let visitors: VisitorSet = std::iter::once(visitor).collect();
        let cache = PlanCache::new();
        let composition = Composer::new(&visitors, InjectionKinds::all(), &cache).compose_all(class)?;
        RewritePlan::build(&composition, registry, options)
    }

    fn opcodes(class: &ClassFile, name: &str, descriptor: &str) -> Vec<Opcode> {
        let index = class.find_method(name, descriptor).unwrap();
        let code = class.methods[index].code().unwrap();
        MethodBody::decode(code, &class.constant_pool)
            .unwrap()
            .instructions()
            .map(|i| i.opcode)
            .collect()
    }

    #[test]
    fn intercept_wraps_and_relocates() -> Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        let registry = CallbackRegistry::new();
        let plan = plan_for(
            &class,
            FnVisitor::new("hook").on_method(|site| {
                (site.name() == "compute").then(|| Injection::post_hook(|_, _, v, _| Ok(v)))
            }),
            &registry,
            RewriteOptions::default(),
        )?;
        let output = rewrite(&class, &plan)?;
        let woven = ClassFile::from_mem(output.primary)?;

        let wrapper = opcodes(&woven, "compute", "(I)I");
        assert_eq!(wrapper.first(), Some(&Opcode::Ldc));
        assert!(wrapper.contains(&Opcode::Invokestatic));
        assert_eq!(wrapper.last(), Some(&Opcode::Ireturn));

        let relocated = woven.find_method("compute$cw$original", "(I)I").unwrap();
        let original = class.class_file().find_method("compute", "(I)I").unwrap();
        assert_eq!(
            woven.methods[relocated].code().map(|c| &c.code),
            class.class_file().methods[original].code().map(|c| &c.code)
        );
        assert!(woven.methods[relocated].access.contains(AccessFlags::SYNTHETIC));
        assert!(!woven.methods[relocated].access.contains(AccessFlags::PUBLIC));

        assert_eq!(output.helpers.len(), 1);
        let (name, bytes) = &output.helpers[0];
        let helper = ClassFile::from_mem(bytes.clone())?;
        assert_eq!(&helper.name()?, name);
        assert!(helper
            .find_method("<init>", "(Ldemo/Sample;)V")
            .is_some());
        Ok(())
    }

    #[test]
    fn empty_plan_keeps_the_class() -> Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        let plan = RewritePlan::empty(
            &class,
            RewriteOptions {
                emit_nest_attributes: true,
                stamp: None,
            },
        );
        let output = rewrite(&class, &plan)?;
        assert!(output.helpers.is_empty());
        assert_eq!(&ClassFile::from_mem(output.primary)?, class.class_file());
        Ok(())
    }

    #[test]
    fn stamp_records_the_injector() -> Result<()> {
        let class = ClassSite::from_bytes(&sample_class_bytes())?;
        let registry = CallbackRegistry::new();
        let plan = plan_for(
            &class,
            FnVisitor::new("limit").on_class(|_| {
                Some(Injection::add_field(
                    FieldDeclaration::new(
                        AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                        "MAX",
                        TypeSignature::Int,
                    )
                    .with_constant(LiteralValue::Int(99)),
                ))
            }),
            &registry,
            RewriteOptions {
                emit_nest_attributes: true,
                stamp: Some("tests".into()),
            },
        )?;
        let output = rewrite(&class, &plan)?;
        let woven = ClassSite::from_bytes(&output.primary)?;
        assert_eq!(
            woven.woven(),
            Some(Woven {
                injector: "tests".into(),
                modified: true,
            })
        );
        assert!(woven.field("MAX").is_some());
        assert!(woven.class_file().find_method("<clinit>", "()V").is_none());
        Ok(())
    }

    #[test]
    fn helpers_join_the_nest() -> Result<()> {
        let class = ClassSite::from_bytes(&modern_sample_bytes())?;
        let registry = CallbackRegistry::new();
        let plan = plan_for(
            &class,
            FnVisitor::new("peek").on_class(|_| {
                Some(Injection::add_method(
                    MethodDeclaration::new(
                        AccessFlags::PUBLIC,
                        "peek",
                        MethodDescriptor::new(Vec::new(), TypeSignature::object()),
                        |_, _, accessors| {
                            Ok(accessors.field("count").map_or(Value::Null, |_| Value::Int(1)))
                        },
                    )
                    .field("count"),
                ))
            }),
            &registry,
            RewriteOptions::default(),
        )?;
        let output = rewrite(&class, &plan)?;
        let woven = ClassFile::from_mem(output.primary)?;

        let members = woven
            .attributes
            .iter()
            .find_map(|a| match &a.body {
                AttributeBody::NestMembers(list) => Some(list.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(
            woven.constant_pool.class_name(members[0])?,
            output.helpers[0].0
        );

        let helper = ClassFile::from_mem(output.helpers[0].1.clone())?;
        assert!(helper
            .attributes
            .iter()
            .any(|a| matches!(a.body, AttributeBody::NestHost(_))));
        assert!(woven.find_method("peek", "()Ljava/lang/Object;").is_some());
        Ok(())
    }

    #[test]
    fn plan_for_another_image_is_rejected() -> Result<()> {
        let legacy = ClassSite::from_bytes(&sample_class_bytes())?;
        let modern = ClassSite::from_bytes(&modern_sample_bytes())?;
        let plan = RewritePlan::empty(&legacy, RewriteOptions::default());
        assert!(matches!(
            rewrite(&modern, &plan),
            Err(crate::Error::IncompatibleConfiguration(_))
        ));
        Ok(())
    }
}
