//! Rewrite plans: the validated, token-bearing form of one class's composition.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    classfile::{attributes::AttributeBody, constpool::LiteralValue, flags::AccessFlags},
    inject::{FieldDeclaration, InitialValue, Injection, MethodDeclaration},
    rewrite::symbols::{holder_name, original_name, HELPER_MARKER},
    runtime::{Callback, CallbackRegistry, InterceptChain},
    signatures::{ClassName, MethodDescriptor, TypeSignature},
    sites::{ClassSite, MethodSite, Site},
    visitor::Composition,
    Result,
};

static NEXT_HELPER: AtomicU64 = AtomicU64::new(1);

/// Class file version that introduced nest-based access control.
pub const NEST_VERSION: u16 = 55;

/// Switches that shape the generated images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Add `NestHost`/`NestMembers` so helpers may reach private members
    pub emit_nest_attributes: bool,
    /// Injector identity written into the woven stamp, if stamping
    pub stamp: Option<String>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        RewriteOptions {
            emit_nest_attributes: true,
            stamp: None,
        }
    }
}

/// What a synthetic helper class gives access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperKind {
    /// Invokes the relocated body of an intercepted method
    Call {
        /// Name the original body was moved to
        method: String,
        /// Descriptor of the intercepted method
        descriptor: MethodDescriptor,
        /// Whether the method is static
        is_static: bool,
    },
    /// Reads and writes one field
    Field {
        /// Field name
        field: String,
        /// Field type
        ty: TypeSignature,
        /// Whether the field is static
        is_static: bool,
        /// Whether the field rejects writes
        is_final: bool,
    },
    /// Invokes one method
    Method {
        /// Method name
        method: String,
        /// Method descriptor
        descriptor: MethodDescriptor,
        /// Whether the method is static
        is_static: bool,
    },
}

impl HelperKind {
    /// Returns true if the helper needs no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        match self {
            HelperKind::Call { is_static, .. }
            | HelperKind::Field { is_static, .. }
            | HelperKind::Method { is_static, .. } => *is_static,
        }
    }
}

/// A synthetic helper class the rewrite emits next to the primary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperDecl {
    /// Name of the helper class, nested in the owner
    pub name: ClassName,
    /// What the helper binds
    pub kind: HelperKind,
}

/// How an added field receives its first value.
#[derive(Clone)]
pub enum FieldInit {
    /// Left at the type default
    Default,
    /// A `ConstantValue` attribute on a static field
    Constant(LiteralValue),
    /// A literal stored by every non-delegating constructor
    Store(LiteralValue),
    /// A registered initializer, reached through a token holder field
    Callback {
        /// Registry token of the initializer
        token: String,
        /// Name of the static field holding the token
        holder: String,
    },
}

impl fmt::Debug for FieldInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldInit::Default => f.write_str("Default"),
            FieldInit::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            FieldInit::Store(value) => f.debug_tuple("Store").field(value).finish(),
            FieldInit::Callback { token, holder } => f
                .debug_struct("Callback")
                .field("token", token)
                .field("holder", holder)
                .finish(),
        }
    }
}

/// One field to declare.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    /// Modifiers
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeSignature,
    /// Initialization strategy
    pub init: FieldInit,
}

impl FieldPlan {
    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }
}

/// One method to declare, delegating to a registered body.
#[derive(Debug, Clone)]
pub struct AddedMethodPlan {
    /// Modifiers
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Parameter and return types
    pub descriptor: MethodDescriptor,
    /// Declared thrown classes
    pub throws: Vec<ClassName>,
    /// Registry token of the body
    pub token: String,
    /// Field accessor helpers keyed by field name
    pub fields: Vec<(String, ClassName)>,
    /// Method accessor helpers keyed by method name
    pub methods: Vec<(String, ClassName)>,
}

impl AddedMethodPlan {
    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }
}

/// One intercepted method.
#[derive(Debug, Clone)]
pub struct InterceptPlan {
    /// The method whose calls are intercepted
    pub site: MethodSite,
    /// The chain the wrapper runs
    pub chain: Arc<InterceptChain>,
    /// Registry token of the chain
    pub token: String,
    /// Name the original body moves to
    pub original: String,
    /// Helper invoking the original body
    pub thunk: ClassName,
}

/// Everything code generation needs for one class.
///
/// Building a plan validates every injection against the class and registers every callback the
/// generated code will reach, so generation itself only lays out bytecode.
#[derive(Debug, Clone)]
pub struct RewritePlan {
    class: ClassSite,
    fields: Vec<FieldPlan>,
    methods: Vec<AddedMethodPlan>,
    intercepts: Vec<InterceptPlan>,
    helpers: Vec<HelperDecl>,
    options: RewriteOptions,
    injections: usize,
}

impl RewritePlan {
    /// A plan that changes nothing.
    #[must_use]
    pub fn empty(class: &ClassSite, options: RewriteOptions) -> Self {
        RewritePlan {
            class: class.clone(),
            fields: Vec::new(),
            methods: Vec::new(),
            intercepts: Vec::new(),
            helpers: Vec::new(),
            options,
            injections: 0,
        }
    }

    /// Validate `composition` and register its callbacks in `registry`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleConfiguration`] for injections this engine cannot
    /// realize on the class: interception of constructors, initializers, abstract or native
    /// methods, additions to interfaces other than static constants, name collisions, accessor
    /// references to unknown members and private accessors without nest support.
    pub fn build(
        composition: &Composition,
        registry: &CallbackRegistry,
        options: RewriteOptions,
    ) -> Result<Self> {
        let mut builder = PlanBuilder {
            class: &composition.class,
            registry,
            nestmates: nest_capable(&composition.class, &options),
            fields: Vec::new(),
            methods: Vec::new(),
            helpers: Vec::new(),
            field_helpers: HashMap::new(),
            method_helpers: HashMap::new(),
            names: HashSet::new(),
        };

        let mut added = Vec::new();
        for injection in composition.additions.iter() {
            match injection {
                Injection::AddField(declaration) => builder.add_field(declaration)?,
                Injection::AddMethod(declaration) => added.push(declaration),
                Injection::None(_) => {}
                other => {
                    return Err(incompatible_error!(
                        "{} cannot apply to class {}",
                        other.kind(),
                        composition.class
                    ))
                }
            }
        }
        for declaration in added {
            builder.add_method(declaration)?;
        }

        let mut intercepts = Vec::new();
        for (site, injections) in &composition.methods {
            if let Some(intercept) = builder.intercept(site, injections)? {
                intercepts.push(intercept);
            }
        }
        for (site, injections) in &composition.fields {
            if let Some(injection) = injections.iter().find(|i| !i.is_none()) {
                return Err(incompatible_error!(
                    "{} cannot apply to field {}",
                    injection.kind(),
                    site
                ));
            }
        }

        Ok(RewritePlan {
            class: composition.class.clone(),
            fields: builder.fields,
            methods: builder.methods,
            intercepts,
            helpers: builder.helpers,
            options,
            injections: composition.len(),
        })
    }

    /// The class the plan rewrites.
    #[must_use]
    pub fn class(&self) -> &ClassSite {
        &self.class
    }

    /// Fields to declare, in injection order.
    #[must_use]
    pub fn fields(&self) -> &[FieldPlan] {
        &self.fields
    }

    /// Methods to declare, in injection order.
    #[must_use]
    pub fn added_methods(&self) -> &[AddedMethodPlan] {
        &self.methods
    }

    /// Intercepted methods, in declaration order.
    #[must_use]
    pub fn intercepts(&self) -> &[InterceptPlan] {
        &self.intercepts
    }

    /// Helper classes to synthesize.
    #[must_use]
    pub fn helpers(&self) -> &[HelperDecl] {
        &self.helpers
    }

    /// Generation switches.
    #[must_use]
    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Number of injections the plan was built from.
    #[must_use]
    pub fn injection_count(&self) -> usize {
        self.injections
    }

    /// Returns true if the plan leaves the class unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.methods.is_empty() && self.intercepts.is_empty()
    }
}

fn nest_capable(class: &ClassSite, options: &RewriteOptions) -> bool {
    options.emit_nest_attributes
        && class.major_version() >= NEST_VERSION
        && !class
            .class_file()
            .attributes
            .iter()
            .any(|a| matches!(a.body, AttributeBody::NestHost(_)))
}

fn helper_name(owner: &ClassName, prefix: &str) -> ClassName {
    let number = NEXT_HELPER.fetch_add(1, Ordering::Relaxed);
    owner.nested(&format!("{HELPER_MARKER}{prefix}{number}"))
}

fn literal_fits(value: &LiteralValue, ty: &TypeSignature) -> bool {
    match value {
        LiteralValue::Int(_) => matches!(
            ty,
            TypeSignature::Boolean
                | TypeSignature::Byte
                | TypeSignature::Char
                | TypeSignature::Short
                | TypeSignature::Int
        ),
        LiteralValue::Long(_) => *ty == TypeSignature::Long,
        LiteralValue::Float(_) => *ty == TypeSignature::Float,
        LiteralValue::Double(_) => *ty == TypeSignature::Double,
        LiteralValue::String(_) => *ty == TypeSignature::string(),
    }
}

struct PlanBuilder<'a> {
    class: &'a ClassSite,
    registry: &'a CallbackRegistry,
    nestmates: bool,
    fields: Vec<FieldPlan>,
    methods: Vec<AddedMethodPlan>,
    helpers: Vec<HelperDecl>,
    field_helpers: HashMap<String, ClassName>,
    method_helpers: HashMap<(String, String), ClassName>,
    names: HashSet<String>,
}

impl PlanBuilder<'_> {
    fn owner(&self) -> &ClassName {
        self.class.class_name()
    }

    fn field_taken(&self, name: &str) -> bool {
        self.class.field(name).is_some() || self.fields.iter().any(|f| f.name == name)
    }

    fn method_taken(&self, name: &str, descriptor: &str) -> bool {
        self.class.method(name, descriptor).is_some()
            || self
                .methods
                .iter()
                .any(|m| m.name == name && m.descriptor.descriptor() == descriptor)
            || self.names.contains(&format!("{name}{descriptor}"))
    }

    fn add_field(&mut self, declaration: &FieldDeclaration) -> Result<()> {
        let name = &declaration.name;
        if declaration.ty.is_void() {
            return Err(incompatible_error!("Field {} cannot have type void", name));
        }
        if self.field_taken(name) {
            return Err(incompatible_error!(
                "Field {} already exists in {}",
                name,
                self.owner()
            ));
        }
        let access = declaration.access;
        if self.class.is_interface()
            && (!is_constant_access(access)
                || matches!(declaration.initial, InitialValue::Computed(_)))
        {
            return Err(incompatible_error!(
                "Interface {} only accepts public static final fields without computed initializers, not {}",
                self.owner(),
                name
            ));
        }

        let init = match &declaration.initial {
            InitialValue::None => FieldInit::Default,
            InitialValue::Constant(value) => {
                if !literal_fits(value, &declaration.ty) {
                    return Err(incompatible_error!(
                        "Constant {:?} does not fit field {} of type {}",
                        value,
                        name,
                        declaration.ty
                    ));
                }
                if access.is_static() {
                    FieldInit::Constant(value.clone())
                } else {
                    FieldInit::Store(value.clone())
                }
            }
            InitialValue::Computed(initializer) => {
                let holder = holder_name(name);
                if self.field_taken(&holder) {
                    return Err(incompatible_error!(
                        "Field {} already exists in {}",
                        holder,
                        self.owner()
                    ));
                }
                let token = self.registry.register(Callback::Initial(initializer.clone()));
                FieldInit::Callback { token, holder }
            }
        };

        self.fields.push(FieldPlan {
            access,
            name: name.clone(),
            ty: declaration.ty.clone(),
            init,
        });
        Ok(())
    }

    fn add_method(&mut self, declaration: &MethodDeclaration) -> Result<()> {
        let name = &declaration.name;
        let descriptor = declaration.descriptor.descriptor();
        if name.starts_with('<') {
            return Err(incompatible_error!("Cannot add special method {}", name));
        }
        if self.class.is_interface() {
            return Err(incompatible_error!(
                "Cannot add method {} to interface {}",
                name,
                self.owner()
            ));
        }
        if declaration
            .access
            .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
        {
            return Err(incompatible_error!(
                "Added method {} must have a body",
                name
            ));
        }
        if self.method_taken(name, &descriptor) {
            return Err(incompatible_error!(
                "Method {}{} already exists in {}",
                name,
                descriptor,
                self.owner()
            ));
        }
        let is_static = declaration.access.is_static();

        let mut fields = Vec::with_capacity(declaration.fields.len());
        for field in &declaration.fields {
            let (access, ty) = self.resolve_field(field)?;
            self.check_reachable(access, field, is_static, name)?;
            let helper = self.field_helper(field, access, ty);
            fields.push((field.clone(), helper));
        }

        let mut methods = Vec::with_capacity(declaration.methods.len());
        for reference in &declaration.methods {
            let access = self.resolve_method(&reference.name, &reference.descriptor)?;
            self.check_reachable(access, &reference.name, is_static, name)?;
            let helper = self.method_helper(&reference.name, &reference.descriptor, access);
            methods.push((reference.name.clone(), helper));
        }

        let token = self
            .registry
            .register(Callback::Added(declaration.body.clone()));
        self.methods.push(AddedMethodPlan {
            access: declaration.access | AccessFlags::SYNTHETIC,
            name: name.clone(),
            descriptor: declaration.descriptor.clone(),
            throws: declaration.throws.clone(),
            token,
            fields,
            methods,
        });
        Ok(())
    }

    fn resolve_field(&self, name: &str) -> Result<(AccessFlags, TypeSignature)> {
        if let Some(site) = self.class.field(name) {
            return Ok((site.access(), site.descriptor().clone()));
        }
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.access, f.ty.clone()))
            .ok_or_else(|| {
                incompatible_error!("Accessor names unknown field {} of {}", name, self.owner())
            })
    }

    fn resolve_method(&self, name: &str, descriptor: &MethodDescriptor) -> Result<AccessFlags> {
        let text = descriptor.descriptor();
        if name.starts_with('<') {
            return Err(incompatible_error!("Accessor cannot bind special method {}", name));
        }
        if let Some(site) = self.class.method(name, &text) {
            return Ok(site.access());
        }
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == *descriptor)
            .map(|m| m.access)
            .ok_or_else(|| {
                incompatible_error!(
                    "Accessor names unknown method {}{} of {}",
                    name,
                    text,
                    self.owner()
                )
            })
    }

    fn check_reachable(
        &self,
        access: AccessFlags,
        name: &str,
        from_static: bool,
        method: &str,
    ) -> Result<()> {
        if from_static && !access.is_static() {
            return Err(incompatible_error!(
                "Static method {} cannot access instance member {}",
                method,
                name
            ));
        }
        if access.contains(AccessFlags::PRIVATE) && !self.nestmates {
            return Err(incompatible_error!(
                "Private member {} of {} needs nest attributes (class version {}, required {})",
                name,
                self.owner(),
                self.class.major_version(),
                NEST_VERSION
            ));
        }
        Ok(())
    }

    fn field_helper(&mut self, name: &str, access: AccessFlags, ty: TypeSignature) -> ClassName {
        if let Some(existing) = self.field_helpers.get(name) {
            return existing.clone();
        }
        let helper = helper_name(self.owner(), "F");
        self.helpers.push(HelperDecl {
            name: helper.clone(),
            kind: HelperKind::Field {
                field: name.to_string(),
                ty,
                is_static: access.is_static(),
                is_final: access.contains(AccessFlags::FINAL),
            },
        });
        self.field_helpers.insert(name.to_string(), helper.clone());
        helper
    }

    fn method_helper(
        &mut self,
        name: &str,
        descriptor: &MethodDescriptor,
        access: AccessFlags,
    ) -> ClassName {
        let key = (name.to_string(), descriptor.descriptor());
        if let Some(existing) = self.method_helpers.get(&key) {
            return existing.clone();
        }
        let helper = helper_name(self.owner(), "M");
        self.helpers.push(HelperDecl {
            name: helper.clone(),
            kind: HelperKind::Method {
                method: name.to_string(),
                descriptor: descriptor.clone(),
                is_static: access.is_static(),
            },
        });
        self.method_helpers.insert(key, helper.clone());
        helper
    }

    fn intercept(
        &mut self,
        site: &MethodSite,
        injections: &[Injection],
    ) -> Result<Option<InterceptPlan>> {
        if injections.iter().all(Injection::is_none) {
            return Ok(None);
        }
        if site.is_constructor() || site.is_static_initializer() {
            return Err(incompatible_error!("Cannot intercept initializer {}", site));
        }
        if self.class.is_interface() {
            return Err(incompatible_error!(
                "Cannot intercept {} declared in interface {}",
                site,
                self.owner()
            ));
        }
        if site.access().intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
            || !site.has_code()
        {
            return Err(incompatible_error!(
                "Cannot intercept {} without bytecode",
                site
            ));
        }

        let chain = InterceptChain::new(site.clone(), injections)?;
        let descriptor = site.descriptor().descriptor();
        let base = original_name(site.name());
        let mut original = base.clone();
        let mut suffix = 1;
        while self.method_taken(&original, &descriptor) {
            original = format!("{base}{suffix}");
            suffix += 1;
        }
        self.names.insert(format!("{original}{descriptor}"));

        let thunk = helper_name(self.owner(), "Call");
        self.helpers.push(HelperDecl {
            name: thunk.clone(),
            kind: HelperKind::Call {
                method: original.clone(),
                descriptor: site.descriptor().clone(),
                is_static: site.is_static(),
            },
        });

        let chain = Arc::new(chain);
        let token = self.registry.register(Callback::Intercept(chain.clone()));
        Ok(Some(InterceptPlan {
            site: site.clone(),
            chain,
            token,
            original,
            thunk,
        }))
    }
}

fn is_constant_access(access: AccessFlags) -> bool {
    access.contains(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inject::InjectionKinds,
        runtime::Value,
        test::{modern_sample_bytes, sample_class_bytes},
        visitor::{Composer, FnVisitor, PlanCache, VisitorSet},
    };

    fn compose(bytes: &[u8], visitor: FnVisitor) -> Result<Composition> {
        let class = ClassSite::from_bytes(bytes)?;
        let visitor: Arc<dyn crate::visitor::InjectionVisitor> = Arc::new(visitor);
        let visitors: VisitorSet = std::iter::once(visitor).collect();
        let cache = PlanCache::new();
        Composer::new(&visitors, InjectionKinds::all(), &cache).compose_all(&class)
    }

    fn getter(field: &str) -> Injection {
        Injection::add_method(
            MethodDeclaration::new(
                AccessFlags::PUBLIC,
                "peek",
                MethodDescriptor::new(Vec::new(), TypeSignature::object()),
                |_, _, accessors| Ok(accessors.field("count").map_or(Value::Null, |_| Value::Int(1))),
            )
            .field(field),
        )
    }

    #[test]
    fn intercept_allocates_thunk_and_original_name() -> Result<()> {
        let composition = compose(
            &sample_class_bytes(),
            FnVisitor::new("hook").on_method(|site| {
                (site.name() == "compute").then(|| Injection::post_hook(|_, _, v, _| Ok(v)))
            }),
        )?;
        let registry = CallbackRegistry::new();
        let plan = RewritePlan::build(&composition, &registry, RewriteOptions::default())?;

        assert_eq!(plan.intercepts().len(), 1);
        let intercept = &plan.intercepts()[0];
        assert_eq!(intercept.original, "compute$cw$original");
        assert!(registry.contains(&intercept.token));
        assert_eq!(plan.helpers().len(), 1);
        assert!(plan.helpers()[0]
            .name
            .internal()
            .starts_with("demo/Sample$cw$Call"));
        assert_eq!(plan.injection_count(), 1);
        Ok(())
    }

    #[test]
    fn constructors_cannot_be_intercepted() -> Result<()> {
        let composition = compose(
            &sample_class_bytes(),
            FnVisitor::new("ctor").on_method(|site| {
                site.is_constructor()
                    .then(|| Injection::pre_hook(|_, args, _| Ok(args)))
            }),
        )?;
        let result = RewritePlan::build(
            &composition,
            &CallbackRegistry::new(),
            RewriteOptions::default(),
        );
        assert!(matches!(result, Err(crate::Error::IncompatibleConfiguration(_))));
        Ok(())
    }

    #[test]
    fn field_initialization_strategies() -> Result<()> {
        let composition = compose(
            &sample_class_bytes(),
            FnVisitor::new("fields").on_class(|_| {
                Some(Injection::add_field(
                    FieldDeclaration::new(AccessFlags::PRIVATE, "seed", TypeSignature::Long)
                        .with_initializer(|_| Ok(Value::Long(7))),
                ))
            }),
        )?;
        let registry = CallbackRegistry::new();
        let plan = RewritePlan::build(&composition, &registry, RewriteOptions::default())?;
        match &plan.fields()[0].init {
            FieldInit::Callback { token, holder } => {
                assert_eq!(holder, "$cw$init$seed");
                assert!(matches!(registry.resolve(token)?, Callback::Initial(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn mismatched_literal_and_duplicate_field() -> Result<()> {
        let composition = compose(
            &sample_class_bytes(),
            FnVisitor::new("bad").on_class(|_| {
                Some(Injection::add_field(
                    FieldDeclaration::new(AccessFlags::STATIC, "ratio", TypeSignature::Double)
                        .with_constant(LiteralValue::Int(1)),
                ))
            }),
        )?;
        let registry = CallbackRegistry::new();
        assert!(RewritePlan::build(&composition, &registry, RewriteOptions::default()).is_err());

        let composition = compose(
            &sample_class_bytes(),
            FnVisitor::new("dup").on_class(|_| {
                Some(Injection::add_field(FieldDeclaration::new(
                    AccessFlags::PRIVATE,
                    "count",
                    TypeSignature::Int,
                )))
            }),
        )?;
        assert!(RewritePlan::build(&composition, &registry, RewriteOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn private_accessors_need_nest_support() -> Result<()> {
        // `count` is private in the sample class
        let legacy = compose(
            &sample_class_bytes(),
            FnVisitor::new("peek").on_class(|_| Some(getter("count"))),
        )?;
        let registry = CallbackRegistry::new();
        let result = RewritePlan::build(&legacy, &registry, RewriteOptions::default());
        assert!(matches!(result, Err(crate::Error::IncompatibleConfiguration(_))));

        let modern = compose(
            &modern_sample_bytes(),
            FnVisitor::new("peek").on_class(|_| Some(getter("count"))),
        )?;
        let plan = RewritePlan::build(&modern, &registry, RewriteOptions::default())?;
        assert_eq!(plan.added_methods()[0].fields.len(), 1);
        assert!(matches!(plan.helpers()[0].kind, HelperKind::Field { is_static: false, .. }));

        let options = RewriteOptions {
            emit_nest_attributes: false,
            stamp: None,
        };
        assert!(RewritePlan::build(&modern, &registry, options).is_err());
        Ok(())
    }
}
