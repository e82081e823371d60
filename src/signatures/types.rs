use std::fmt;

/// A class referenced by name, stored in internal (slash separated) form.
///
/// Construction normalizes every spelling the class file format and Java source use for the same
/// class: `java.lang.Object`, `java/lang/Object` and `Ljava/lang/Object;` all produce the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassName(String);

impl ClassName {
    /// Create a class name from a binary, internal or descriptor spelling.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let trimmed = match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
            Some(inner) => inner,
            None => name,
        };
        ClassName(trimmed.replace('.', "/"))
    }

    /// `java/lang/Object`
    #[must_use]
    pub fn object() -> Self {
        ClassName("java/lang/Object".to_string())
    }

    /// Internal name, `java/lang/String`.
    #[must_use]
    pub fn internal(&self) -> &str {
        &self.0
    }

    /// Binary name, `java.lang.String`.
    #[must_use]
    pub fn binary_name(&self) -> String {
        self.0.replace('/', ".")
    }

    /// Field descriptor, `Ljava/lang/String;`.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("L{};", self.0)
    }

    /// Name without the package, `String`. Nested classes keep their `$` suffix.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Package in internal form, `java/lang`. Empty for the unnamed package.
    #[must_use]
    pub fn package(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Returns true if both names live in the same runtime package.
    #[must_use]
    pub fn same_package(&self, other: &ClassName) -> bool {
        self.package() == other.package()
    }

    /// Derive a sibling name in the same package, `Owner$suffix`.
    #[must_use]
    pub fn nested(&self, suffix: &str) -> ClassName {
        ClassName(format!("{}${}", self.0, suffix))
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.binary_name())
    }
}

impl From<&str> for ClassName {
    fn from(value: &str) -> Self {
        ClassName::new(value)
    }
}

/// Canonical, backend-agnostic description of a type.
///
/// Equality and hashing are structural. The canonical encoding is the field descriptor returned
/// by [`TypeSignature::descriptor`]; two signatures are interchangeable exactly when their
/// descriptors match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeSignature {
    /// `V`, only valid as a return type
    Void,
    /// `Z`
    Boolean,
    /// `C`
    Char,
    /// `B`
    Byte,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `Lname;`
    Reference(ClassName),
    /// `[`-prefixed array of a non-array element type
    Array {
        /// Number of dimensions, at least one
        dimensions: u8,
        /// Element type, never itself an array
        element: Box<TypeSignature>,
    },
}

impl TypeSignature {
    /// Reference to the named class.
    #[must_use]
    pub fn class(name: &str) -> Self {
        TypeSignature::Reference(ClassName::new(name))
    }

    /// `java.lang.Object`
    #[must_use]
    pub fn object() -> Self {
        TypeSignature::Reference(ClassName::object())
    }

    /// `java.lang.String`
    #[must_use]
    pub fn string() -> Self {
        TypeSignature::class("java/lang/String")
    }

    /// Wrap this type into an array with `dimensions` additional dimensions.
    #[must_use]
    pub fn array_of(self, dimensions: u8) -> Self {
        match self {
            TypeSignature::Array {
                dimensions: inner,
                element,
            } => TypeSignature::Array {
                dimensions: inner.saturating_add(dimensions),
                element,
            },
            element => TypeSignature::Array {
                dimensions,
                element: Box::new(element),
            },
        }
    }

    /// Canonical field descriptor encoding.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            TypeSignature::Reference(name) => name.descriptor(),
            TypeSignature::Array {
                dimensions,
                element,
            } => {
                let mut out = "[".repeat(usize::from(*dimensions));
                out.push_str(&element.descriptor());
                out
            }
            primitive => primitive.primitive_code().unwrap_or('V').to_string(),
        }
    }

    /// Java source spelling, `int`, `java.lang.String[][]`.
    #[must_use]
    pub fn java_name(&self) -> String {
        match self {
            TypeSignature::Reference(name) => name.binary_name(),
            TypeSignature::Array {
                dimensions,
                element,
            } => {
                let mut out = element.java_name();
                out.push_str(&"[]".repeat(usize::from(*dimensions)));
                out
            }
            primitive => primitive.keyword().unwrap_or("void").to_string(),
        }
    }

    /// Operand of `checkcast`/`anewarray`: internal name for classes, descriptor for arrays.
    #[must_use]
    pub fn class_operand(&self) -> Option<String> {
        match self {
            TypeSignature::Reference(name) => Some(name.internal().to_string()),
            TypeSignature::Array { .. } => Some(self.descriptor()),
            _ => None,
        }
    }

    /// Descriptor letter of a primitive or `void`.
    #[must_use]
    pub fn primitive_code(&self) -> Option<char> {
        Some(match self {
            TypeSignature::Void => 'V',
            TypeSignature::Boolean => 'Z',
            TypeSignature::Char => 'C',
            TypeSignature::Byte => 'B',
            TypeSignature::Short => 'S',
            TypeSignature::Int => 'I',
            TypeSignature::Long => 'J',
            TypeSignature::Float => 'F',
            TypeSignature::Double => 'D',
            _ => return None,
        })
    }

    /// Source keyword of a primitive or `void`.
    #[must_use]
    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            TypeSignature::Void => "void",
            TypeSignature::Boolean => "boolean",
            TypeSignature::Char => "char",
            TypeSignature::Byte => "byte",
            TypeSignature::Short => "short",
            TypeSignature::Int => "int",
            TypeSignature::Long => "long",
            TypeSignature::Float => "float",
            TypeSignature::Double => "double",
            _ => return None,
        })
    }

    pub(crate) fn from_primitive_code(code: u8) -> Option<Self> {
        Some(match code {
            b'V' => TypeSignature::Void,
            b'Z' => TypeSignature::Boolean,
            b'C' => TypeSignature::Char,
            b'B' => TypeSignature::Byte,
            b'S' => TypeSignature::Short,
            b'I' => TypeSignature::Int,
            b'J' => TypeSignature::Long,
            b'F' => TypeSignature::Float,
            b'D' => TypeSignature::Double,
            _ => return None,
        })
    }

    pub(crate) fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "void" => TypeSignature::Void,
            "boolean" => TypeSignature::Boolean,
            "char" => TypeSignature::Char,
            "byte" => TypeSignature::Byte,
            "short" => TypeSignature::Short,
            "int" => TypeSignature::Int,
            "long" => TypeSignature::Long,
            "float" => TypeSignature::Float,
            "double" => TypeSignature::Double,
            _ => return None,
        })
    }

    /// Returns true for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// Returns true for the eight primitive kinds.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !self.is_void() && self.primitive_code().is_some()
    }

    /// Returns true for class references and arrays.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeSignature::Reference(_) | TypeSignature::Array { .. }
        )
    }

    /// Number of local variable / operand stack slots a value of this type occupies.
    #[must_use]
    pub fn slot_size(&self) -> u16 {
        match self {
            TypeSignature::Void => 0,
            TypeSignature::Long | TypeSignature::Double => 2,
            _ => 1,
        }
    }

    /// Wrapper class used when a primitive value travels as an `Object`.
    #[must_use]
    pub fn boxed_class(&self) -> Option<ClassName> {
        let name = match self {
            TypeSignature::Boolean => "java/lang/Boolean",
            TypeSignature::Char => "java/lang/Character",
            TypeSignature::Byte => "java/lang/Byte",
            TypeSignature::Short => "java/lang/Short",
            TypeSignature::Int => "java/lang/Integer",
            TypeSignature::Long => "java/lang/Long",
            TypeSignature::Float => "java/lang/Float",
            TypeSignature::Double => "java/lang/Double",
            _ => return None,
        };
        Some(ClassName::new(name))
    }

    /// Name of the wrapper method that unboxes a value of this primitive type.
    #[must_use]
    pub fn unbox_method(&self) -> Option<String> {
        self.keyword()
            .filter(|_| self.is_primitive())
            .map(|keyword| format!("{keyword}Value"))
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.java_name())
    }
}

/// Parameter and return types of a method, the `(params)ret` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<TypeSignature>,
    /// Return type, possibly [`TypeSignature::Void`]
    pub ret: TypeSignature,
}

impl MethodDescriptor {
    /// Create a descriptor from its parts.
    #[must_use]
    pub fn new(params: Vec<TypeSignature>, ret: TypeSignature) -> Self {
        MethodDescriptor { params, ret }
    }

    /// Canonical `(params)ret` encoding.
    #[must_use]
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.params {
            out.push_str(&param.descriptor());
        }
        out.push(')');
        out.push_str(&self.ret.descriptor());
        out
    }

    /// Local variable slots used by the parameters, excluding the receiver.
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(TypeSignature::slot_size).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// A generic-aware view of a declared type.
///
/// Built from `Signature` attributes when present and from plain descriptors otherwise. Shapes
/// whose bounds cannot be resolved (recursive type variables, wildcards nested inside wildcard
/// bounds, signatures that fail to parse) are represented by [`TypeInfo::Unknown`] instead of a
/// guessed type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    /// A non-generic type
    Plain(TypeSignature),
    /// A generic class applied to type arguments, `List<String>`
    Parameterized {
        /// The erased class
        raw: ClassName,
        /// Type arguments in declaration order
        arguments: Vec<TypeArgument>,
    },
    /// A reference to a declared type variable
    Variable {
        /// Variable name, `T`
        name: String,
        /// Resolved bounds; `[Unknown]` when the bound could not be resolved
        bounds: Vec<TypeInfo>,
    },
    /// An array whose component is generic
    Array {
        /// Number of dimensions
        dimensions: u8,
        /// Generic component type
        component: Box<TypeInfo>,
    },
    /// An unresolvable type or bound
    Unknown,
}

impl TypeInfo {
    /// Type after erasure of all generic information.
    ///
    /// Variables erase to their first bound, unknown types to `java.lang.Object`.
    #[must_use]
    pub fn erasure(&self) -> TypeSignature {
        match self {
            TypeInfo::Plain(signature) => signature.clone(),
            TypeInfo::Parameterized { raw, .. } => TypeSignature::Reference(raw.clone()),
            TypeInfo::Variable { bounds, .. } => bounds
                .first()
                .map_or_else(TypeSignature::object, TypeInfo::erasure),
            TypeInfo::Array {
                dimensions,
                component,
            } => component.erasure().array_of(*dimensions),
            TypeInfo::Unknown => TypeSignature::object(),
        }
    }

    /// Returns true if this type carries generic information.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !matches!(self, TypeInfo::Plain(_))
    }

    /// Returns true if this type, or any bound or argument inside it, is unknown.
    #[must_use]
    pub fn has_unknown(&self) -> bool {
        match self {
            TypeInfo::Unknown => true,
            TypeInfo::Plain(_) => false,
            TypeInfo::Parameterized { arguments, .. } => {
                arguments.iter().any(TypeArgument::has_unknown)
            }
            TypeInfo::Variable { bounds, .. } => bounds.iter().any(TypeInfo::has_unknown),
            TypeInfo::Array { component, .. } => component.has_unknown(),
        }
    }
}

impl From<TypeSignature> for TypeInfo {
    fn from(value: TypeSignature) -> Self {
        TypeInfo::Plain(value)
    }
}

/// One argument of a parameterized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeArgument {
    /// `?`
    Any,
    /// `? extends T`
    Extends(TypeInfo),
    /// `? super T`
    Super(TypeInfo),
    /// `T`
    Exact(TypeInfo),
}

impl TypeArgument {
    fn has_unknown(&self) -> bool {
        match self {
            TypeArgument::Any => false,
            TypeArgument::Extends(info) | TypeArgument::Super(info) | TypeArgument::Exact(info) => {
                info.has_unknown()
            }
        }
    }

    pub(crate) fn is_wildcard(&self) -> bool {
        !matches!(self, TypeArgument::Exact(_))
    }
}

/// A declared type parameter with its resolved bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParameter {
    /// Parameter name, `T`
    pub name: String,
    /// Class bound followed by interface bounds; `[Object]` when none were declared
    pub bounds: Vec<TypeInfo>,
}

/// Generic view of a class declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassSignature {
    /// Declared type parameters
    pub type_parameters: Vec<TypeParameter>,
    /// Superclass type
    pub superclass: TypeInfo,
    /// Implemented interfaces in declaration order
    pub interfaces: Vec<TypeInfo>,
}

/// Generic view of a method declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Declared method type parameters
    pub type_parameters: Vec<TypeParameter>,
    /// Parameter types in declaration order
    pub parameters: Vec<TypeInfo>,
    /// Return type
    pub return_type: TypeInfo,
    /// Declared thrown types
    pub throws: Vec<TypeInfo>,
}
