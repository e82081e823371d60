//! Per-artifact storage behind every site handle.
//!
//! A [`SiteArena`] owns the decoded class and everything derived from it. Names and descriptors
//! are extracted when the arena is built, since a class whose descriptors do not parse is
//! malformed. Everything else (generic signatures, member details, annotations, parameter names)
//! is extracted on first access and memoized in a `OnceLock`, so repeated accesses return the
//! same data at the same address.
//!
//! Handles ([`crate::sites::ClassSite`], [`crate::sites::FieldSite`],
//! [`crate::sites::MethodSite`]) share the arena through an `Arc` and address members by index.
//! The arena never holds a handle, so there is no ownership cycle: dropping the last handle drops
//! the arena.

use std::{fmt, sync::OnceLock};

use sha1::{Digest, Sha1};

use crate::{
    classfile::{
        attributes::{AttributeBody, CodeAttribute, DecodeOptions},
        constpool::{ConstantPool, LiteralValue},
        flags::AccessFlags,
        ClassFile, MemberInfo,
    },
    signatures::{
        parse_class_signature, parse_field_descriptor, parse_field_signature,
        parse_method_descriptor, parse_method_signature, ClassName, MethodDescriptor,
        TypeInfo, TypeParameter, TypeSignature,
    },
    sites::annotation::{parameter_annotations, AnnotationSite},
    Error, Result,
};

/// Identity of one binary class artifact: the SHA-1 of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId([u8; 20]);

impl ArtifactId {
    /// Identity of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        ArtifactId(hasher.finalize().into())
    }

    /// The raw digest.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactId({self})")
    }
}

/// Generic view of the class declaration.
pub(crate) struct ClassGenerics {
    pub(crate) type_parameters: Vec<TypeParameter>,
    pub(crate) superclass: Option<TypeInfo>,
    pub(crate) interfaces: Vec<TypeInfo>,
}

pub(crate) struct FieldData {
    pub(crate) ty: TypeInfo,
    pub(crate) constant: Option<LiteralValue>,
    pub(crate) annotations: Vec<AnnotationSite>,
}

/// One formal parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSite {
    pub(crate) index: usize,
    pub(crate) ty: TypeInfo,
    pub(crate) descriptor: TypeSignature,
    pub(crate) name: Option<String>,
    pub(crate) varargs: bool,
    pub(crate) annotations: Vec<AnnotationSite>,
}

impl ParameterSite {
    /// Position in the parameter list.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Declared type, generic when the method carries a signature.
    #[must_use]
    pub fn ty(&self) -> &TypeInfo {
        &self.ty
    }

    /// Erased type from the method descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &TypeSignature {
        &self.descriptor
    }

    /// Source name, when the class records one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns true for the trailing parameter of a variable arity method.
    #[must_use]
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Parameter annotations.
    #[must_use]
    pub fn annotations(&self) -> &[AnnotationSite] {
        &self.annotations
    }
}

pub(crate) struct MethodData {
    pub(crate) type_parameters: Vec<TypeParameter>,
    pub(crate) parameters: Vec<ParameterSite>,
    pub(crate) return_type: TypeInfo,
    pub(crate) throws: Vec<TypeInfo>,
    pub(crate) annotations: Vec<AnnotationSite>,
}

/// Marker left by a previous rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Woven {
    /// Name of the injector that rewrote the class
    pub injector: String,
    /// Whether the rewrite changed anything
    pub modified: bool,
}

pub(crate) struct SiteArena {
    pub(crate) id: ArtifactId,
    pub(crate) class: ClassFile,
    pub(crate) name: ClassName,
    pub(crate) super_name: Option<ClassName>,
    pub(crate) interfaces: Vec<ClassName>,
    pub(crate) field_names: Vec<String>,
    pub(crate) field_types: Vec<TypeSignature>,
    pub(crate) method_names: Vec<String>,
    pub(crate) method_descriptors: Vec<MethodDescriptor>,
    generics: OnceLock<ClassGenerics>,
    annotations: OnceLock<Vec<AnnotationSite>>,
    fields: OnceLock<Vec<FieldData>>,
    methods: OnceLock<Vec<MethodData>>,
    enclosing: OnceLock<Option<ClassName>>,
}

impl SiteArena {
    pub(crate) fn build(id: ArtifactId, class: ClassFile) -> Result<Self> {
        let pool = &class.constant_pool;
        let name = class.name()?;
        let super_name = class.super_name()?;
        let interfaces = class.interface_names()?;

        let mut field_names = Vec::with_capacity(class.fields.len());
        let mut field_types = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            field_names.push(field.name(pool)?.to_string());
            field_types.push(parse_field_descriptor(field.descriptor(pool)?)?);
        }

        let mut method_names = Vec::with_capacity(class.methods.len());
        let mut method_descriptors = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            method_names.push(method.name(pool)?.to_string());
            method_descriptors.push(parse_method_descriptor(method.descriptor(pool)?)?);
        }

        if class.fields.len() > usize::from(u16::MAX) || class.methods.len() > usize::from(u16::MAX)
        {
            return Err(malformed_error!("Member table of {} overflows", name));
        }

        Ok(SiteArena {
            id,
            class,
            name,
            super_name,
            interfaces,
            field_names,
            field_types,
            method_names,
            method_descriptors,
            generics: OnceLock::new(),
            annotations: OnceLock::new(),
            fields: OnceLock::new(),
            methods: OnceLock::new(),
            enclosing: OnceLock::new(),
        })
    }

    pub(crate) fn decode(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        let class = ClassFile::from_mem_with(data, options)?;
        Self::build(ArtifactId::of(data), class).map_err(Error::into_malformed)
    }

    fn pool(&self) -> &ConstantPool {
        &self.class.constant_pool
    }

    pub(crate) fn generics(&self) -> &ClassGenerics {
        self.generics.get_or_init(|| self.extract_generics())
    }

    pub(crate) fn annotations(&self) -> &[AnnotationSite] {
        self.annotations
            .get_or_init(|| AnnotationSite::collect(self.pool(), &self.class.attributes))
    }

    pub(crate) fn fields(&self) -> &[FieldData] {
        self.fields.get_or_init(|| self.extract_fields())
    }

    pub(crate) fn methods(&self) -> &[MethodData] {
        self.methods.get_or_init(|| self.extract_methods())
    }

    pub(crate) fn enclosing(&self) -> Option<&ClassName> {
        self.enclosing
            .get_or_init(|| self.extract_enclosing())
            .as_ref()
    }

    #[cfg(test)]
    pub(crate) fn methods_extracted(&self) -> bool {
        self.methods.get().is_some()
    }

    pub(crate) fn woven(&self) -> Option<Woven> {
        self.class.attributes.iter().find_map(|a| match a.body {
            AttributeBody::Woven(stamp) => Some(Woven {
                injector: self.pool().utf8(stamp.injector).ok()?.to_string(),
                modified: stamp.modified,
            }),
            _ => None,
        })
    }

    fn extract_generics(&self) -> ClassGenerics {
        let plain = |name: &ClassName| TypeInfo::Plain(TypeSignature::Reference(name.clone()));
        let signature = match self.class.signature() {
            Ok(Some(text)) => parse_class_signature(text).map_err(|e| {
                log::debug!("unresolvable signature on {}: {e}", self.name);
            }),
            Ok(None) => {
                return ClassGenerics {
                    type_parameters: Vec::new(),
                    superclass: self.super_name.as_ref().map(plain),
                    interfaces: self.interfaces.iter().map(plain).collect(),
                }
            }
            Err(_) => Err(()),
        };

        match signature {
            Ok(signature) => ClassGenerics {
                type_parameters: signature.type_parameters,
                superclass: self.super_name.as_ref().map(|_| signature.superclass),
                interfaces: signature.interfaces,
            },
            Err(()) => ClassGenerics {
                type_parameters: Vec::new(),
                superclass: self.super_name.as_ref().map(|_| TypeInfo::Unknown),
                interfaces: vec![TypeInfo::Unknown; self.interfaces.len()],
            },
        }
    }

    fn extract_fields(&self) -> Vec<FieldData> {
        let pool = self.pool();
        let outer = &self.generics().type_parameters;
        self.class
            .fields
            .iter()
            .zip(&self.field_types)
            .map(|(field, descriptor)| {
                let ty = match field.signature(pool) {
                    Ok(Some(text)) => {
                        parse_field_signature(text, outer).unwrap_or(TypeInfo::Unknown)
                    }
                    Ok(None) => TypeInfo::Plain(descriptor.clone()),
                    Err(_) => TypeInfo::Unknown,
                };
                let constant = field.attributes.iter().find_map(|a| match a.body {
                    AttributeBody::ConstantValue(index) => pool.literal(index).ok(),
                    _ => None,
                });
                FieldData {
                    ty,
                    constant,
                    annotations: AnnotationSite::collect(pool, &field.attributes),
                }
            })
            .collect()
    }

    fn extract_methods(&self) -> Vec<MethodData> {
        self.class
            .methods
            .iter()
            .zip(&self.method_descriptors)
            .map(|(method, descriptor)| self.extract_method(method, descriptor))
            .collect()
    }

    fn extract_method(&self, method: &MemberInfo, descriptor: &MethodDescriptor) -> MethodData {
        let pool = self.pool();
        let outer = &self.generics().type_parameters;
        let count = descriptor.params.len();

        let signature = match method.signature(pool) {
            Ok(Some(text)) => Some(parse_method_signature(text, outer).ok()),
            Ok(None) => None,
            Err(_) => Some(None),
        };

        // Signatures of inner class constructors omit the leading synthetic parameters.
        let (type_parameters, generic_params, return_type, signature_throws) = match signature {
            None => (
                Vec::new(),
                descriptor.params.iter().cloned().map(TypeInfo::Plain).collect(),
                TypeInfo::Plain(descriptor.ret.clone()),
                Vec::new(),
            ),
            Some(None) => (
                Vec::new(),
                vec![TypeInfo::Unknown; count],
                TypeInfo::Unknown,
                Vec::new(),
            ),
            Some(Some(signature)) => {
                let skipped = count.saturating_sub(signature.parameters.len());
                let params = descriptor.params[..skipped]
                    .iter()
                    .cloned()
                    .map(TypeInfo::Plain)
                    .chain(signature.parameters.into_iter().take(count - skipped))
                    .collect();
                (
                    signature.type_parameters,
                    params,
                    signature.return_type,
                    signature.throws,
                )
            }
        };

        let throws = if signature_throws.is_empty() {
            declared_exceptions(pool, method)
        } else {
            signature_throws
        };

        let names = parameter_names(pool, method, descriptor);
        let mut annotations = parameter_annotations(pool, &method.attributes, count);
        let varargs = method.access.contains(AccessFlags::VARARGS);

        let parameters = generic_params
            .into_iter()
            .zip(&descriptor.params)
            .enumerate()
            .map(|(index, (ty, erased))| ParameterSite {
                index,
                ty,
                descriptor: erased.clone(),
                name: names.get(index).cloned().flatten(),
                varargs: varargs && index + 1 == count,
                annotations: std::mem::take(&mut annotations[index]),
            })
            .collect();

        MethodData {
            type_parameters,
            parameters,
            return_type,
            throws,
            annotations: AnnotationSite::collect(pool, &method.attributes),
        }
    }

    fn extract_enclosing(&self) -> Option<ClassName> {
        let pool = self.pool();
        for attribute in &self.class.attributes {
            if let AttributeBody::InnerClasses(entries) = &attribute.body {
                let own = entries
                    .iter()
                    .find(|e| e.inner == self.class.this_class && e.outer != 0);
                if let Some(entry) = own {
                    return pool.class_name(entry.outer).ok();
                }
            }
        }
        self.class.attributes.iter().find_map(|a| match a.body {
            AttributeBody::EnclosingMethod { class, .. } => pool.class_name(class).ok(),
            _ => None,
        })
    }
}

fn declared_exceptions(pool: &ConstantPool, method: &MemberInfo) -> Vec<TypeInfo> {
    method
        .attributes
        .iter()
        .find_map(|a| match &a.body {
            AttributeBody::Exceptions(classes) => Some(classes),
            _ => None,
        })
        .map(|classes| {
            classes
                .iter()
                .map(|&index| {
                    pool.class_name(index)
                        .map_or(TypeInfo::Unknown, |name| {
                            TypeInfo::Plain(TypeSignature::Reference(name))
                        })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Names from `MethodParameters`, or failing that from the local variables live at entry.
fn parameter_names(
    pool: &ConstantPool,
    method: &MemberInfo,
    descriptor: &MethodDescriptor,
) -> Vec<Option<String>> {
    let count = descriptor.params.len();
    let declared = method.attributes.iter().find_map(|a| match &a.body {
        AttributeBody::MethodParameters(entries) => Some(entries),
        _ => None,
    });
    if let Some(entries) = declared {
        let offset = count.saturating_sub(entries.len());
        let mut names = vec![None; count];
        for (i, entry) in entries.iter().enumerate().take(count - offset) {
            if entry.name != 0 {
                names[offset + i] = pool.utf8(entry.name).ok().map(str::to_string);
            }
        }
        return names;
    }

    let Some(code) = method.code() else {
        return vec![None; count];
    };
    let mut slot = u16::from(!method.access.is_static());
    descriptor
        .params
        .iter()
        .map(|param| {
            let name = local_name_at_entry(pool, code, slot);
            slot += param.slot_size();
            name
        })
        .collect()
}

fn local_name_at_entry(pool: &ConstantPool, code: &CodeAttribute, slot: u16) -> Option<String> {
    code.attributes.iter().find_map(|a| match &a.body {
        AttributeBody::LocalVariableTable(entries) => entries
            .iter()
            .find(|v| v.start_pc == 0 && v.index == slot)
            .and_then(|v| pool.utf8(v.name).ok())
            .map(str::to_string),
        _ => None,
    })
}
