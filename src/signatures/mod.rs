//! Type names, descriptors and generic signatures.
//!
//! The class file format spells types in several ways: field descriptors (`I`,
//! `[Ljava/lang/String;`), method descriptors (`(IJ)V`), generic `Signature` attributes
//! (`<T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;`) and plain internal names
//! (`java/lang/String`). This module turns all of them into one canonical representation:
//!
//! - [`TypeSignature`] - void, the eight primitives, class references and arrays
//! - [`ClassName`] - a class in internal form with conversions to the other spellings
//! - [`MethodDescriptor`] - parameter and return types of a method
//! - [`TypeInfo`] - a generic-aware wrapper used by the site model
//!
//! # Examples
//!
//! ```rust
//! use classweave::signatures::{parse_type_name, TypeSignature};
//!
//! let from_source = parse_type_name("java.lang.String[]")?;
//! let from_descriptor = parse_type_name("[Ljava/lang/String;")?;
//! assert_eq!(from_source, from_descriptor);
//! assert_eq!(from_source.descriptor(), "[Ljava/lang/String;");
//! assert_eq!(parse_type_name("int")?, TypeSignature::Int);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Unresolvable bounds
//!
//! Generic bounds that cannot be resolved precisely (a type variable used inside its own bound, a
//! wildcard nested in a wildcard bound, a variable declared nowhere in scope) resolve to
//! [`TypeInfo::Unknown`] rather than a guess.

mod parser;
mod types;

pub use parser::SignatureParser;
pub use types::*;

use crate::Result;

/// Parse a complete field descriptor, `[[I`.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the descriptor is invalid.
pub fn parse_field_descriptor(descriptor: &str) -> Result<TypeSignature> {
    SignatureParser::new(descriptor).parse_field_descriptor()
}

/// Parse a complete method descriptor, `(ILjava/lang/String;)V`.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the descriptor is invalid.
pub fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor> {
    SignatureParser::new(descriptor).parse_method_descriptor()
}

/// Parse a class `Signature` attribute.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the signature is invalid.
pub fn parse_class_signature(signature: &str) -> Result<ClassSignature> {
    SignatureParser::new(signature).parse_class_signature()
}

/// Parse a method `Signature` attribute in the scope of the declaring class's type parameters.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the signature is invalid.
pub fn parse_method_signature(
    signature: &str,
    class_parameters: &[TypeParameter],
) -> Result<MethodSignature> {
    SignatureParser::new(signature).parse_method_signature(class_parameters)
}

/// Parse a field `Signature` attribute in the scope of the declaring class's type parameters.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] if the signature is invalid.
pub fn parse_field_signature(signature: &str, class_parameters: &[TypeParameter]) -> Result<TypeInfo> {
    SignatureParser::new(signature).parse_field_signature(class_parameters)
}

/// Parse a type written in any of the supported spellings.
///
/// Accepts field descriptors (`Ljava/lang/Object;`, `[[I`, `Z`), internal names
/// (`java/lang/Object`), binary names (`java.lang.Object`), source-style arrays
/// (`java.lang.Object[]`) and primitive keywords (`int`, `void`).
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] for empty or syntactically invalid input.
pub fn parse_type_name(name: &str) -> Result<TypeSignature> {
    let name = name.trim();
    if name.is_empty() {
        return Err(malformed_error!("Empty type name"));
    }

    if name.starts_with('[') || (name.starts_with('L') && name.ends_with(';')) {
        return parse_field_descriptor(name);
    }
    if name.len() == 1 {
        if let Some(primitive) = TypeSignature::from_primitive_code(name.as_bytes()[0]) {
            return Ok(primitive);
        }
    }

    let mut base = name;
    let mut dimensions: u8 = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped.trim_end();
        dimensions = dimensions
            .checked_add(1)
            .ok_or_else(|| malformed_error!("Array dimensions exceed 255"))?;
    }

    if base.is_empty() || base.contains(['[', ']', ';', '<', '>']) {
        return Err(malformed_error!("Invalid type name '{}'", name));
    }

    let element = TypeSignature::from_keyword(base)
        .unwrap_or_else(|| TypeSignature::Reference(ClassName::new(base)));
    if dimensions == 0 {
        Ok(element)
    } else if element.is_void() {
        Err(malformed_error!("Array of void in '{}'", name))
    } else {
        Ok(element.array_of(dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_name_spellings() {
        let dotted = ClassName::new("java.util.Map$Entry");
        let slashed = ClassName::new("java/util/Map$Entry");
        let descriptor = ClassName::new("Ljava/util/Map$Entry;");
        assert_eq!(dotted, slashed);
        assert_eq!(slashed, descriptor);
        assert_eq!(dotted.package(), "java/util");
        assert_eq!(dotted.simple_name(), "Map$Entry");
        assert_eq!(dotted.to_string(), "java.util.Map$Entry");
        assert_eq!(ClassName::new("Top").package(), "");
    }

    #[test]
    fn descriptors() {
        let sig = parse_field_descriptor("[[Ljava/lang/String;").unwrap();
        assert_eq!(
            sig,
            TypeSignature::Array {
                dimensions: 2,
                element: Box::new(TypeSignature::string()),
            }
        );
        assert_eq!(sig.java_name(), "java.lang.String[][]");
        assert_eq!(sig.class_operand().unwrap(), "[[Ljava/lang/String;");

        let method = parse_method_descriptor("(IJ[DLjava/lang/Object;)V").unwrap();
        assert_eq!(method.params.len(), 4);
        assert_eq!(method.param_slots(), 1 + 2 + 1 + 1);
        assert_eq!(method.descriptor(), "(IJ[DLjava/lang/Object;)V");

        assert!(parse_field_descriptor("V").is_err());
        assert!(parse_field_descriptor("II").is_err());
        assert!(parse_method_descriptor("(I").is_err());
        assert!(parse_field_descriptor("Ljava/lang/String").is_err());
    }

    #[test]
    fn flexible_names() {
        assert_eq!(parse_type_name("Z").unwrap(), TypeSignature::Boolean);
        assert_eq!(parse_type_name("boolean").unwrap(), TypeSignature::Boolean);
        assert_eq!(
            parse_type_name("int[][]").unwrap(),
            parse_field_descriptor("[[I").unwrap()
        );
        assert_eq!(
            parse_type_name("java/lang/Object").unwrap(),
            TypeSignature::object()
        );
        assert!(parse_type_name("void[]").is_err());
        assert!(parse_type_name("").is_err());
        assert!(parse_type_name("java.util.List<String>").is_err());
    }

    #[test]
    fn boxing_metadata() {
        assert_eq!(
            TypeSignature::Int.boxed_class().unwrap().internal(),
            "java/lang/Integer"
        );
        assert_eq!(TypeSignature::Char.unbox_method().unwrap(), "charValue");
        assert!(TypeSignature::Void.unbox_method().is_none());
        assert!(TypeSignature::string().boxed_class().is_none());
    }

    #[test]
    fn class_signature_with_bounds() {
        let sig = parse_class_signature(
            "<K:Ljava/lang/Object;V::Ljava/lang/Comparable<TV;>;>Ljava/util/AbstractMap<TK;TV;>;Ljava/io/Serializable;",
        )
        .unwrap();

        assert_eq!(sig.type_parameters.len(), 2);
        assert_eq!(sig.type_parameters[0].name, "K");
        assert_eq!(
            sig.type_parameters[0].bounds,
            vec![TypeInfo::Plain(TypeSignature::object())]
        );

        // V extends Comparable<V>: the inner V is recursive and therefore unknown
        match &sig.type_parameters[1].bounds[0] {
            TypeInfo::Parameterized { raw, arguments } => {
                assert_eq!(raw.internal(), "java/lang/Comparable");
                assert_eq!(
                    arguments[0],
                    TypeArgument::Exact(TypeInfo::Variable {
                        name: "V".into(),
                        bounds: vec![TypeInfo::Unknown],
                    })
                );
            }
            other => panic!("unexpected bound {other:?}"),
        }

        assert_eq!(sig.superclass.erasure().descriptor(), "Ljava/util/AbstractMap;");
        assert_eq!(sig.interfaces.len(), 1);
        assert!(!sig.interfaces[0].is_generic());
    }

    #[test]
    fn nested_wildcards_are_unknown() {
        let info = parse_field_signature(
            "Ljava/util/List<+Ljava/util/List<-Ljava/lang/Number;>;>;",
            &[],
        )
        .unwrap();
        match info {
            TypeInfo::Parameterized { arguments, .. } => {
                assert_eq!(arguments, vec![TypeArgument::Extends(TypeInfo::Unknown)]);
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn method_signature_uses_class_scope() {
        let class = parse_class_signature("<T:Ljava/lang/Number;>Ljava/lang/Object;").unwrap();
        let method = parse_method_signature(
            "<R:Ljava/lang/Object;>(TT;[TR;TX;)TR;^Ljava/io/IOException;",
            &class.type_parameters,
        )
        .unwrap();

        assert_eq!(method.parameters[0].erasure(), TypeSignature::class("java/lang/Number"));
        assert_eq!(
            method.parameters[1].erasure(),
            TypeSignature::object().array_of(1)
        );
        // X is declared nowhere
        assert!(method.parameters[2].has_unknown());
        assert_eq!(method.return_type.erasure(), TypeSignature::object());
        assert_eq!(method.throws.len(), 1);
    }

    #[test]
    fn inner_class_signature() {
        let info = parse_field_signature("Lpkg/Outer<TT;>.Inner<Ljava/lang/String;>;", &[]).unwrap();
        match info {
            TypeInfo::Parameterized { raw, arguments } => {
                assert_eq!(raw.internal(), "pkg/Outer$Inner");
                assert_eq!(arguments.len(), 1);
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn malformed_signatures() {
        assert!(parse_class_signature("<T>Ljava/lang/Object;").is_err());
        assert!(parse_field_signature("Ljava/util/List<>;", &[]).is_err());
        assert!(parse_method_signature("(TT;", &[]).is_err());
    }
}
