use crate::{
    classfile::{
        annotations::{Annotation, ElementValue},
        attributes::{Attribute, AttributeBody},
        constpool::{Constant, ConstantPool},
    },
    signatures::{parse_field_descriptor, ClassName, TypeSignature},
    sites::Materializer,
};

/// A resolved annotation element value.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// `boolean`
    Bool(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `String`
    String(String),
    /// Enum constant
    Enum {
        /// Enum class
        type_name: ClassName,
        /// Constant name
        constant: String,
    },
    /// Class literal, possibly a primitive or `void`
    Class(TypeSignature),
    /// Nested annotation
    Annotation(Box<AnnotationSite>),
    /// Array of values
    Array(Vec<AnnotationValue>),
    /// A value whose constant could not be resolved
    Unknown,
}

/// An annotation on a class, member or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSite {
    type_name: ClassName,
    values: Vec<(String, AnnotationValue)>,
    visible: bool,
}

impl AnnotationSite {
    /// Annotation type.
    #[must_use]
    pub fn type_name(&self) -> &ClassName {
        &self.type_name
    }

    /// Explicitly given elements in declaration order. Defaults are not included.
    #[must_use]
    pub fn values(&self) -> &[(String, AnnotationValue)] {
        &self.values
    }

    /// Value of element `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&AnnotationValue> {
        self.values
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Returns true if the annotation is retained at run time.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Resolve to a live annotation instance, if the materializer knows one.
    pub fn materialize<M: Materializer>(&self, materializer: &M) -> Option<M::Annotation> {
        materializer.annotation(self)
    }

    pub(crate) fn resolve(pool: &ConstantPool, annotation: &Annotation, visible: bool) -> Self {
        let type_name = pool
            .utf8(annotation.type_index)
            .map_or_else(|_| ClassName::object(), ClassName::new);
        let values = annotation
            .elements
            .iter()
            .map(|(name, value)| {
                let name = pool.utf8(*name).unwrap_or("?").to_string();
                (name, resolve_value(pool, value, visible))
            })
            .collect();
        AnnotationSite {
            type_name,
            values,
            visible,
        }
    }

    /// Every declaration annotation in `attributes`, visible ones first.
    pub(crate) fn collect(pool: &ConstantPool, attributes: &[Attribute]) -> Vec<Self> {
        let mut out = Vec::new();
        for wanted in [true, false] {
            for attribute in attributes {
                if let AttributeBody::Annotations {
                    visible,
                    annotations,
                } = &attribute.body
                {
                    if *visible == wanted {
                        out.extend(annotations.iter().map(|a| Self::resolve(pool, a, *visible)));
                    }
                }
            }
        }
        out
    }
}

fn resolve_value(pool: &ConstantPool, value: &ElementValue, visible: bool) -> AnnotationValue {
    match value {
        ElementValue::Const { tag, index } => resolve_const(pool, *tag, *index),
        ElementValue::Enum {
            type_name,
            const_name,
        } => match (pool.utf8(*type_name), pool.utf8(*const_name)) {
            (Ok(type_name), Ok(constant)) => AnnotationValue::Enum {
                type_name: ClassName::new(type_name),
                constant: constant.to_string(),
            },
            _ => AnnotationValue::Unknown,
        },
        ElementValue::Class(index) => pool
            .utf8(*index)
            .ok()
            .and_then(|descriptor| {
                if descriptor == "V" {
                    Some(TypeSignature::Void)
                } else {
                    parse_field_descriptor(descriptor).ok()
                }
            })
            .map_or(AnnotationValue::Unknown, AnnotationValue::Class),
        ElementValue::Annotation(nested) => {
            AnnotationValue::Annotation(Box::new(AnnotationSite::resolve(pool, nested, visible)))
        }
        ElementValue::Array(values) => AnnotationValue::Array(
            values
                .iter()
                .map(|v| resolve_value(pool, v, visible))
                .collect(),
        ),
    }
}

fn resolve_const(pool: &ConstantPool, tag: u8, index: u16) -> AnnotationValue {
    let Ok(constant) = pool.get(index) else {
        return AnnotationValue::Unknown;
    };
    match (tag, constant) {
        (b'Z', Constant::Integer(v)) => AnnotationValue::Bool(*v != 0),
        (b'B', Constant::Integer(v)) => AnnotationValue::Byte(*v as i8),
        (b'C', Constant::Integer(v)) => AnnotationValue::Char(*v as u16),
        (b'S', Constant::Integer(v)) => AnnotationValue::Short(*v as i16),
        (b'I', Constant::Integer(v)) => AnnotationValue::Int(*v),
        (b'J', Constant::Long(v)) => AnnotationValue::Long(*v),
        (b'F', Constant::Float(bits)) => AnnotationValue::Float(f32::from_bits(*bits)),
        (b'D', Constant::Double(bits)) => AnnotationValue::Double(f64::from_bits(*bits)),
        (b's', Constant::Utf8(text)) => AnnotationValue::String(text.clone()),
        _ => AnnotationValue::Unknown,
    }
}

/// Per-parameter annotations of a method with `count` descriptor parameters.
///
/// Compilers may omit leading synthetic parameters from the table; short tables are aligned to
/// the last parameters.
pub(crate) fn parameter_annotations(
    pool: &ConstantPool,
    attributes: &[Attribute],
    count: usize,
) -> Vec<Vec<AnnotationSite>> {
    let mut out = vec![Vec::new(); count];
    for wanted in [true, false] {
        for attribute in attributes {
            let AttributeBody::ParameterAnnotations {
                visible,
                parameters,
            } = &attribute.body
            else {
                continue;
            };
            if *visible != wanted {
                continue;
            }
            let offset = count.saturating_sub(parameters.len());
            for (i, annotations) in parameters.iter().enumerate() {
                if let Some(slot) = out.get_mut(offset + i) {
                    slot.extend(
                        annotations
                            .iter()
                            .map(|a| AnnotationSite::resolve(pool, a, *visible)),
                    );
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_values() {
        let mut pool = ConstantPool::new();
        let outer_type = pool.add_utf8("Ldemo/Tag;");
        let inner_type = pool.add_utf8("Ldemo/Inner;");
        let name = pool.add_utf8("value");
        let level = pool.add_utf8("level");
        let number = pool.add_integer(3);
        let text = pool.add_utf8("hello");
        let enum_type = pool.add_utf8("Ldemo/Level;");
        let enum_const = pool.add_utf8("HIGH");
        let class_lit = pool.add_utf8("[I");

        let annotation = Annotation {
            type_index: outer_type,
            elements: vec![
                (
                    name,
                    ElementValue::Array(vec![
                        ElementValue::Const { tag: b'I', index: number },
                        ElementValue::Const { tag: b's', index: text },
                        ElementValue::Class(class_lit),
                    ]),
                ),
                (
                    level,
                    ElementValue::Annotation(Annotation {
                        type_index: inner_type,
                        elements: vec![(
                            name,
                            ElementValue::Enum {
                                type_name: enum_type,
                                const_name: enum_const,
                            },
                        )],
                    }),
                ),
            ],
        };

        let site = AnnotationSite::resolve(&pool, &annotation, true);
        assert_eq!(site.type_name().internal(), "demo/Tag");
        assert_eq!(
            site.value("value"),
            Some(&AnnotationValue::Array(vec![
                AnnotationValue::Int(3),
                AnnotationValue::String("hello".into()),
                AnnotationValue::Class(TypeSignature::Int.array_of(1)),
            ]))
        );
        match site.value("level") {
            Some(AnnotationValue::Annotation(inner)) => {
                assert_eq!(inner.type_name().internal(), "demo/Inner");
                assert_eq!(
                    inner.value("value"),
                    Some(&AnnotationValue::Enum {
                        type_name: ClassName::new("demo/Level"),
                        constant: "HIGH".into(),
                    })
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_constants_resolve_to_unknown() {
        let mut pool = ConstantPool::new();
        let ty = pool.add_utf8("Ldemo/Tag;");
        let name = pool.add_utf8("value");
        let annotation = Annotation {
            type_index: ty,
            elements: vec![(name, ElementValue::Const { tag: b'J', index: ty })],
        };
        let site = AnnotationSite::resolve(&pool, &annotation, false);
        assert_eq!(site.value("value"), Some(&AnnotationValue::Unknown));
        assert!(!site.is_visible());
    }
}
