//! Raw annotation structures of `Runtime*Annotations` attributes.
//!
//! Values keep their constant pool indices; the site model resolves them into
//! [`crate::sites::AnnotationSite`] values on demand.

use crate::{
    file::{io::write_be, parser::Parser},
    Error::RecursionLimit,
    Result,
};

/// One annotation: its type descriptor and element/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    /// `Utf8` index of the annotation type descriptor
    pub type_index: u16,
    /// `(Utf8 name index, value)` pairs in declaration order
    pub elements: Vec<(u16, ElementValue)>,
}

/// An annotation element value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is one of `BCDFIJSZs`
    Const {
        /// Element tag
        tag: u8,
        /// Constant pool index of the value
        index: u16,
    },
    /// Enum constant
    Enum {
        /// `Utf8` index of the enum type descriptor
        type_name: u16,
        /// `Utf8` index of the constant name
        const_name: u16,
    },
    /// Class literal, `Utf8` index of the return descriptor
    Class(u16),
    /// Nested annotation
    Annotation(Annotation),
    /// Array of values
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Read one annotation, bounding element nesting to `max_depth`.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] when nesting exceeds `max_depth` and
    /// [`crate::Error::MalformedArtifact`] for unknown element tags.
    pub fn read(parser: &mut Parser, max_depth: usize) -> Result<Self> {
        Self::read_nested(parser, 0, max_depth)
    }

    fn read_nested(parser: &mut Parser, depth: usize, max_depth: usize) -> Result<Self> {
        let type_index = parser.read_be::<u16>()?;
        let elements = parser.read_u2_table(|p| {
            let name = p.read_be::<u16>()?;
            let value = ElementValue::read(p, depth + 1, max_depth)?;
            Ok((name, value))
        })?;
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    /// Append the encoded annotation.
    pub fn write(&self, out: &mut Vec<u8>) {
        write_be(out, self.type_index);
        write_be(out, self.elements.len() as u16);
        for (name, value) in &self.elements {
            write_be(out, *name);
            value.write(out);
        }
    }
}

impl ElementValue {
    fn read(parser: &mut Parser, depth: usize, max_depth: usize) -> Result<Self> {
        if depth > max_depth {
            return Err(RecursionLimit(max_depth));
        }

        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: parser.read_be()?,
            },
            b'e' => ElementValue::Enum {
                type_name: parser.read_be()?,
                const_name: parser.read_be()?,
            },
            b'c' => ElementValue::Class(parser.read_be()?),
            b'@' => ElementValue::Annotation(Annotation::read_nested(parser, depth, max_depth)?),
            b'[' => ElementValue::Array(
                parser.read_u2_table(|p| ElementValue::read(p, depth + 1, max_depth))?,
            ),
            _ => {
                return Err(malformed_error!(
                    "Unknown annotation element tag '{}'",
                    tag as char
                ))
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            ElementValue::Const { tag, index } => {
                write_be(out, *tag);
                write_be(out, *index);
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                write_be(out, b'e');
                write_be(out, *type_name);
                write_be(out, *const_name);
            }
            ElementValue::Class(index) => {
                write_be(out, b'c');
                write_be(out, *index);
            }
            ElementValue::Annotation(annotation) => {
                write_be(out, b'@');
                annotation.write(out);
            }
            ElementValue::Array(values) => {
                write_be(out, b'[');
                write_be(out, values.len() as u16);
                for value in values {
                    value.write(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> Annotation {
        let mut current = Annotation {
            type_index: 1,
            elements: vec![(2, ElementValue::Const { tag: b'I', index: 3 })],
        };
        for _ in 0..depth {
            current = Annotation {
                type_index: 1,
                elements: vec![(2, ElementValue::Annotation(current))],
            };
        }
        current
    }

    #[test]
    fn encode_decode() {
        let annotation = Annotation {
            type_index: 5,
            elements: vec![
                (6, ElementValue::Enum { type_name: 7, const_name: 8 }),
                (
                    9,
                    ElementValue::Array(vec![ElementValue::Class(10), ElementValue::Const { tag: b's', index: 11 }]),
                ),
            ],
        };
        let mut out = Vec::new();
        annotation.write(&mut out);
        let decoded = Annotation::read(&mut Parser::new(&out), 8).unwrap();
        assert_eq!(decoded, annotation);
    }

    #[test]
    fn nesting_limit() {
        let mut out = Vec::new();
        nested(10).write(&mut out);
        assert!(Annotation::read(&mut Parser::new(&out), 32).is_ok());
        assert!(matches!(
            Annotation::read(&mut Parser::new(&out), 4),
            Err(crate::Error::RecursionLimit(4))
        ));
    }

    #[test]
    fn unknown_tag() {
        let data = [0x00, 0x01, 0x00, 0x01, 0x00, 0x02, b'?'];
        assert!(Annotation::read(&mut Parser::new(&data), 8).is_err());
    }
}
