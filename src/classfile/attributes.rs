//! Attribute decoding and encoding.
//!
//! Attributes the pipeline reads or rewrites are decoded into [`AttributeBody`] variants; every
//! other attribute is kept as raw bytes and written back verbatim. Indices inside raw bodies stay
//! valid because the constant pool is never renumbered.

use crate::{
    classfile::{
        annotations::Annotation,
        constpool::ConstantPool,
        flags::AccessFlags,
    },
    file::{
        io::{patch_be_at, write_be},
        parser::Parser,
    },
    Result,
};

/// Names of the attributes decoded structurally.
#[allow(non_snake_case, missing_docs)]
pub mod NAME {
    pub const CODE: &str = "Code";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const METHOD_PARAMETERS: &str = "MethodParameters";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
    pub const NEST_HOST: &str = "NestHost";
    pub const NEST_MEMBERS: &str = "NestMembers";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const WOVEN: &str = "classweave.Woven";
}

/// Options that bound decoding work.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Maximum nesting of annotation element values
    pub max_annotation_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            max_annotation_depth: 32,
        }
    }
}

/// An attribute: its name index and decoded or raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// `Utf8` index of the attribute name
    pub name: u16,
    /// Attribute body
    pub body: AttributeBody,
}

/// Decoded attribute bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBody {
    /// Method bytecode
    Code(CodeAttribute),
    /// Initial value of a static field, constant pool index
    ConstantValue(u16),
    /// Declared thrown classes, `Class` indices
    Exceptions(Vec<u16>),
    /// Generic signature, `Utf8` index
    Signature(u16),
    /// Source file name, `Utf8` index
    SourceFile(u16),
    /// Formal parameter names and flags
    MethodParameters(Vec<MethodParameter>),
    /// Declaration annotations
    Annotations {
        /// `RuntimeVisible` when true, `RuntimeInvisible` otherwise
        visible: bool,
        /// Annotations in declaration order
        annotations: Vec<Annotation>,
    },
    /// Per-parameter annotations
    ParameterAnnotations {
        /// `RuntimeVisible` when true, `RuntimeInvisible` otherwise
        visible: bool,
        /// One annotation list per parameter
        parameters: Vec<Vec<Annotation>>,
    },
    /// Nested class table
    InnerClasses(Vec<InnerClass>),
    /// Enclosing method of a local or anonymous class
    EnclosingMethod {
        /// `Class` index of the enclosing class
        class: u16,
        /// `NameAndType` index of the enclosing method, 0 if none
        method: u16,
    },
    /// Nest host, `Class` index
    NestHost(u16),
    /// Nest members, `Class` indices
    NestMembers(Vec<u16>),
    /// Bytecode offset to source line mapping
    LineNumberTable(Vec<LineNumber>),
    /// Local variable debug information
    LocalVariableTable(Vec<LocalVariable>),
    /// Marker left on classes rewritten by this crate
    Woven(WovenStamp),
    /// Any attribute not decoded structurally
    Raw(Vec<u8>),
}

/// The `Code` attribute in its encoded form.
///
/// `code` holds the raw bytecode. [`crate::bytecode::MethodBody`] decodes it into labelled
/// instructions and encodes it back when a method is rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Raw bytecode
    pub code: Vec<u8>,
    /// Exception handlers with raw offsets
    pub exception_table: Vec<ExceptionEntry>,
    /// Nested attributes (`LineNumberTable`, `StackMapTable`, ...)
    pub attributes: Vec<Attribute>,
}

/// One raw exception table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// Start of the protected range, inclusive
    pub start_pc: u16,
    /// End of the protected range, exclusive
    pub end_pc: u16,
    /// Handler entry point
    pub handler_pc: u16,
    /// `Class` index of the caught type, 0 for any
    pub catch_type: u16,
}

/// One `MethodParameters` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodParameter {
    /// `Utf8` index of the name, 0 if unnamed
    pub name: u16,
    /// Parameter flags (`FINAL`, `SYNTHETIC`, `MANDATED`)
    pub access: u16,
}

/// One `InnerClasses` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClass {
    /// `Class` index of the nested class
    pub inner: u16,
    /// `Class` index of the enclosing class, 0 for local and anonymous classes
    pub outer: u16,
    /// `Utf8` index of the simple name, 0 for anonymous classes
    pub name: u16,
    /// Declared modifiers of the nested class
    pub access: AccessFlags,
}

/// One `LineNumberTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    /// Bytecode offset
    pub start_pc: u16,
    /// Source line
    pub line: u16,
}

/// One `LocalVariableTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    /// Start of the live range
    pub start_pc: u16,
    /// Length of the live range
    pub length: u16,
    /// `Utf8` index of the variable name
    pub name: u16,
    /// `Utf8` index of the descriptor
    pub descriptor: u16,
    /// Local slot
    pub index: u16,
}

/// Body of the woven stamp attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WovenStamp {
    /// `Utf8` index of the injector identity
    pub injector: u16,
    /// Whether any injection changed the class
    pub modified: bool,
}

impl Attribute {
    /// Create an attribute, interning its name.
    pub fn new(pool: &mut ConstantPool, name: &str, body: AttributeBody) -> Self {
        Attribute {
            name: pool.add_utf8(name),
            body,
        }
    }

    /// Read one attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the name or a known body is invalid.
    pub fn read(parser: &mut Parser, pool: &ConstantPool, options: &DecodeOptions) -> Result<Self> {
        let name = parser.read_be::<u16>()?;
        let data = parser.read_u4_block()?;
        let mut body_parser = Parser::new(data);
        let body = decode_body(pool.utf8(name)?, &mut body_parser, pool, options)?;
        if !matches!(body, AttributeBody::Raw(_)) && body_parser.has_more_data() {
            return Err(malformed_error!(
                "Attribute '{}' has {} trailing bytes",
                pool.utf8(name)?,
                data.len() - body_parser.pos()
            ));
        }
        Ok(Attribute { name, body })
    }

    /// Read a `u2`-counted attribute table.
    ///
    /// # Errors
    /// Returns the first attribute error.
    pub fn read_table(
        parser: &mut Parser,
        pool: &ConstantPool,
        options: &DecodeOptions,
    ) -> Result<Vec<Attribute>> {
        parser.read_u2_table(|p| Attribute::read(p, pool, options))
    }

    /// Append the encoded attribute, name and length included.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if a table outgrows its length field.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_be(out, self.name);
        let length_at = out.len();
        write_be(out, 0_u32);
        let start = out.len();
        encode_body(&self.body, out)?;
        let length = u32::try_from(out.len() - start)
            .map_err(|_| crate::Error::NotSupported("attribute longer than 4GiB".into()))?;
        patch_be_at(out, length_at, length)
    }

    /// Append a `u2`-counted attribute table.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for oversized tables.
    pub fn write_table(attributes: &[Attribute], out: &mut Vec<u8>) -> Result<()> {
        write_be(out, table_len(attributes.len())?);
        for attribute in attributes {
            attribute.write(out)?;
        }
        Ok(())
    }
}

fn table_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| crate::Error::NotSupported(format!("table of {len} entries")))
}

fn read_u2_list(parser: &mut Parser) -> Result<Vec<u16>> {
    parser.read_u2_table(|p| p.read_be::<u16>())
}

fn decode_body(
    name: &str,
    parser: &mut Parser,
    pool: &ConstantPool,
    options: &DecodeOptions,
) -> Result<AttributeBody> {
    Ok(match name {
        NAME::CODE => {
            let max_stack = parser.read_be()?;
            let max_locals = parser.read_be()?;
            let code = parser.read_u4_block()?.to_vec();
            if code.is_empty() || code.len() > usize::from(u16::MAX) {
                return Err(malformed_error!("Code length {} out of range", code.len()));
            }
            let exception_table = parser.read_u2_table(|p| {
                Ok(ExceptionEntry {
                    start_pc: p.read_be()?,
                    end_pc: p.read_be()?,
                    handler_pc: p.read_be()?,
                    catch_type: p.read_be()?,
                })
            })?;
            let attributes = Attribute::read_table(parser, pool, options)?;
            AttributeBody::Code(CodeAttribute {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes,
            })
        }
        NAME::CONSTANT_VALUE => AttributeBody::ConstantValue(parser.read_be()?),
        NAME::EXCEPTIONS => AttributeBody::Exceptions(read_u2_list(parser)?),
        NAME::SIGNATURE => AttributeBody::Signature(parser.read_be()?),
        NAME::SOURCE_FILE => AttributeBody::SourceFile(parser.read_be()?),
        NAME::METHOD_PARAMETERS => {
            let count = parser.read_be::<u8>()?;
            let mut parameters = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                parameters.push(MethodParameter {
                    name: parser.read_be()?,
                    access: parser.read_be()?,
                });
            }
            AttributeBody::MethodParameters(parameters)
        }
        NAME::RUNTIME_VISIBLE_ANNOTATIONS | NAME::RUNTIME_INVISIBLE_ANNOTATIONS => {
            AttributeBody::Annotations {
                visible: name == NAME::RUNTIME_VISIBLE_ANNOTATIONS,
                annotations: parser
                    .read_u2_table(|p| Annotation::read(p, options.max_annotation_depth))?,
            }
        }
        NAME::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
        | NAME::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
            let count = parser.read_be::<u8>()?;
            let mut parameters = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                parameters.push(
                    parser.read_u2_table(|p| Annotation::read(p, options.max_annotation_depth))?,
                );
            }
            AttributeBody::ParameterAnnotations {
                visible: name == NAME::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
                parameters,
            }
        }
        NAME::INNER_CLASSES => AttributeBody::InnerClasses(parser.read_u2_table(|p| {
            Ok(InnerClass {
                inner: p.read_be()?,
                outer: p.read_be()?,
                name: p.read_be()?,
                access: AccessFlags::from_bits_retain(p.read_be()?),
            })
        })?),
        NAME::ENCLOSING_METHOD => AttributeBody::EnclosingMethod {
            class: parser.read_be()?,
            method: parser.read_be()?,
        },
        NAME::NEST_HOST => AttributeBody::NestHost(parser.read_be()?),
        NAME::NEST_MEMBERS => AttributeBody::NestMembers(read_u2_list(parser)?),
        NAME::LINE_NUMBER_TABLE => AttributeBody::LineNumberTable(parser.read_u2_table(|p| {
            Ok(LineNumber {
                start_pc: p.read_be()?,
                line: p.read_be()?,
            })
        })?),
        NAME::LOCAL_VARIABLE_TABLE => {
            AttributeBody::LocalVariableTable(parser.read_u2_table(|p| {
                Ok(LocalVariable {
                    start_pc: p.read_be()?,
                    length: p.read_be()?,
                    name: p.read_be()?,
                    descriptor: p.read_be()?,
                    index: p.read_be()?,
                })
            })?)
        }
        NAME::WOVEN => AttributeBody::Woven(WovenStamp {
            injector: parser.read_be()?,
            modified: parser.read_be::<u8>()? != 0,
        }),
        _ => AttributeBody::Raw(parser.read_bytes(parser.len())?.to_vec()),
    })
}

fn encode_body(body: &AttributeBody, out: &mut Vec<u8>) -> Result<()> {
    match body {
        AttributeBody::Code(code) => {
            write_be(out, code.max_stack);
            write_be(out, code.max_locals);
            let len = u32::try_from(code.code.len())
                .map_err(|_| crate::Error::NotSupported("code longer than 4GiB".into()))?;
            write_be(out, len);
            out.extend_from_slice(&code.code);
            write_be(out, table_len(code.exception_table.len())?);
            for entry in &code.exception_table {
                write_be(out, entry.start_pc);
                write_be(out, entry.end_pc);
                write_be(out, entry.handler_pc);
                write_be(out, entry.catch_type);
            }
            Attribute::write_table(&code.attributes, out)?;
        }
        AttributeBody::ConstantValue(index)
        | AttributeBody::Signature(index)
        | AttributeBody::SourceFile(index)
        | AttributeBody::NestHost(index) => write_be(out, *index),
        AttributeBody::Exceptions(indices) | AttributeBody::NestMembers(indices) => {
            write_be(out, table_len(indices.len())?);
            for index in indices {
                write_be(out, *index);
            }
        }
        AttributeBody::MethodParameters(parameters) => {
            let count = u8::try_from(parameters.len()).map_err(|_| {
                crate::Error::NotSupported("more than 255 method parameters".into())
            })?;
            write_be(out, count);
            for parameter in parameters {
                write_be(out, parameter.name);
                write_be(out, parameter.access);
            }
        }
        AttributeBody::Annotations { annotations, .. } => {
            write_be(out, table_len(annotations.len())?);
            for annotation in annotations {
                annotation.write(out);
            }
        }
        AttributeBody::ParameterAnnotations { parameters, .. } => {
            let count = u8::try_from(parameters.len()).map_err(|_| {
                crate::Error::NotSupported("more than 255 annotated parameters".into())
            })?;
            write_be(out, count);
            for annotations in parameters {
                write_be(out, table_len(annotations.len())?);
                for annotation in annotations {
                    annotation.write(out);
                }
            }
        }
        AttributeBody::InnerClasses(entries) => {
            write_be(out, table_len(entries.len())?);
            for entry in entries {
                write_be(out, entry.inner);
                write_be(out, entry.outer);
                write_be(out, entry.name);
                write_be(out, entry.access.bits());
            }
        }
        AttributeBody::EnclosingMethod { class, method } => {
            write_be(out, *class);
            write_be(out, *method);
        }
        AttributeBody::LineNumberTable(entries) => {
            write_be(out, table_len(entries.len())?);
            for entry in entries {
                write_be(out, entry.start_pc);
                write_be(out, entry.line);
            }
        }
        AttributeBody::LocalVariableTable(entries) => {
            write_be(out, table_len(entries.len())?);
            for entry in entries {
                write_be(out, entry.start_pc);
                write_be(out, entry.length);
                write_be(out, entry.name);
                write_be(out, entry.descriptor);
                write_be(out, entry.index);
            }
        }
        AttributeBody::Woven(stamp) => {
            write_be(out, stamp.injector);
            write_be(out, u8::from(stamp.modified));
        }
        AttributeBody::Raw(bytes) => out.extend_from_slice(bytes),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(pool: &ConstantPool, attribute: &Attribute) -> Attribute {
        let mut out = Vec::new();
        attribute.write(&mut out).unwrap();
        Attribute::read(&mut Parser::new(&out), pool, &DecodeOptions::default()).unwrap()
    }

    #[test]
    fn code_with_nested_tables() {
        let mut pool = ConstantPool::new();
        let lines = Attribute::new(
            &mut pool,
            NAME::LINE_NUMBER_TABLE,
            AttributeBody::LineNumberTable(vec![LineNumber { start_pc: 0, line: 12 }]),
        );
        let code = Attribute::new(
            &mut pool,
            NAME::CODE,
            AttributeBody::Code(CodeAttribute {
                max_stack: 1,
                max_locals: 1,
                code: vec![0x2A, 0xB0],
                exception_table: vec![ExceptionEntry {
                    start_pc: 0,
                    end_pc: 1,
                    handler_pc: 1,
                    catch_type: 0,
                }],
                attributes: vec![lines],
            }),
        );
        assert_eq!(round_trip(&pool, &code), code);
    }

    #[test]
    fn unknown_attribute_stays_raw() {
        let mut pool = ConstantPool::new();
        let custom = Attribute::new(&mut pool, "Custom", AttributeBody::Raw(vec![1, 2, 3]));
        assert_eq!(round_trip(&pool, &custom), custom);
    }

    #[test]
    fn trailing_bytes_in_known_attribute() {
        let mut pool = ConstantPool::new();
        let name = pool.add_utf8(NAME::SIGNATURE);
        let mut out = Vec::new();
        write_be(&mut out, name);
        write_be(&mut out, 3_u32);
        out.extend_from_slice(&[0, 1, 9]);
        assert!(Attribute::read(&mut Parser::new(&out), &pool, &DecodeOptions::default()).is_err());
    }

    #[test]
    fn woven_stamp() {
        let mut pool = ConstantPool::new();
        let injector = pool.add_utf8("test");
        let stamp = Attribute::new(
            &mut pool,
            NAME::WOVEN,
            AttributeBody::Woven(WovenStamp {
                injector,
                modified: true,
            }),
        );
        assert_eq!(round_trip(&pool, &stamp), stamp);
    }
}
