//! The constant pool.
//!
//! Entries are kept index-for-index as decoded, so every index stored anywhere else in the class
//! image (instruction operands, attribute bodies the codec does not understand) stays valid when
//! the class is re-encoded. New entries are only ever appended, and the `add_*` methods reuse an
//! existing equal entry before appending.

use std::collections::HashMap;

use crate::{
    file::parser::{decode_modified_utf8, encode_modified_utf8, Parser},
    file::io::write_be,
    signatures::ClassName,
    Result,
};

/// Constant pool tags as defined by the class file format.
#[allow(non_snake_case, missing_docs)]
pub mod TAG {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// One constant pool entry.
///
/// Floats and doubles are stored as raw bits so that entries compare and hash bit-exactly (NaN
/// payloads and negative zero survive a round trip).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Slot 0, and the second slot occupied by every `Long`/`Double`
    Unusable,
    /// Modified UTF-8 text
    Utf8(String),
    /// `int` literal
    Integer(i32),
    /// `float` literal bits
    Float(u32),
    /// `long` literal
    Long(i64),
    /// `double` literal bits
    Double(u64),
    /// Class reference, index of the internal name
    Class(u16),
    /// String literal, index of the text
    String(u16),
    /// Field reference
    FieldRef {
        /// `Class` index
        class: u16,
        /// `NameAndType` index
        name_and_type: u16,
    },
    /// Class method reference
    MethodRef {
        /// `Class` index
        class: u16,
        /// `NameAndType` index
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// `Class` index
        class: u16,
        /// `NameAndType` index
        name_and_type: u16,
    },
    /// Member name and descriptor
    NameAndType {
        /// `Utf8` index of the name
        name: u16,
        /// `Utf8` index of the descriptor
        descriptor: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind, 1 to 9
        kind: u8,
        /// Member reference index
        reference: u16,
    },
    /// Method type, index of the descriptor
    MethodType(u16),
    /// Dynamically computed constant
    Dynamic {
        /// `BootstrapMethods` index
        bootstrap: u16,
        /// `NameAndType` index
        name_and_type: u16,
    },
    /// `invokedynamic` call site
    InvokeDynamic {
        /// `BootstrapMethods` index
        bootstrap: u16,
        /// `NameAndType` index
        name_and_type: u16,
    },
    /// Module, index of the name
    Module(u16),
    /// Package, index of the name
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved member reference: owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Declaring class
    pub owner: ClassName,
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
    /// True for `InterfaceMethodref`
    pub interface: bool,
}

/// Loadable constant values, as pushed by `ldc` or stored in `ConstantValue`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// `int` (also boolean, byte, char and short fields)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `java.lang.String`
    String(String),
}

/// The constant pool of one class.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ConstantPool {
    /// An empty pool holding only the unusable slot 0.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Read the pool count and entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] for unknown tags or truncated entries.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count is zero"));
        }

        let mut pool = ConstantPool::new();
        while pool.entries.len() < usize::from(count) {
            let tag = parser.read_be::<u8>()?;
            let constant = match tag {
                TAG::UTF8 => {
                    let len = usize::from(parser.read_be::<u16>()?);
                    Constant::Utf8(decode_modified_utf8(parser.read_bytes(len)?)?)
                }
                TAG::INTEGER => Constant::Integer(parser.read_be()?),
                TAG::FLOAT => Constant::Float(parser.read_be()?),
                TAG::LONG => Constant::Long(parser.read_be()?),
                TAG::DOUBLE => Constant::Double(parser.read_be()?),
                TAG::CLASS => Constant::Class(parser.read_be()?),
                TAG::STRING => Constant::String(parser.read_be()?),
                TAG::FIELDREF => Constant::FieldRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                TAG::METHODREF => Constant::MethodRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                TAG::INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                TAG::NAME_AND_TYPE => Constant::NameAndType {
                    name: parser.read_be()?,
                    descriptor: parser.read_be()?,
                },
                TAG::METHOD_HANDLE => Constant::MethodHandle {
                    kind: parser.read_be()?,
                    reference: parser.read_be()?,
                },
                TAG::METHOD_TYPE => Constant::MethodType(parser.read_be()?),
                TAG::DYNAMIC => Constant::Dynamic {
                    bootstrap: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                TAG::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                TAG::MODULE => Constant::Module(parser.read_be()?),
                TAG::PACKAGE => Constant::Package(parser.read_be()?),
                _ => {
                    return Err(malformed_error!(
                        "Unknown constant pool tag {} at index {}",
                        tag,
                        pool.entries.len()
                    ))
                }
            };
            pool.push_raw(constant);
        }

        if pool.entries.len() != usize::from(count) {
            return Err(malformed_error!(
                "Wide constant overruns the constant pool count {}",
                count
            ));
        }
        Ok(pool)
    }

    /// Append the encoded pool, count included.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool outgrew the `u2` index space.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| crate::Error::NotSupported("constant pool exceeds 65535 entries".into()))?;
        write_be(out, count);

        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(text) => {
                    let bytes = encode_modified_utf8(text);
                    let len = u16::try_from(bytes.len()).map_err(|_| {
                        crate::Error::NotSupported("UTF-8 constant longer than 65535 bytes".into())
                    })?;
                    write_be(out, TAG::UTF8);
                    write_be(out, len);
                    out.extend_from_slice(&bytes);
                }
                Constant::Integer(value) => {
                    write_be(out, TAG::INTEGER);
                    write_be(out, *value);
                }
                Constant::Float(bits) => {
                    write_be(out, TAG::FLOAT);
                    write_be(out, *bits);
                }
                Constant::Long(value) => {
                    write_be(out, TAG::LONG);
                    write_be(out, *value);
                }
                Constant::Double(bits) => {
                    write_be(out, TAG::DOUBLE);
                    write_be(out, *bits);
                }
                Constant::Class(index) => {
                    write_be(out, TAG::CLASS);
                    write_be(out, *index);
                }
                Constant::String(index) => {
                    write_be(out, TAG::STRING);
                    write_be(out, *index);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    write_be(out, TAG::FIELDREF);
                    write_be(out, *class);
                    write_be(out, *name_and_type);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    write_be(out, TAG::METHODREF);
                    write_be(out, *class);
                    write_be(out, *name_and_type);
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    write_be(out, TAG::INTERFACE_METHODREF);
                    write_be(out, *class);
                    write_be(out, *name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    write_be(out, TAG::NAME_AND_TYPE);
                    write_be(out, *name);
                    write_be(out, *descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    write_be(out, TAG::METHOD_HANDLE);
                    write_be(out, *kind);
                    write_be(out, *reference);
                }
                Constant::MethodType(index) => {
                    write_be(out, TAG::METHOD_TYPE);
                    write_be(out, *index);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    write_be(out, TAG::DYNAMIC);
                    write_be(out, *bootstrap);
                    write_be(out, *name_and_type);
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    write_be(out, TAG::INVOKE_DYNAMIC);
                    write_be(out, *bootstrap);
                    write_be(out, *name_and_type);
                }
                Constant::Module(index) => {
                    write_be(out, TAG::MODULE);
                    write_be(out, *index);
                }
                Constant::Package(index) => {
                    write_be(out, TAG::PACKAGE);
                    write_be(out, *index);
                }
            }
        }
        Ok(())
    }

    fn push_raw(&mut self, constant: Constant) -> u16 {
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.entry(constant.clone()).or_insert(index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        index
    }

    fn intern(&mut self, constant: Constant) -> u16 {
        if let Some(&index) = self.lookup.get(&constant) {
            return index;
        }
        self.push_raw(constant)
    }

    /// Number of slots, slot 0 included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the pool holds nothing but slot 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] for index 0, unusable slots and out of range indices.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {} (pool size {})",
                index,
                self.entries.len()
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Iterate over `(index, entry)` for every usable slot.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Text of a `Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not `Utf8`.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            other => Err(malformed_error!("Expected Utf8 at {} but found {:?}", index, other)),
        }
    }

    /// Name of a `Class` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not `Class`.
    pub fn class_name(&self, index: u16) -> Result<ClassName> {
        match self.get(index)? {
            Constant::Class(name) => Ok(ClassName::new(self.utf8(*name)?)),
            other => Err(malformed_error!("Expected Class at {} but found {:?}", index, other)),
        }
    }

    /// Name and descriptor of a `NameAndType` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not `NameAndType`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at {} but found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (class, name_and_type, interface) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at {} but found {:?}",
                    index,
                    other
                ))
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    /// A loadable literal at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not a literal.
    pub fn literal(&self, index: u16) -> Result<LiteralValue> {
        Ok(match self.get(index)? {
            Constant::Integer(value) => LiteralValue::Int(*value),
            Constant::Long(value) => LiteralValue::Long(*value),
            Constant::Float(bits) => LiteralValue::Float(f32::from_bits(*bits)),
            Constant::Double(bits) => LiteralValue::Double(f64::from_bits(*bits)),
            Constant::String(text) => LiteralValue::String(self.utf8(*text)?.to_string()),
            other => {
                return Err(malformed_error!(
                    "Expected literal at {} but found {:?}",
                    index,
                    other
                ))
            }
        })
    }

    /// Intern a `Utf8` entry.
    pub fn add_utf8(&mut self, text: &str) -> u16 {
        self.intern(Constant::Utf8(text.to_string()))
    }

    /// Intern a `Class` entry. Array types are named by their descriptor.
    pub fn add_class(&mut self, internal_name: &str) -> u16 {
        let name = self.add_utf8(internal_name);
        self.intern(Constant::Class(name))
    }

    /// Point the `Class` entry at `index` to `internal_name`.
    ///
    /// Every reference to the entry follows the rename; other entries naming the old class keep
    /// their text.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the entry is not `Class`.
    pub fn set_class_name(&mut self, index: u16, internal_name: &str) -> Result<()> {
        if !matches!(self.get(index)?, Constant::Class(_)) {
            return Err(malformed_error!("Expected Class at {}", index));
        }
        let name = self.add_utf8(internal_name);
        let renamed = Constant::Class(name);
        let old = std::mem::replace(&mut self.entries[usize::from(index)], renamed.clone());
        if self.lookup.get(&old) == Some(&index) {
            self.lookup.remove(&old);
        }
        self.lookup.entry(renamed).or_insert(index);
        Ok(())
    }

    /// Intern a `String` literal.
    pub fn add_string(&mut self, text: &str) -> u16 {
        let text = self.add_utf8(text);
        self.intern(Constant::String(text))
    }

    /// Intern an `Integer` literal.
    pub fn add_integer(&mut self, value: i32) -> u16 {
        self.intern(Constant::Integer(value))
    }

    /// Intern a `Float` literal.
    pub fn add_float(&mut self, value: f32) -> u16 {
        self.intern(Constant::Float(value.to_bits()))
    }

    /// Intern a `Long` literal.
    pub fn add_long(&mut self, value: i64) -> u16 {
        self.intern(Constant::Long(value))
    }

    /// Intern a `Double` literal.
    pub fn add_double(&mut self, value: f64) -> u16 {
        self.intern(Constant::Double(value.to_bits()))
    }

    /// Intern any literal.
    pub fn add_literal(&mut self, value: &LiteralValue) -> u16 {
        match value {
            LiteralValue::Int(v) => self.add_integer(*v),
            LiteralValue::Long(v) => self.add_long(*v),
            LiteralValue::Float(v) => self.add_float(*v),
            LiteralValue::Double(v) => self.add_double(*v),
            LiteralValue::String(v) => self.add_string(v),
        }
    }

    /// Intern a `NameAndType` entry.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.add_utf8(name);
        let descriptor = self.add_utf8(descriptor);
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Intern a `Fieldref` entry.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.add_class(owner);
        let name_and_type = self.add_name_and_type(name, descriptor);
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Intern a `Methodref` or `InterfaceMethodref` entry.
    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> u16 {
        let class = self.add_class(owner);
        let name_and_type = self.add_name_and_type(name, descriptor);
        if interface {
            self.intern(Constant::InterfaceMethodRef {
                class,
                name_and_type,
            })
        } else {
            self.intern(Constant::MethodRef {
                class,
                name_and_type,
            })
        }
    }
}
