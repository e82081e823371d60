//! Reference implementation of the class file codec.
//!
//! [`ClassFile`] is a faithful, index-preserving model of one class image: the constant pool is
//! kept slot-for-slot, members keep their name and descriptor indices, and attributes are either
//! decoded structurally ([`attributes::AttributeBody`]) or carried as raw bytes. Writing a class
//! that was not changed therefore reproduces the input, and rewriting only touches what the
//! rewrite engine replaced.
//!
//! # Key Components
//!
//! - [`ClassFile`] - the decoded class, with [`ClassFile::from_mem`], [`ClassFile::from_file`]
//!   and [`ClassFile::to_bytes`]
//! - [`constpool::ConstantPool`] - the pool with append-only interning
//! - [`attributes`] - attribute bodies, including `Code`
//! - [`annotations`] - raw annotation structures
//! - [`flags::AccessFlags`] - modifier bit-set
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::{ClassFile, flags::AccessFlags};
//!
//! let class = ClassFile::new("demo/Empty", Some("java/lang/Object"), AccessFlags::PUBLIC, 52);
//! let bytes = class.to_bytes()?;
//! let decoded = ClassFile::from_mem(bytes)?;
//! assert_eq!(decoded.name()?.internal(), "demo/Empty");
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod annotations;
pub mod attributes;
pub mod constpool;
pub mod flags;

use std::path::Path;

use crate::{
    classfile::{
        attributes::{Attribute, AttributeBody, CodeAttribute, DecodeOptions},
        constpool::ConstantPool,
        flags::AccessFlags,
    },
    file::{io::write_be, parser::Parser, MappedFile},
    signatures::ClassName,
    Result,
};

/// Magic number at the start of every class image.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Oldest major version accepted, JDK 1.1.
pub const MIN_MAJOR_VERSION: u16 = 45;

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    /// Declared modifiers
    pub access: AccessFlags,
    /// `Utf8` index of the name
    pub name: u16,
    /// `Utf8` index of the descriptor
    pub descriptor: u16,
    /// Member attributes
    pub attributes: Vec<Attribute>,
}

/// A declared field.
pub type FieldInfo = MemberInfo;

/// A declared method.
pub type MethodInfo = MemberInfo;

impl MemberInfo {
    /// Create a member, interning name and descriptor.
    pub fn new(pool: &mut ConstantPool, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        MemberInfo {
            access,
            name: pool.add_utf8(name),
            descriptor: pool.add_utf8(descriptor),
            attributes: Vec::new(),
        }
    }

    /// Member name.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the index is not a `Utf8` entry.
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.name)
    }

    /// Member descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the index is not a `Utf8` entry.
    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.descriptor)
    }

    /// The `Code` attribute, if the method has a body.
    #[must_use]
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match &a.body {
            AttributeBody::Code(code) => Some(code),
            _ => None,
        })
    }

    /// Mutable access to the `Code` attribute.
    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes.iter_mut().find_map(|a| match &mut a.body {
            AttributeBody::Code(code) => Some(code),
            _ => None,
        })
    }

    /// Text of the `Signature` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the index is not a `Utf8` entry.
    pub fn signature<'p>(&self, pool: &'p ConstantPool) -> Result<Option<&'p str>> {
        signature_of(&self.attributes, pool)
    }
}

pub(crate) fn signature_of<'p>(
    attributes: &[Attribute],
    pool: &'p ConstantPool,
) -> Result<Option<&'p str>> {
    for attribute in attributes {
        if let AttributeBody::Signature(index) = attribute.body {
            return Ok(Some(pool.utf8(index)?));
        }
    }
    Ok(None)
}

/// A decoded class image.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Class modifiers
    pub access: AccessFlags,
    /// `Class` index of this class
    pub this_class: u16,
    /// `Class` index of the superclass, 0 only for `java.lang.Object` and modules
    pub super_class: u16,
    /// `Class` indices of the direct superinterfaces
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<FieldInfo>,
    /// Declared methods
    pub methods: Vec<MethodInfo>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Create an empty class.
    #[must_use]
    pub fn new(name: &str, super_name: Option<&str>, access: AccessFlags, major_version: u16) -> Self {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.add_class(name);
        let super_class = super_name.map_or(0, |s| constant_pool.add_class(s));
        ClassFile {
            minor_version: 0,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Decode a class image with default limits.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the image cannot be decoded.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        Self::from_mem_with(&data, &DecodeOptions::default())
    }

    /// Decode a class image.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the image cannot be decoded.
    pub fn from_mem_with(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        Self::read(&mut Parser::new(data), options).map_err(crate::Error::into_malformed)
    }

    /// Map and decode a class file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::MalformedArtifact`] if it cannot be decoded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mapped = MappedFile::open(path)?;
        Self::from_mem_with(mapped.data(), &DecodeOptions::default())
    }

    fn read(parser: &mut Parser, options: &DecodeOptions) -> Result<Self> {
        if parser.is_empty() {
            return Err(malformed_error!("Empty class image"));
        }
        let magic = parser.read_be::<u32>()?;
        if magic != CLASS_MAGIC {
            return Err(malformed_error!("Invalid magic {:#010x}", magic));
        }

        let minor_version = parser.read_be()?;
        let major_version = parser.read_be()?;
        if major_version < MIN_MAJOR_VERSION {
            return Err(malformed_error!("Unsupported major version {}", major_version));
        }

        let constant_pool = ConstantPool::read(parser)?;
        let access = AccessFlags::from_bits_retain(parser.read_be()?);
        let this_class = parser.read_be()?;
        let super_class = parser.read_be()?;
        let interfaces = parser.read_u2_table(|p| p.read_be::<u16>())?;

        let pool = &constant_pool;
        let mut read_member = |p: &mut Parser| -> Result<MemberInfo> {
            let member = MemberInfo {
                access: AccessFlags::from_bits_retain(p.read_be()?),
                name: p.read_be()?,
                descriptor: p.read_be()?,
                attributes: Attribute::read_table(p, pool, options)?,
            };
            pool.utf8(member.name)?;
            pool.utf8(member.descriptor)?;
            Ok(member)
        };
        let fields = parser.read_u2_table(&mut read_member)?;
        let methods = parser.read_u2_table(&mut read_member)?;
        let attributes = Attribute::read_table(parser, pool, options)?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class attributes",
                parser.len() - parser.pos()
            ));
        }

        let class = ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.name()?;
        class.super_name()?;
        class.interface_names()?;
        Ok(class)
    }

    /// Encode the class image.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if a table outgrew its length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        write_be(&mut out, CLASS_MAGIC);
        write_be(&mut out, self.minor_version);
        write_be(&mut out, self.major_version);
        self.constant_pool.write(&mut out)?;
        write_be(&mut out, self.access.bits());
        write_be(&mut out, self.this_class);
        write_be(&mut out, self.super_class);

        write_be(&mut out, table_len(self.interfaces.len())?);
        for interface in &self.interfaces {
            write_be(&mut out, *interface);
        }
        for members in [&self.fields, &self.methods] {
            write_be(&mut out, table_len(members.len())?);
            for member in members {
                write_be(&mut out, member.access.bits());
                write_be(&mut out, member.name);
                write_be(&mut out, member.descriptor);
                Attribute::write_table(&member.attributes, &mut out)?;
            }
        }
        Attribute::write_table(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Name of this class.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if `this_class` is not a `Class` entry.
    pub fn name(&self) -> Result<ClassName> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Name of the superclass, `None` for `java.lang.Object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if `super_class` is not a `Class` entry.
    pub fn super_name(&self) -> Result<Option<ClassName>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Names of the direct superinterfaces.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if an index is not a `Class` entry.
    pub fn interface_names(&self) -> Result<Vec<ClassName>> {
        self.interfaces
            .iter()
            .map(|&index| self.constant_pool.class_name(index))
            .collect()
    }

    /// Text of the class `Signature` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the index is not a `Utf8` entry.
    pub fn signature(&self) -> Result<Option<&str>> {
        signature_of(&self.attributes, &self.constant_pool)
    }

    /// Index of the method with the given name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            m.name(&self.constant_pool).is_ok_and(|n| n == name)
                && m.descriptor(&self.constant_pool).is_ok_and(|d| d == descriptor)
        })
    }

    /// Index of the field with the given name.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name(&self.constant_pool).is_ok_and(|n| n == name))
    }

    /// Append a class attribute, interning its name.
    pub fn add_attribute(&mut self, name: &str, body: AttributeBody) {
        let attribute = Attribute::new(&mut self.constant_pool, name, body);
        self.attributes.push(attribute);
    }

    /// Replace the first class attribute named `name`, or append it.
    pub fn set_attribute(&mut self, name: &str, body: AttributeBody) {
        let name_index = self.constant_pool.add_utf8(name);
        match self.attributes.iter_mut().find(|a| a.name == name_index) {
            Some(existing) => existing.body = body,
            None => self.attributes.push(Attribute {
                name: name_index,
                body,
            }),
        }
    }
}

fn table_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| crate::Error::NotSupported(format!("table of {len} entries")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::attributes::NAME;

    #[test]
    fn empty_input_is_malformed() {
        assert!(ClassFile::from_mem(Vec::new()).unwrap_err().is_malformed());
        assert!(ClassFile::from_mem(vec![0xCA, 0xFE]).unwrap_err().is_malformed());
    }

    #[test]
    fn decodes_from_a_mapped_file() -> Result<()> {
        let bytes = crate::test::sample_class_bytes();
        let path = std::env::temp_dir().join(format!("classweave-{}.class", std::process::id()));
        std::fs::write(&path, &bytes)?;
        let from_disk = ClassFile::from_file(&path);
        std::fs::remove_file(&path)?;

        assert_eq!(from_disk?, ClassFile::from_mem(bytes)?);
        Ok(())
    }

    #[test]
    fn bad_magic() {
        let data = vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52];
        assert!(ClassFile::from_mem(data).unwrap_err().is_malformed());
    }

    #[test]
    fn write_read_identity() {
        let mut class = ClassFile::new("a/B", Some("java/lang/Object"), AccessFlags::PUBLIC, 55);
        let iface = class.constant_pool.add_class("java/lang/Runnable");
        class.interfaces.push(iface);
        let field = MemberInfo::new(&mut class.constant_pool, AccessFlags::PRIVATE, "x", "I");
        class.fields.push(field);
        class.add_attribute(NAME::SOURCE_FILE, AttributeBody::SourceFile(1));

        let bytes = class.to_bytes().unwrap();
        let decoded = ClassFile::from_mem(bytes.clone()).unwrap();
        assert_eq!(decoded, class);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
        assert_eq!(decoded.interface_names().unwrap()[0].internal(), "java/lang/Runnable");
        assert_eq!(decoded.find_field("x"), Some(0));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let class = ClassFile::new("a/B", Some("java/lang/Object"), AccessFlags::PUBLIC, 52);
        let mut bytes = class.to_bytes().unwrap();
        bytes.push(0);
        assert!(ClassFile::from_mem(bytes).unwrap_err().is_malformed());
    }

    #[test]
    fn bad_this_class_index() {
        let mut class = ClassFile::new("a/B", None, AccessFlags::PUBLIC, 52);
        class.this_class = 1; // the Utf8 entry, not the Class entry
        let bytes = class.to_bytes().unwrap();
        assert!(ClassFile::from_mem(bytes).unwrap_err().is_malformed());
    }
}
