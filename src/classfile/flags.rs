//! Access and property flags for classes, fields, methods and inner classes.
//!
//! The class file format reuses bit positions with context dependent meaning (`0x0020` is
//! `ACC_SUPER` on a class and `ACC_SYNCHRONIZED` on a method). [`AccessFlags`] carries every name,
//! aliases included; callers pick the one that matches the member they inspect.

use bitflags::bitflags;

/// Mask of the three visibility bits.
pub const VISIBILITY_MASK: u16 = 0x0007;

bitflags! {
    /// Modifier bit-set shared by classes, fields and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Visible in the declaring class (and its nest)
        const PRIVATE = 0x0002;
        /// Visible in subclasses and the package
        const PROTECTED = 0x0004;
        /// Member belongs to the class rather than an instance
        const STATIC = 0x0008;
        /// No subclassing, overriding or reassignment
        const FINAL = 0x0010;
        /// Class: treat `invokespecial` with modern semantics
        const SUPER = 0x0020;
        /// Method: acquires the monitor
        const SYNCHRONIZED = 0x0020;
        /// Field: not cached
        const VOLATILE = 0x0040;
        /// Method: compiler-generated bridge
        const BRIDGE = 0x0040;
        /// Field: not serialized
        const TRANSIENT = 0x0080;
        /// Method: variable arity
        const VARARGS = 0x0080;
        /// Method: implemented outside the class file
        const NATIVE = 0x0100;
        /// Class: is an interface
        const INTERFACE = 0x0200;
        /// Class or method: no implementation
        const ABSTRACT = 0x0400;
        /// Method: strict floating point
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Class: is an annotation interface
        const ANNOTATION = 0x2000;
        /// Class or field: enum type or constant
        const ENUM = 0x4000;
        /// Class: is a module descriptor
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Flags with the visibility bits replaced by `visibility`.
    #[must_use]
    pub fn with_visibility(self, visibility: AccessFlags) -> Self {
        let cleared = self.bits() & !VISIBILITY_MASK;
        AccessFlags::from_bits_retain(cleared | (visibility.bits() & VISIBILITY_MASK))
    }

    /// Returns true if the `STATIC` bit is set.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// Returns true if neither `PUBLIC`, `PROTECTED` nor `PRIVATE` is set.
    #[must_use]
    pub fn is_package_private(self) -> bool {
        self.bits() & VISIBILITY_MASK == 0
    }
}
