//! The JVM opcode table.
//!
//! [`Opcode`] lists every defined opcode; [`Opcode::operand_kind`] describes how its operand bytes
//! are laid out. Mnemonics come from the `strum` `Display` derive.

use strum::{Display, EnumCount, FromRepr, IntoStaticStr};

/// Layout of the operand bytes that follow an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Signed byte (`bipush`)
    I1,
    /// Unsigned byte (`newarray` element type)
    U1,
    /// Signed short (`sipush`)
    I2,
    /// Local variable slot, one byte or two after `wide`
    Local,
    /// `iinc` slot and increment
    Iinc,
    /// One byte constant pool index (`ldc`)
    Constant1,
    /// Two byte constant pool index
    Constant2,
    /// `invokeinterface` index, count and zero byte
    InvokeInterface,
    /// `invokedynamic` index and two zero bytes
    InvokeDynamic,
    /// `multianewarray` index and dimension count
    MultiANewArray,
    /// Two byte relative branch
    Branch2,
    /// Four byte relative branch
    Branch4,
    /// `tableswitch` padding and table
    TableSwitch,
    /// `lookupswitch` padding and pairs
    LookupSwitch,
    /// The `wide` prefix
    Wide,
}

/// Every opcode defined by the class file format.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    AconstNull = 0x01,
    IconstM1 = 0x02,
    #[strum(serialize = "iconst_0")]
    Iconst0 = 0x03,
    #[strum(serialize = "iconst_1")]
    Iconst1 = 0x04,
    #[strum(serialize = "iconst_2")]
    Iconst2 = 0x05,
    #[strum(serialize = "iconst_3")]
    Iconst3 = 0x06,
    #[strum(serialize = "iconst_4")]
    Iconst4 = 0x07,
    #[strum(serialize = "iconst_5")]
    Iconst5 = 0x08,
    #[strum(serialize = "lconst_0")]
    Lconst0 = 0x09,
    #[strum(serialize = "lconst_1")]
    Lconst1 = 0x0A,
    #[strum(serialize = "fconst_0")]
    Fconst0 = 0x0B,
    #[strum(serialize = "fconst_1")]
    Fconst1 = 0x0C,
    #[strum(serialize = "fconst_2")]
    Fconst2 = 0x0D,
    #[strum(serialize = "dconst_0")]
    Dconst0 = 0x0E,
    #[strum(serialize = "dconst_1")]
    Dconst1 = 0x0F,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,
    #[strum(serialize = "ldc2_w")]
    Ldc2W = 0x14,
    Iload = 0x15,
    Lload = 0x16,
    Fload = 0x17,
    Dload = 0x18,
    Aload = 0x19,
    #[strum(serialize = "iload_0")]
    Iload0 = 0x1A,
    #[strum(serialize = "iload_1")]
    Iload1 = 0x1B,
    #[strum(serialize = "iload_2")]
    Iload2 = 0x1C,
    #[strum(serialize = "iload_3")]
    Iload3 = 0x1D,
    #[strum(serialize = "lload_0")]
    Lload0 = 0x1E,
    #[strum(serialize = "lload_1")]
    Lload1 = 0x1F,
    #[strum(serialize = "lload_2")]
    Lload2 = 0x20,
    #[strum(serialize = "lload_3")]
    Lload3 = 0x21,
    #[strum(serialize = "fload_0")]
    Fload0 = 0x22,
    #[strum(serialize = "fload_1")]
    Fload1 = 0x23,
    #[strum(serialize = "fload_2")]
    Fload2 = 0x24,
    #[strum(serialize = "fload_3")]
    Fload3 = 0x25,
    #[strum(serialize = "dload_0")]
    Dload0 = 0x26,
    #[strum(serialize = "dload_1")]
    Dload1 = 0x27,
    #[strum(serialize = "dload_2")]
    Dload2 = 0x28,
    #[strum(serialize = "dload_3")]
    Dload3 = 0x29,
    #[strum(serialize = "aload_0")]
    Aload0 = 0x2A,
    #[strum(serialize = "aload_1")]
    Aload1 = 0x2B,
    #[strum(serialize = "aload_2")]
    Aload2 = 0x2C,
    #[strum(serialize = "aload_3")]
    Aload3 = 0x2D,
    Iaload = 0x2E,
    Laload = 0x2F,
    Faload = 0x30,
    Daload = 0x31,
    Aaload = 0x32,
    Baload = 0x33,
    Caload = 0x34,
    Saload = 0x35,
    Istore = 0x36,
    Lstore = 0x37,
    Fstore = 0x38,
    Dstore = 0x39,
    Astore = 0x3A,
    #[strum(serialize = "istore_0")]
    Istore0 = 0x3B,
    #[strum(serialize = "istore_1")]
    Istore1 = 0x3C,
    #[strum(serialize = "istore_2")]
    Istore2 = 0x3D,
    #[strum(serialize = "istore_3")]
    Istore3 = 0x3E,
    #[strum(serialize = "lstore_0")]
    Lstore0 = 0x3F,
    #[strum(serialize = "lstore_1")]
    Lstore1 = 0x40,
    #[strum(serialize = "lstore_2")]
    Lstore2 = 0x41,
    #[strum(serialize = "lstore_3")]
    Lstore3 = 0x42,
    #[strum(serialize = "fstore_0")]
    Fstore0 = 0x43,
    #[strum(serialize = "fstore_1")]
    Fstore1 = 0x44,
    #[strum(serialize = "fstore_2")]
    Fstore2 = 0x45,
    #[strum(serialize = "fstore_3")]
    Fstore3 = 0x46,
    #[strum(serialize = "dstore_0")]
    Dstore0 = 0x47,
    #[strum(serialize = "dstore_1")]
    Dstore1 = 0x48,
    #[strum(serialize = "dstore_2")]
    Dstore2 = 0x49,
    #[strum(serialize = "dstore_3")]
    Dstore3 = 0x4A,
    #[strum(serialize = "astore_0")]
    Astore0 = 0x4B,
    #[strum(serialize = "astore_1")]
    Astore1 = 0x4C,
    #[strum(serialize = "astore_2")]
    Astore2 = 0x4D,
    #[strum(serialize = "astore_3")]
    Astore3 = 0x4E,
    Iastore = 0x4F,
    Lastore = 0x50,
    Fastore = 0x51,
    Dastore = 0x52,
    Aastore = 0x53,
    Bastore = 0x54,
    Castore = 0x55,
    Sastore = 0x56,
    Pop = 0x57,
    Pop2 = 0x58,
    Dup = 0x59,
    DupX1 = 0x5A,
    DupX2 = 0x5B,
    Dup2 = 0x5C,
    #[strum(serialize = "dup2_x1")]
    Dup2X1 = 0x5D,
    #[strum(serialize = "dup2_x2")]
    Dup2X2 = 0x5E,
    Swap = 0x5F,
    Iadd = 0x60,
    Ladd = 0x61,
    Fadd = 0x62,
    Dadd = 0x63,
    Isub = 0x64,
    Lsub = 0x65,
    Fsub = 0x66,
    Dsub = 0x67,
    Imul = 0x68,
    Lmul = 0x69,
    Fmul = 0x6A,
    Dmul = 0x6B,
    Idiv = 0x6C,
    Ldiv = 0x6D,
    Fdiv = 0x6E,
    Ddiv = 0x6F,
    Irem = 0x70,
    Lrem = 0x71,
    Frem = 0x72,
    Drem = 0x73,
    Ineg = 0x74,
    Lneg = 0x75,
    Fneg = 0x76,
    Dneg = 0x77,
    Ishl = 0x78,
    Lshl = 0x79,
    Ishr = 0x7A,
    Lshr = 0x7B,
    Iushr = 0x7C,
    Lushr = 0x7D,
    Iand = 0x7E,
    Land = 0x7F,
    Ior = 0x80,
    Lor = 0x81,
    Ixor = 0x82,
    Lxor = 0x83,
    Iinc = 0x84,
    #[strum(serialize = "i2l")]
    I2l = 0x85,
    #[strum(serialize = "i2f")]
    I2f = 0x86,
    #[strum(serialize = "i2d")]
    I2d = 0x87,
    #[strum(serialize = "l2i")]
    L2i = 0x88,
    #[strum(serialize = "l2f")]
    L2f = 0x89,
    #[strum(serialize = "l2d")]
    L2d = 0x8A,
    #[strum(serialize = "f2i")]
    F2i = 0x8B,
    #[strum(serialize = "f2l")]
    F2l = 0x8C,
    #[strum(serialize = "f2d")]
    F2d = 0x8D,
    #[strum(serialize = "d2i")]
    D2i = 0x8E,
    #[strum(serialize = "d2l")]
    D2l = 0x8F,
    #[strum(serialize = "d2f")]
    D2f = 0x90,
    #[strum(serialize = "i2b")]
    I2b = 0x91,
    #[strum(serialize = "i2c")]
    I2c = 0x92,
    #[strum(serialize = "i2s")]
    I2s = 0x93,
    Lcmp = 0x94,
    Fcmpl = 0x95,
    Fcmpg = 0x96,
    Dcmpl = 0x97,
    Dcmpg = 0x98,
    Ifeq = 0x99,
    Ifne = 0x9A,
    Iflt = 0x9B,
    Ifge = 0x9C,
    Ifgt = 0x9D,
    Ifle = 0x9E,
    IfIcmpeq = 0x9F,
    IfIcmpne = 0xA0,
    IfIcmplt = 0xA1,
    IfIcmpge = 0xA2,
    IfIcmpgt = 0xA3,
    IfIcmple = 0xA4,
    IfAcmpeq = 0xA5,
    IfAcmpne = 0xA6,
    Goto = 0xA7,
    Jsr = 0xA8,
    Ret = 0xA9,
    Tableswitch = 0xAA,
    Lookupswitch = 0xAB,
    Ireturn = 0xAC,
    Lreturn = 0xAD,
    Freturn = 0xAE,
    Dreturn = 0xAF,
    Areturn = 0xB0,
    Return = 0xB1,
    Getstatic = 0xB2,
    Putstatic = 0xB3,
    Getfield = 0xB4,
    Putfield = 0xB5,
    Invokevirtual = 0xB6,
    Invokespecial = 0xB7,
    Invokestatic = 0xB8,
    Invokeinterface = 0xB9,
    Invokedynamic = 0xBA,
    New = 0xBB,
    Newarray = 0xBC,
    Anewarray = 0xBD,
    Arraylength = 0xBE,
    Athrow = 0xBF,
    Checkcast = 0xC0,
    Instanceof = 0xC1,
    Monitorenter = 0xC2,
    Monitorexit = 0xC3,
    Wide = 0xC4,
    Multianewarray = 0xC5,
    Ifnull = 0xC6,
    Ifnonnull = 0xC7,
    GotoW = 0xC8,
    JsrW = 0xC9,
}

impl Opcode {
    /// Raw opcode byte.
    #[must_use]
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Operand layout of this opcode.
    #[must_use]
    pub fn operand_kind(self) -> OperandKind {
        match self as u8 {
            0x10 => OperandKind::I1,
            0x11 => OperandKind::I2,
            0x12 => OperandKind::Constant1,
            0x13 | 0x14 => OperandKind::Constant2,
            0x15..=0x19 | 0x36..=0x3A | 0xA9 => OperandKind::Local,
            0x84 => OperandKind::Iinc,
            0x99..=0xA8 | 0xC6 | 0xC7 => OperandKind::Branch2,
            0xC8 | 0xC9 => OperandKind::Branch4,
            0xAA => OperandKind::TableSwitch,
            0xAB => OperandKind::LookupSwitch,
            0xB2..=0xB8 | 0xBB | 0xBD | 0xC0 | 0xC1 => OperandKind::Constant2,
            0xB9 => OperandKind::InvokeInterface,
            0xBA => OperandKind::InvokeDynamic,
            0xBC => OperandKind::U1,
            0xC4 => OperandKind::Wide,
            0xC5 => OperandKind::MultiANewArray,
            _ => OperandKind::None,
        }
    }

    /// Returns true for the `*return` family.
    #[must_use]
    pub fn is_return(self) -> bool {
        (0xAC..=0xB1).contains(&(self as u8))
    }

    /// Returns true for instructions after which control never falls through.
    #[must_use]
    pub fn ends_flow(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Opcode::Athrow
                    | Opcode::Goto
                    | Opcode::GotoW
                    | Opcode::Ret
                    | Opcode::Tableswitch
                    | Opcode::Lookupswitch
            )
    }
}
