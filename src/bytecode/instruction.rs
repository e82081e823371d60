//! Label-based instruction representation.
//!
//! Branch targets, exception ranges and debug ranges refer to [`Label`]s instead of byte offsets,
//! so instruction sequences can be spliced and extended without fixing up offsets by hand. Short
//! and long encodings of the same operation (`ldc`/`ldc_w`, `goto`/`goto_w`, `wide` forms) are
//! normalized on decode and chosen again on encode.

use std::fmt;

use crate::bytecode::opcodes::Opcode;

/// A position in a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// `bipush` value
    Byte(i8),
    /// `newarray` element type code
    ArrayType(u8),
    /// `sipush` value
    Short(i16),
    /// Local variable slot of loads, stores and `ret`
    Local(u16),
    /// `iinc` slot and increment
    Iinc {
        /// Local variable slot
        index: u16,
        /// Increment
        delta: i16,
    },
    /// Constant pool index of `ldc*`, field and method instructions, `new`, casts
    Constant(u16),
    /// `invokeinterface` method reference and argument slot count
    InvokeInterface {
        /// `InterfaceMethodref` index
        index: u16,
        /// Argument slots including the receiver
        count: u8,
    },
    /// `invokedynamic` call site index
    InvokeDynamic(u16),
    /// `multianewarray` class index and dimension count
    MultiANewArray {
        /// `Class` index
        index: u16,
        /// Dimensions to allocate
        dimensions: u8,
    },
    /// Branch target
    Branch(Label),
    /// `tableswitch` table
    TableSwitch {
        /// Target when out of range
        default: Label,
        /// Lowest key
        low: i32,
        /// Targets for `low..=low + targets.len() - 1`
        targets: Vec<Label>,
    },
    /// `lookupswitch` table
    LookupSwitch {
        /// Target when no key matches
        default: Label,
        /// Sorted key and target pairs
        pairs: Vec<(i32, Label)>,
    },
}

/// One instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode, normalized to the short form
    pub opcode: Opcode,
    /// Operand
    pub operand: Operand,
}

impl Instruction {
    /// An instruction without operand.
    #[must_use]
    pub fn simple(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Labels this instruction may transfer control to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Branch(label) => vec![*label],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, l)| *l))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Constant pool index referenced by this instruction, if any.
    #[must_use]
    pub fn constant_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Constant(index)
            | Operand::InvokeDynamic(index)
            | Operand::InvokeInterface { index, .. }
            | Operand::MultiANewArray { index, .. } => Some(index),
            _ => None,
        }
    }

    pub(crate) fn relabel(&mut self, offset: u32) {
        let shift = |label: &mut Label| label.0 += offset;
        match &mut self.operand {
            Operand::Branch(label) => shift(label),
            Operand::TableSwitch {
                default, targets, ..
            } => {
                shift(default);
                targets.iter_mut().for_each(shift);
            }
            Operand::LookupSwitch { default, pairs } => {
                shift(default);
                pairs.iter_mut().for_each(|(_, label)| shift(label));
            }
            _ => {}
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Byte(v) => write!(f, " {v}"),
            Operand::ArrayType(v) => write!(f, " {v}"),
            Operand::Short(v) => write!(f, " {v}"),
            Operand::Local(v) => write!(f, " {v}"),
            Operand::Iinc { index, delta } => write!(f, " {index} {delta}"),
            Operand::Constant(v) | Operand::InvokeDynamic(v) => write!(f, " #{v}"),
            Operand::InvokeInterface { index, count } => write!(f, " #{index} {count}"),
            Operand::MultiANewArray { index, dimensions } => write!(f, " #{index} {dimensions}"),
            Operand::Branch(label) => write!(f, " {label}"),
            Operand::TableSwitch {
                default,
                low,
                targets,
            } => write!(f, " {low}..{} default {default}", i64::from(*low) + targets.len() as i64 - 1),
            Operand::LookupSwitch { default, pairs } => {
                write!(f, " {} keys default {default}", pairs.len())
            }
        }
    }
}

/// An element of a method body: an instruction or a label marking the next instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Position marker
    Label(Label),
    /// Instruction
    Op(Instruction),
}

impl Insn {
    /// The instruction, if this is not a label.
    #[must_use]
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Insn::Op(instruction) => Some(instruction),
            Insn::Label(_) => None,
        }
    }
}

impl From<Instruction> for Insn {
    fn from(value: Instruction) -> Self {
        Insn::Op(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_targets_and_relabel() {
        let mut insn = Instruction {
            opcode: Opcode::Tableswitch,
            operand: Operand::TableSwitch {
                default: Label(0),
                low: 1,
                targets: vec![Label(1), Label(2)],
            },
        };
        assert_eq!(insn.targets(), vec![Label(0), Label(1), Label(2)]);
        insn.relabel(10);
        assert_eq!(insn.targets(), vec![Label(10), Label(11), Label(12)]);
        assert_eq!(insn.to_string(), "tableswitch 1..2 default L10");
    }

    #[test]
    fn constant_index() {
        let insn = Instruction {
            opcode: Opcode::Invokeinterface,
            operand: Operand::InvokeInterface { index: 7, count: 2 },
        };
        assert_eq!(insn.constant_index(), Some(7));
        assert_eq!(Instruction::simple(Opcode::Nop).constant_index(), None);
    }
}
