//! JVM bytecode: opcodes, labelled instructions, method body codec and an assembler.
//!
//! Raw `Code` attributes live in [`crate::classfile::attributes::CodeAttribute`]. The rewrite
//! engine only decodes a body when it has to change it: [`MethodBody::decode`] turns the bytecode
//! into [`Insn`]s whose branch targets are [`Label`]s, the engine splices or rebuilds
//! instructions, and [`MethodBody::encode`] lays them out again. Methods that are not rewritten
//! keep their original bytes.
//!
//! # Key Components
//!
//! - [`Opcode`] - the opcode table with operand layouts
//! - [`Instruction`], [`Operand`], [`Label`] - the instruction model
//! - [`MethodBody`] - decode, encode and splice whole bodies
//! - [`CodeBuilder`] - stack-tracking assembler for generated code

mod assembler;
mod body;
mod instruction;
mod opcodes;

pub use assembler::CodeBuilder;
pub use body::{Handler, LocalRange, MethodBody};
pub use instruction::{Insn, Instruction, Label, Operand};
pub use opcodes::{Opcode, OperandKind};
