//! Method bodies: decoding `Code` attributes into labelled instructions and encoding them back.
//!
//! Decoding runs in two passes. The first pass walks the bytecode once, recording every
//! instruction start and every offset something refers to (branch and switch targets, exception
//! ranges, debug tables). The second pass turns each referenced offset into a [`Label`] placed
//! in front of the instruction it names. A reference that does not land on an instruction
//! boundary makes the body malformed.
//!
//! Encoding lays the instructions out again. `goto` and `jsr` whose displacement no longer fits
//! in 16 bits are widened and the layout is recomputed until no instruction changes size.
//! `LineNumberTable` and `LocalVariableTable` are remapped to the new offsets; other nested
//! attributes describe the old offsets and are dropped, `StackMapTable` included.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    bytecode::{
        instruction::{Insn, Instruction, Label, Operand},
        opcodes::{Opcode, OperandKind},
    },
    classfile::{
        attributes::{
            Attribute, AttributeBody, CodeAttribute, ExceptionEntry, LineNumber, LocalVariable,
            NAME,
        },
        constpool::ConstantPool,
    },
    file::{io::write_be, parser::Parser},
    Error::NotSupported,
    Result,
};

/// An exception handler over a label range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    /// First protected instruction
    pub start: Label,
    /// End of the protected range, exclusive
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// `Class` index of the caught type, 0 for any
    pub catch_type: u16,
}

/// A local variable debug entry over a label range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRange {
    /// Start of the live range
    pub start: Label,
    /// End of the live range, exclusive
    pub end: Label,
    /// `Utf8` index of the name
    pub name: u16,
    /// `Utf8` index of the descriptor
    pub descriptor: u16,
    /// Local slot
    pub index: u16,
}

/// A method body in labelled form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Instructions and labels in order
    pub code: Vec<Insn>,
    /// Exception handlers in priority order
    pub handlers: Vec<Handler>,
    /// Source line of the instruction following each label
    pub line_numbers: Vec<(Label, u16)>,
    /// Local variable debug ranges
    pub local_variables: Vec<LocalRange>,
    next_label: u32,
}

impl MethodBody {
    /// An empty body.
    #[must_use]
    pub fn new(max_locals: u16) -> Self {
        MethodBody {
            max_locals,
            ..MethodBody::default()
        }
    }

    /// Allocate a fresh label. The label is not placed until pushed as [`Insn::Label`].
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Number of labels allocated so far.
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.next_label
    }

    /// Iterate over the instructions, skipping labels.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.code.iter().filter_map(Insn::instruction)
    }

    /// Positions in [`MethodBody::code`] of every instruction matching `predicate`.
    pub fn positions<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&Instruction) -> bool,
    {
        self.code
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| insn.instruction().filter(|op| predicate(op)).map(|_| i))
            .collect()
    }

    /// Insert `fragment` before position `at`.
    ///
    /// Fragment labels are renumbered past this body's labels. Fragment handlers are placed in
    /// front of the existing ones so they take priority inside an enclosing protected range. The
    /// fragment must expect an empty operand stack at the insertion point.
    pub fn splice(&mut self, at: usize, fragment: MethodBody) {
        let offset = self.next_label;
        let shift = |label: Label| Label(label.0 + offset);

        let code = fragment.code.into_iter().map(|insn| match insn {
            Insn::Label(label) => Insn::Label(shift(label)),
            Insn::Op(mut op) => {
                op.relabel(offset);
                Insn::Op(op)
            }
        });
        self.code.splice(at..at, code);

        let mut handlers: Vec<Handler> = fragment
            .handlers
            .into_iter()
            .map(|h| Handler {
                start: shift(h.start),
                end: shift(h.end),
                handler: shift(h.handler),
                catch_type: h.catch_type,
            })
            .collect();
        handlers.append(&mut self.handlers);
        self.handlers = handlers;

        self.next_label += fragment.next_label;
        self.max_stack = self.max_stack.max(fragment.max_stack);
        self.max_locals = self.max_locals.max(fragment.max_locals);
    }

    /// Byte offset of every element of [`MethodBody::code`] after layout, plus the total size.
    ///
    /// # Errors
    /// Same as [`MethodBody::encode`].
    pub fn offsets(&self) -> Result<Vec<usize>> {
        Ok(Layout::compute(&self.code)?.offsets)
    }

    /// Decode a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] for unknown opcodes, truncated operands and
    /// references that do not land on an instruction boundary.
    pub fn decode(code: &CodeAttribute, pool: &ConstantPool) -> Result<Self> {
        let raw = decode_raw(&code.code)?;
        let end = code.code.len();

        let starts: BTreeSet<usize> = raw.iter().map(|(offset, _)| *offset).collect();
        let is_boundary = |offset: usize| offset == end || starts.contains(&offset);

        let mut referenced = BTreeSet::new();
        for (offset, insn) in &raw {
            for target in insn.targets() {
                let target = target.0 as usize;
                if target == end || !is_boundary(target) {
                    return Err(malformed_error!(
                        "Branch at {} targets {} which is not an instruction",
                        offset,
                        target
                    ));
                }
                referenced.insert(target);
            }
        }
        for entry in &code.exception_table {
            let (start, stop, handler) = (
                usize::from(entry.start_pc),
                usize::from(entry.end_pc),
                usize::from(entry.handler_pc),
            );
            let aligned = is_boundary(start) && is_boundary(stop) && is_boundary(handler);
            if start >= stop || handler == end || !aligned {
                return Err(malformed_error!(
                    "Exception range {}..{} -> {} is not aligned to instructions",
                    start,
                    stop,
                    handler
                ));
            }
            referenced.extend([start, stop, handler]);
        }

        let mut lines = Vec::new();
        let mut locals = Vec::new();
        for attribute in &code.attributes {
            match &attribute.body {
                AttributeBody::LineNumberTable(entries) => {
                    for entry in entries {
                        let pc = usize::from(entry.start_pc);
                        if pc != end && is_boundary(pc) {
                            referenced.insert(pc);
                            lines.push((pc, entry.line));
                        } else {
                            log::trace!("dropping line number entry at unaligned offset {pc}");
                        }
                    }
                }
                AttributeBody::LocalVariableTable(entries) => {
                    for entry in entries {
                        let start = usize::from(entry.start_pc);
                        let stop = start + usize::from(entry.length);
                        if is_boundary(start) && is_boundary(stop) {
                            referenced.extend([start, stop]);
                            locals.push((start, stop, *entry));
                        } else {
                            log::trace!("dropping local variable entry at {start}..{stop}");
                        }
                    }
                }
                _ => {}
            }
        }

        let labels: BTreeMap<usize, Label> = referenced
            .into_iter()
            .enumerate()
            .map(|(i, offset)| (offset, Label(i as u32)))
            .collect();
        let label_at = |offset: usize| labels[&offset];

        let mut body = MethodBody {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            code: Vec::with_capacity(raw.len() + labels.len()),
            handlers: Vec::with_capacity(code.exception_table.len()),
            line_numbers: Vec::with_capacity(lines.len()),
            local_variables: Vec::with_capacity(locals.len()),
            next_label: labels.len() as u32,
        };

        for (offset, mut insn) in raw {
            if let Some(label) = labels.get(&offset) {
                body.code.push(Insn::Label(*label));
            }
            map_labels(&mut insn, |label| label_at(label.0 as usize));
            body.code.push(Insn::Op(insn));
        }
        if let Some(label) = labels.get(&end) {
            body.code.push(Insn::Label(*label));
        }

        for entry in &code.exception_table {
            body.handlers.push(Handler {
                start: label_at(usize::from(entry.start_pc)),
                end: label_at(usize::from(entry.end_pc)),
                handler: label_at(usize::from(entry.handler_pc)),
                catch_type: entry.catch_type,
            });
        }
        body.line_numbers = lines.into_iter().map(|(pc, line)| (label_at(pc), line)).collect();
        body.local_variables = locals
            .into_iter()
            .map(|(start, stop, entry)| LocalRange {
                start: label_at(start),
                end: label_at(stop),
                name: entry.name,
                descriptor: entry.descriptor,
                index: entry.index,
            })
            .collect();

        if let Some(op) = body.instructions().find(|op| {
            op.constant_index()
                .is_some_and(|index| index == 0 || usize::from(index) >= pool.len())
        }) {
            return Err(malformed_error!("'{}' references an invalid constant", op));
        }

        Ok(body)
    }

    /// Encode into a `Code` attribute, interning debug table names in `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] when the body exceeds 65535 bytes or a conditional
    /// branch no longer reaches its target, and [`crate::Error::MalformedArtifact`] when a label
    /// is referenced but never placed.
    pub fn encode(&self, pool: &mut ConstantPool) -> Result<CodeAttribute> {
        let layout = Layout::compute(&self.code)?;
        let mut out = Vec::with_capacity(layout.size);

        for (i, insn) in self.code.iter().enumerate() {
            if let Insn::Op(op) = insn {
                let offset = layout.offsets[i];
                emit(op, offset, layout.long[i], &layout, &mut out)?;
                debug_assert_eq!(out.len(), layout.offsets[i + 1]);
            }
        }

        let pc = |label: Label| -> Result<u16> {
            layout
                .labels
                .get(&label)
                .map(|&offset| offset as u16)
                .ok_or_else(|| malformed_error!("Label {} is never placed", label))
        };

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let (start_pc, end_pc) = (pc(handler.start)?, pc(handler.end)?);
            if start_pc >= end_pc {
                continue;
            }
            exception_table.push(ExceptionEntry {
                start_pc,
                end_pc,
                handler_pc: pc(handler.handler)?,
                catch_type: handler.catch_type,
            });
        }

        let mut attributes = Vec::new();
        if !self.line_numbers.is_empty() {
            let mut entries = Vec::with_capacity(self.line_numbers.len());
            for (label, line) in &self.line_numbers {
                let start_pc = pc(*label)?;
                if usize::from(start_pc) < out.len() {
                    entries.push(LineNumber {
                        start_pc,
                        line: *line,
                    });
                }
            }
            attributes.push(Attribute::new(
                pool,
                NAME::LINE_NUMBER_TABLE,
                AttributeBody::LineNumberTable(entries),
            ));
        }
        if !self.local_variables.is_empty() {
            let mut entries = Vec::with_capacity(self.local_variables.len());
            for local in &self.local_variables {
                let (start_pc, end_pc) = (pc(local.start)?, pc(local.end)?);
                entries.push(LocalVariable {
                    start_pc,
                    length: end_pc.saturating_sub(start_pc),
                    name: local.name,
                    descriptor: local.descriptor,
                    index: local.index,
                });
            }
            attributes.push(Attribute::new(
                pool,
                NAME::LOCAL_VARIABLE_TABLE,
                AttributeBody::LocalVariableTable(entries),
            ));
        }

        Ok(CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: out,
            exception_table,
            attributes,
        })
    }
}

fn map_labels<F: Fn(Label) -> Label>(insn: &mut Instruction, f: F) {
    match &mut insn.operand {
        Operand::Branch(label) => *label = f(*label),
        Operand::TableSwitch {
            default, targets, ..
        } => {
            *default = f(*default);
            for target in targets {
                *target = f(*target);
            }
        }
        Operand::LookupSwitch { default, pairs } => {
            *default = f(*default);
            for (_, target) in pairs {
                *target = f(*target);
            }
        }
        _ => {}
    }
}

/// Decode the bytecode into instructions whose labels temporarily hold absolute offsets.
fn decode_raw(code: &[u8]) -> Result<Vec<(usize, Instruction)>> {
    let mut parser = Parser::new(code);
    let mut out = Vec::with_capacity(code.len() / 2);
    while parser.has_more_data() {
        let offset = parser.pos();
        let insn = decode_instruction(&mut parser, offset)?;
        out.push((offset, insn));
    }
    Ok(out)
}

fn branch_target(offset: usize, displacement: i32) -> Result<Label> {
    let target = offset as i64 + i64::from(displacement);
    if target < 0 || target > i64::from(u16::MAX) {
        return Err(malformed_error!("Branch at {} leaves the method", offset));
    }
    Ok(Label(target as u32))
}

fn decode_instruction(parser: &mut Parser, offset: usize) -> Result<Instruction> {
    let byte = parser.read_be::<u8>()?;
    let opcode = Opcode::from_repr(byte)
        .ok_or_else(|| malformed_error!("Unknown opcode {:#04x} at {}", byte, offset))?;

    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::I1 => Operand::Byte(parser.read_be()?),
        OperandKind::U1 => Operand::ArrayType(parser.read_be()?),
        OperandKind::I2 => Operand::Short(parser.read_be()?),
        OperandKind::Local => Operand::Local(u16::from(parser.read_be::<u8>()?)),
        OperandKind::Iinc => Operand::Iinc {
            index: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        OperandKind::Constant1 => Operand::Constant(u16::from(parser.read_be::<u8>()?)),
        OperandKind::Constant2 => Operand::Constant(parser.read_be()?),
        OperandKind::InvokeInterface => {
            let index = parser.read_be()?;
            let count = parser.read_be()?;
            parser.read_be::<u8>()?;
            Operand::InvokeInterface { index, count }
        }
        OperandKind::InvokeDynamic => {
            let index = parser.read_be()?;
            parser.read_be::<u16>()?;
            Operand::InvokeDynamic(index)
        }
        OperandKind::MultiANewArray => Operand::MultiANewArray {
            index: parser.read_be()?,
            dimensions: parser.read_be()?,
        },
        OperandKind::Branch2 => {
            Operand::Branch(branch_target(offset, i32::from(parser.read_be::<i16>()?))?)
        }
        OperandKind::Branch4 => Operand::Branch(branch_target(offset, parser.read_be::<i32>()?)?),
        OperandKind::TableSwitch => {
            parser.align_from(0, 4)?;
            let default = branch_target(offset, parser.read_be()?)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!("tableswitch at {} has high < low", offset));
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            if count * 4 > parser.len() - parser.pos() {
                return Err(out_of_bounds_error!());
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(branch_target(offset, parser.read_be()?)?);
            }
            Operand::TableSwitch {
                default,
                low,
                targets,
            }
        }
        OperandKind::LookupSwitch => {
            parser.align_from(0, 4)?;
            let default = branch_target(offset, parser.read_be()?)?;
            let count = parser.read_be::<i32>()?;
            let count = usize::try_from(count)
                .map_err(|_| malformed_error!("lookupswitch at {} has negative size", offset))?;
            if count * 8 > parser.len() - parser.pos() {
                return Err(out_of_bounds_error!());
            }
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, branch_target(offset, parser.read_be()?)?));
            }
            Operand::LookupSwitch { default, pairs }
        }
        OperandKind::Wide => {
            let byte = parser.read_be::<u8>()?;
            let inner = Opcode::from_repr(byte)
                .filter(|op| matches!(op.operand_kind(), OperandKind::Local | OperandKind::Iinc))
                .ok_or_else(|| malformed_error!("Invalid wide opcode {:#04x} at {}", byte, offset))?;
            let operand = if inner == Opcode::Iinc {
                Operand::Iinc {
                    index: parser.read_be()?,
                    delta: parser.read_be()?,
                }
            } else {
                Operand::Local(parser.read_be()?)
            };
            return Ok(Instruction {
                opcode: inner,
                operand,
            });
        }
    };

    let opcode = match opcode {
        Opcode::LdcW => Opcode::Ldc,
        Opcode::GotoW => Opcode::Goto,
        Opcode::JsrW => Opcode::Jsr,
        other => other,
    };
    Ok(Instruction { opcode, operand })
}

/// Offsets of every element of a body after layout.
struct Layout {
    /// Offset of `code[i]`, plus one trailing entry for the end
    offsets: Vec<usize>,
    /// Whether `code[i]` uses its 4-byte branch form
    long: Vec<bool>,
    labels: BTreeMap<Label, usize>,
    size: usize,
}

impl Layout {
    fn compute(code: &[Insn]) -> Result<Self> {
        let mut long = vec![false; code.len()];
        loop {
            let mut offsets = Vec::with_capacity(code.len() + 1);
            let mut labels = BTreeMap::new();
            let mut offset = 0;
            for (i, insn) in code.iter().enumerate() {
                offsets.push(offset);
                match insn {
                    Insn::Label(label) => {
                        labels.insert(*label, offset);
                    }
                    Insn::Op(op) => offset += size_of(op, offset, long[i]),
                }
            }
            offsets.push(offset);

            if offset > usize::from(u16::MAX) {
                return Err(NotSupported(format!(
                    "method body of {offset} bytes exceeds the 65535 byte limit"
                )));
            }

            let mut changed = false;
            for (i, insn) in code.iter().enumerate() {
                let Insn::Op(op) = insn else { continue };
                let Operand::Branch(target) = op.operand else {
                    continue;
                };
                if long[i] {
                    continue;
                }
                let Some(&to) = labels.get(&target) else {
                    return Err(malformed_error!("Label {} is never placed", target));
                };
                let displacement = to as i64 - offsets[i] as i64;
                if i16::try_from(displacement).is_err() {
                    if matches!(op.opcode, Opcode::Goto | Opcode::Jsr) {
                        long[i] = true;
                        changed = true;
                    } else {
                        return Err(NotSupported(format!(
                            "conditional branch '{}' spans {} bytes",
                            op.opcode, displacement
                        )));
                    }
                }
            }

            if !changed {
                return Ok(Layout {
                    offsets,
                    long,
                    labels,
                    size: offset,
                });
            }
        }
    }

    fn displacement(&self, from: usize, label: Label) -> Result<i32> {
        let to = self
            .labels
            .get(&label)
            .ok_or_else(|| malformed_error!("Label {} is never placed", label))?;
        Ok((*to as i64 - from as i64) as i32)
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn is_wide_local(index: u16) -> bool {
    index > u16::from(u8::MAX)
}

fn size_of(op: &Instruction, offset: usize, long: bool) -> usize {
    match &op.operand {
        Operand::None => 1,
        Operand::Byte(_) | Operand::ArrayType(_) => 2,
        Operand::Short(_) => 3,
        Operand::Local(index) => {
            if is_wide_local(*index) {
                4
            } else {
                2
            }
        }
        Operand::Iinc { index, delta } => {
            if is_wide_local(*index) || i8::try_from(*delta).is_err() {
                6
            } else {
                3
            }
        }
        Operand::Constant(index) => {
            if op.opcode == Opcode::Ldc && *index <= u16::from(u8::MAX) {
                2
            } else {
                3
            }
        }
        Operand::InvokeInterface { .. } | Operand::InvokeDynamic(_) => 5,
        Operand::MultiANewArray { .. } => 4,
        Operand::Branch(_) => {
            if long {
                5
            } else {
                3
            }
        }
        Operand::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len()
        }
        Operand::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
    }
}

fn emit(op: &Instruction, offset: usize, long: bool, layout: &Layout, out: &mut Vec<u8>) -> Result<()> {
    let opcode = op.opcode;
    match &op.operand {
        Operand::None => write_be(out, opcode.byte()),
        Operand::Byte(value) => {
            write_be(out, opcode.byte());
            write_be(out, *value);
        }
        Operand::ArrayType(value) => {
            write_be(out, opcode.byte());
            write_be(out, *value);
        }
        Operand::Short(value) => {
            write_be(out, opcode.byte());
            write_be(out, *value);
        }
        Operand::Local(index) => {
            if is_wide_local(*index) {
                write_be(out, Opcode::Wide.byte());
                write_be(out, opcode.byte());
                write_be(out, *index);
            } else {
                write_be(out, opcode.byte());
                write_be(out, *index as u8);
            }
        }
        Operand::Iinc { index, delta } => match i8::try_from(*delta) {
            Ok(short) if !is_wide_local(*index) => {
                write_be(out, opcode.byte());
                write_be(out, *index as u8);
                write_be(out, short);
            }
            _ => {
                write_be(out, Opcode::Wide.byte());
                write_be(out, opcode.byte());
                write_be(out, *index);
                write_be(out, *delta);
            }
        },
        Operand::Constant(index) => {
            if opcode == Opcode::Ldc {
                if let Ok(short) = u8::try_from(*index) {
                    write_be(out, Opcode::Ldc.byte());
                    write_be(out, short);
                } else {
                    write_be(out, Opcode::LdcW.byte());
                    write_be(out, *index);
                }
            } else {
                write_be(out, opcode.byte());
                write_be(out, *index);
            }
        }
        Operand::InvokeInterface { index, count } => {
            write_be(out, opcode.byte());
            write_be(out, *index);
            write_be(out, *count);
            write_be(out, 0_u8);
        }
        Operand::InvokeDynamic(index) => {
            write_be(out, opcode.byte());
            write_be(out, *index);
            write_be(out, 0_u16);
        }
        Operand::MultiANewArray { index, dimensions } => {
            write_be(out, opcode.byte());
            write_be(out, *index);
            write_be(out, *dimensions);
        }
        Operand::Branch(label) => {
            let displacement = layout.displacement(offset, *label)?;
            if long {
                let wide = match opcode {
                    Opcode::Jsr => Opcode::JsrW,
                    _ => Opcode::GotoW,
                };
                write_be(out, wide.byte());
                write_be(out, displacement);
            } else {
                write_be(out, opcode.byte());
                write_be(out, displacement as i16);
            }
        }
        Operand::TableSwitch {
            default,
            low,
            targets,
        } => {
            write_be(out, opcode.byte());
            out.resize(out.len() + switch_padding(offset), 0);
            write_be(out, layout.displacement(offset, *default)?);
            write_be(out, *low);
            let high = i64::from(*low) + targets.len() as i64 - 1;
            let high = i32::try_from(high)
                .map_err(|_| NotSupported("tableswitch range overflows".to_string()))?;
            write_be(out, high);
            for target in targets {
                write_be(out, layout.displacement(offset, *target)?);
            }
        }
        Operand::LookupSwitch { default, pairs } => {
            write_be(out, opcode.byte());
            out.resize(out.len() + switch_padding(offset), 0);
            write_be(out, layout.displacement(offset, *default)?);
            write_be(out, pairs.len() as i32);
            for (key, target) in pairs {
                write_be(out, *key);
                write_be(out, layout.displacement(offset, *target)?);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(code: Vec<u8>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 2,
            max_locals: 2,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    fn pool() -> ConstantPool {
        let mut pool = ConstantPool::new();
        pool.add_string("hello");
        pool
    }

    #[test]
    fn decode_branches_into_labels() {
        // iload_1; ifeq +5; iconst_1; ireturn; iconst_0; ireturn
        let code = vec![0x1B, 0x99, 0x00, 0x05, 0x04, 0xAC, 0x03, 0xAC];
        let body = MethodBody::decode(&attribute(code.clone()), &pool()).unwrap();
        assert_eq!(body.instructions().count(), 6);
        assert_eq!(body.label_count(), 1);
        assert!(matches!(body.code[1], Insn::Op(Instruction { opcode: Opcode::Ifeq, operand: Operand::Branch(Label(0)) })));
        assert_eq!(body.code[4], Insn::Label(Label(0)));

        let encoded = body.encode(&mut pool()).unwrap();
        assert_eq!(encoded.code, code);
    }

    #[test]
    fn unaligned_target_is_malformed() {
        // goto +1 lands inside the goto itself
        let code = vec![0xA7, 0x00, 0x01, 0xB1];
        let err = MethodBody::decode(&attribute(code), &pool()).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        let err = MethodBody::decode(&attribute(vec![0xCB]), &pool()).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn invalid_constant_is_malformed() {
        // ldc #9 with a two entry pool
        let err = MethodBody::decode(&attribute(vec![0x12, 0x09, 0xB0]), &pool()).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn wide_and_long_forms_normalize() {
        // wide iload 300; ldc_w #2; goto_w +5; return; return
        let code = vec![
            0xC4, 0x15, 0x01, 0x2C, 0x13, 0x00, 0x02, 0xC8, 0x00, 0x00, 0x00, 0x05, 0xB1, 0xB1,
        ];
        let body = MethodBody::decode(&attribute(code), &pool()).unwrap();
        let ops: Vec<_> = body.instructions().cloned().collect();
        assert_eq!(ops[0].operand, Operand::Local(300));
        assert_eq!(ops[1].opcode, Opcode::Ldc);
        assert_eq!(ops[2].opcode, Opcode::Goto);

        let encoded = body.encode(&mut pool()).unwrap();
        // wide iload stays wide, ldc and goto shrink
        assert_eq!(
            encoded.code,
            vec![0xC4, 0x15, 0x01, 0x2C, 0x12, 0x02, 0xA7, 0x00, 0x03, 0xB1, 0xB1]
        );
    }

    #[test]
    fn tableswitch_padding_follows_offset() {
        // nop; iload_1; tableswitch (pad 1) default L21 low 0 high 0 [L20]; return; return
        let mut code = vec![0x00, 0x1B, 0xAA, 0x00];
        code.extend_from_slice(&19_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&18_i32.to_be_bytes());
        code.extend_from_slice(&[0xB1, 0xB1]);
        assert_eq!(code.len(), 22);
        let body = MethodBody::decode(&attribute(code.clone()), &pool()).unwrap();
        assert_eq!(body.encode(&mut pool()).unwrap().code, code);

        // remove the nop: padding changes, targets follow
        let mut shifted = body.clone();
        shifted.code.remove(0);
        let encoded = shifted.encode(&mut pool()).unwrap();
        assert_eq!(encoded.code[1], 0xAA);
        assert_eq!(encoded.code.len(), 1 + 1 + 2 + 16 + 2);
        let reparsed = MethodBody::decode(&encoded, &pool()).unwrap();
        assert_eq!(reparsed.instructions().count(), 4);
    }

    #[test]
    fn goto_widens_when_out_of_range() {
        let mut body = MethodBody::new(1);
        let target = body.new_label();
        body.code.push(Insn::Op(Instruction {
            opcode: Opcode::Goto,
            operand: Operand::Branch(target),
        }));
        for _ in 0..40_000 {
            body.code.push(Insn::Op(Instruction::simple(Opcode::Nop)));
        }
        body.code.push(Insn::Label(target));
        body.code.push(Insn::Op(Instruction::simple(Opcode::Return)));

        let encoded = body.encode(&mut ConstantPool::new()).unwrap();
        assert_eq!(encoded.code[0], Opcode::GotoW.byte());
        assert_eq!(&encoded.code[1..5], &40_005_i32.to_be_bytes());
    }

    #[test]
    fn conditional_out_of_range_is_not_supported() {
        let mut body = MethodBody::new(1);
        let target = body.new_label();
        body.code.push(Insn::Op(Instruction {
            opcode: Opcode::Ifeq,
            operand: Operand::Branch(target),
        }));
        for _ in 0..40_000 {
            body.code.push(Insn::Op(Instruction::simple(Opcode::Nop)));
        }
        body.code.push(Insn::Label(target));
        body.code.push(Insn::Op(Instruction::simple(Opcode::Return)));
        assert!(matches!(
            body.encode(&mut ConstantPool::new()),
            Err(crate::Error::NotSupported(_))
        ));
    }

    #[test]
    fn handlers_and_debug_tables_are_remapped() {
        let mut pool = pool();
        let name = pool.add_utf8("x");
        let descriptor = pool.add_utf8("I");
        // iconst_0; istore_1; iload_1; ireturn; astore_1; iconst_m1; ireturn
        let mut code = attribute(vec![0x03, 0x3C, 0x1B, 0xAC, 0x4C, 0x02, 0xAC]);
        code.exception_table.push(ExceptionEntry {
            start_pc: 0,
            end_pc: 4,
            handler_pc: 4,
            catch_type: 0,
        });
        code.attributes.push(Attribute::new(
            &mut pool,
            NAME::LINE_NUMBER_TABLE,
            AttributeBody::LineNumberTable(vec![LineNumber { start_pc: 2, line: 7 }]),
        ));
        code.attributes.push(Attribute::new(
            &mut pool,
            NAME::LOCAL_VARIABLE_TABLE,
            AttributeBody::LocalVariableTable(vec![LocalVariable {
                start_pc: 2,
                length: 2,
                name,
                descriptor,
                index: 1,
            }]),
        ));
        code.attributes.push(Attribute::new(&mut pool, "StackMapTable", AttributeBody::Raw(vec![0, 0])));

        let mut body = MethodBody::decode(&code, &pool).unwrap();
        assert_eq!(body.handlers.len(), 1);
        assert_eq!(body.line_numbers.len(), 1);

        body.code.insert(0, Insn::Op(Instruction::simple(Opcode::Nop)));
        let encoded = body.encode(&mut pool).unwrap();
        assert_eq!(
            encoded.exception_table,
            vec![ExceptionEntry { start_pc: 1, end_pc: 5, handler_pc: 5, catch_type: 0 }]
        );
        assert_eq!(encoded.attributes.len(), 2);
        assert!(matches!(
            &encoded.attributes[0].body,
            AttributeBody::LineNumberTable(lines) if lines[0] == LineNumber { start_pc: 3, line: 7 }
        ));
        assert!(matches!(
            &encoded.attributes[1].body,
            AttributeBody::LocalVariableTable(vars) if vars[0].start_pc == 3 && vars[0].length == 2
        ));
    }

    #[test]
    fn splice_renumbers_fragment_labels() {
        let code = vec![0x1B, 0x99, 0x00, 0x04, 0xB1, 0xB1];
        let mut body = MethodBody::decode(&attribute(code), &pool()).unwrap();
        assert_eq!(body.label_count(), 1);

        let mut fragment = MethodBody::new(0);
        let skip = fragment.new_label();
        fragment.code.push(Insn::Op(Instruction {
            opcode: Opcode::Goto,
            operand: Operand::Branch(skip),
        }));
        fragment.code.push(Insn::Label(skip));
        fragment.max_stack = 5;

        let returns = body.positions(|op| op.opcode.is_return());
        body.splice(returns[0], fragment);
        assert_eq!(body.label_count(), 2);
        assert_eq!(body.max_stack, 5);
        assert!(body.code.contains(&Insn::Label(Label(1))));

        let encoded = body.encode(&mut pool()).unwrap();
        assert_eq!(
            encoded.code,
            vec![0x1B, 0x99, 0x00, 0x07, 0xA7, 0x00, 0x03, 0xB1, 0xB1]
        );
    }
}
