//! Fluent assembler for generated method bodies.
//!
//! [`CodeBuilder`] appends instructions to a [`MethodBody`] while tracking the operand stack
//! depth, so the finished body carries correct `max_stack` and `max_locals` values. Every
//! emitting method returns `Result<&mut Self>` and fails on stack underflow, which lets generated
//! sequences chain with `?`:
//!
//! ```rust
//! use classweave::bytecode::CodeBuilder;
//! use classweave::classfile::constpool::ConstantPool;
//! use classweave::signatures::TypeSignature;
//!
//! let mut pool = ConstantPool::new();
//! let mut asm = CodeBuilder::new(&mut pool, 1);
//! asm.push_int(42)?
//!     .box_value(&TypeSignature::Int)?
//!     .return_value(&TypeSignature::object())?;
//! let body = asm.finish();
//! assert_eq!(body.max_stack, 1);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{
        body::{Handler, MethodBody},
        instruction::{Insn, Instruction, Label, Operand},
        opcodes::Opcode,
    },
    classfile::constpool::{ConstantPool, LiteralValue},
    signatures::{ClassName, MethodDescriptor, TypeSignature},
    Error::NotSupported,
    Result,
};

/// Method body assembler with operand stack tracking.
pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    body: MethodBody,
    depth: u16,
    max_depth: u16,
    next_local: u16,
    label_depths: HashMap<Label, u16>,
    reachable: bool,
}

impl<'p> CodeBuilder<'p> {
    /// Start a body whose first `locals` slots hold the receiver and parameters.
    pub fn new(pool: &'p mut ConstantPool, locals: u16) -> Self {
        CodeBuilder {
            pool,
            body: MethodBody::new(locals),
            depth: 0,
            max_depth: 0,
            next_local: locals,
            label_depths: HashMap::new(),
            reachable: true,
        }
    }

    /// The constant pool instructions are interned into.
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut *self.pool
    }

    /// Current operand stack depth in slots.
    #[must_use]
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Finish the body.
    #[must_use]
    pub fn finish(mut self) -> MethodBody {
        self.body.max_stack = self.max_depth;
        self.body.max_locals = self.body.max_locals.max(self.next_local);
        self.body
    }

    /// Reserve a local slot for a value of type `ty`.
    pub fn allocate_local(&mut self, ty: &TypeSignature) -> u16 {
        let slot = self.next_local;
        self.next_local += ty.slot_size().max(1);
        slot
    }

    /// Allocate a label.
    pub fn new_label(&mut self) -> Label {
        self.body.new_label()
    }

    /// Place `label` before the next instruction.
    pub fn place(&mut self, label: Label) -> &mut Self {
        if !self.reachable {
            self.depth = self.label_depths.get(&label).copied().unwrap_or(0);
        }
        self.reachable = true;
        self.body.code.push(Insn::Label(label));
        self
    }

    /// Register an exception handler. The handler entry starts with the exception on the stack.
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch: Option<&ClassName>) -> &mut Self {
        let catch_type = catch.map_or(0, |class| self.pool.add_class(class.internal()));
        self.body.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
        self.label_depths.insert(handler, 1);
        self
    }

    fn emit(&mut self, opcode: Opcode, operand: Operand, pops: u16, pushes: u16) -> Result<&mut Self> {
        let instruction = Instruction { opcode, operand };
        if self.depth < pops {
            return Err(NotSupported(format!(
                "operand stack underflow at '{}' (depth {})",
                instruction, self.depth
            )));
        }
        self.depth = self.depth - pops + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        for target in instruction.targets() {
            self.label_depths.entry(target).or_insert(self.depth);
        }
        self.reachable = !opcode.ends_flow();
        self.body.code.push(Insn::Op(instruction));
        Ok(self)
    }

    /// Emit an instruction without operand using explicit stack effects.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn op(&mut self, opcode: Opcode, pops: u16, pushes: u16) -> Result<&mut Self> {
        self.emit(opcode, Operand::None, pops, pushes)
    }

    /// `nop`
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Nop, 0, 0)
    }

    /// `aconst_null`
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn push_null(&mut self) -> Result<&mut Self> {
        self.op(Opcode::AconstNull, 0, 1)
    }

    /// Push an `int` using the shortest encoding.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1..=5 => {
                let opcode = Opcode::from_repr((Opcode::Iconst0.byte() as i32 + value) as u8)
                    .unwrap_or(Opcode::Iconst0);
                self.op(opcode, 0, 1)
            }
            v if i8::try_from(v).is_ok() => self.emit(Opcode::Bipush, Operand::Byte(v as i8), 0, 1),
            v if i16::try_from(v).is_ok() => {
                self.emit(Opcode::Sipush, Operand::Short(v as i16), 0, 1)
            }
            v => {
                let index = self.pool.add_integer(v);
                self.emit(Opcode::Ldc, Operand::Constant(index), 0, 1)
            }
        }
    }

    /// Push a constant.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn push_literal(&mut self, value: &LiteralValue) -> Result<&mut Self> {
        match value {
            LiteralValue::Int(v) => self.push_int(*v),
            LiteralValue::Long(_) | LiteralValue::Double(_) => {
                let index = self.pool.add_literal(value);
                self.emit(Opcode::Ldc2W, Operand::Constant(index), 0, 2)
            }
            LiteralValue::Float(_) | LiteralValue::String(_) => {
                let index = self.pool.add_literal(value);
                self.emit(Opcode::Ldc, Operand::Constant(index), 0, 1)
            }
        }
    }

    /// Push a string constant.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn push_string(&mut self, value: &str) -> Result<&mut Self> {
        self.push_literal(&LiteralValue::String(value.to_string()))
    }

    /// Load local `slot` holding a value of type `ty`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for `void`.
    pub fn load(&mut self, ty: &TypeSignature, slot: u16) -> Result<&mut Self> {
        let opcode = match ty {
            TypeSignature::Void => return Err(NotSupported("load of void".to_string())),
            TypeSignature::Long => Opcode::Lload,
            TypeSignature::Float => Opcode::Fload,
            TypeSignature::Double => Opcode::Dload,
            t if t.is_reference() => Opcode::Aload,
            _ => Opcode::Iload,
        };
        self.next_local = self.next_local.max(slot + ty.slot_size());
        self.emit(opcode, Operand::Local(slot), 0, ty.slot_size())
    }

    /// Store the top of stack into local `slot`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for `void` and on stack underflow.
    pub fn store(&mut self, ty: &TypeSignature, slot: u16) -> Result<&mut Self> {
        let opcode = match ty {
            TypeSignature::Void => return Err(NotSupported("store of void".to_string())),
            TypeSignature::Long => Opcode::Lstore,
            TypeSignature::Float => Opcode::Fstore,
            TypeSignature::Double => Opcode::Dstore,
            t if t.is_reference() => Opcode::Astore,
            _ => Opcode::Istore,
        };
        self.next_local = self.next_local.max(slot + ty.slot_size());
        self.emit(opcode, Operand::Local(slot), ty.slot_size(), 0)
    }

    /// `aload_0`, the receiver of an instance method.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn load_this(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Aload0, 0, 1)
    }

    /// `dup` or `dup2` depending on the slot size of `ty`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn dup_value(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        match ty.slot_size() {
            2 => self.op(Opcode::Dup2, 2, 4),
            _ => self.op(Opcode::Dup, 1, 2),
        }
    }

    /// `dup`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Dup, 1, 2)
    }

    /// Discard a value of type `ty`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn pop_value(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        match ty.slot_size() {
            0 => Ok(self),
            2 => self.op(Opcode::Pop2, 2, 0),
            _ => self.op(Opcode::Pop, 1, 0),
        }
    }

    /// `swap`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn swap(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Swap, 2, 2)
    }

    /// `new` of `class`.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn new_object(&mut self, class: &ClassName) -> Result<&mut Self> {
        let index = self.pool.add_class(class.internal());
        self.emit(Opcode::New, Operand::Constant(index), 0, 1)
    }

    /// `checkcast` to `ty`; `java.lang.Object` needs no cast and emits nothing.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for primitive types.
    pub fn checkcast(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        if *ty == TypeSignature::object() {
            return Ok(self);
        }
        let operand = ty
            .class_operand()
            .ok_or_else(|| NotSupported(format!("checkcast to primitive {ty}")))?;
        let index = self.pool.add_class(&operand);
        self.emit(Opcode::Checkcast, Operand::Constant(index), 1, 1)
    }

    /// `anewarray` of `element`, consuming the length.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for primitive element types and on underflow.
    pub fn new_array(&mut self, element: &TypeSignature) -> Result<&mut Self> {
        let operand = element
            .class_operand()
            .ok_or_else(|| NotSupported(format!("anewarray of primitive {element}")))?;
        let index = self.pool.add_class(&operand);
        self.emit(Opcode::Anewarray, Operand::Constant(index), 1, 1)
    }

    /// `aastore`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn array_store(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Aastore, 3, 0)
    }

    /// `aaload`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn array_load(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Aaload, 2, 1)
    }

    fn field(&mut self, opcode: Opcode, owner: &ClassName, name: &str, ty: &TypeSignature) -> Result<&mut Self> {
        let index = self
            .pool
            .add_field_ref(owner.internal(), name, &ty.descriptor());
        let size = ty.slot_size();
        let (pops, pushes) = match opcode {
            Opcode::Getstatic => (0, size),
            Opcode::Putstatic => (size, 0),
            Opcode::Getfield => (1, size),
            _ => (1 + size, 0),
        };
        self.emit(opcode, Operand::Constant(index), pops, pushes)
    }

    /// `getfield`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn get_field(&mut self, owner: &ClassName, name: &str, ty: &TypeSignature) -> Result<&mut Self> {
        self.field(Opcode::Getfield, owner, name, ty)
    }

    /// `putfield`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn put_field(&mut self, owner: &ClassName, name: &str, ty: &TypeSignature) -> Result<&mut Self> {
        self.field(Opcode::Putfield, owner, name, ty)
    }

    /// `getstatic`
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn get_static(&mut self, owner: &ClassName, name: &str, ty: &TypeSignature) -> Result<&mut Self> {
        self.field(Opcode::Getstatic, owner, name, ty)
    }

    /// `putstatic`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn put_static(&mut self, owner: &ClassName, name: &str, ty: &TypeSignature) -> Result<&mut Self> {
        self.field(Opcode::Putstatic, owner, name, ty)
    }

    fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &ClassName,
        name: &str,
        descriptor: &MethodDescriptor,
        interface: bool,
    ) -> Result<&mut Self> {
        let index = self.pool.add_method_ref(
            owner.internal(),
            name,
            &descriptor.descriptor(),
            interface,
        );
        let receiver = u16::from(opcode != Opcode::Invokestatic);
        let pops = descriptor.param_slots() + receiver;
        let pushes = descriptor.ret.slot_size();
        let operand = if opcode == Opcode::Invokeinterface {
            let count = u8::try_from(pops)
                .map_err(|_| NotSupported(format!("too many arguments for {owner}.{name}")))?;
            Operand::InvokeInterface { index, count }
        } else {
            Operand::Constant(index)
        };
        self.emit(opcode, operand, pops, pushes)
    }

    /// `invokevirtual`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn invoke_virtual(&mut self, owner: &ClassName, name: &str, descriptor: &MethodDescriptor) -> Result<&mut Self> {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor, false)
    }

    /// `invokespecial`, for constructors and private or super calls.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn invoke_special(&mut self, owner: &ClassName, name: &str, descriptor: &MethodDescriptor) -> Result<&mut Self> {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor, false)
    }

    /// `invokestatic`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn invoke_static(&mut self, owner: &ClassName, name: &str, descriptor: &MethodDescriptor) -> Result<&mut Self> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, false)
    }

    /// `invokestatic` of a static method declared in an interface.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn invoke_static_interface(
        &mut self,
        owner: &ClassName,
        name: &str,
        descriptor: &MethodDescriptor,
    ) -> Result<&mut Self> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, true)
    }

    /// `invokeinterface`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn invoke_interface(&mut self, owner: &ClassName, name: &str, descriptor: &MethodDescriptor) -> Result<&mut Self> {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor, true)
    }

    /// Convert the value on top of the stack to an `Object`, boxing primitives.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for `void` and on stack underflow.
    pub fn box_value(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        if ty.is_void() {
            return Err(NotSupported("boxing of void".to_string()));
        }
        let Some(wrapper) = ty.boxed_class() else {
            return Ok(self);
        };
        let descriptor = MethodDescriptor::new(vec![ty.clone()], TypeSignature::Reference(wrapper.clone()));
        self.invoke_static(&wrapper, "valueOf", &descriptor)
    }

    /// Convert the `Object` on top of the stack to `ty`, unboxing primitives.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for `void` and on stack underflow.
    pub fn unbox_value(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        match (ty.boxed_class(), ty.unbox_method()) {
            (Some(wrapper), Some(method)) => {
                let wrapper_ty = TypeSignature::Reference(wrapper.clone());
                self.checkcast(&wrapper_ty)?;
                self.invoke_virtual(&wrapper, &method, &MethodDescriptor::new(Vec::new(), ty.clone()))
            }
            _ if ty.is_void() => Err(NotSupported("unboxing to void".to_string())),
            _ => self.checkcast(ty),
        }
    }

    /// Return a value of type `ty` with the matching `*return` opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn return_value(&mut self, ty: &TypeSignature) -> Result<&mut Self> {
        let opcode = match ty {
            TypeSignature::Void => Opcode::Return,
            TypeSignature::Long => Opcode::Lreturn,
            TypeSignature::Float => Opcode::Freturn,
            TypeSignature::Double => Opcode::Dreturn,
            t if t.is_reference() => Opcode::Areturn,
            _ => Opcode::Ireturn,
        };
        self.op(opcode, ty.slot_size(), 0)
    }

    /// `athrow`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn throw(&mut self) -> Result<&mut Self> {
        self.op(Opcode::Athrow, 1, 0)
    }

    /// `goto label`
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn goto(&mut self, label: Label) -> Result<&mut Self> {
        self.emit(Opcode::Goto, Operand::Branch(label), 0, 0)
    }

    /// `ifeq label`, branching when the `int` on top of the stack is zero.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn if_zero(&mut self, label: Label) -> Result<&mut Self> {
        self.emit(Opcode::Ifeq, Operand::Branch(label), 1, 0)
    }

    /// `ifne label`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on stack underflow.
    pub fn if_non_zero(&mut self, label: Label) -> Result<&mut Self> {
        self.emit(Opcode::Ifne, Operand::Branch(label), 1, 0)
    }

    /// Load the parameters of `descriptor` from consecutive slots starting at `first_slot`.
    ///
    /// # Errors
    /// Never fails for well-formed descriptors.
    pub fn load_arguments(&mut self, descriptor: &MethodDescriptor, first_slot: u16) -> Result<&mut Self> {
        let mut slot = first_slot;
        for param in &descriptor.params {
            self.load(param, slot)?;
            slot += param.slot_size();
        }
        Ok(self)
    }

    /// Build an `Object[]` holding the parameters of `descriptor`, boxed, starting at
    /// `first_slot`.
    ///
    /// # Errors
    /// Never fails for well-formed descriptors.
    pub fn pack_arguments(&mut self, descriptor: &MethodDescriptor, first_slot: u16) -> Result<&mut Self> {
        let length = i32::try_from(descriptor.params.len())
            .map_err(|_| NotSupported("too many parameters".to_string()))?;
        self.push_int(length)?.new_array(&TypeSignature::object())?;
        let mut slot = first_slot;
        for (i, param) in descriptor.params.iter().enumerate() {
            self.dup()?
                .push_int(i as i32)?
                .load(param, slot)?
                .box_value(param)?
                .array_store()?;
            slot += param.slot_size();
        }
        Ok(self)
    }

    /// Push the unboxed elements of the `Object[]` in local `array_slot` as arguments matching
    /// `descriptor`.
    ///
    /// # Errors
    /// Never fails for well-formed descriptors.
    pub fn unpack_arguments(&mut self, descriptor: &MethodDescriptor, array_slot: u16) -> Result<&mut Self> {
        for (i, param) in descriptor.params.iter().enumerate() {
            self.load(&TypeSignature::object(), array_slot)?
                .push_int(i as i32)?
                .array_load()?
                .unbox_value(param)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::parse_method_descriptor;

    #[test]
    fn tracks_stack_depth() {
        let mut pool = ConstantPool::new();
        let mut asm = CodeBuilder::new(&mut pool, 3);
        let descriptor = parse_method_descriptor("(JI)V").unwrap();
        asm.pack_arguments(&descriptor, 1).unwrap();
        assert_eq!(asm.depth(), 1);
        asm.pop_value(&TypeSignature::object()).unwrap()
            .return_value(&TypeSignature::Void)
            .unwrap();
        let body = asm.finish();
        assert_eq!(body.max_stack, 5);
        assert_eq!(body.max_locals, 4);
    }

    #[test]
    fn underflow_is_rejected() {
        let mut pool = ConstantPool::new();
        let mut asm = CodeBuilder::new(&mut pool, 0);
        assert!(asm.array_store().is_err());
        assert!(asm.return_value(&TypeSignature::Int).is_err());
    }

    #[test]
    fn push_int_picks_short_forms() {
        let mut pool = ConstantPool::new();
        let mut asm = CodeBuilder::new(&mut pool, 0);
        asm.push_int(-1).unwrap()
            .push_int(5).unwrap()
            .push_int(100).unwrap()
            .push_int(1000).unwrap()
            .push_int(100_000).unwrap();
        let body = asm.finish();
        let opcodes: Vec<_> = body.instructions().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::IconstM1, Opcode::Iconst5, Opcode::Bipush, Opcode::Sipush, Opcode::Ldc]
        );
    }

    #[test]
    fn boxing_round_trip_instructions() {
        let mut pool = ConstantPool::new();
        let mut asm = CodeBuilder::new(&mut pool, 1);
        asm.load(&TypeSignature::object(), 0).unwrap()
            .unbox_value(&TypeSignature::Boolean).unwrap()
            .box_value(&TypeSignature::Boolean).unwrap()
            .return_value(&TypeSignature::object()).unwrap();
        let body = asm.finish();
        let rendered: Vec<_> = body.instructions().map(|i| i.opcode.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["aload", "checkcast", "invokevirtual", "invokestatic", "areturn"]
        );
        assert_eq!(body.max_stack, 1);
    }

    #[test]
    fn labels_restore_depth_after_jumps() {
        let mut pool = ConstantPool::new();
        let mut asm = CodeBuilder::new(&mut pool, 1);
        let other = asm.new_label();
        asm.load(&TypeSignature::Int, 0).unwrap()
            .if_zero(other).unwrap()
            .push_int(1).unwrap()
            .return_value(&TypeSignature::Int).unwrap();
        asm.place(other);
        assert_eq!(asm.depth(), 0);
        asm.push_int(0).unwrap().return_value(&TypeSignature::Int).unwrap();

        let body = asm.finish();
        let encoded = body.encode(&mut ConstantPool::new()).unwrap();
        assert_eq!(encoded.code, vec![0x15, 0x00, 0x99, 0x00, 0x05, 0x04, 0xAC, 0x03, 0xAC]);
    }
}
