//! Code objects and the [`CodeBuilder`] front ends use to assemble them.
//!
//! Bytecode is a flat stream of `(opcode, operand)` byte pairs. Operands
//! wider than a byte are carried by `ExtendedArg` prefix pairs, folded into
//! the following instruction's operand at fetch time. Jump operands are byte
//! offsets into the stream, always even.
//!
//! A `Code` is immutable once built and shared by reference between the
//! functions created from it and every frame executing it; only its per-site
//! operation cache carries interior mutability.

use std::rc::Rc;

use crate::{
    cache::OpCache,
    exception::{RunError, RunResult},
    op::Opcode,
    signature::Signature,
    value::Value,
};

/// An immutable compiled unit: bytecode plus the tables it indexes into.
#[derive(Debug)]
pub struct Code {
    name: Rc<str>,
    qualname: Rc<str>,
    bytecode: Box<[u8]>,
    consts: Box<[Value]>,
    /// Names referenced by the name-space instructions and `ImportName`.
    names: Box<[Rc<str>]>,
    /// Fast-local slot names; the leading slots are the bound parameters.
    varnames: Box<[Rc<str>]>,
    /// Variables captured by nested functions; fresh cells per activation.
    cellvars: Box<[Rc<str>]>,
    /// Variables this code receives from an enclosing closure.
    freevars: Box<[Rc<str>]>,
    /// `(cell index, fast-local slot)` pairs: parameters that are also
    /// cell variables, seeded into their cells at frame entry.
    cell_param_slots: Box<[(usize, usize)]>,
    signature: Signature,
    /// Upper bound on operand-stack depth, trusted by the VM.
    stacksize: usize,
    cache: OpCache,
}

impl Code {
    /// Builds a code object directly from a raw bytecode stream.
    ///
    /// Intended for embedders and tests driving the VM without the builder.
    /// Nothing is validated here; malformed streams surface as fatal errors
    /// at execution time.
    #[must_use]
    pub fn raw(name: &str, bytecode: Vec<u8>, consts: Vec<Value>, stacksize: usize) -> Self {
        let pairs = bytecode.len().div_ceil(2);
        Self {
            name: Rc::from(name),
            qualname: Rc::from(name),
            bytecode: bytecode.into_boxed_slice(),
            consts: consts.into_boxed_slice(),
            names: Box::new([]),
            varnames: Box::new([]),
            cellvars: Box::new([]),
            freevars: Box::new([]),
            cell_param_slots: Box::new([]),
            signature: Signature::default(),
            stacksize,
            cache: OpCache::new(pairs),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn stacksize(&self) -> usize {
        self.stacksize
    }

    #[must_use]
    pub fn varname_count(&self) -> usize {
        self.varnames.len()
    }

    #[must_use]
    pub fn cellvar_count(&self) -> usize {
        self.cellvars.len()
    }

    #[must_use]
    pub fn freevar_count(&self) -> usize {
        self.freevars.len()
    }

    #[must_use]
    pub fn cell_param_slots(&self) -> &[(usize, usize)] {
        &self.cell_param_slots
    }

    pub(crate) fn cache(&self) -> &OpCache {
        &self.cache
    }

    pub(crate) fn const_at(&self, idx: u32) -> RunResult<&Value> {
        self.consts
            .get(idx as usize)
            .ok_or_else(|| self.bad_index("constant", idx, self.consts.len()))
    }

    pub(crate) fn name_at(&self, idx: u32) -> RunResult<&Rc<str>> {
        self.names
            .get(idx as usize)
            .ok_or_else(|| self.bad_index("name", idx, self.names.len()))
    }

    pub(crate) fn varname_at(&self, idx: u32) -> RunResult<&Rc<str>> {
        self.varnames
            .get(idx as usize)
            .ok_or_else(|| self.bad_index("fast local", idx, self.varnames.len()))
    }

    pub(crate) fn cellvar_name(&self, idx: usize) -> Option<&Rc<str>> {
        self.cellvars.get(idx)
    }

    pub(crate) fn freevar_name(&self, idx: usize) -> Option<&Rc<str>> {
        self.freevars.get(idx)
    }

    fn bad_index(&self, table: &str, idx: u32, len: usize) -> RunError {
        RunError::internal(format!(
            "{table} index {idx} out of range (0..{len}) in code object '{}'",
            self.name
        ))
    }
}

/// A forward-jump operand awaiting its target.
#[derive(Debug, Clone, Copy)]
#[must_use = "an unpatched jump lands at offset 0"]
pub struct JumpLabel {
    /// Byte offset of the reserved `ExtendedArg` pair.
    at: usize,
}

/// Assembles a [`Code`] object: instructions, constant pool, name tables,
/// and the stack-depth bound the VM sizes frames with.
///
/// The builder tracks stack depth through [`Opcode::stack_effect`] as
/// instructions are emitted, so front ends get `stacksize` for free.
#[derive(Debug)]
pub struct CodeBuilder {
    name: Rc<str>,
    qualname: Rc<str>,
    signature: Signature,
    bytecode: Vec<u8>,
    consts: Vec<Value>,
    names: Vec<Rc<str>>,
    varnames: Vec<Rc<str>>,
    cellvars: Vec<Rc<str>>,
    freevars: Vec<Rc<str>>,
    depth: i32,
    max_depth: i32,
}

impl CodeBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            qualname: Rc::from(name),
            signature: Signature::default(),
            bytecode: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Sets the dotted name reported in reprs and tracebacks.
    pub fn set_qualname(&mut self, qualname: &str) {
        self.qualname = Rc::from(qualname);
    }

    /// Declares the parameter list. The bound parameters take the leading
    /// fast-local slots, so this must be called before [`Self::local`].
    pub fn set_signature(&mut self, signature: Signature) {
        assert!(self.varnames.is_empty(), "signature must be set before locals are declared");
        self.varnames = signature.slot_names().cloned().collect();
        self.signature = signature;
    }

    /// Interns a fast-local name, returning its slot index.
    pub fn local(&mut self, name: &str) -> u32 {
        intern(&mut self.varnames, name)
    }

    /// Interns a name-table entry (for the name-space instructions and
    /// `ImportName`), returning its index.
    pub fn name(&mut self, name: &str) -> u32 {
        intern(&mut self.names, name)
    }

    /// Declares a variable captured by nested functions, returning its cell
    /// index (the `LoadClosure`/`LoadDeref`/`StoreDeref` operand).
    pub fn cellvar(&mut self, name: &str) -> u32 {
        intern(&mut self.cellvars, name)
    }

    /// Declares a variable received from the enclosing closure. Free
    /// variables index after the cell variables in the deref instructions.
    pub fn freevar(&mut self, name: &str) -> u32 {
        let idx = intern(&mut self.freevars, name);
        idx + u32::try_from(self.cellvars.len()).expect("cellvar count exceeds u32")
    }

    /// Interns a constant, returning its pool index. Simple immutable values
    /// are deduplicated.
    pub fn const_(&mut self, value: Value) -> u32 {
        let dedup = matches!(
            value,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        );
        if dedup && let Some(idx) = self.consts.iter().position(|c| c.is_identical(&value) || c.py_eq(&value)) {
            return u32::try_from(idx).expect("constant pool exceeds u32");
        }
        self.consts.push(value);
        u32::try_from(self.consts.len() - 1).expect("constant pool exceeds u32")
    }

    /// Current byte offset; the target for a backward jump.
    #[must_use]
    pub fn mark(&self) -> u32 {
        u32::try_from(self.bytecode.len()).expect("bytecode length exceeds u32")
    }

    /// Emits an instruction that takes no operand.
    pub fn emit(&mut self, op: Opcode) {
        debug_assert!(!op.has_arg(), "{op} takes an operand; use emit_arg");
        self.push_pair(op, 0);
        self.track(op, 0);
    }

    /// Emits an instruction with its operand, inserting `ExtendedArg`
    /// prefixes as needed for operands above 255.
    pub fn emit_arg(&mut self, op: Opcode, arg: u32) {
        debug_assert!(op.has_arg(), "{op} takes no operand; use emit");
        let mut prefixes = [0u8; 3];
        let mut count = 0;
        let mut rest = arg >> 8;
        while rest != 0 {
            prefixes[count] = (rest & 0xff) as u8;
            count += 1;
            rest >>= 8;
        }
        for &prefix in prefixes[..count].iter().rev() {
            self.push_pair(Opcode::ExtendedArg, prefix);
        }
        self.push_pair(op, (arg & 0xff) as u8);
        self.track(op, arg);
    }

    /// Emits a jump whose target is not yet known. One `ExtendedArg` prefix
    /// is reserved, so patched targets may span 16 bits of byte offset.
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        debug_assert!(
            matches!(
                op,
                Opcode::JumpForward
                    | Opcode::JumpAbsolute
                    | Opcode::PopJumpIfFalse
                    | Opcode::PopJumpIfTrue
                    | Opcode::JumpIfFalseOrPop
                    | Opcode::JumpIfTrueOrPop
            ),
            "{op} is not a jump"
        );
        let at = self.bytecode.len();
        self.push_pair(Opcode::ExtendedArg, 0);
        self.push_pair(op, 0);
        self.track(op, 0);
        JumpLabel { at }
    }

    /// Points `label` at the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.bytecode.len();
        let op = Opcode::from_repr(self.bytecode[label.at + 2]).expect("jump label does not point at an instruction");
        let operand = if op == Opcode::JumpForward {
            // relative to the cursor after the jump's own pair
            target - (label.at + 4)
        } else {
            target
        };
        let operand = u16::try_from(operand).expect("jump operand exceeds u16; function too large");
        self.bytecode[label.at + 1] = (operand >> 8) as u8;
        self.bytecode[label.at + 3] = (operand & 0xff) as u8;
    }

    /// Finishes assembly.
    pub fn finish(self) -> Code {
        let cell_param_slots: Box<[(usize, usize)]> = self
            .cellvars
            .iter()
            .enumerate()
            .filter_map(|(cell, name)| {
                self.signature
                    .slot_names()
                    .position(|slot| slot == name)
                    .map(|slot| (cell, slot))
            })
            .collect();
        let pairs = self.bytecode.len() / 2;
        let stacksize = usize::try_from(self.max_depth).expect("stack depth never goes negative");
        Code {
            name: self.name,
            qualname: self.qualname,
            bytecode: self.bytecode.into_boxed_slice(),
            consts: self.consts.into_boxed_slice(),
            names: self.names.into_boxed_slice(),
            varnames: self.varnames.into_boxed_slice(),
            cellvars: self.cellvars.into_boxed_slice(),
            freevars: self.freevars.into_boxed_slice(),
            cell_param_slots,
            signature: self.signature,
            stacksize,
            cache: OpCache::new(pairs),
        }
    }

    fn push_pair(&mut self, op: Opcode, arg: u8) {
        self.bytecode.push(op as u8);
        self.bytecode.push(arg);
    }

    fn track(&mut self, op: Opcode, arg: u32) {
        let effect = op
            .stack_effect(arg)
            .expect("builder cannot emit instructions outside the supported set");
        self.depth += effect;
        debug_assert!(self.depth >= 0, "stack depth went negative after {op}");
        self.max_depth = self.max_depth.max(self.depth);
    }
}

fn intern(table: &mut Vec<Rc<str>>, name: &str) -> u32 {
    let idx = table.iter().position(|n| **n == *name).unwrap_or_else(|| {
        table.push(Rc::from(name));
        table.len() - 1
    });
    u32::try_from(idx).expect("name table exceeds u32")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_operands_emit_single_pairs() {
        let mut b = CodeBuilder::new("t");
        let k = b.const_(Value::Int(7));
        b.emit_arg(Opcode::LoadConst, k);
        b.emit(Opcode::ReturnValue);
        let code = b.finish();
        assert_eq!(code.bytecode(), &[Opcode::LoadConst as u8, 0, Opcode::ReturnValue as u8, 0]);
        assert_eq!(code.stacksize(), 1);
    }

    #[test]
    fn wide_operands_get_extended_arg_prefixes() {
        let mut b = CodeBuilder::new("t");
        b.emit_arg(Opcode::LoadConst, 0x0001_0203);
        let code = b.finish();
        assert_eq!(
            code.bytecode(),
            &[
                Opcode::ExtendedArg as u8,
                0x01,
                Opcode::ExtendedArg as u8,
                0x02,
                Opcode::LoadConst as u8,
                0x03,
            ]
        );

        // top byte set: three prefixes
        let mut b = CodeBuilder::new("t");
        b.emit_arg(Opcode::LoadConst, 0xdead_beef);
        let code = b.finish();
        assert_eq!(
            code.bytecode(),
            &[
                Opcode::ExtendedArg as u8,
                0xde,
                Opcode::ExtendedArg as u8,
                0xad,
                Opcode::ExtendedArg as u8,
                0xbe,
                Opcode::LoadConst as u8,
                0xef,
            ]
        );
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut b = CodeBuilder::new("t");
        let a = b.const_(Value::Int(1));
        let b_idx = b.const_(Value::Int(2));
        let again = b.const_(Value::Int(1));
        assert_eq!(a, again);
        assert_ne!(a, b_idx);
    }

    #[test]
    fn forward_jump_operand_is_relative_to_next_pair() {
        let mut b = CodeBuilder::new("t");
        let k = b.const_(Value::None);
        let label = b.emit_jump(Opcode::JumpForward);
        b.emit_arg(Opcode::LoadConst, k);
        b.emit(Opcode::PopTop);
        b.patch_jump(label);
        let code = b.finish();
        // reserved prefix pair at 0, jump pair at 2, skipped pairs at 4 and 6
        assert_eq!(code.bytecode()[..4], [Opcode::ExtendedArg as u8, 0, Opcode::JumpForward as u8, 4]);
    }

    #[test]
    fn absolute_jump_operand_is_the_target_offset() {
        let mut b = CodeBuilder::new("t");
        let k = b.const_(Value::Bool(true));
        b.emit_arg(Opcode::LoadConst, k);
        let label = b.emit_jump(Opcode::PopJumpIfFalse);
        b.emit_arg(Opcode::LoadConst, k);
        b.emit(Opcode::PopTop);
        b.patch_jump(label);
        let code = b.finish();
        assert_eq!(code.bytecode()[2..6], [Opcode::ExtendedArg as u8, 0, Opcode::PopJumpIfFalse as u8, 10]);
    }

    #[test]
    fn stacksize_tracks_the_running_maximum() {
        let mut b = CodeBuilder::new("t");
        let k = b.const_(Value::Int(1));
        b.emit_arg(Opcode::LoadConst, k);
        b.emit_arg(Opcode::LoadConst, k);
        b.emit_arg(Opcode::LoadConst, k);
        b.emit_arg(Opcode::BuildTuple, 3);
        b.emit(Opcode::ReturnValue);
        let code = b.finish();
        assert_eq!(code.stacksize(), 3);
    }

    #[test]
    fn cell_params_are_mapped_to_their_slots() {
        let mut b = CodeBuilder::new("t");
        b.set_signature(Signature::positional(&["a", "b"]));
        b.cellvar("fresh");
        let cell = b.cellvar("b");
        b.emit_arg(Opcode::LoadClosure, cell);
        b.emit(Opcode::ReturnValue);
        let code = b.finish();
        assert_eq!(code.cell_param_slots(), &[(1, 1)]);
    }

    #[test]
    fn freevar_indices_follow_cellvars() {
        let mut b = CodeBuilder::new("t");
        b.cellvar("own");
        let f = b.freevar("outer");
        assert_eq!(f, 1);
        b.emit_arg(Opcode::LoadDeref, f);
        b.emit(Opcode::ReturnValue);
        let code = b.finish();
        assert_eq!(code.cellvar_count(), 1);
        assert_eq!(code.freevar_count(), 1);
    }
}
