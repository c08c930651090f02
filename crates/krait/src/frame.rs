//! Call frames: the mutable state of one activation.
//!
//! A frame owns its operand stack, fast-local slots, and cells; everything
//! else (bytecode, constant pool, name tables, operation caches) lives in the
//! shared code object. Frames are created either for a module body, where the
//! namespace and globals tiers are the same mapping, or for a function call,
//! where bound arguments seed the leading fast-local slots.
//!
//! Frame methods report malformed bytecode as [`RunError::Internal`]: stack
//! underflow, odd cursors, unknown opcodes, and out-of-range jump targets are
//! producer bugs, not program errors, and are never catchable.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    code::Code,
    exception::{RunError, RunResult},
    namespace::Namespace,
    op::Opcode,
    value::{CellRef, Value},
};

/// One fetched instruction: opcode, folded operand, and the pair index of
/// the terminal pair (the operation-cache site).
pub(crate) type Fetched = (Opcode, u32, usize);

#[derive(Debug)]
pub(crate) struct Frame {
    code: Rc<Code>,
    /// Byte offset of the next instruction pair; always even.
    cursor: usize,
    stack: Vec<Value>,
    /// Fast-local slots in `varnames` order; `Undefined` until assigned.
    locals: Box<[Value]>,
    /// Fresh cells for the cell variables, then the closure's cells for the
    /// free variables.
    cells: Box<[CellRef]>,
    /// First name-resolution tier and the target of the name stores.
    namespace: Rc<Namespace>,
    /// Second tier. Module and function frames both alias `namespace` here,
    /// so `StoreName` in a function body writes the module's globals.
    globals: Rc<Namespace>,
}

impl Frame {
    /// Frame for a module body: names resolve and store against `globals`.
    pub(crate) fn module(code: Rc<Code>, globals: Rc<Namespace>) -> RunResult<Self> {
        Self::new(code, SmallVec::new(), &[], Rc::clone(&globals), globals)
    }

    /// Frame for a function call with already-bound argument slots; name
    /// resolution and stores go through the defining module's globals.
    pub(crate) fn call(
        code: Rc<Code>,
        bound: SmallVec<[Value; 8]>,
        closure: &[CellRef],
        globals: Rc<Namespace>,
    ) -> RunResult<Self> {
        Self::new(code, bound, closure, Rc::clone(&globals), globals)
    }

    fn new(
        code: Rc<Code>,
        bound: SmallVec<[Value; 8]>,
        closure: &[CellRef],
        namespace: Rc<Namespace>,
        globals: Rc<Namespace>,
    ) -> RunResult<Self> {
        if bound.len() > code.varname_count() {
            return Err(RunError::internal(format!(
                "code object '{}' binds {} arguments but has {} fast-local slots",
                code.name(),
                bound.len(),
                code.varname_count()
            )));
        }
        if closure.len() != code.freevar_count() {
            return Err(RunError::internal(format!(
                "code object '{}' expects {} free variables, closure provides {}",
                code.name(),
                code.freevar_count(),
                closure.len()
            )));
        }
        let mut locals = vec![Value::Undefined; code.varname_count()].into_boxed_slice();
        for (slot, value) in bound.into_iter().enumerate() {
            locals[slot] = value;
        }
        let mut cells: Vec<CellRef> = (0..code.cellvar_count())
            .map(|_| CellRef::new(Value::Undefined))
            .collect();
        // parameters that are captured get copied into their cells at entry
        for &(cell, slot) in code.cell_param_slots() {
            cells[cell].set(locals[slot].clone());
        }
        cells.extend(closure.iter().cloned());
        Ok(Self {
            stack: Vec::with_capacity(code.stacksize()),
            locals,
            cells: cells.into_boxed_slice(),
            cursor: 0,
            code,
            namespace,
            globals,
        })
    }

    pub(crate) fn code(&self) -> &Rc<Code> {
        &self.code
    }

    pub(crate) fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub(crate) fn globals(&self) -> &Rc<Namespace> {
        &self.globals
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Decodes the next instruction, folding any `ExtendedArg` prefixes into
    /// the operand of the instruction they precede.
    pub(crate) fn fetch(&mut self) -> RunResult<Fetched> {
        let bytecode = self.code.bytecode();
        let mut oparg: u32 = 0;
        loop {
            if self.cursor >= bytecode.len() {
                return Err(RunError::internal(format!(
                    "execution ran off the end of code object '{}'",
                    self.code.name()
                )));
            }
            if self.cursor + 1 >= bytecode.len() {
                return Err(RunError::internal(format!(
                    "truncated instruction pair at offset {} in code object '{}'",
                    self.cursor,
                    self.code.name()
                )));
            }
            let byte = bytecode[self.cursor];
            let arg = bytecode[self.cursor + 1];
            let Some(op) = Opcode::from_repr(byte) else {
                return Err(RunError::internal(format!(
                    "unknown opcode byte {byte:#04x} at offset {} in code object '{}'",
                    self.cursor,
                    self.code.name()
                )));
            };
            self.cursor += 2;
            oparg = (oparg << 8) | u32::from(arg);
            if op != Opcode::ExtendedArg {
                return Ok((op, oparg, (self.cursor - 2) / 2));
            }
        }
    }

    /// Moves the cursor to an absolute byte offset.
    pub(crate) fn jump_to(&mut self, target: usize) -> RunResult<()> {
        if target % 2 != 0 || target >= self.code.bytecode().len() {
            return Err(RunError::internal(format!(
                "jump target {target} out of range in code object '{}'",
                self.code.name()
            )));
        }
        self.cursor = target;
        Ok(())
    }

    /// Moves the cursor forward by a relative byte offset.
    pub(crate) fn jump_forward(&mut self, offset: u32) -> RunResult<()> {
        self.jump_to(self.cursor + offset as usize)
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    pub(crate) fn peek(&self) -> RunResult<&Value> {
        self.stack.last().ok_or_else(|| self.underflow())
    }

    /// Pops `n` values, returning them in stack order (deepest first).
    pub(crate) fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(self.underflow());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Moves the top value down to the `depth`-th position, lifting the
    /// values above it by one (the rotate instructions).
    pub(crate) fn rotate(&mut self, depth: usize) -> RunResult<()> {
        if self.stack.len() < depth {
            return Err(self.underflow());
        }
        let top = self.stack.len();
        self.stack[top - depth..].rotate_right(1);
        Ok(())
    }

    pub(crate) fn dup_top(&mut self) -> RunResult<()> {
        let top = self.peek()?.clone();
        self.push(top);
        Ok(())
    }

    pub(crate) fn dup_top_two(&mut self) -> RunResult<()> {
        let len = self.stack.len();
        if len < 2 {
            return Err(self.underflow());
        }
        let pair = [self.stack[len - 2].clone(), self.stack[len - 1].clone()];
        self.stack.extend(pair);
        Ok(())
    }

    pub(crate) fn local(&self, slot: u32) -> RunResult<&Value> {
        self.locals
            .get(slot as usize)
            .ok_or_else(|| self.bad_slot("fast local", slot as usize, self.locals.len()))
    }

    pub(crate) fn set_local(&mut self, slot: u32, value: Value) -> RunResult<()> {
        let len = self.locals.len();
        match self.locals.get_mut(slot as usize) {
            Some(dest) => {
                *dest = value;
                Ok(())
            }
            None => Err(self.bad_slot("fast local", slot as usize, len)),
        }
    }

    /// The cell at a deref index: cell variables first, then free variables.
    pub(crate) fn cell(&self, idx: u32) -> RunResult<&CellRef> {
        self.cells
            .get(idx as usize)
            .ok_or_else(|| self.bad_slot("cell", idx as usize, self.cells.len()))
    }

    pub(crate) fn cells_len(&self) -> usize {
        self.cells.len()
    }

    /// Name of the variable behind a deref index, and whether it is a cell
    /// variable of this frame (as opposed to a captured free variable).
    pub(crate) fn deref_name(&self, idx: u32) -> (Option<&Rc<str>>, bool) {
        let idx = idx as usize;
        let n_cells = self.code.cellvar_count();
        if idx < n_cells {
            (self.code.cellvar_name(idx), true)
        } else {
            (self.code.freevar_name(idx - n_cells), false)
        }
    }

    fn underflow(&self) -> RunError {
        RunError::internal(format!(
            "operand stack underflow at offset {} in code object '{}'",
            self.cursor,
            self.code.name()
        ))
    }

    fn bad_slot(&self, kind: &str, idx: usize, len: usize) -> RunError {
        RunError::internal(format!(
            "{kind} index {idx} out of range (0..{len}) in code object '{}'",
            self.code.name()
        ))
    }
}
