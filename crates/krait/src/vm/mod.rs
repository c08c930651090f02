//! The bytecode dispatch loop.
//!
//! One [`Vm`] executes one frame at a time; calls recurse into a fresh frame
//! on the host stack, bounded by the recursion limit. The VM is generic over
//! its import collaborator and its tracer so that the production
//! configuration (`NoImports`, `NoopTracer`) monomorphizes both away.
//!
//! Errors split along one line: program errors (`RunError::Exc`) carry an
//! exception value a future handler layer could catch; malformed bytecode and
//! broken producer contracts are `RunError::Internal` and abort the run.

mod call;

use std::rc::Rc;

use crate::{
    args::CallArgs,
    code::Code,
    exception::{ExcType, RunError, RunResult},
    frame::Frame,
    import::{Importer, NoImports},
    namespace::{Namespace, default_builtins},
    op::{CompareKind, Opcode},
    tracer::{NoopTracer, VmTracer},
    value::{BinaryKind, UnaryKind, Value},
};

/// Execution limits, applied per [`Vm`].
#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    /// Maximum depth of nested function calls before `RecursionError`.
    pub recursion_limit: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { recursion_limit: 1000 }
    }
}

/// A bytecode interpreter bound to an importer and a tracer.
#[derive(Debug)]
pub struct Vm<I: Importer, T: VmTracer> {
    importer: I,
    tracer: T,
    builtins: Rc<Namespace>,
    options: VmOptions,
    /// Current function-call depth; the module frame is depth zero.
    depth: usize,
}

impl Default for Vm<NoImports, NoopTracer> {
    fn default() -> Self {
        Self::new(NoImports, NoopTracer)
    }
}

impl<I: Importer, T: VmTracer> Vm<I, T> {
    #[must_use]
    pub fn new(importer: I, tracer: T) -> Self {
        Self {
            importer,
            tracer,
            builtins: default_builtins(),
            options: VmOptions::default(),
            depth: 0,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: VmOptions) -> Self {
        self.options = options;
        self
    }

    /// The builtins tier; embedders install extra natives through it.
    #[must_use]
    pub fn builtins(&self) -> &Rc<Namespace> {
        &self.builtins
    }

    #[must_use]
    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }

    /// Executes `code` as a module body against `globals`, returning the
    /// value of its `ReturnValue`.
    pub fn run_module(&mut self, code: Rc<Code>, globals: Rc<Namespace>) -> RunResult<Value> {
        let mut frame = Frame::module(code, globals)?;
        self.run_frame(&mut frame)
    }

    /// Calls any callable value from host code, outside any frame.
    pub fn call_value(&mut self, callable: &Value, args: CallArgs) -> RunResult<Value> {
        self.invoke(callable, args)
    }

    fn run_frame(&mut self, frame: &mut Frame) -> RunResult<Value> {
        loop {
            let offset = frame.cursor();
            let (op, oparg, site) = frame.fetch()?;
            self.tracer.on_instruction(offset, op, oparg, frame.stack_depth());
            match op {
                Opcode::Nop => {}
                Opcode::PopTop => {
                    frame.pop()?;
                }
                Opcode::DupTop => frame.dup_top()?,
                Opcode::DupTopTwo => frame.dup_top_two()?,
                Opcode::RotTwo => frame.rotate(2)?,
                Opcode::RotThree => frame.rotate(3)?,
                Opcode::RotFour => frame.rotate(4)?,

                Opcode::UnaryPositive => op_unary(frame, UnaryKind::Pos)?,
                Opcode::UnaryNegative => op_unary(frame, UnaryKind::Neg)?,
                Opcode::UnaryNot => op_unary(frame, UnaryKind::Not)?,
                Opcode::UnaryInvert => op_unary(frame, UnaryKind::Invert)?,

                Opcode::BinaryAdd
                | Opcode::BinarySubtract
                | Opcode::BinaryMultiply
                | Opcode::BinaryTrueDivide
                | Opcode::BinaryFloorDivide
                | Opcode::BinaryModulo
                | Opcode::BinaryPower
                | Opcode::BinaryAnd
                | Opcode::BinaryOr
                | Opcode::BinaryXor
                | Opcode::BinaryLshift
                | Opcode::BinaryRshift => self.op_binary(frame, op, site)?,

                Opcode::BinarySubscr => {
                    let index = frame.pop()?;
                    let container = frame.pop()?;
                    frame.push(container.py_subscr(&index)?);
                }
                Opcode::CompareOp => {
                    let kind = CompareKind::from_repr(u8::try_from(oparg).unwrap_or(u8::MAX))
                        .ok_or_else(|| RunError::internal(format!("invalid comparison operand {oparg}")))?;
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(lhs.py_compare(kind, &rhs)?);
                }

                Opcode::LoadConst => {
                    let value = frame.code().const_at(oparg)?.clone();
                    frame.push(value);
                }
                Opcode::LoadFast => {
                    let value = frame.local(oparg)?.clone();
                    if matches!(value, Value::Undefined) {
                        return Err(ExcType::unbound_local(frame.code().varname_at(oparg)?));
                    }
                    frame.push(value);
                }
                Opcode::StoreFast => {
                    let value = frame.pop()?;
                    frame.set_local(oparg, value)?;
                }
                Opcode::DeleteFast => {
                    if matches!(frame.local(oparg)?, Value::Undefined) {
                        return Err(ExcType::unbound_local(frame.code().varname_at(oparg)?));
                    }
                    frame.set_local(oparg, Value::Undefined)?;
                }

                Opcode::LoadName | Opcode::LoadGlobal => {
                    let name = frame.code().name_at(oparg)?;
                    let value = self.resolve_name(frame, name)?;
                    frame.push(value);
                }
                Opcode::StoreName => {
                    let name = Rc::clone(frame.code().name_at(oparg)?);
                    let value = frame.pop()?;
                    frame.namespace().set(name, value);
                }
                Opcode::DeleteName => {
                    let name = frame.code().name_at(oparg)?;
                    if frame.namespace().remove(name).is_none() {
                        return Err(ExcType::name_error(name));
                    }
                }

                Opcode::LoadDeref => {
                    let cell = frame.cell(oparg)?;
                    let value = cell.get();
                    self.tracer.on_cell_load(oparg as usize, frame.cells_len());
                    if matches!(value, Value::Undefined) {
                        return Err(unbound_deref(frame, oparg));
                    }
                    frame.push(value);
                }
                Opcode::StoreDeref => {
                    let value = frame.pop()?;
                    frame.cell(oparg)?.set(value);
                    self.tracer.on_cell_store(oparg as usize, frame.cells_len());
                }
                Opcode::LoadClosure => {
                    let cell = frame.cell(oparg)?.clone();
                    frame.push(Value::Cell(cell));
                }

                Opcode::BuildTuple => {
                    let values = frame.pop_n(oparg as usize)?;
                    frame.push(Value::tuple(values));
                }
                Opcode::BuildList => {
                    let values = frame.pop_n(oparg as usize)?;
                    frame.push(Value::list(values));
                }
                Opcode::BuildMap => op_build_map(frame, oparg)?,

                Opcode::JumpForward => frame.jump_forward(oparg)?,
                Opcode::JumpAbsolute => frame.jump_to(oparg as usize)?,
                Opcode::PopJumpIfFalse => {
                    if !frame.pop()?.py_bool() {
                        frame.jump_to(oparg as usize)?;
                    }
                }
                Opcode::PopJumpIfTrue => {
                    if frame.pop()?.py_bool() {
                        frame.jump_to(oparg as usize)?;
                    }
                }
                Opcode::JumpIfFalseOrPop => {
                    // jump keeps the operand; fall-through discards it
                    if frame.peek()?.py_bool() {
                        frame.pop()?;
                    } else {
                        frame.jump_to(oparg as usize)?;
                    }
                }
                Opcode::JumpIfTrueOrPop => {
                    if frame.peek()?.py_bool() {
                        frame.jump_to(oparg as usize)?;
                    } else {
                        frame.pop()?;
                    }
                }

                Opcode::RaiseVarargs => return Err(self.op_raise(frame, oparg)),
                Opcode::ImportName => self.op_import(frame, oparg)?,
                Opcode::MakeFunction => self.op_make_function(frame, oparg)?,
                Opcode::CallFunction => self.op_call_function(frame, oparg)?,
                Opcode::CallFunctionKw => self.op_call_function_kw(frame, oparg)?,
                Opcode::CallFunctionEx => self.op_call_function_ex(frame, oparg)?,
                Opcode::ReturnValue => return frame.pop(),

                Opcode::ExtendedArg => {
                    return Err(RunError::internal("ExtendedArg cannot terminate an instruction"));
                }
                Opcode::GetIter
                | Opcode::ForIter
                | Opcode::LoadAttr
                | Opcode::StoreAttr
                | Opcode::DeleteAttr
                | Opcode::StoreGlobal
                | Opcode::DeleteGlobal
                | Opcode::UnpackSequence
                | Opcode::YieldValue
                | Opcode::SetupFinally
                | Opcode::PopBlock
                | Opcode::FormatValue
                | Opcode::BuildSlice
                | Opcode::BuildSet => {
                    return Err(RunError::internal(format!(
                        "instruction {op} is outside the supported instruction set"
                    )));
                }
            }
        }
    }

    /// Three-tier name resolution: frame namespace, module globals, builtins.
    fn resolve_name(&self, frame: &Frame, name: &str) -> RunResult<Value> {
        frame
            .namespace()
            .get(name)
            .or_else(|| frame.globals().get(name))
            .or_else(|| self.builtins.get(name))
            .ok_or_else(|| ExcType::name_error(name))
    }

    fn op_binary(&mut self, frame: &mut Frame, op: Opcode, site: usize) -> RunResult<()> {
        let rhs = frame.pop()?;
        let lhs = frame.pop()?;
        let kind = binary_kind(op);
        let (value, status) = frame.code().cache().binary(site, kind, &lhs, &rhs)?;
        match status {
            crate::cache::CacheStatus::Hit => self.tracer.on_cache_hit(site * 2, op),
            crate::cache::CacheStatus::Miss => self.tracer.on_cache_miss(site * 2, op),
        }
        frame.push(value);
        Ok(())
    }

    fn op_import(&mut self, frame: &mut Frame, oparg: u32) -> RunResult<()> {
        let fromlist = frame.pop()?;
        let level = match frame.pop()? {
            Value::Int(level) if level >= 0 => u32::try_from(level)
                .map_err(|_| RunError::internal("import level exceeds u32"))?,
            other => {
                return Err(RunError::internal(format!(
                    "import level must be a non-negative int, got {}",
                    other.type_name()
                )));
            }
        };
        let name = Rc::clone(frame.code().name_at(oparg)?);
        let module = self.importer.import(&name, &fromlist, level)?;
        frame.push(module);
        Ok(())
    }
}

fn op_unary(frame: &mut Frame, kind: UnaryKind) -> RunResult<()> {
    let value = frame.pop()?;
    frame.push(value.py_unary(kind)?);
    Ok(())
}

fn op_build_map(frame: &mut Frame, count: u32) -> RunResult<()> {
    let flat = frame.pop_n(count as usize * 2)?;
    let mut map =
        crate::value::Dict::with_capacity_and_hasher(count as usize, ahash::RandomState::default());
    for pair in flat.chunks_exact(2) {
        let Value::Str(key) = &pair[0] else {
            return Err(ExcType::type_error(format!(
                "dict keys must be str, not '{}'",
                pair[0].type_name()
            )));
        };
        map.insert(Rc::clone(key), pair[1].clone());
    }
    frame.push(Value::dict(map));
    Ok(())
}

fn binary_kind(op: Opcode) -> BinaryKind {
    match op {
        Opcode::BinaryAdd => BinaryKind::Add,
        Opcode::BinarySubtract => BinaryKind::Sub,
        Opcode::BinaryMultiply => BinaryKind::Mul,
        Opcode::BinaryTrueDivide => BinaryKind::TrueDiv,
        Opcode::BinaryFloorDivide => BinaryKind::FloorDiv,
        Opcode::BinaryModulo => BinaryKind::Mod,
        Opcode::BinaryPower => BinaryKind::Pow,
        Opcode::BinaryAnd => BinaryKind::And,
        Opcode::BinaryOr => BinaryKind::Or,
        Opcode::BinaryXor => BinaryKind::Xor,
        Opcode::BinaryLshift => BinaryKind::Lshift,
        Opcode::BinaryRshift => BinaryKind::Rshift,
        _ => unreachable!("{op} is not a binary arithmetic instruction"),
    }
}

fn unbound_deref(frame: &Frame, idx: u32) -> RunError {
    let (name, is_cellvar) = frame.deref_name(idx);
    let name = name.map_or("?", |n| n.as_ref());
    if is_cellvar {
        ExcType::unbound_local(name)
    } else {
        ExcType::unbound_free(name)
    }
}
