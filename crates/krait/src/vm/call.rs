//! The call protocol, function construction, and explicit raises.

use std::rc::Rc;

use crate::{
    args::CallArgs,
    exception::{ExcType, RunError, RunResult, SimpleException},
    frame::Frame,
    function::Function,
    import::Importer,
    tracer::VmTracer,
    value::{CellRef, Value},
    vm::Vm,
};

impl<I: Importer, T: VmTracer> Vm<I, T> {
    pub(super) fn op_call_function(&mut self, frame: &mut Frame, argc: u32) -> RunResult<()> {
        let positional = frame.pop_n(argc as usize)?;
        let callable = frame.pop()?;
        let result = self.invoke(&callable, CallArgs::positional(positional))?;
        frame.push(result);
        Ok(())
    }

    pub(super) fn op_call_function_kw(&mut self, frame: &mut Frame, argc: u32) -> RunResult<()> {
        let Value::Tuple(names) = frame.pop()? else {
            return Err(RunError::internal("CallFunctionKw expects a tuple of keyword names on top"));
        };
        let argc = argc as usize;
        if names.len() > argc {
            return Err(RunError::internal("more keyword names than call arguments"));
        }
        let mut values = frame.pop_n(argc)?;
        let callable = frame.pop()?;
        let kw_values = values.split_off(argc - names.len());
        let mut args = CallArgs::positional(values);
        for (name, value) in names.iter().zip(kw_values) {
            let Value::Str(name) = name else {
                return Err(RunError::internal("keyword names must be strings"));
            };
            if !args.push_kw(Rc::clone(name), value) {
                return Err(RunError::internal(format!("duplicate keyword name '{name}' in call")));
            }
        }
        let result = self.invoke(&callable, args)?;
        frame.push(result);
        Ok(())
    }

    pub(super) fn op_call_function_ex(&mut self, frame: &mut Frame, flags: u32) -> RunResult<()> {
        if flags & !1 != 0 {
            return Err(RunError::internal(format!("invalid CallFunctionEx operand {flags}")));
        }
        let kwargs = if flags & 1 != 0 { Some(frame.pop()?) } else { None };
        let iterable = frame.pop()?;
        let callable = frame.pop()?;
        let fname = callable_name(&callable);

        let mut args = match &iterable {
            Value::Tuple(t) => CallArgs::positional(t.iter().cloned()),
            Value::List(l) => CallArgs::positional(l.borrow().iter().cloned()),
            Value::Str(s) => CallArgs::positional(s.chars().map(|c| Value::from(c.to_string().as_str()))),
            other => {
                return Err(ExcType::type_error(format!(
                    "{fname}() argument after * must be an iterable, not {}",
                    other.type_name()
                )));
            }
        };
        if let Some(kwargs) = kwargs {
            let Value::Dict(map) = &kwargs else {
                return Err(ExcType::type_error(format!(
                    "{fname}() argument after ** must be a mapping, not {}",
                    kwargs.type_name()
                )));
            };
            for (name, value) in map.borrow().iter() {
                if !args.push_kw(Rc::clone(name), value.clone()) {
                    return Err(ExcType::type_error(format!(
                        "{fname}() got multiple values for keyword argument '{name}'"
                    )));
                }
            }
        }
        let result = self.invoke(&callable, args)?;
        frame.push(result);
        Ok(())
    }

    /// Dispatches a call on any value.
    pub(super) fn invoke(&mut self, callable: &Value, args: CallArgs) -> RunResult<Value> {
        match callable {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(native) => (native.func)(args),
            Value::ExcClass(exc_type) => construct_exception(*exc_type, args),
            other => Err(ExcType::not_callable(other.type_name())),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, args: CallArgs) -> RunResult<Value> {
        if self.depth + 1 > self.options.recursion_limit {
            return Err(ExcType::recursion_limit());
        }
        let bound = function.bind(args)?;
        let mut frame = Frame::call(
            Rc::clone(function.code()),
            bound,
            function.closure(),
            Rc::clone(function.globals()),
        )?;
        self.depth += 1;
        self.tracer.on_call(function.qualname(), self.depth);
        let result = self.run_frame(&mut frame);
        self.depth -= 1;
        self.tracer.on_return(self.depth);
        result
    }

    /// `MakeFunction`: the operand flags which optional operands are present.
    /// Bit 0 is a defaults tuple, bit 1 a keyword-defaults mapping, bit 2 an
    /// annotations mapping, bit 3 a closure tuple; flagged operands are
    /// popped highest bit first, then the qualified name and the code object.
    pub(super) fn op_make_function(&mut self, frame: &mut Frame, flags: u32) -> RunResult<()> {
        if flags & !0xf != 0 {
            return Err(RunError::internal(format!("invalid MakeFunction operand {flags:#x}")));
        }
        let closure: Box<[CellRef]> = if flags & 0x8 != 0 {
            let Value::Tuple(cells) = frame.pop()? else {
                return Err(RunError::internal("MakeFunction closure operand must be a tuple"));
            };
            cells
                .iter()
                .map(|v| match v {
                    Value::Cell(cell) => Ok(cell.clone()),
                    other => Err(RunError::internal(format!(
                        "MakeFunction closure tuple holds a {}, expected cells",
                        other.type_name()
                    ))),
                })
                .collect::<RunResult<_>>()?
        } else {
            Box::new([])
        };
        let annotations = if flags & 0x4 != 0 { Some(frame.pop()?) } else { None };
        let kwdefaults = if flags & 0x2 != 0 {
            match frame.pop()? {
                Value::Dict(map) => Some(map),
                other => {
                    return Err(RunError::internal(format!(
                        "MakeFunction keyword-defaults operand must be a dict, got {}",
                        other.type_name()
                    )));
                }
            }
        } else {
            None
        };
        let defaults: Box<[Value]> = if flags & 0x1 != 0 {
            match frame.pop()? {
                Value::Tuple(values) => values.iter().cloned().collect(),
                other => {
                    return Err(RunError::internal(format!(
                        "MakeFunction defaults operand must be a tuple, got {}",
                        other.type_name()
                    )));
                }
            }
        } else {
            Box::new([])
        };
        let Value::Str(qualname) = frame.pop()? else {
            return Err(RunError::internal("MakeFunction expects a qualified name below the operands"));
        };
        let Value::Code(code) = frame.pop()? else {
            return Err(RunError::internal("MakeFunction expects a code object at the bottom"));
        };
        self.tracer.on_make_function(&qualname, closure.len(), defaults.len());
        let function = Function::new(
            code,
            qualname,
            defaults,
            kwdefaults,
            annotations,
            closure,
            Rc::clone(frame.globals()),
        );
        frame.push(Value::Function(Rc::new(function)));
        Ok(())
    }

    /// `RaiseVarargs`: always produces the error that unwinds the frame.
    pub(super) fn op_raise(&mut self, frame: &mut Frame, oparg: u32) -> RunError {
        self.raise_inner(frame, oparg).unwrap_or_else(|err| err)
    }

    fn raise_inner(&mut self, frame: &mut Frame, oparg: u32) -> RunResult<RunError> {
        match oparg {
            // bare `raise`: the core tracks no active exception to re-raise
            0 => Ok(ExcType::RuntimeError.with_msg("No active exception to re-raise")),
            1 => {
                let exc = as_exception(frame.pop()?)?;
                self.tracer.on_raise(exc.exc_type().into());
                Ok(exc.into())
            }
            2 => {
                let cause = frame.pop()?;
                let mut exc = as_exception(frame.pop()?)?;
                let cause = match cause {
                    Value::None => None,
                    other => Some(as_cause(other)?),
                };
                exc.set_cause(cause);
                self.tracer.on_raise(exc.exc_type().into());
                Ok(exc.into())
            }
            n => Ok(RunError::internal(format!("invalid RaiseVarargs operand {n}"))),
        }
    }
}

fn as_exception(value: Value) -> RunResult<SimpleException> {
    match value {
        Value::Exception(exc) => Ok((*exc).clone()),
        Value::ExcClass(exc_type) => Ok(SimpleException::new(exc_type)),
        _ => Err(ExcType::type_error("exceptions must derive from BaseException")),
    }
}

fn as_cause(value: Value) -> RunResult<SimpleException> {
    match value {
        Value::Exception(exc) => Ok((*exc).clone()),
        Value::ExcClass(exc_type) => Ok(SimpleException::new(exc_type)),
        _ => Err(ExcType::type_error("exception causes must derive from BaseException")),
    }
}

fn callable_name(callable: &Value) -> String {
    match callable {
        Value::Function(f) => f.name().to_owned(),
        Value::Native(f) => f.name.to_owned(),
        Value::ExcClass(t) => t.to_string(),
        other => other.type_name().to_owned(),
    }
}

/// Calling an exception class constructs an exception value; it does not
/// raise.
fn construct_exception(exc_type: ExcType, args: CallArgs) -> RunResult<Value> {
    if let Some((name, _)) = args.kw().first() {
        return Err(ExcType::type_error(format!(
            "{exc_type}() got an unexpected keyword argument '{name}'"
        )));
    }
    let exc = match args.pos() {
        [] => SimpleException::new(exc_type),
        [msg] => SimpleException::new_msg(exc_type, msg.py_str()),
        many => SimpleException::new_msg(exc_type, Value::tuple(many.to_vec()).py_repr()),
    };
    Ok(Value::Exception(Rc::new(exc)))
}
