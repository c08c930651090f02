//! Runtime error taxonomy.
//!
//! The dispatch loop performs no local recovery: every error produced while
//! executing an instruction unwinds the current activation through `?`.
//! The split between [`RunError::Exc`] (conditions of the executed program)
//! and [`RunError::Internal`] (defects: corrupted instruction streams,
//! unimplemented opcode families, broken construction invariants) mirrors the
//! catchable/uncatchable split of the error-propagation collaborator.

use std::{
    borrow::Cow,
    fmt::{self, Display},
};

use strum::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception kinds the VM core can raise.
///
/// The string representation matches the variant name exactly
/// (e.g. `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumIter, EnumString, IntoStaticStr)]
pub enum ExcType {
    Exception,
    TypeError,
    ValueError,
    /// Unresolved name after all three resolution tiers.
    NameError,
    /// Subclass of NameError - reading a fast local before first assignment.
    UnboundLocalError,
    AttributeError,
    KeyError,
    IndexError,
    ZeroDivisionError,
    /// Raised when an integer result exceeds the fixed-width range.
    OverflowError,
    ImportError,
    RuntimeError,
    /// Subclass of RuntimeError - activation depth exceeded the limit.
    RecursionError,
    NotImplementedError,
    /// Reserved for the iterator protocol, which lives outside this core.
    StopIteration,
    SystemError,
}

impl ExcType {
    /// Wraps this exception type and a message into a raised error.
    pub(crate) fn with_msg(self, msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(self, msg).into()
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> RunError {
        Self::TypeError.with_msg(msg)
    }

    pub(crate) fn name_error(name: &str) -> RunError {
        Self::NameError.with_msg(format!("name '{name}' is not defined"))
    }

    pub(crate) fn unbound_local(name: &str) -> RunError {
        Self::UnboundLocalError.with_msg(format!("local variable '{name}' referenced before assignment"))
    }

    pub(crate) fn unbound_free(name: &str) -> RunError {
        Self::NameError.with_msg(format!(
            "free variable '{name}' referenced before assignment in enclosing scope"
        ))
    }

    pub(crate) fn not_callable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    pub(crate) fn unsupported_binary(op: &str, lhs: &str, rhs: &str) -> RunError {
        Self::type_error(format!("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'"))
    }

    pub(crate) fn unsupported_unary(op: &str, operand: &str) -> RunError {
        Self::type_error(format!("bad operand type for unary {op}: '{operand}'"))
    }

    pub(crate) fn not_comparable(symbol: &str, lhs: &str, rhs: &str) -> RunError {
        Self::type_error(format!(
            "'{symbol}' not supported between instances of '{lhs}' and '{rhs}'"
        ))
    }

    pub(crate) fn division_by_zero() -> RunError {
        Self::ZeroDivisionError.with_msg("division by zero")
    }

    pub(crate) fn integer_division_by_zero() -> RunError {
        Self::ZeroDivisionError.with_msg("integer division or modulo by zero")
    }

    pub(crate) fn int_overflow() -> RunError {
        Self::OverflowError.with_msg("int result too large for this runtime")
    }

    pub(crate) fn recursion_limit() -> RunError {
        Self::RecursionError.with_msg("maximum recursion depth exceeded")
    }

    pub(crate) fn import_error(msg: impl Into<String>) -> RunError {
        Self::ImportError.with_msg(msg)
    }
}

/// Lightweight representation of a raised exception.
///
/// The core carries only a type, an optional message, and an optional cause
/// (set by two-operand raises); presentation concerns like tracebacks belong
/// to the host's exception machinery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleException {
    exc_type: ExcType,
    msg: Option<String>,
    cause: Option<Box<SimpleException>>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType) -> Self {
        Self {
            exc_type,
            msg: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl Into<String>) -> Self {
        Self {
            exc_type,
            msg: Some(msg.into()),
            cause: None,
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }

    #[must_use]
    pub fn cause(&self) -> Option<&SimpleException> {
        self.cause.as_deref()
    }

    /// Attaches an explicit cause, as set by `raise X from Y`.
    pub(crate) fn set_cause(&mut self, cause: Option<SimpleException>) {
        self.cause = cause.map(Box::new);
    }
}

impl Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// Runtime error raised during execution.
///
/// Two variants:
/// - `Exc`: a condition of the executed program (unbound names, arity
///   mismatches, arithmetic errors, explicit raises).
/// - `Internal`: a defect - corrupted instruction stream, unimplemented
///   opcode family, or a broken construction invariant. These indicate a bug
///   in the bytecode producer or an incomplete port, not user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    Internal(Cow<'static, str>),
    Exc(Box<SimpleException>),
}

impl RunError {
    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the exception type, if this is a raised exception.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match self {
            Self::Exc(exc) => Some(exc.exc_type()),
            Self::Internal(_) => None,
        }
    }

    /// Returns true if this error is an exception of `exc_type`.
    #[must_use]
    pub fn is_exception_type(&self, exc_type: ExcType) -> bool {
        self.exc_type() == Some(exc_type)
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error in krait: {msg}"),
            Self::Exc(exc) => write!(f, "{exc}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Formats a list of parameter names for arity error messages.
///
/// Examples:
/// - `["a"]` -> `'a'`
/// - `["a", "b"]` -> `'a' and 'b'`
/// - `["a", "b", "c"]` -> `'a', 'b' and 'c'`
pub(crate) fn format_param_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => format!("'{only}'"),
        [init @ .., last] => {
            let init = init.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ");
            format!("{init} and '{last}'")
        }
    }
}
