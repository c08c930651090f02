//! Runtime values and the generic (shape-polymorphic) operation handlers.
//!
//! `Value` uses a hybrid design: small immediate values (`Int`, `Bool`,
//! `None`) are stored inline, while compound values are shared through `Rc`.
//! The VM is single-threaded per activation, so `Rc`/`RefCell` is the
//! shared-mutable discipline for containers and closure cells.
//!
//! The `py_*` methods are the generic handlers behind the per-site operation
//! caches: a cache slot may route an instruction to a shape-specialized fast
//! path, but every specialized path computes exactly what the generic method
//! here computes.

use std::{cell::RefCell, cmp::Ordering, fmt, fmt::Write, rc::Rc};

use indexmap::IndexMap;

use crate::{
    args::CallArgs,
    exception::{ExcType, RunResult},
    function::Function,
    op::CompareKind,
};

/// Insertion-ordered string-keyed mapping.
///
/// The core needs mappings only for keyword arguments, keyword defaults, and
/// annotations, which are string-keyed; general dict semantics belong to the
/// object-model collaborator outside this core.
pub type Dict = IndexMap<Rc<str>, Value, ahash::RandomState>;

/// A heap-allocated one-slot mutable box shared between an enclosing frame
/// and the closures created during its activation.
///
/// Cells are never stack-allocated: a captured cell must outlive the frame
/// that created it.
#[derive(Debug, Clone)]
pub struct CellRef(Rc<RefCell<Value>>);

impl CellRef {
    /// Creates a cell holding `value`. Pass [`Value::Undefined`] for a cell
    /// whose variable has not been assigned yet.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Returns a clone of the current cell contents.
    #[must_use]
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Replaces the cell contents.
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// Returns true if both refs alias the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A host-provided function callable from bytecode.
pub type NativeFn = fn(CallArgs) -> RunResult<Value>;

/// Wrapper pairing a host function pointer with its name for error messages
/// and reprs.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.func, other.func)
    }
}

/// Primary value type for the VM core.
#[derive(Debug, Clone)]
pub enum Value {
    /// Sentinel for an unbound fast-local slot or an empty cell. Never a
    /// legitimate operand; reading one raises before it reaches the stack.
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Dict>>),
    /// A code object, pushed as a constant for `MakeFunction`.
    Code(Rc<crate::code::Code>),
    Function(Rc<Function>),
    Native(NativeFunction),
    /// A closure cell as a first-class stack value (`LoadClosure`).
    Cell(CellRef),
    /// An exception class; calling it constructs an exception value.
    ExcClass(ExcType),
    Exception(Rc<crate::exception::SimpleException>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl Value {
    /// Builds a tuple value from owned elements.
    #[must_use]
    pub fn tuple(values: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(values))
    }

    /// Builds a list value from owned elements.
    #[must_use]
    pub fn list(values: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(values)))
    }

    /// Builds a dict value from an existing mapping.
    #[must_use]
    pub fn dict(map: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(map)))
    }

    /// The type name used in error messages and reprs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "<unbound>",
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Code(_) => "code",
            Self::Function(_) => "function",
            Self::Native(_) => "builtin_function_or_method",
            Self::Cell(_) => "cell",
            Self::ExcClass(_) => "type",
            Self::Exception(exc) => exc.exc_type().into(),
        }
    }

    /// Truthiness, as used by all conditional jumps.
    #[must_use]
    pub fn py_bool(&self) -> bool {
        match self {
            Self::Undefined => {
                debug_assert!(false, "Undefined sentinel reached a truthiness test");
                false
            }
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Code(_) | Self::Function(_) | Self::Native(_) | Self::Cell(_) | Self::ExcClass(_) | Self::Exception(_) => {
                true
            }
        }
    }

    /// Allocation identity (`is` / `is not`). Immediates compare by value.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::Undefined, Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Code(a), Self::Code(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::Cell(a), Self::Cell(b)) => a.ptr_eq(b),
            (Self::ExcClass(a), Self::ExcClass(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality with numeric cross-type comparison.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bool(a), other) | (other, Self::Bool(a)) => Self::Int(i64::from(*a)).py_eq(other),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y)),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.py_eq(w)))
            }
            _ => self.is_identical(other),
        }
    }

    /// Ordering for the `<`, `<=`, `>`, `>=` comparisons.
    pub fn py_ord(&self, other: &Self, symbol: &str) -> RunResult<Ordering> {
        let incomparable = || ExcType::not_comparable(symbol, self.type_name(), other.type_name());
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b).ok_or_else(incomparable),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)).ok_or_else(incomparable),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).ok_or_else(incomparable),
            (Self::Bool(a), other) => Self::Int(i64::from(*a)).py_ord(other, symbol),
            (this, Self::Bool(b)) => this.py_ord(&Self::Int(i64::from(*b)), symbol),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (Self::Tuple(a), Self::Tuple(b)) => sequence_ord(a, b, symbol),
            (Self::List(a), Self::List(b)) => sequence_ord(&a.borrow(), &b.borrow(), symbol),
            _ => Err(incomparable()),
        }
    }

    /// Rich comparison dispatch for `CompareOp`.
    pub fn py_compare(&self, kind: CompareKind, other: &Self) -> RunResult<Value> {
        let result = match kind {
            CompareKind::Eq => self.py_eq(other),
            CompareKind::Ne => !self.py_eq(other),
            CompareKind::Is => self.is_identical(other),
            CompareKind::IsNot => !self.is_identical(other),
            CompareKind::Lt => self.py_ord(other, kind.symbol())? == Ordering::Less,
            CompareKind::Le => self.py_ord(other, kind.symbol())? != Ordering::Greater,
            CompareKind::Gt => self.py_ord(other, kind.symbol())? == Ordering::Greater,
            CompareKind::Ge => self.py_ord(other, kind.symbol())? != Ordering::Less,
        };
        Ok(Value::Bool(result))
    }

    /// Generic binary operation handler.
    ///
    /// This is the fallback behind the per-site operation caches; every
    /// shape-specialized fast path must agree with it.
    pub fn py_binary(&self, op: BinaryKind, rhs: &Self) -> RunResult<Value> {
        // bool participates in arithmetic as 0/1
        let lhs = self.widen_bool();
        let rhs_w = rhs.widen_bool();
        match (&lhs, &rhs_w) {
            (Self::Int(a), Self::Int(b)) => int_binary(op, *a, *b),
            (Self::Float(a), Self::Float(b)) => float_binary(op, *a, *b),
            (Self::Int(a), Self::Float(b)) => float_binary(op, *a as f64, *b),
            (Self::Float(a), Self::Int(b)) => float_binary(op, *a, *b as f64),
            (Self::Str(a), Self::Str(b)) if op == BinaryKind::Add => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::Str(Rc::from(s.as_str())))
            }
            (Self::Str(s), Self::Int(n)) | (Self::Int(n), Self::Str(s)) if op == BinaryKind::Mul => {
                let count = repeat_count(s.len(), *n)?;
                Ok(Value::Str(Rc::from(s.repeat(count).as_str())))
            }
            (Self::Tuple(a), Self::Tuple(b)) if op == BinaryKind::Add => {
                Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Self::Tuple(t), Self::Int(n)) | (Self::Int(n), Self::Tuple(t)) if op == BinaryKind::Mul => {
                Ok(Value::tuple(repeat_elements(t, *n)?))
            }
            (Self::List(a), Self::List(b)) if op == BinaryKind::Add => {
                let joined = a.borrow().iter().chain(b.borrow().iter()).cloned().collect();
                Ok(Value::list(joined))
            }
            (Self::List(l), Self::Int(n)) | (Self::Int(n), Self::List(l)) if op == BinaryKind::Mul => {
                Ok(Value::list(repeat_elements(&l.borrow(), *n)?))
            }
            _ => Err(ExcType::unsupported_binary(op.symbol(), self.type_name(), rhs.type_name())),
        }
    }

    /// Generic unary operation handler.
    pub fn py_unary(&self, op: UnaryKind) -> RunResult<Value> {
        if op == UnaryKind::Not {
            return Ok(Value::Bool(!self.py_bool()));
        }
        match (self.widen_bool(), op) {
            (Self::Int(i), UnaryKind::Pos) => Ok(Value::Int(i)),
            (Self::Int(i), UnaryKind::Neg) => i.checked_neg().map(Value::Int).ok_or_else(ExcType::int_overflow),
            (Self::Int(i), UnaryKind::Invert) => Ok(Value::Int(!i)),
            (Self::Float(f), UnaryKind::Pos) => Ok(Value::Float(f)),
            (Self::Float(f), UnaryKind::Neg) => Ok(Value::Float(-f)),
            _ => Err(ExcType::unsupported_unary(op.symbol(), self.type_name())),
        }
    }

    /// Generic indexing handler for `BinarySubscr`.
    pub fn py_subscr(&self, index: &Self) -> RunResult<Value> {
        match (self, index) {
            (Self::Tuple(t), Self::Int(i)) => sequence_index(t, *i, "tuple"),
            (Self::List(l), Self::Int(i)) => sequence_index(&l.borrow(), *i, "list"),
            (Self::Str(s), Self::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(*i, chars.len())
                    .ok_or_else(|| ExcType::IndexError.with_msg("string index out of range"))?;
                Ok(Value::Str(Rc::from(chars[idx].to_string().as_str())))
            }
            (Self::Dict(d), Self::Str(key)) => d
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| ExcType::KeyError.with_msg(format!("'{key}'"))),
            (Self::Dict(_), other) => Err(ExcType::KeyError.with_msg(other.py_repr())),
            (Self::Tuple(_) | Self::List(_) | Self::Str(_), other) => Err(ExcType::type_error(format!(
                "{} indices must be integers, not '{}'",
                self.type_name(),
                other.type_name()
            ))),
            _ => Err(ExcType::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            ))),
        }
    }

    /// Canonical display form, loosely following `repr()`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        match self {
            Self::Undefined => "<unbound>".to_owned(),
            Self::None => "None".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => float_repr(*f),
            Self::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Tuple(t) => {
                if t.len() == 1 {
                    format!("({},)", t[0].py_repr())
                } else {
                    format!("({})", join_reprs(t.iter()))
                }
            }
            Self::List(l) => format!("[{}]", join_reprs(l.borrow().iter())),
            Self::Dict(d) => {
                let mut out = String::from("{");
                for (i, (k, v)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "'{k}': {}", v.py_repr());
                }
                out.push('}');
                out
            }
            Self::Code(code) => format!("<code object {}>", code.name()),
            Self::Function(f) => format!("<function {}>", f.qualname()),
            Self::Native(f) => format!("<built-in function {}>", f.name),
            Self::Cell(cell) => format!("<cell: {}>", cell.get().py_repr()),
            Self::ExcClass(t) => format!("<class '{t}'>"),
            Self::Exception(exc) => match exc.msg() {
                Some(msg) => format!("{}('{msg}')", exc.exc_type()),
                None => format!("{}()", exc.exc_type()),
            },
        }
    }

    /// Display form following `str()`: strings are unquoted, everything else
    /// matches [`Value::py_repr`].
    #[must_use]
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.py_repr(),
        }
    }

    fn widen_bool(&self) -> Self {
        match self {
            Self::Bool(b) => Self::Int(i64::from(*b)),
            other => other.clone(),
        }
    }
}

/// Test-oriented structural equality; uses [`Value::py_eq`] for data values
/// and identity for callables.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

/// Binary operator selector shared by the dispatch loop, the operation
/// caches, and the generic handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Lshift,
    Rshift,
}

impl BinaryKind {
    /// Source-level operator symbol, used in error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Lshift => "<<",
            Self::Rshift => ">>",
        }
    }
}

/// Unary operator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Pos,
    Neg,
    Not,
    Invert,
}

impl UnaryKind {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Pos => "+",
            Self::Neg => "-",
            Self::Not => "not",
            Self::Invert => "~",
        }
    }
}

/// Integer arithmetic. Overflow raises `OverflowError`: the core uses
/// fixed-width integers rather than arbitrary precision.
pub(crate) fn int_binary(op: BinaryKind, a: i64, b: i64) -> RunResult<Value> {
    let v = match op {
        BinaryKind::Add => Value::Int(a.checked_add(b).ok_or_else(ExcType::int_overflow)?),
        BinaryKind::Sub => Value::Int(a.checked_sub(b).ok_or_else(ExcType::int_overflow)?),
        BinaryKind::Mul => Value::Int(a.checked_mul(b).ok_or_else(ExcType::int_overflow)?),
        BinaryKind::TrueDiv => {
            if b == 0 {
                return Err(ExcType::division_by_zero());
            }
            Value::Float(a as f64 / b as f64)
        }
        BinaryKind::FloorDiv => {
            if b == 0 {
                return Err(ExcType::integer_division_by_zero());
            }
            let q = a.checked_div(b).ok_or_else(ExcType::int_overflow)?;
            let r = a % b;
            // round toward negative infinity
            Value::Int(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
        }
        BinaryKind::Mod => {
            if b == 0 {
                return Err(ExcType::integer_division_by_zero());
            }
            let r = a.checked_rem(b).ok_or_else(ExcType::int_overflow)?;
            // result takes the sign of the divisor
            Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        BinaryKind::Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| ExcType::int_overflow())?;
                Value::Int(a.checked_pow(exp).ok_or_else(ExcType::int_overflow)?)
            } else {
                // negative exponent yields a float
                Value::Float((a as f64).powf(b as f64))
            }
        }
        BinaryKind::And => Value::Int(a & b),
        BinaryKind::Or => Value::Int(a | b),
        BinaryKind::Xor => Value::Int(a ^ b),
        BinaryKind::Lshift => {
            if b < 0 {
                return Err(ExcType::ValueError.with_msg("negative shift count"));
            }
            let shift = u32::try_from(b).map_err(|_| ExcType::int_overflow())?;
            if shift >= 64 {
                if a == 0 { Value::Int(0) } else { return Err(ExcType::int_overflow()) }
            } else {
                let shifted = a << shift;
                if shifted >> shift != a {
                    return Err(ExcType::int_overflow());
                }
                Value::Int(shifted)
            }
        }
        BinaryKind::Rshift => {
            if b < 0 {
                return Err(ExcType::ValueError.with_msg("negative shift count"));
            }
            // arithmetic shift saturates at the sign bit
            Value::Int(a >> b.min(63))
        }
    };
    Ok(v)
}

/// Float arithmetic with Python's sign conventions for `%` and `//`.
pub(crate) fn float_binary(op: BinaryKind, a: f64, b: f64) -> RunResult<Value> {
    let v = match op {
        BinaryKind::Add => a + b,
        BinaryKind::Sub => a - b,
        BinaryKind::Mul => a * b,
        BinaryKind::TrueDiv => {
            if b == 0.0 {
                return Err(ExcType::ZeroDivisionError.with_msg("float division by zero"));
            }
            a / b
        }
        BinaryKind::FloorDiv => {
            if b == 0.0 {
                return Err(ExcType::ZeroDivisionError.with_msg("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinaryKind::Mod => {
            if b == 0.0 {
                return Err(ExcType::ZeroDivisionError.with_msg("float modulo"));
            }
            let r = a % b;
            // result takes the sign of the divisor
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        BinaryKind::Pow => {
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ExcType::ValueError.with_msg("negative number cannot be raised to a fractional power"));
            }
            a.powf(b)
        }
        BinaryKind::And | BinaryKind::Or | BinaryKind::Xor | BinaryKind::Lshift | BinaryKind::Rshift => {
            return Err(ExcType::unsupported_binary(op.symbol(), "float", "float"));
        }
    };
    Ok(Value::Float(v))
}

fn sequence_ord(a: &[Value], b: &[Value], symbol: &str) -> RunResult<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.py_eq(y) {
            return x.py_ord(y, symbol);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn sequence_index(values: &[Value], index: i64, type_name: &str) -> RunResult<Value> {
    normalize_index(index, values.len())
        .map(|i| values[i].clone())
        .ok_or_else(|| ExcType::IndexError.with_msg(format!("{type_name} index out of range")))
}

/// Maps a possibly negative index into `0..len`.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) { usize::try_from(idx).ok() } else { None }
}

// Ceiling on a materialized repetition; past this the allocator aborts
// instead of returning an error we could surface.
const MAX_REPEAT_LEN: usize = u32::MAX as usize;

/// Validates a sequence/string repetition count. Negative counts clamp to
/// zero; a product past the addressable range is an `OverflowError`.
fn repeat_count(len: usize, n: i64) -> RunResult<usize> {
    if len == 0 {
        return Ok(0);
    }
    let n = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(n) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(n),
        _ => Err(ExcType::int_overflow()),
    }
}

fn repeat_elements(values: &[Value], n: i64) -> RunResult<Vec<Value>> {
    let n = repeat_count(values.len(), n)?;
    let mut out = Vec::with_capacity(values.len() * n);
    for _ in 0..n {
        out.extend(values.iter().cloned());
    }
    Ok(out)
}

fn join_reprs<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values.map(Value::py_repr).collect::<Vec<_>>().join(", ")
}

fn float_repr(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
