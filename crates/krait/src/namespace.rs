//! Name-space tiers for the name instructions.
//!
//! `LoadName`/`LoadGlobal` resolve through three tiers: the frame's own
//! namespace, the module globals it was created under, and the builtins the
//! VM was constructed with. Module-level frames use the same namespace for
//! the first two tiers; function frames resolve names directly against their
//! module globals.

use std::{cell::RefCell, rc::Rc};

use strum::IntoEnumIterator;

use crate::{
    args::CallArgs,
    exception::{ExcType, RunResult},
    value::{Dict, Value},
};

/// One mutable name-to-value mapping, shared by reference between frames.
#[derive(Debug, Default)]
pub struct Namespace {
    map: RefCell<Dict>,
}

impl Namespace {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.borrow().get(name).cloned()
    }

    pub fn set(&self, name: Rc<str>, value: Value) {
        self.map.borrow_mut().insert(name, value);
    }

    /// Removes a binding; `shift_remove` keeps insertion order intact.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.map.borrow_mut().shift_remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.borrow().contains_key(name)
    }
}

/// The default builtins tier: a handful of natives plus every exception
/// class, so raised and caught types resolve by name.
#[must_use]
pub fn default_builtins() -> Rc<Namespace> {
    let ns = Namespace::new();
    for exc_type in ExcType::iter() {
        ns.set(Rc::from(<&'static str>::from(exc_type)), Value::ExcClass(exc_type));
    }
    for &(name, func) in BUILTIN_FUNCTIONS {
        ns.set(Rc::from(name), Value::Native(crate::value::NativeFunction { name, func }));
    }
    ns
}

const BUILTIN_FUNCTIONS: &[(&str, fn(CallArgs) -> RunResult<Value>)] = &[
    ("len", builtin_len),
    ("abs", builtin_abs),
    ("repr", builtin_repr),
    ("str", builtin_str),
    ("bool", builtin_bool),
];

fn builtin_len(args: CallArgs) -> RunResult<Value> {
    let [value] = args.expect_positional::<1>("len")?;
    let len = match &value {
        Value::Str(s) => s.chars().count(),
        Value::Tuple(t) => t.len(),
        Value::List(l) => l.borrow().len(),
        Value::Dict(d) => d.borrow().len(),
        other => {
            return Err(ExcType::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(len).map_err(|_| ExcType::int_overflow())?))
}

fn builtin_abs(args: CallArgs) -> RunResult<Value> {
    let [value] = args.expect_positional::<1>("abs")?;
    match value {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(ExcType::int_overflow),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        other => Err(ExcType::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_repr(args: CallArgs) -> RunResult<Value> {
    let [value] = args.expect_positional::<1>("repr")?;
    Ok(Value::Str(Rc::from(value.py_repr().as_str())))
}

fn builtin_str(args: CallArgs) -> RunResult<Value> {
    let [value] = args.expect_positional::<1>("str")?;
    Ok(Value::Str(Rc::from(value.py_str().as_str())))
}

fn builtin_bool(args: CallArgs) -> RunResult<Value> {
    let [value] = args.expect_positional::<1>("bool")?;
    Ok(Value::Bool(value.py_bool()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_expose_exception_classes() {
        let builtins = default_builtins();
        assert_eq!(builtins.get("ValueError"), Some(Value::ExcClass(ExcType::ValueError)));
        assert!(builtins.get("no_such_builtin").is_none());
    }

    #[test]
    fn len_counts_characters_not_bytes() {
        let args = CallArgs::positional([Value::from("héllo")]);
        assert_eq!(builtin_len(args).unwrap(), Value::Int(5));
    }

    #[test]
    fn len_rejects_unsized_values() {
        let args = CallArgs::positional([Value::Int(3)]);
        let err = builtin_len(args).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: object of type 'int' has no len()");
    }

    #[test]
    fn abs_of_int_min_overflows() {
        let args = CallArgs::positional([Value::Int(i64::MIN)]);
        assert!(
            builtin_abs(args)
                .unwrap_err()
                .is_exception_type(ExcType::OverflowError)
        );
    }

    #[test]
    fn remove_returns_the_old_binding() {
        let ns = Namespace::new();
        ns.set(Rc::from("x"), Value::Int(1));
        assert_eq!(ns.remove("x"), Some(Value::Int(1)));
        assert_eq!(ns.remove("x"), None);
    }
}
