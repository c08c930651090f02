//! Parameter signatures and argument binding.
//!
//! A signature describes the parameter list of a code object. Binding maps a
//! [`CallArgs`] onto the leading fast-local slots of a new frame: positional
//! parameters first, then keyword-only parameters, then the `*args` tuple and
//! `**kwargs` dict if declared. Every binding failure is a `TypeError` whose
//! message names the function.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    args::CallArgs,
    exception::{ExcType, RunResult, format_param_names},
    value::{Dict, Value},
};

/// Parameter list of a code object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Signature {
    /// Positional-or-keyword parameters, in declaration order.
    params: Vec<Rc<str>>,
    /// Name of the `*args` parameter, if declared.
    vararg: Option<Rc<str>>,
    /// Keyword-only parameters (those after `*` or `*args`).
    kwonly: Vec<Rc<str>>,
    /// Name of the `**kwargs` parameter, if declared.
    kwarg: Option<Rc<str>>,
}

impl Signature {
    #[must_use]
    pub fn new(
        params: Vec<Rc<str>>,
        vararg: Option<Rc<str>>,
        kwonly: Vec<Rc<str>>,
        kwarg: Option<Rc<str>>,
    ) -> Self {
        Self { params, vararg, kwonly, kwarg }
    }

    /// A signature of positional-or-keyword parameters only.
    #[must_use]
    pub fn positional(names: &[&str]) -> Self {
        Self {
            params: names.iter().map(|n| Rc::from(*n)).collect(),
            ..Self::default()
        }
    }

    /// Fast-local slot names in binding order.
    pub fn slot_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.params
            .iter()
            .chain(&self.kwonly)
            .chain(&self.vararg)
            .chain(&self.kwarg)
    }

    /// Number of fast-local slots the bound arguments occupy.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.params.len()
            + self.kwonly.len()
            + usize::from(self.vararg.is_some())
            + usize::from(self.kwarg.is_some())
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Binds `args` to this signature, producing the values for the leading
    /// fast-local slots in [`Signature::slot_names`] order.
    pub fn bind(
        &self,
        fname: &str,
        args: CallArgs,
        defaults: &[Value],
        kwdefaults: Option<&Dict>,
    ) -> RunResult<SmallVec<[Value; 8]>> {
        let named = self.params.len() + self.kwonly.len();
        let mut slots: SmallVec<[Value; 8]> = SmallVec::with_capacity(self.slot_count());
        slots.resize(named, Value::Undefined);

        let (pos, kw) = args.into_parts();
        let pos_given = pos.len();

        let mut extra_pos = Vec::new();
        for (i, value) in pos.into_iter().enumerate() {
            if i < self.params.len() {
                slots[i] = value;
            } else if self.vararg.is_some() {
                extra_pos.push(value);
            } else {
                return Err(self.too_many_positional(fname, pos_given, defaults.len()));
            }
        }

        let mut extra_kw: Option<Dict> = self.kwarg.as_ref().map(|_| Dict::default());
        for (name, value) in kw {
            if let Some(slot) = self.named_slot(&name) {
                if matches!(slots[slot], Value::Undefined) {
                    slots[slot] = value;
                } else {
                    return Err(ExcType::type_error(format!(
                        "{fname}() got multiple values for argument '{name}'"
                    )));
                }
            } else if let Some(extra) = extra_kw.as_mut() {
                extra.insert(name, value);
            } else {
                return Err(ExcType::type_error(format!(
                    "{fname}() got an unexpected keyword argument '{name}'"
                )));
            }
        }

        // defaults align with the tail of the positional parameters
        let first_default = self.params.len() - defaults.len().min(self.params.len());
        for (slot, default) in (first_default..self.params.len()).zip(defaults) {
            if matches!(slots[slot], Value::Undefined) {
                slots[slot] = default.clone();
            }
        }
        if let Some(kwdefaults) = kwdefaults {
            for (i, name) in self.kwonly.iter().enumerate() {
                let slot = self.params.len() + i;
                if matches!(slots[slot], Value::Undefined)
                    && let Some(default) = kwdefaults.get(name)
                {
                    slots[slot] = default.clone();
                }
            }
        }

        self.check_missing(fname, &slots)?;

        if self.vararg.is_some() {
            slots.push(Value::tuple(extra_pos));
        }
        if let Some(extra) = extra_kw {
            slots.push(Value::dict(extra));
        }
        Ok(slots)
    }

    fn named_slot(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|p| **p == *name)
            .or_else(|| self.kwonly.iter().position(|p| **p == *name).map(|i| self.params.len() + i))
    }

    fn check_missing(&self, fname: &str, slots: &[Value]) -> RunResult<()> {
        let missing_pos: Vec<&str> = self
            .params
            .iter()
            .enumerate()
            .filter(|(i, _)| matches!(slots[*i], Value::Undefined))
            .map(|(_, n)| &**n)
            .collect();
        if !missing_pos.is_empty() {
            let plural = if missing_pos.len() == 1 { "argument" } else { "arguments" };
            return Err(ExcType::type_error(format!(
                "{fname}() missing {} required positional {plural}: {}",
                missing_pos.len(),
                format_param_names(&missing_pos)
            )));
        }
        let missing_kw: Vec<&str> = self
            .kwonly
            .iter()
            .enumerate()
            .filter(|(i, _)| matches!(slots[self.params.len() + i], Value::Undefined))
            .map(|(_, n)| &**n)
            .collect();
        if !missing_kw.is_empty() {
            let plural = if missing_kw.len() == 1 { "argument" } else { "arguments" };
            return Err(ExcType::type_error(format!(
                "{fname}() missing {} required keyword-only {plural}: {}",
                missing_kw.len(),
                format_param_names(&missing_kw)
            )));
        }
        Ok(())
    }

    fn too_many_positional(&self, fname: &str, given: usize, n_defaults: usize) -> crate::exception::RunError {
        let n = self.params.len();
        let takes = if n_defaults == 0 {
            let plural = if n == 1 { "argument" } else { "arguments" };
            format!("{n} positional {plural}")
        } else {
            format!("from {} to {n} positional arguments", n - n_defaults)
        };
        let were = if given == 1 { "was" } else { "were" };
        ExcType::type_error(format!("{fname}() takes {takes} but {given} {were} given"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_simple(sig: &Signature, args: CallArgs) -> RunResult<SmallVec<[Value; 8]>> {
        sig.bind("f", args, &[], None)
    }

    #[test]
    fn binds_positional_in_order() {
        let sig = Signature::positional(&["a", "b"]);
        let slots = bind_simple(&sig, CallArgs::positional([Value::Int(1), Value::Int(2)])).unwrap();
        assert_eq!(&slots[..], &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn keyword_fills_positional_slot() {
        let sig = Signature::positional(&["a", "b"]);
        let mut args = CallArgs::positional([Value::Int(1)]);
        assert!(args.push_kw(Rc::from("b"), Value::Int(2)));
        let slots = bind_simple(&sig, args).unwrap();
        assert_eq!(&slots[..], &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn positional_and_keyword_collision() {
        let sig = Signature::positional(&["a"]);
        let mut args = CallArgs::positional([Value::Int(1)]);
        assert!(args.push_kw(Rc::from("a"), Value::Int(2)));
        let err = bind_simple(&sig, args).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: f() got multiple values for argument 'a'");
    }

    #[test]
    fn missing_arguments_are_listed() {
        let sig = Signature::positional(&["a", "b", "c"]);
        let err = bind_simple(&sig, CallArgs::positional([Value::Int(1)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: f() missing 2 required positional arguments: 'b' and 'c'"
        );
    }

    #[test]
    fn too_many_positional_with_defaults() {
        let sig = Signature::positional(&["a", "b"]);
        let args = CallArgs::positional([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let err = sig.bind("f", args, &[Value::Int(0)], None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: f() takes from 1 to 2 positional arguments but 3 were given"
        );
    }

    #[test]
    fn defaults_fill_the_tail() {
        let sig = Signature::positional(&["a", "b"]);
        let slots = sig
            .bind("f", CallArgs::positional([Value::Int(1)]), &[Value::Int(9)], None)
            .unwrap();
        assert_eq!(&slots[..], &[Value::Int(1), Value::Int(9)]);
    }

    #[test]
    fn vararg_and_kwarg_collect_extras() {
        let sig = Signature::new(
            vec![Rc::from("a")],
            Some(Rc::from("args")),
            vec![],
            Some(Rc::from("kwargs")),
        );
        let mut args = CallArgs::positional([Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(args.push_kw(Rc::from("x"), Value::Int(4)));
        let slots = sig.bind("f", args, &[], None).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], Value::Int(1));
        assert_eq!(slots[1], Value::tuple(vec![Value::Int(2), Value::Int(3)]));
        let Value::Dict(d) = &slots[2] else { panic!("expected dict") };
        assert_eq!(d.borrow().get("x"), Some(&Value::Int(4)));
    }

    #[test]
    fn kwonly_requires_keyword_or_default() {
        let sig = Signature::new(vec![], None, vec![Rc::from("flag")], None);
        let err = bind_simple(&sig, CallArgs::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: f() missing 1 required keyword-only argument: 'flag'"
        );

        let mut kwdefaults = Dict::default();
        kwdefaults.insert(Rc::from("flag"), Value::Bool(true));
        let slots = sig.bind("f", CallArgs::default(), &[], Some(&kwdefaults)).unwrap();
        assert_eq!(&slots[..], &[Value::Bool(true)]);
    }
}
