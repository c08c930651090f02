//! Materialized call arguments.
//!
//! All three call instructions normalize their operands into a [`CallArgs`]
//! before dispatch, so functions, natives, and exception constructors all see
//! the same argument shape.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Positional and keyword arguments for one call.
///
/// Keywords keep call order; duplicate names are rejected at insertion.
#[derive(Debug, Default)]
pub struct CallArgs {
    pos: SmallVec<[Value; 8]>,
    kw: Vec<(Rc<str>, Value)>,
}

impl CallArgs {
    /// Arguments for a purely positional call.
    #[must_use]
    pub fn positional(pos: impl IntoIterator<Item = Value>) -> Self {
        Self {
            pos: pos.into_iter().collect(),
            kw: Vec::new(),
        }
    }

    /// Appends a positional argument.
    pub fn push(&mut self, value: Value) {
        self.pos.push(value);
    }

    /// Appends a keyword argument. Returns false if the name was already
    /// present, leaving the arguments unchanged.
    #[must_use]
    pub fn push_kw(&mut self, name: Rc<str>, value: Value) -> bool {
        if self.kw.iter().any(|(k, _)| *k == name) {
            return false;
        }
        self.kw.push((name, value));
        true
    }

    #[must_use]
    pub fn pos(&self) -> &[Value] {
        &self.pos
    }

    #[must_use]
    pub fn kw(&self) -> &[(Rc<str>, Value)] {
        &self.kw
    }

    pub(crate) fn into_parts(self) -> (SmallVec<[Value; 8]>, Vec<(Rc<str>, Value)>) {
        (self.pos, self.kw)
    }

    /// For natives taking exactly `n` positional arguments and no keywords.
    pub fn expect_positional<const N: usize>(self, fname: &str) -> RunResult<[Value; N]> {
        if let Some((name, _)) = self.kw.first() {
            return Err(ExcType::type_error(format!(
                "{fname}() got an unexpected keyword argument '{name}'"
            )));
        }
        let got = self.pos.len();
        let plural = if N == 1 { "argument" } else { "arguments" };
        self.pos
            .into_vec()
            .try_into()
            .map_err(|_| ExcType::type_error(format!("{fname}() takes exactly {N} {plural} ({got} given)")))
    }
}
