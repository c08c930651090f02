//! Function objects built by `MakeFunction`.
//!
//! A function couples a shared code object with the call-time state captured
//! at its creation site: default values, keyword-only defaults, annotations,
//! the closure cells it was built over, and the module globals it will
//! resolve names through.

use std::{cell::RefCell, rc::Rc};

use smallvec::SmallVec;

use crate::{
    args::CallArgs,
    code::Code,
    exception::RunResult,
    namespace::Namespace,
    value::{CellRef, Dict, Value},
};

#[derive(Debug)]
pub struct Function {
    code: Rc<Code>,
    qualname: Rc<str>,
    defaults: Box<[Value]>,
    kwdefaults: Option<Rc<RefCell<Dict>>>,
    /// Carried for introspection; the VM never reads annotations.
    annotations: Option<Value>,
    closure: Box<[CellRef]>,
    globals: Rc<Namespace>,
}

impl Function {
    pub(crate) fn new(
        code: Rc<Code>,
        qualname: Rc<str>,
        defaults: Box<[Value]>,
        kwdefaults: Option<Rc<RefCell<Dict>>>,
        annotations: Option<Value>,
        closure: Box<[CellRef]>,
        globals: Rc<Namespace>,
    ) -> Self {
        Self {
            code,
            qualname,
            defaults,
            kwdefaults,
            annotations,
            closure,
            globals,
        }
    }

    #[must_use]
    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    /// Short name, used in binding error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        self.code.name()
    }

    /// Dotted name, used in reprs.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    #[must_use]
    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    #[must_use]
    pub fn kwdefaults(&self) -> Option<&Rc<RefCell<Dict>>> {
        self.kwdefaults.as_ref()
    }

    #[must_use]
    pub fn annotations(&self) -> Option<&Value> {
        self.annotations.as_ref()
    }

    #[must_use]
    pub fn closure(&self) -> &[CellRef] {
        &self.closure
    }

    #[must_use]
    pub fn globals(&self) -> &Rc<Namespace> {
        &self.globals
    }

    /// Binds `args` against this function's signature and defaults,
    /// producing the leading fast-local slot values for a new frame.
    pub(crate) fn bind(&self, args: CallArgs) -> RunResult<SmallVec<[Value; 8]>> {
        let kwdefaults = self.kwdefaults.as_ref().map(|d| d.borrow());
        self.code
            .signature()
            .bind(self.name(), args, &self.defaults, kwdefaults.as_deref())
    }
}
