//! The import collaborator behind `ImportName`.
//!
//! The core does not own a module system. `ImportName` delegates to an
//! [`Importer`] supplied at VM construction; embedders decide what a module
//! is and where it comes from.

use std::{collections::HashMap, rc::Rc};

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Resolves `import` requests on behalf of the dispatch loop.
pub trait Importer {
    /// Resolves `name` to a module value.
    ///
    /// `fromlist` is the (possibly empty) tuple of names being imported from
    /// the module and `level` the number of leading dots of a relative
    /// import; both are passed through untouched from the instruction's
    /// operands.
    fn import(&mut self, name: &str, fromlist: &Value, level: u32) -> RunResult<Value>;
}

/// Importer for sealed environments: every import raises `ImportError`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImports;

impl Importer for NoImports {
    fn import(&mut self, name: &str, _fromlist: &Value, _level: u32) -> RunResult<Value> {
        Err(ExcType::import_error(format!("No module named '{name}'")))
    }
}

/// A fixed table of pre-registered module values.
///
/// Only absolute imports resolve; there is no package hierarchy to be
/// relative to.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<Rc<str>, Value, ahash::RandomState>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, module: Value) {
        self.modules.insert(Rc::from(name), module);
    }
}

impl Importer for ModuleRegistry {
    fn import(&mut self, name: &str, _fromlist: &Value, level: u32) -> RunResult<Value> {
        if level > 0 {
            return Err(ExcType::ImportError.with_msg("attempted relative import with no known parent package"));
        }
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ExcType::import_error(format!("No module named '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_imports_always_fails() {
        let err = NoImports.import("math", &Value::tuple(vec![]), 0).unwrap_err();
        assert_eq!(err.to_string(), "ImportError: No module named 'math'");
    }

    #[test]
    fn registry_resolves_registered_names() {
        let mut registry = ModuleRegistry::new();
        registry.register("answers", Value::Int(42));
        let module = registry.import("answers", &Value::tuple(vec![]), 0).unwrap();
        assert_eq!(module, Value::Int(42));
        assert!(registry.import("questions", &Value::tuple(vec![]), 0).is_err());
    }

    #[test]
    fn registry_rejects_relative_imports() {
        let mut registry = ModuleRegistry::new();
        registry.register("pkg", Value::Int(1));
        let err = registry.import("pkg", &Value::tuple(vec![]), 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ImportError: attempted relative import with no known parent package"
        );
    }
}
