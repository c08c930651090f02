//! Per-site operation caches for binary arithmetic and comparison.
//!
//! Each binary instruction in a code object owns one cache slot, keyed by the
//! byte offset of its instruction pair. A slot remembers the operand shape it
//! last executed with and routes repeat executions straight to the matching
//! fast path. The cache is a hint only: on a shape mismatch the slot is
//! rewritten and the operands go through the generic handlers, so results are
//! identical whether a site is cold, specialized, or megamorphic.
//!
//! Code objects are shared between activations, so a cache warmed by one call
//! speeds up the next. Slots use `Cell`: the VM is single-threaded and slots
//! are `Copy`.

use std::cell::Cell;

use crate::{
    exception::RunResult,
    value::{BinaryKind, Value, float_binary, int_binary},
};

/// Operand-shape speculation state of one cache slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BinaryShape {
    /// Never executed.
    #[default]
    Unset,
    IntInt,
    FloatFloat,
    IntFloat,
    FloatInt,
    StrStr,
    /// Saw more than one shape; stays on the generic handler.
    Generic,
}

impl BinaryShape {
    fn of(lhs: &Value, rhs: &Value) -> Self {
        match (lhs, rhs) {
            (Value::Int(_), Value::Int(_)) => Self::IntInt,
            (Value::Float(_), Value::Float(_)) => Self::FloatFloat,
            (Value::Int(_), Value::Float(_)) => Self::IntFloat,
            (Value::Float(_), Value::Int(_)) => Self::FloatInt,
            (Value::Str(_), Value::Str(_)) => Self::StrStr,
            _ => Self::Generic,
        }
    }
}

/// Whether an execution went through a slot's specialized fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// The cache slots of one code object, indexed by instruction-pair offset.
#[derive(Debug)]
pub struct OpCache {
    sites: Vec<Cell<BinaryShape>>,
}

impl OpCache {
    /// Creates cold slots for a code object with `pairs` instruction pairs.
    #[must_use]
    pub fn new(pairs: usize) -> Self {
        Self {
            sites: vec![Cell::new(BinaryShape::Unset); pairs],
        }
    }

    /// Current speculation state of the slot at `site`.
    #[must_use]
    pub fn shape_at(&self, site: usize) -> BinaryShape {
        self.sites.get(site).map_or(BinaryShape::Unset, Cell::get)
    }

    /// Executes `lhs op rhs` through the slot at `site`.
    ///
    /// A matching shape takes the specialized path; anything else rewrites
    /// the slot and falls back to [`Value::py_binary`].
    pub(crate) fn binary(
        &self,
        site: usize,
        op: BinaryKind,
        lhs: &Value,
        rhs: &Value,
    ) -> RunResult<(Value, CacheStatus)> {
        let slot = &self.sites[site];
        let fast = match (slot.get(), lhs, rhs) {
            (BinaryShape::IntInt, Value::Int(a), Value::Int(b)) => Some(int_binary(op, *a, *b)),
            (BinaryShape::FloatFloat, Value::Float(a), Value::Float(b)) => Some(float_binary(op, *a, *b)),
            (BinaryShape::IntFloat, Value::Int(a), Value::Float(b)) => Some(float_binary(op, *a as f64, *b)),
            (BinaryShape::FloatInt, Value::Float(a), Value::Int(b)) => Some(float_binary(op, *a, *b as f64)),
            (BinaryShape::StrStr, Value::Str(_), Value::Str(_)) | (BinaryShape::Generic, ..) => {
                // StrStr covers concat and repeat error paths alike; route
                // through the generic handler but keep the slot stable.
                Some(lhs.py_binary(op, rhs))
            }
            _ => None,
        };
        if let Some(result) = fast {
            return Ok((result?, CacheStatus::Hit));
        }
        // miss: rewrite the slot, then answer generically
        let observed = BinaryShape::of(lhs, rhs);
        let next = if slot.get() == BinaryShape::Unset { observed } else { BinaryShape::Generic };
        slot.set(next);
        Ok((lhs.py_binary(op, rhs)?, CacheStatus::Miss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_execution_specializes_the_slot() {
        let cache = OpCache::new(4);
        let (v, status) = cache.binary(0, BinaryKind::Add, &Value::Int(2), &Value::Int(3)).unwrap();
        assert_eq!(v, Value::Int(5));
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(cache.shape_at(0), BinaryShape::IntInt);

        let (v, status) = cache.binary(0, BinaryKind::Add, &Value::Int(4), &Value::Int(5)).unwrap();
        assert_eq!(v, Value::Int(9));
        assert_eq!(status, CacheStatus::Hit);
    }

    #[test]
    fn shape_change_falls_back_to_generic() {
        let cache = OpCache::new(1);
        cache.binary(0, BinaryKind::Mul, &Value::Int(2), &Value::Int(3)).unwrap();
        let (v, status) = cache
            .binary(0, BinaryKind::Mul, &Value::Float(2.0), &Value::Int(3))
            .unwrap();
        assert_eq!(v, Value::Float(6.0));
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(cache.shape_at(0), BinaryShape::Generic);

        // generic slots stay generic and stay correct
        let (v, status) = cache.binary(0, BinaryKind::Mul, &Value::Int(2), &Value::Int(3)).unwrap();
        assert_eq!(v, Value::Int(6));
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(cache.shape_at(0), BinaryShape::Generic);
    }

    #[test]
    fn specialized_path_agrees_with_generic_handler_on_errors() {
        let cache = OpCache::new(1);
        cache.binary(0, BinaryKind::FloorDiv, &Value::Int(6), &Value::Int(2)).unwrap();
        let err = cache
            .binary(0, BinaryKind::FloorDiv, &Value::Int(1), &Value::Int(0))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ZeroDivisionError: integer division or modulo by zero"
        );
    }

    #[test]
    fn sites_are_independent() {
        let cache = OpCache::new(2);
        cache.binary(0, BinaryKind::Add, &Value::Int(1), &Value::Int(1)).unwrap();
        assert_eq!(cache.shape_at(0), BinaryShape::IntInt);
        assert_eq!(cache.shape_at(1), BinaryShape::Unset);
    }
}
