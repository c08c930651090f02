//! Opcode definitions for the krait instruction set.
//!
//! Every instruction is encoded as a two-byte `(opcode, arg)` pair. Opcodes
//! without a logical operand carry a zero arg byte so the stream length is
//! always even and a cursor can be advanced without an arity table.
//!
//! Operands wider than one byte are encoded with [`Opcode::ExtendedArg`]
//! prefixes: each prefix contributes the next-higher byte of the following
//! instruction's operand.

use strum::{Display, FromRepr, IntoStaticStr};

/// A bytecode instruction tag.
///
/// The numeric values are an internal encoding detail shared between the
/// bytecode producer and the VM; they are not CPython's opcode numbers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
pub enum Opcode {
    // Stack shuffles
    Nop,
    PopTop,
    DupTop,
    DupTopTwo,
    RotTwo,
    RotThree,
    RotFour,

    // Unary operations (dispatched through the per-site operation cache)
    UnaryPositive,
    UnaryNegative,
    UnaryNot,
    UnaryInvert,

    // Binary operations (dispatched through the per-site operation cache)
    BinaryAdd,
    BinarySubtract,
    BinaryMultiply,
    BinaryTrueDivide,
    BinaryFloorDivide,
    BinaryModulo,
    BinaryPower,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    BinaryLshift,
    BinaryRshift,

    /// Pops index then container, pushes `container[index]`.
    BinarySubscr,

    /// Rich comparison; the operand selects a [`CompareKind`].
    CompareOp,

    // Constants and variables
    LoadConst,
    LoadFast,
    StoreFast,
    DeleteFast,
    /// Name lookup through the three-tier resolution order
    /// (frame namespace, module globals, builtins).
    LoadName,
    /// Same resolution order as [`Opcode::LoadName`]; kept as a separate
    /// opcode so producers emitting the traditional distinction still work.
    LoadGlobal,
    StoreName,
    DeleteName,

    // Closure cells
    /// Pushes the value held by cell `oparg` (cellvars first, then freevars).
    LoadDeref,
    /// Pops a value into cell `oparg`.
    StoreDeref,
    /// Pushes the cell itself (used to build closure tuples).
    LoadClosure,

    // Collection builders
    BuildTuple,
    BuildList,
    /// Pops `2 * oparg` values (alternating key, value); keys must be strings.
    BuildMap,

    // Control transfer
    JumpForward,
    JumpAbsolute,
    PopJumpIfFalse,
    PopJumpIfTrue,
    /// Jumps keeping the operand on the stack when it is falsy; pops it and
    /// falls through otherwise. The asymmetry implements short-circuit `and`.
    JumpIfFalseOrPop,
    /// Jumps keeping the operand on the stack when it is truthy; pops it and
    /// falls through otherwise. The asymmetry implements short-circuit `or`.
    JumpIfTrueOrPop,

    /// Raises an exception; the operand (0, 1, or 2) selects how many values
    /// are popped (cause above exception).
    RaiseVarargs,

    /// Pops `fromlist` then `level`, resolves `names[oparg]` through the
    /// import collaborator, pushes the result.
    ImportName,

    /// Builds a function object. The operand is a bit set: bit 0 = defaults
    /// tuple, bit 1 = keyword-defaults mapping, bit 2 = annotations mapping,
    /// bit 3 = closure tuple. Flagged operands are popped highest bit first
    /// (closure is nearest the top), then the qualified name, then the code
    /// object.
    MakeFunction,

    // Calls
    CallFunction,
    /// Like [`Opcode::CallFunction`] but additionally pops a tuple of keyword
    /// names; the trailing `names.len()` argument values are keyword values.
    CallFunctionKw,
    /// Star-expanded call: pops a keyword mapping when bit 0 of the operand
    /// is set, then a positional iterable, then the callable.
    CallFunctionEx,

    ReturnValue,

    /// Operand-widening prefix; never executed on its own.
    ExtendedArg,

    // Families outside this core. The dispatch loop rejects these loudly
    // rather than approximating their semantics.
    GetIter,
    ForIter,
    LoadAttr,
    StoreAttr,
    DeleteAttr,
    StoreGlobal,
    DeleteGlobal,
    UnpackSequence,
    YieldValue,
    SetupFinally,
    PopBlock,
    FormatValue,
    BuildSlice,
    BuildSet,
}

impl Opcode {
    /// Returns true if the arg byte carries a logical operand.
    #[must_use]
    pub fn has_arg(self) -> bool {
        matches!(
            self,
            Self::CompareOp
                | Self::LoadConst
                | Self::LoadFast
                | Self::StoreFast
                | Self::DeleteFast
                | Self::LoadName
                | Self::LoadGlobal
                | Self::StoreName
                | Self::DeleteName
                | Self::LoadDeref
                | Self::StoreDeref
                | Self::LoadClosure
                | Self::BuildTuple
                | Self::BuildList
                | Self::BuildMap
                | Self::JumpForward
                | Self::JumpAbsolute
                | Self::PopJumpIfFalse
                | Self::PopJumpIfTrue
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
                | Self::RaiseVarargs
                | Self::ImportName
                | Self::MakeFunction
                | Self::CallFunction
                | Self::CallFunctionKw
                | Self::CallFunctionEx
                | Self::ExtendedArg
        )
    }

    /// Net effect on operand-stack depth, when statically known.
    ///
    /// Used by [`CodeBuilder`](crate::code::CodeBuilder) to compute the
    /// `stacksize` upper bound the VM trusts at run time. Conditional
    /// or-pop jumps report the fall-through effect, which never
    /// underestimates the running maximum (the jump path keeps the depth
    /// already accounted for).
    ///
    /// Returns `None` for the unsupported instruction families.
    #[must_use]
    pub fn stack_effect(self, oparg: u32) -> Option<i32> {
        let n = oparg as i32;
        let effect = match self {
            Self::Nop | Self::RotTwo | Self::RotThree | Self::RotFour | Self::ExtendedArg => 0,
            Self::PopTop => -1,
            Self::DupTop => 1,
            Self::DupTopTwo => 2,

            Self::UnaryPositive | Self::UnaryNegative | Self::UnaryNot | Self::UnaryInvert => 0,

            Self::BinaryAdd
            | Self::BinarySubtract
            | Self::BinaryMultiply
            | Self::BinaryTrueDivide
            | Self::BinaryFloorDivide
            | Self::BinaryModulo
            | Self::BinaryPower
            | Self::BinaryAnd
            | Self::BinaryOr
            | Self::BinaryXor
            | Self::BinaryLshift
            | Self::BinaryRshift
            | Self::BinarySubscr
            | Self::CompareOp => -1,

            Self::LoadConst
            | Self::LoadFast
            | Self::LoadName
            | Self::LoadGlobal
            | Self::LoadDeref
            | Self::LoadClosure => 1,
            Self::StoreFast | Self::StoreName | Self::StoreDeref => -1,
            Self::DeleteFast | Self::DeleteName => 0,

            Self::BuildTuple | Self::BuildList => 1 - n,
            Self::BuildMap => 1 - 2 * n,

            Self::JumpForward | Self::JumpAbsolute => 0,
            Self::PopJumpIfFalse | Self::PopJumpIfTrue => -1,
            Self::JumpIfFalseOrPop | Self::JumpIfTrueOrPop => -1,

            Self::RaiseVarargs => -n,
            Self::ImportName => -1,
            Self::MakeFunction => -(n.count_ones() as i32 + 1),
            Self::CallFunction => -n,
            Self::CallFunctionKw => -(n + 1),
            Self::CallFunctionEx => -(1 + (n & 1)),
            Self::ReturnValue => -1,

            Self::GetIter
            | Self::ForIter
            | Self::LoadAttr
            | Self::StoreAttr
            | Self::DeleteAttr
            | Self::StoreGlobal
            | Self::DeleteGlobal
            | Self::UnpackSequence
            | Self::YieldValue
            | Self::SetupFinally
            | Self::PopBlock
            | Self::FormatValue
            | Self::BuildSlice
            | Self::BuildSet => return None,
        };
        Some(effect)
    }
}

/// Operand of [`Opcode::CompareOp`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
pub enum CompareKind {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    /// Identity comparison. Immediate values compare by value, shared values
    /// by allocation identity.
    Is,
    IsNot,
}

impl CompareKind {
    /// Source-level operator symbol, used in error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrips_through_repr() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_repr(Opcode::ReturnValue as u8), Some(Opcode::ReturnValue));
    }

    #[test]
    fn unsupported_families_have_no_static_effect() {
        assert_eq!(Opcode::ForIter.stack_effect(0), None);
        assert_eq!(Opcode::LoadAttr.stack_effect(3), None);
    }

    #[test]
    fn call_effects_scale_with_operand() {
        assert_eq!(Opcode::CallFunction.stack_effect(3), Some(-3));
        assert_eq!(Opcode::CallFunctionKw.stack_effect(3), Some(-4));
        assert_eq!(Opcode::CallFunctionEx.stack_effect(1), Some(-2));
        assert_eq!(Opcode::MakeFunction.stack_effect(0b1011), Some(-4));
    }
}
