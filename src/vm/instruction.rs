//! Bytecode instructions and compiled programs.

use crate::core::{BinaryOp, UnaryOp};

/// A single stack-machine instruction.
///
/// Operands are indices: into the constant pool (`Number`), into the
/// symbol slot table the program was compiled against (`Symbol`), or into
/// the caller's derivative buffer (`PutDeriv`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    /// Push `numbers[idx]`.
    Number(u32),
    /// Push the current value of the referenced symbol.
    Symbol(u32),
    /// Push the scan coordinate.
    X,
    /// Pop into derivative slot `idx`.
    PutDeriv(u32),
    /// Pop one, apply, push.
    Un(UnaryOp),
    /// Pop two, apply, push.
    Bin(BinaryOp),
}

/// A compiled formula: flat code plus its deduplicated constant pool.
///
/// Programs with derivatives have the layout
///
/// ```text
/// <deriv 0> PutDeriv(0) ... <deriv n> PutDeriv(n) <value>
/// ```
///
/// and `value_offset` marks the start of the `<value>` suffix so the hot
/// path can skip the derivative trains when only the value is needed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub(crate) code: Vec<Instr>,
    pub(crate) numbers: Vec<f64>,
    pub(crate) value_offset: usize,
    pub(crate) max_stack: usize,
}

impl Program {
    /// The instruction list.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    /// The constant pool.
    #[inline]
    #[must_use]
    pub fn numbers(&self) -> &[f64] {
        &self.numbers
    }

    /// Start of the value-only code suffix.
    #[inline]
    #[must_use]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// Peak stack depth this program needs (computed at compile time).
    #[inline]
    #[must_use]
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Replace every `Symbol(i)` with a constant-pool load of `values[i]`.
    ///
    /// This specializes a function program to the current parameter
    /// values, leaving `X` as the only varying input. Existing pool slots
    /// holding the same value are reused.
    pub fn replace_symbols(&mut self, values: &[f64]) {
        for instr in &mut self.code {
            if let Instr::Symbol(i) = *instr {
                let val = values[i as usize];
                let idx = match self.numbers.iter().position(|&n| n == val) {
                    Some(idx) => idx,
                    None => {
                        self.numbers.push(val);
                        self.numbers.len() - 1
                    }
                };
                *instr = Instr::Number(idx as u32);
            }
        }
    }

    /// True if any `Symbol` instruction remains.
    #[must_use]
    pub fn has_symbols(&self) -> bool {
        self.code.iter().any(|i| matches!(i, Instr::Symbol(_)))
    }
}
