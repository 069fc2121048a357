//! Expression-to-bytecode compilation.
//!
//! Emission is a plain post-order walk; all algebraic cleverness lives in
//! the tree simplifier, so the compiler's only jobs are constant-pool
//! interning, symbol-slot mapping and stack-depth accounting. The depth
//! check at compile time is what lets the interpreters index a fixed
//! stack without per-push bounds checks.

use rustc_hash::FxHashMap;

use crate::core::{EngineError, Expr, Result};

use super::instruction::{Instr, Program};

/// Fixed evaluation stack budget. Fitting formulas are shallow; anything
/// deeper than this is a runaway input and is rejected at compile time.
pub const MAX_STACK_DEPTH: usize = 32;

/// Bytecode emitter with compile-time stack validation.
pub struct Compiler {
    code: Vec<Instr>,
    numbers: Vec<f64>,
    // Interning map: f64 bit pattern -> pool index.
    const_map: FxHashMap<u64, u32>,
    current_stack: usize,
    max_stack: usize,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            code: Vec::new(),
            numbers: Vec::new(),
            const_map: FxHashMap::default(),
            current_stack: 0,
            max_stack: 0,
        }
    }

    /// Compile a value-only program.
    ///
    /// `slot_map[k]` is the symbol slot emitted for `Var(k)`; the index
    /// one past the end of the map denotes the scan coordinate.
    ///
    /// # Errors
    ///
    /// `StackOverflow` if the tree needs more than [`MAX_STACK_DEPTH`].
    pub fn tree(tree: &Expr, slot_map: &[usize]) -> Result<Program> {
        let mut c = Compiler::new();
        c.emit(tree, slot_map)?;
        c.pop();
        Ok(c.finish(0))
    }

    /// Compile derivative trees followed by the value tree.
    ///
    /// Each derivative's code is followed by a `PutDeriv` with its index;
    /// the value code starts at the returned program's `value_offset`.
    ///
    /// # Errors
    ///
    /// `StackOverflow` if any tree needs more than [`MAX_STACK_DEPTH`].
    pub fn with_derivatives(
        derivs: &[Expr],
        value: &Expr,
        slot_map: &[usize],
    ) -> Result<Program> {
        let mut c = Compiler::new();
        for (i, d) in derivs.iter().enumerate() {
            c.emit(d, slot_map)?;
            c.code.push(Instr::PutDeriv(i as u32));
            c.pop();
        }
        let value_offset = c.code.len();
        c.emit(value, slot_map)?;
        c.pop();
        Ok(c.finish(value_offset))
    }

    fn finish(self, value_offset: usize) -> Program {
        debug_assert_eq!(self.current_stack, 0);
        Program {
            code: self.code,
            numbers: self.numbers,
            value_offset,
            max_stack: self.max_stack,
        }
    }

    fn add_const(&mut self, val: f64) -> u32 {
        let bits = val.to_bits();
        if let Some(&idx) = self.const_map.get(&bits) {
            return idx;
        }
        let idx = self.numbers.len() as u32;
        self.numbers.push(val);
        self.const_map.insert(bits, idx);
        idx
    }

    fn push(&mut self) -> Result<()> {
        self.current_stack += 1;
        if self.current_stack > MAX_STACK_DEPTH {
            return Err(EngineError::StackOverflow {
                needed: self.current_stack,
                limit: MAX_STACK_DEPTH,
            });
        }
        if self.current_stack > self.max_stack {
            self.max_stack = self.current_stack;
        }
        Ok(())
    }

    fn pop(&mut self) {
        debug_assert!(self.current_stack > 0);
        self.current_stack -= 1;
    }

    fn emit(&mut self, tree: &Expr, slot_map: &[usize]) -> Result<()> {
        match tree {
            Expr::Const(v) => {
                let idx = self.add_const(*v);
                self.code.push(Instr::Number(idx));
                self.push()
            }
            Expr::Var(k) if *k == slot_map.len() => {
                self.code.push(Instr::X);
                self.push()
            }
            Expr::Var(k) => {
                self.code.push(Instr::Symbol(slot_map[*k] as u32));
                self.push()
            }
            Expr::Unary(op, a) => {
                self.emit(a, slot_map)?;
                self.code.push(Instr::Un(*op));
                Ok(())
            }
            Expr::Binary(op, a, b) => {
                self.emit(a, slot_map)?;
                self.emit(b, slot_map)?;
                self.code.push(Instr::Bin(*op));
                self.pop();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinaryOp, Expr, UnaryOp};

    fn bin(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn emits_post_order() {
        // 2 * sin($0)
        let e = bin(
            BinaryOp::Mul,
            Expr::num(2.0),
            Expr::Unary(UnaryOp::Sin, Box::new(Expr::var(0))),
        );
        let prog = Compiler::tree(&e, &[5]).unwrap();
        assert_eq!(
            prog.code(),
            &[
                Instr::Number(0),
                Instr::Symbol(5),
                Instr::Un(UnaryOp::Sin),
                Instr::Bin(BinaryOp::Mul),
            ]
        );
        assert_eq!(prog.numbers(), &[2.0]);
        assert_eq!(prog.max_stack(), 2);
    }

    #[test]
    fn var_past_map_is_scan_coordinate() {
        // $0 bound, $1 is x
        let e = bin(BinaryOp::Add, Expr::var(0), Expr::var(1));
        let prog = Compiler::tree(&e, &[3]).unwrap();
        assert_eq!(
            prog.code(),
            &[Instr::Symbol(3), Instr::X, Instr::Bin(BinaryOp::Add)]
        );
    }

    #[test]
    fn constants_are_interned() {
        let e = bin(
            BinaryOp::Add,
            bin(BinaryOp::Mul, Expr::num(2.0), Expr::var(0)),
            Expr::num(2.0),
        );
        let prog = Compiler::tree(&e, &[0]).unwrap();
        assert_eq!(prog.numbers(), &[2.0]);
    }

    #[test]
    fn derivative_layout_and_value_offset() {
        let derivs = [Expr::num(1.0), Expr::num(0.0)];
        let value = Expr::var(0);
        let prog = Compiler::with_derivatives(&derivs, &value, &[0]).unwrap();
        assert_eq!(
            prog.code(),
            &[
                Instr::Number(0),
                Instr::PutDeriv(0),
                Instr::Number(1),
                Instr::PutDeriv(1),
                Instr::Symbol(0),
            ]
        );
        assert_eq!(prog.value_offset(), 4);
    }

    #[test]
    fn rejects_runaway_depth() {
        // Right-leaning chain: a + (a + (a + ...)) needs one slot per level.
        let mut e = Expr::var(0);
        for _ in 0..(MAX_STACK_DEPTH + 1) {
            e = bin(BinaryOp::Add, Expr::var(0), e);
        }
        let err = Compiler::tree(&e, &[0]).unwrap_err();
        assert!(matches!(err, EngineError::StackOverflow { .. }));
    }
}
