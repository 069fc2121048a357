//! Model functions: a formula of the scan coordinate, bound to variables.

use crate::core::{EngineError, Expr, Result};
use crate::diff::differentiate;
use crate::vm::{run_value_only, run_with_derivs, Compiler, Program};

use super::variable::ParMult;

/// One flattened chain-rule entry of a function: the derivative of the
/// function with respect to formal argument `n` contributes with weight
/// `mult` to the derivative with respect to parameter slot `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multi {
    pub p: usize,
    pub n: usize,
    pub mult: f64,
}

/// A named function `y = f(args; x)`.
///
/// The compiled program's `Symbol(i)` operands are *formal* indices
/// `0..n`, not variable-list positions, so re-linking after a graph
/// mutation only has to refresh `var_idx`; the bytecode stays valid.
/// Before evaluation the program is specialized: symbols are replaced by
/// the arguments' current values, leaving `X` as the only input.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    varnames: Vec<String>,
    var_idx: Vec<usize>,
    /// n parameter derivatives, the x derivative, then the value tree.
    op_trees: Vec<Expr>,
    program: Program,
    substituted: Program,
    /// Scratch for the n+1 derivative slots during evaluation.
    derivatives: Vec<f64>,
    multi: Vec<Multi>,
}

impl Function {
    /// Build a function from its value formula. `tree` references formal
    /// arguments as `Var(0..n)` and the scan coordinate as `Var(n)`,
    /// where `n == varnames.len()`.
    ///
    /// # Errors
    ///
    /// `UnboundArgument` if the tree references an index past the scan
    /// coordinate, plus anything differentiation and compilation report.
    pub(crate) fn new(
        name: impl Into<String>,
        tree: &Expr,
        varnames: Vec<String>,
    ) -> Result<Self> {
        let n = varnames.len();
        if let Some(m) = tree.max_var() {
            if m > n {
                return Err(EngineError::UnboundArgument { index: m, bound: n });
            }
        }
        let op_trees = differentiate(tree, n, true)?;
        let slot_map: Vec<usize> = (0..n).collect();
        let program = Compiler::with_derivatives(&op_trees[..=n], &op_trees[n + 1], &slot_map)?;
        let substituted = program.clone();
        Ok(Function {
            name: name.into(),
            varnames,
            var_idx: Vec::new(),
            op_trees,
            program,
            substituted,
            derivatives: vec![0.0; n + 1],
            multi: Vec::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the bound argument variables.
    #[must_use]
    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    /// Current positions of the bound argument variables.
    #[must_use]
    pub fn var_idx(&self) -> &[usize] {
        &self.var_idx
    }

    /// The simplified value formula (formal indices, `Var(n)` is x).
    #[must_use]
    pub fn value_tree(&self) -> &Expr {
        // Construction guarantees n+2 trees.
        &self.op_trees[self.op_trees.len() - 1]
    }

    /// Flattened chain-rule list, rebuilt on every recompute.
    #[must_use]
    pub fn multi(&self) -> &[Multi] {
        &self.multi
    }

    /// Re-resolve argument names to list positions.
    pub(crate) fn set_var_idx(
        &mut self,
        resolve: &dyn Fn(&str) -> Option<usize>,
    ) -> Result<()> {
        let mut idx = Vec::with_capacity(self.varnames.len());
        for n in &self.varnames {
            idx.push(resolve(n).ok_or_else(|| EngineError::undefined_variable(n))?);
        }
        self.var_idx = idx;
        Ok(())
    }

    /// Specialize the program to the arguments' current values and
    /// rebuild the chain-rule list.
    pub(crate) fn precompute(&mut self, values_by_pos: &[f64], recs_by_pos: &[Vec<ParMult>]) {
        let arg_values: Vec<f64> = self.var_idx.iter().map(|&p| values_by_pos[p]).collect();
        let mut specialized = self.program.clone();
        specialized.replace_symbols(&arg_values);
        self.substituted = specialized;

        self.multi.clear();
        for (i, &p) in self.var_idx.iter().enumerate() {
            for pm in &recs_by_pos[p] {
                self.multi.push(Multi {
                    p: pm.p,
                    n: i,
                    mult: pm.mult,
                });
            }
        }
    }

    /// Value at `x` (hot path, value code only).
    #[inline]
    #[must_use]
    pub fn value(&self, x: f64) -> f64 {
        run_value_only(&self.substituted, x)
    }

    /// Value at `x`, accumulating parameter derivatives.
    ///
    /// `dy_da` has one cell per global parameter plus a trailing cell for
    /// the derivative with respect to x; contributions are *added*, so
    /// several functions can share one buffer per data point.
    pub fn value_and_put_derivatives(&mut self, x: f64, dy_da: &mut [f64]) -> f64 {
        let y = run_with_derivs(&self.substituted, x, &mut self.derivatives);
        for m in &self.multi {
            dy_da[m.p] += self.derivatives[m.n] * m.mult;
        }
        let last = dy_da.len() - 1;
        dy_da[last] += self.derivatives[self.varnames.len()];
        y
    }

    /// Parameter slot `k` was removed; shift chain-rule entries.
    pub(crate) fn erased_parameter(&mut self, k: usize) {
        for m in &mut self.multi {
            if m.p > k {
                m.p -= 1;
            }
        }
    }
}
