use std::collections::HashMap;

use super::bound::{ConstIntBound, const_int_bound};
use super::simplify::Simplifier;
use crate::buffer::Range;
use crate::expr::{PrimExpr, Var};

/// Arithmetic context: variable bounds plus the queries that use them.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    bounds: HashMap<Var, ConstIntBound>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `var` ranges over `range`. A later binding of the same
    /// variable replaces the earlier one.
    pub fn bind(&mut self, var: &Var, range: &Range) {
        let min = self.const_int_bound(&range.min);
        let extent = self.const_int_bound(&range.extent);
        let upper = self.const_int_bound(&(&range.min + range.extent.clone() - 1));
        let bound = if extent.max <= 0 { ConstIntBound::point(min.min) } else { ConstIntBound::new(min.min, upper.max) };
        self.bounds.insert(var.clone(), bound);
    }

    pub fn bind_bound(&mut self, var: &Var, bound: ConstIntBound) {
        self.bounds.insert(var.clone(), bound);
    }

    pub fn bounds(&self) -> &HashMap<Var, ConstIntBound> {
        &self.bounds
    }

    pub fn simplify(&self, expr: &PrimExpr) -> PrimExpr {
        Simplifier::new(&self.bounds).simplify(expr)
    }

    pub fn const_int_bound(&self, expr: &PrimExpr) -> ConstIntBound {
        let simplifier = Simplifier::new(&self.bounds);
        if expr.dtype().is_int() && expr.dtype().lanes() == 1 {
            return simplifier.bound_of(&simplifier.linear(expr));
        }
        const_int_bound(expr, &self.bounds)
    }

    /// Whether `cond` simplifies to `true`.
    pub fn can_prove(&self, cond: &PrimExpr) -> bool {
        self.simplify(cond).is_const_true()
    }

    pub fn can_prove_equal(&self, a: &PrimExpr, b: &PrimExpr) -> bool {
        if a == b {
            return true;
        }
        if a.dtype().is_int() && b.dtype().is_int() {
            let simplifier = Simplifier::new(&self.bounds);
            let diff = simplifier.linear(a).combine(&simplifier.linear(b), -1);
            return diff.as_const() == Some(0);
        }
        self.simplify(a) == self.simplify(b)
    }
}
