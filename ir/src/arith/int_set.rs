//! Symbolic integer intervals.
//!
//! [`eval_set`] relaxes the variables of a domain map: every mapped variable
//! is replaced by its interval, the rest stay symbolic. The result bounds are
//! expressions in the unrelaxed variables.

use std::collections::HashMap;

use super::analyzer::Analyzer;
use crate::buffer::Range;
use crate::expr::{BinaryOp, ExprKind, PrimExpr, Var};
use crate::visit::uses_var;

/// Closed interval `[min, max]`; `None` is an unbounded side.
#[derive(Debug, Clone, PartialEq)]
pub struct IntSet {
    pub min: Option<PrimExpr>,
    pub max: Option<PrimExpr>,
}

impl IntSet {
    pub fn single_point(value: PrimExpr) -> Self {
        Self { min: Some(value.clone()), max: Some(value) }
    }

    pub fn interval(min: PrimExpr, max: PrimExpr) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    pub fn everything() -> Self {
        Self { min: None, max: None }
    }

    /// `[range.min, range.min + range.extent - 1]`.
    pub fn from_range(range: &Range) -> Self {
        let max = &range.min + range.extent.clone() - 1;
        Self::interval(range.min.clone(), max)
    }

    pub fn is_single_point(&self) -> bool {
        matches!((&self.min, &self.max), (Some(a), Some(b)) if a == b)
    }

    /// Smallest interval covering all `sets`.
    pub fn union(sets: &[IntSet], analyzer: &Analyzer) -> IntSet {
        let mins: Option<Vec<PrimExpr>> = sets.iter().map(|s| s.min.clone()).collect();
        let maxs: Option<Vec<PrimExpr>> = sets.iter().map(|s| s.max.clone()).collect();
        let reduce = |bounds: Vec<PrimExpr>, op: BinaryOp| {
            bounds.into_iter().reduce(|acc, b| PrimExpr::binary(op, acc, b)).map(|e| analyzer.simplify(&e))
        };
        IntSet {
            min: mins.and_then(|m| reduce(m, BinaryOp::Min)),
            max: maxs.and_then(|m| reduce(m, BinaryOp::Max)),
        }
    }

    /// Clip the interval to `bound` and express it as a range. Unbounded sides
    /// take the corresponding side of `bound`.
    pub fn cover_range(&self, bound: &Range, analyzer: &Analyzer) -> Range {
        let bound_max = analyzer.simplify(&(&bound.min + bound.extent.clone() - 1));
        let min = match &self.min {
            Some(m) => clip_lower(m, &bound.min, analyzer),
            None => bound.min.clone(),
        };
        let max = match &self.max {
            Some(m) => clip_upper(m, &bound_max, analyzer),
            None => bound_max,
        };
        let extent = analyzer.simplify(&(&max - min.clone() + 1));
        Range { min, extent }
    }
}

fn clip_lower(value: &PrimExpr, lower: &PrimExpr, analyzer: &Analyzer) -> PrimExpr {
    if analyzer.can_prove(&crate::expr::ge(value.clone(), lower.clone())) {
        return value.clone();
    }
    if analyzer.can_prove(&crate::expr::le(value.clone(), lower.clone())) {
        return lower.clone();
    }
    analyzer.simplify(&crate::expr::max(value.clone(), lower.clone()))
}

fn clip_upper(value: &PrimExpr, upper: &PrimExpr, analyzer: &Analyzer) -> PrimExpr {
    if analyzer.can_prove(&crate::expr::le(value.clone(), upper.clone())) {
        return value.clone();
    }
    if analyzer.can_prove(&crate::expr::ge(value.clone(), upper.clone())) {
        return upper.clone();
    }
    analyzer.simplify(&crate::expr::min(value.clone(), upper.clone()))
}

/// Interval of `expr` when every variable of `dom` ranges over its set.
pub fn eval_set(expr: &PrimExpr, dom: &HashMap<Var, IntSet>, analyzer: &Analyzer) -> IntSet {
    let expr = analyzer.simplify(expr);
    let set = eval_rec(&expr, dom, analyzer);
    IntSet { min: set.min.map(|e| analyzer.simplify(&e)), max: set.max.map(|e| analyzer.simplify(&e)) }
}

fn eval_rec(expr: &PrimExpr, dom: &HashMap<Var, IntSet>, analyzer: &Analyzer) -> IntSet {
    if !uses_var(expr, |v| dom.contains_key(v)) {
        return IntSet::single_point(expr.clone());
    }
    match expr.kind() {
        ExprKind::Var(var) => dom.get(var).cloned().unwrap_or_else(|| IntSet::single_point(expr.clone())),
        ExprKind::Binary(op, a, b) => {
            let (sa, sb) = (eval_rec(a, dom, analyzer), eval_rec(b, dom, analyzer));
            eval_binary(*op, sa, sb, analyzer)
        }
        _ => IntSet::everything(),
    }
}

fn both(a: &Option<PrimExpr>, b: &Option<PrimExpr>, f: impl Fn(&PrimExpr, &PrimExpr) -> PrimExpr) -> Option<PrimExpr> {
    Some(f(a.as_ref()?, b.as_ref()?))
}

fn eval_binary(op: BinaryOp, a: IntSet, b: IntSet, analyzer: &Analyzer) -> IntSet {
    let point_const = |s: &IntSet| if s.is_single_point() { s.min.as_ref().and_then(|e| analyzer.simplify(e).as_int()) } else { None };
    match op {
        BinaryOp::Add => IntSet { min: both(&a.min, &b.min, |x, y| x + y.clone()), max: both(&a.max, &b.max, |x, y| x + y.clone()) },
        BinaryOp::Sub => IntSet { min: both(&a.min, &b.max, |x, y| x - y.clone()), max: both(&a.max, &b.min, |x, y| x - y.clone()) },
        BinaryOp::Mul => {
            let (set, k) = match (point_const(&a), point_const(&b)) {
                (_, Some(k)) => (a, k),
                (Some(k), None) => (b, k),
                (None, None) => return IntSet::everything(),
            };
            let scale = |e: &PrimExpr| e * PrimExpr::const_int(k, e.dtype());
            if k >= 0 {
                IntSet { min: set.min.as_ref().map(scale), max: set.max.as_ref().map(scale) }
            } else {
                IntSet { min: set.max.as_ref().map(scale), max: set.min.as_ref().map(scale) }
            }
        }
        BinaryOp::FloorDiv => match point_const(&b) {
            Some(c) if c > 0 => {
                let div = |e: &PrimExpr| crate::expr::floordiv(e.clone(), PrimExpr::const_int(c, e.dtype()));
                IntSet { min: a.min.as_ref().map(div), max: a.max.as_ref().map(div) }
            }
            _ => IntSet::everything(),
        },
        BinaryOp::FloorMod => match point_const(&b) {
            Some(c) if c > 0 => {
                if let (Some(lo), Some(hi)) = (&a.min, &a.max) {
                    let (lo_s, hi_s) = (analyzer.simplify(lo), analyzer.simplify(hi));
                    if let (Some(x), Some(y)) = (lo_s.as_int(), hi_s.as_int())
                        && x.div_euclid(c) == y.div_euclid(c)
                    {
                        return IntSet::interval(
                            PrimExpr::const_int(x.rem_euclid(c), lo_s.dtype()),
                            PrimExpr::const_int(y.rem_euclid(c), hi_s.dtype()),
                        );
                    }
                }
                let dtype = a.min.as_ref().or(a.max.as_ref()).map(|e| e.dtype()).unwrap_or(tessera_dtype::DType::Int32);
                IntSet::interval(PrimExpr::zero(dtype), PrimExpr::const_int(c - 1, dtype))
            }
            _ => IntSet::everything(),
        },
        BinaryOp::Min => IntSet {
            min: both(&a.min, &b.min, |x, y| crate::expr::min(x.clone(), y.clone())),
            max: both(&a.max, &b.max, |x, y| crate::expr::min(x.clone(), y.clone())),
        },
        BinaryOp::Max => IntSet {
            min: both(&a.min, &b.min, |x, y| crate::expr::max(x.clone(), y.clone())),
            max: both(&a.max, &b.max, |x, y| crate::expr::max(x.clone(), y.clone())),
        },
    }
}
