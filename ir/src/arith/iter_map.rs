//! Iteration marks and the affine iteration-map solver.
//!
//! A binding expression over loop variables is affine when it flattens to a
//! fused chain `v0 + v1*e0 + v2*e0*e1 + ...` of distinct zero-based loops,
//! where `ek` is the extent of `vk`. Such a chain can be cut at any position:
//! the low-order prefix forms an inner iteration of extent `e0*...*ek` and the
//! remaining suffix an outer iteration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tessera_dtype::DType;

use super::analyzer::Analyzer;
use crate::buffer::Range;
use crate::expr::{ExprKind, PrimExpr, Var};
use crate::mutate::{VarMap, substitute};
use crate::visit::collect_vars;

/// Source of an [`IterMark`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarkSource {
    /// A plain expression, usually a loop variable.
    Expr(PrimExpr),
    /// A structured iteration expression.
    Iter(Box<IterMapExpr>),
}

/// An iteration with a known extent.
#[derive(Debug, Clone, PartialEq)]
pub struct IterMark {
    pub source: MarkSource,
    pub extent: PrimExpr,
}

impl IterMark {
    /// Mark of extent 1 whose value is always zero.
    pub fn unit(dtype: DType) -> Self {
        Self::constant(PrimExpr::zero(dtype))
    }

    /// Mark of extent 1 whose value is `value`.
    pub fn constant(value: PrimExpr) -> Self {
        let extent = PrimExpr::one(value.dtype());
        Self { source: MarkSource::Iter(Box::new(IterMapExpr::Sum(IterSumExpr { args: Vec::new(), base: value }))), extent }
    }

    pub fn from_expr(source: PrimExpr, extent: PrimExpr) -> Self {
        Self { source: MarkSource::Expr(source), extent }
    }

    pub fn is_unit(&self) -> bool {
        self.extent.is_one()
    }

    /// The expression this mark iterates.
    pub fn to_expr(&self) -> PrimExpr {
        match &self.source {
            MarkSource::Expr(e) => e.clone(),
            MarkSource::Iter(iter) => normalize_iter_map_to_expr(iter),
        }
    }
}

/// `floormod(floordiv(source, lower_factor), extent) * scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct IterSplitExpr {
    pub source: Arc<IterMark>,
    pub lower_factor: PrimExpr,
    pub extent: PrimExpr,
    pub scale: PrimExpr,
}

impl IterSplitExpr {
    /// Whole mark with unit scale.
    pub fn from_mark(source: Arc<IterMark>) -> Self {
        let dtype = source.extent.dtype();
        let extent = source.extent.clone();
        Self { source, lower_factor: PrimExpr::one(dtype), extent, scale: PrimExpr::one(dtype) }
    }

    pub fn with_scale(mut self, scale: PrimExpr) -> Self {
        self.scale = scale;
        self
    }
}

/// `sum(args) + base`.
#[derive(Debug, Clone, PartialEq)]
pub struct IterSumExpr {
    pub args: Vec<IterSplitExpr>,
    pub base: PrimExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterMapExpr {
    Split(IterSplitExpr),
    Sum(IterSumExpr),
}

/// Rebuild a plain expression from an iteration expression.
pub fn normalize_iter_map_to_expr(expr: &IterMapExpr) -> PrimExpr {
    match expr {
        IterMapExpr::Split(split) => normalize_split(split),
        IterMapExpr::Sum(sum) => {
            let mut acc: Option<PrimExpr> = None;
            for arg in &sum.args {
                let term = normalize_split(arg);
                acc = Some(match acc {
                    Some(a) => a + term,
                    None => term,
                });
            }
            match acc {
                None => sum.base.clone(),
                Some(a) if sum.base.is_zero() => a,
                Some(a) => a + sum.base.clone(),
            }
        }
    }
}

fn normalize_split(split: &IterSplitExpr) -> PrimExpr {
    let mut res = split.source.to_expr();
    if !split.lower_factor.is_one() {
        res = crate::expr::floordiv(res, split.lower_factor.clone());
    }
    let covers_source = split.source.extent == split.extent && split.lower_factor.is_one();
    if !covers_source {
        res = crate::expr::floormod(res, split.extent.clone());
    }
    if !split.scale.is_one() {
        res = res * split.scale.clone();
    }
    res
}

/// How strictly a detected map must cover the iteration space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum IterMapLevel {
    /// One-to-one; guard predicates are rejected.
    Bijective,
    /// Covering; extra points are excluded by guard predicates.
    Surjective,
}

// =========================================================================
// Detection
// =========================================================================

#[derive(Debug, Clone)]
struct LoopTerm {
    var: Var,
    coef: i64,
    extent: PrimExpr,
}

/// Flatten `binding` into loop terms and a constant base. `None` when any
/// atom is not a zero-based loop variable or a coefficient is not positive.
fn decompose(binding: &PrimExpr, dom: &HashMap<Var, Range>, analyzer: &Analyzer) -> Option<(Vec<LoopTerm>, i64)> {
    if !binding.dtype().is_int() {
        return None;
    }
    let simplified = analyzer.simplify(binding);
    let sum = super::simplify::Simplifier::new(analyzer.bounds()).linear(&simplified);
    let mut terms = Vec::with_capacity(sum.terms.len());
    for (atom, coef) in &sum.terms {
        let ExprKind::Var(var) = atom.kind() else { return None };
        let range = dom.get(var)?;
        if *coef <= 0 || !analyzer.can_prove_equal(&range.min, &PrimExpr::zero(range.min.dtype())) {
            return None;
        }
        terms.push(LoopTerm { var: var.clone(), coef: *coef, extent: range.extent.clone() });
    }
    Some((terms, sum.constant))
}

/// Sort terms by coefficient and check they form a fused chain starting at 1.
fn into_chain(mut terms: Vec<LoopTerm>) -> Option<Vec<LoopTerm>> {
    terms.sort_by_key(|t| (t.coef, !t.extent.is_one()));
    let mut expected = 1i64;
    for (k, term) in terms.iter().enumerate() {
        if term.coef != expected {
            return None;
        }
        if k + 1 < terms.len() {
            expected = expected.checked_mul(term.extent.as_int()?)?;
        }
    }
    Some(terms)
}

fn trivial_substitution(dom: &[(Var, Range)], analyzer: &Analyzer) -> VarMap {
    dom.iter()
        .filter(|(_, range)| analyzer.can_prove_equal(&range.extent, &PrimExpr::one(range.extent.dtype())))
        .map(|(var, range)| (var.clone(), range.min.clone()))
        .collect()
}

fn split_conjuncts(pred: &PrimExpr, out: &mut Vec<PrimExpr>) {
    match pred.kind() {
        ExprKind::And(a, b) => {
            split_conjuncts(a, out);
            split_conjuncts(b, out);
        }
        ExprKind::Bool(true) => {}
        _ => out.push(pred.clone()),
    }
}

fn product(extents: impl IntoIterator<Item = PrimExpr>, dtype: DType, analyzer: &Analyzer) -> PrimExpr {
    let prod = extents.into_iter().reduce(|a, b| a * b).unwrap_or_else(|| PrimExpr::one(dtype));
    analyzer.simplify(&prod)
}

fn sum_mark(terms: &[LoopTerm], scale_div: i64, base: PrimExpr, analyzer: &Analyzer) -> IterMark {
    let dtype = base.dtype();
    let args = terms
        .iter()
        .map(|t| {
            let source = Arc::new(IterMark::from_expr(t.var.to_expr(), t.extent.clone()));
            IterSplitExpr::from_mark(source).with_scale(PrimExpr::const_int(t.coef / scale_div, dtype))
        })
        .collect();
    let extent = product(terms.iter().map(|t| t.extent.clone()), dtype, analyzer);
    IterMark { source: MarkSource::Iter(Box::new(IterMapExpr::Sum(IterSumExpr { args, base }))), extent }
}

/// Detect whether every binding is an affine map of the loops in `dom`.
///
/// Each loop may feed at most one binding. Returns the flattened sum for
/// every binding, or `None` when some binding is not affine.
pub fn detect_iter_map(
    bindings: &[PrimExpr],
    dom: &[(Var, Range)],
    predicate: &PrimExpr,
    level: IterMapLevel,
    analyzer: &Analyzer,
    simplify_trivial: bool,
) -> Option<Vec<IterSumExpr>> {
    if level == IterMapLevel::Bijective && !predicate.is_const_true() {
        return None;
    }
    let dom_map: HashMap<Var, Range> = dom.iter().cloned().collect();
    let trivial = if simplify_trivial { trivial_substitution(dom, analyzer) } else { VarMap::new() };
    let mut used = HashSet::new();
    let mut sums = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let binding = substitute(binding, &trivial);
        let (terms, base) = decompose(&binding, &dom_map, analyzer)?;
        let chain = into_chain(terms)?;
        if !chain.iter().all(|t| used.insert(t.var.clone())) {
            return None;
        }
        let dtype = binding.dtype();
        match sum_mark(&chain, 1, PrimExpr::const_int(base, dtype), analyzer).source {
            MarkSource::Iter(iter) => match *iter {
                IterMapExpr::Sum(sum) => sums.push(sum),
                IterMapExpr::Split(_) => return None,
            },
            MarkSource::Expr(_) => return None,
        }
    }
    Some(sums)
}

/// Divide every binding into an outer and an inner iteration, where the
/// inner iteration only uses `sub_iters` and the outer one only the other
/// loops of `dom`.
///
/// On success the result has one `(outer, inner)` pair per binding and a
/// trailing pair whose extents are the outer and inner guard predicates.
/// An empty result means the bindings are not divisible.
pub fn subspace_divide(
    bindings: &[PrimExpr],
    dom: &[(Var, Range)],
    sub_iters: &[Var],
    predicate: &PrimExpr,
    level: IterMapLevel,
    analyzer: &Analyzer,
    simplify_trivial: bool,
) -> Vec<(IterMark, IterMark)> {
    divide(bindings, dom, sub_iters, predicate, level, analyzer, simplify_trivial).unwrap_or_default()
}

fn divide(
    bindings: &[PrimExpr],
    dom: &[(Var, Range)],
    sub_iters: &[Var],
    predicate: &PrimExpr,
    level: IterMapLevel,
    analyzer: &Analyzer,
    simplify_trivial: bool,
) -> Option<Vec<(IterMark, IterMark)>> {
    if level == IterMapLevel::Bijective && !predicate.is_const_true() {
        return None;
    }
    let dom_map: HashMap<Var, Range> = dom.iter().cloned().collect();
    let inner_set: HashSet<&Var> = sub_iters.iter().collect();
    let trivial = if simplify_trivial { trivial_substitution(dom, analyzer) } else { VarMap::new() };

    let mut used = HashSet::new();
    let mut result = Vec::with_capacity(bindings.len() + 1);
    for binding in bindings {
        let binding = substitute(binding, &trivial);
        let dtype = binding.dtype();
        let (terms, base) = decompose(&binding, &dom_map, analyzer)?;
        let chain = into_chain(terms)?;
        if !chain.iter().all(|t| used.insert(t.var.clone())) {
            return None;
        }

        let n_inner = chain.iter().take_while(|t| inner_set.contains(&t.var)).count();
        if chain[n_inner..].iter().any(|t| inner_set.contains(&t.var)) {
            return None;
        }
        let (inner, outer) = chain.split_at(n_inner);
        if base != 0 && !inner.is_empty() {
            return None;
        }

        let inner_mark = if inner.is_empty() {
            IterMark::unit(dtype)
        } else {
            sum_mark(inner, 1, PrimExpr::zero(dtype), analyzer)
        };
        let outer_mark = if outer.is_empty() {
            IterMark::constant(PrimExpr::const_int(base, dtype))
        } else {
            let inner_extent = if inner.is_empty() { 1 } else { inner_mark.extent.as_int()? };
            sum_mark(outer, inner_extent, PrimExpr::const_int(base, dtype), analyzer)
        };
        result.push((outer_mark, inner_mark));
    }

    let mut conjuncts = Vec::new();
    split_conjuncts(&substitute(predicate, &trivial), &mut conjuncts);
    let (mut outer_pred, mut inner_pred) = (Vec::new(), Vec::new());
    for cond in conjuncts {
        let vars = collect_vars(&cond);
        let uses_inner = vars.iter().any(|v| inner_set.contains(v));
        // A guard over both subspaces stays on the inner iteration with the
        // outer loops free in it.
        if uses_inner {
            inner_pred.push(cond);
        } else {
            outer_pred.push(cond);
        }
    }
    let outer_pred = analyzer.simplify(&crate::expr::all(outer_pred));
    let inner_pred = analyzer.simplify(&crate::expr::all(inner_pred));
    let dtype = bindings.first().map(|b| b.dtype()).unwrap_or(DType::Int32);
    result.push((
        IterMark { source: IterMark::unit(dtype).source, extent: outer_pred },
        IterMark { source: IterMark::unit(dtype).source, extent: inner_pred },
    ));
    Some(result)
}
