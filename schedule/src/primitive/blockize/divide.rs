//! Division of block bindings at a loop boundary.

use std::sync::Arc;

use tessera_ir::arith::{Analyzer, IterMapExpr, IterMapLevel, IterMark, IterSplitExpr, IterSumExpr, MarkSource};
use tessera_ir::{For, IterVar, NodeId, PrimExpr, Range, Var, uses_var};
use tracing::debug;

use crate::error::*;
use crate::state::{SRefNode, ScheduleState};

/// Bindings of a block split into an outer and an inner iteration.
#[derive(Debug, Clone)]
pub struct SubspaceDivision {
    /// `(outer, inner)` mark per block iteration variable.
    pub marks: Vec<(IterMark, IterMark)>,
    pub outer_predicate: PrimExpr,
    pub inner_predicate: PrimExpr,
}

impl SubspaceDivision {
    fn from_pairs(mut pairs: Vec<(IterMark, IterMark)>) -> Option<Self> {
        let (outer_guard, inner_guard) = pairs.pop()?;
        Some(Self { marks: pairs, outer_predicate: outer_guard.extent, inner_predicate: inner_guard.extent })
    }
}

/// Loops walked by [`subspace_divide`].
#[derive(Debug, Clone, Default)]
pub struct DividedLoops {
    /// Loops between the block and the boundary, innermost first.
    pub inner: Vec<Arc<For>>,
    /// Remaining loops up to the scope root, innermost first.
    pub outer: Vec<Arc<For>>,
}

/// Divide the bindings of `block` by the loops from its parent up to the
/// scope root. Loops up to `boundary` form the inner iteration; `boundary`
/// itself belongs to it unless `boundary_is_outer`.
///
/// Falls back to [`trivial_subspace_division`] when the bindings are not an
/// affine map; `None` when that fails too.
#[tracing::instrument(skip_all, fields(block = %block, boundary = %boundary))]
pub fn subspace_divide(
    state: &ScheduleState,
    block: NodeId,
    boundary: NodeId,
    analyzer: &mut Analyzer,
    preserve_unit_iters: bool,
    boundary_is_outer: bool,
) -> Result<(Option<SubspaceDivision>, DividedLoops)> {
    let realize = state.get_block_realize(block)?;
    let mut loops = DividedLoops::default();
    let mut dom: Vec<(Var, Range)> = Vec::new();
    let mut inner = true;

    let mut current = state.parent(block)?;
    while let Some(id) = current {
        let SRefNode::Loop(op) = &state.get_sref(id)?.node else {
            break;
        };
        let parent = state.parent(id)?;
        if boundary_is_outer && id == boundary {
            inner = false;
        }
        let side = if inner { &mut loops.inner } else { &mut loops.outer };
        side.push(op.clone());
        let range = Range::from_min_extent(op.min.clone(), op.extent.clone());
        analyzer.bind(&op.loop_var, &range);
        dom.push((op.loop_var.clone(), range));
        if id == boundary {
            inner = false;
        }
        current = parent;
    }

    let inner_vars: Vec<Var> = loops.inner.iter().map(|l| l.loop_var.clone()).collect();
    let outer_vars: Vec<Var> = loops.outer.iter().map(|l| l.loop_var.clone()).collect();
    let pairs = tessera_ir::arith::subspace_divide(
        &realize.iter_values,
        &dom,
        &inner_vars,
        &realize.predicate,
        IterMapLevel::Surjective,
        analyzer,
        !preserve_unit_iters,
    );
    let division = match SubspaceDivision::from_pairs(pairs) {
        Some(division) => Some(division),
        None => {
            debug!("bindings are not affine, trying the trivial division");
            trivial_subspace_division(
                &realize.block.iter_vars,
                &realize.iter_values,
                &realize.predicate,
                &outer_vars,
                &inner_vars,
            )
        }
    };
    debug!(inner_loops = loops.inner.len(), outer_loops = loops.outer.len(), divided = division.is_some());
    Ok((division, loops))
}

/// Division that only classifies each binding as wholly outer, wholly inner
/// or loop-free. Needs a `true` predicate; a binding that uses both inner and
/// outer loops makes it fail.
pub fn trivial_subspace_division(
    iter_vars: &[IterVar],
    bindings: &[PrimExpr],
    predicate: &PrimExpr,
    outer_vars: &[Var],
    inner_vars: &[Var],
) -> Option<SubspaceDivision> {
    if !predicate.is_const_true() {
        return None;
    }
    let mut marks = Vec::with_capacity(bindings.len());
    for (iter_var, binding) in iter_vars.iter().zip(bindings) {
        let uses_outer = uses_var(binding, |v| outer_vars.contains(v));
        let uses_inner = uses_var(binding, |v| inner_vars.contains(v));
        let unit = IterMark::unit(binding.dtype());
        let pair = match (uses_outer, uses_inner) {
            (true, true) => return None,
            (true, false) => (binding_mark(binding, &iter_var.dom.extent), unit),
            (false, true) => (unit, binding_mark(binding, &iter_var.dom.extent)),
            (false, false) => (IterMark::constant(binding.clone()), unit),
        };
        marks.push(pair);
    }
    let guard = PrimExpr::bool(true);
    Some(SubspaceDivision { marks, outer_predicate: guard.clone(), inner_predicate: guard })
}

fn binding_mark(binding: &PrimExpr, extent: &PrimExpr) -> IterMark {
    let source = if binding.as_var().is_some() {
        let mark = IterMark::from_expr(binding.clone(), extent.clone());
        IterMapExpr::Split(IterSplitExpr::from_mark(Arc::new(mark)))
    } else {
        IterMapExpr::Sum(IterSumExpr { args: Vec::new(), base: binding.clone() })
    };
    IterMark { source: MarkSource::Iter(Box::new(source)), extent: extent.clone() }
}
