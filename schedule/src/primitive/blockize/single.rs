//! Blockize of the subtree under a single loop.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_ir::arith::{Analyzer, IntSet};
use tessera_ir::{
    Block, BlockRealize, For, IterVar, IterVarType, NodeId, PrimExpr, Stmt, VarMap, stmt_uses_var, substitute_stmt,
    uses_var,
};
use tracing::debug;

use super::binding::{IterBindings, derive_block_binding};
use super::divide::subspace_divide;
use super::region::eval_set_regions;
use super::rewrite::substitute_block;
use crate::error::*;
use crate::state::{BlockReuse, ScheduleState};

/// Build the outer block realization that replaces the loop `loop_id`
/// without touching the state. `reuse` receives `original block → inner
/// block`.
#[tracing::instrument(skip_all, fields(loop_id = %loop_id, preserve_unit_iters))]
pub fn blockize_impl(
    state: &ScheduleState,
    loop_id: NodeId,
    reuse: &mut BlockReuse,
    analyzer: &mut Analyzer,
    preserve_unit_iters: bool,
) -> Result<BlockRealize> {
    let loop_id = state.resolve(loop_id)?;
    state.get_for(loop_id)?;

    let children = state.child_blocks(loop_id)?;
    let [block_id] = children.as_slice() else {
        return NotSingleChildBlockSnafu { loop_id, count: children.len() }.fail();
    };
    let block_id = *block_id;
    let realize = state.get_block_realize(block_id)?;
    let block = &realize.block;

    let (division, loops) = subspace_divide(state, block_id, loop_id, analyzer, preserve_unit_iters, false)?;
    let Some(division) = division else {
        let boundary = loops.inner.last().map(|l| l.id()).unwrap_or(loop_id);
        tracing::error!(block = %block_id, loop_id = %boundary, "bindings are not divisible");
        return SubspaceNotDivisibleSnafu { block: block_id, block_name: block.name.clone(), loop_id: boundary }.fail();
    };

    let mut outer = IterBindings::default();
    let mut inner = IterBindings::default();
    let subst = derive_block_binding(&block.iter_vars, &division, &mut outer, &mut inner, preserve_unit_iters, false)?;
    debug!(outer = outer.iter_vars.len(), inner = inner.iter_vars.len(), "derived block bindings");

    let mut inner_dom = HashMap::new();
    for iv in &outer.iter_vars {
        analyzer.bind(&iv.var, &iv.dom);
    }
    for iv in &inner.iter_vars {
        inner_dom.insert(iv.var.clone(), IntSet::from_range(&iv.dom));
        analyzer.bind(&iv.var, &iv.dom);
    }
    let block_subst = substitute_block(block, &subst, reuse, analyzer);

    let has_outer_reduction =
        block_subst.init.is_some() && outer.iter_vars.iter().any(|iv| iv.iter_type == IterVarType::CommReduce);
    let inner_realize = generate_inner(has_outer_reduction, inner, division.inner_predicate, &block_subst);
    reuse.insert(block.id(), inner_realize.block.id());

    let init = block_subst.init.as_ref().map(|init| generate_outer_init(init, &inner_realize, &loops.inner));
    let outer_block = Block::builder()
        .name(format!("{}_o", block_subst.name))
        .iter_vars(outer.iter_vars)
        .reads(eval_set_regions(&block_subst.reads, &inner_dom, analyzer)?)
        .writes(eval_set_regions(&block_subst.writes, &inner_dom, analyzer)?)
        .maybe_init(init)
        .body(make_loop_nest(Stmt::from(inner_realize), &loops.inner))
        .build();
    Ok(BlockRealize::new(outer.values, division.outer_predicate, Arc::new(outer_block)))
}

/// Blockize the subtree under `loop_id` and return the new outer block.
#[tracing::instrument(skip_all, fields(loop_id = %loop_id, preserve_unit_iters))]
pub fn blockize(state: &mut ScheduleState, loop_id: NodeId, preserve_unit_iters: bool) -> Result<NodeId> {
    let loop_id = state.resolve(loop_id)?;
    let mut analyzer = Analyzer::new();
    let mut reuse = BlockReuse::new();
    let blockized = blockize_impl(state, loop_id, &mut reuse, &mut analyzer, preserve_unit_iters)?;
    let result = blockized.block.id();
    state.replace(loop_id, Stmt::from(blockized), &reuse)?;

    let scope_root = state.get_scope_root(result)?;
    let affine = state.is_affine_block_binding(scope_root)?;
    state.refresh_scope_info(scope_root)?;
    state.set_affine_block_binding(scope_root, affine)?;
    debug!(block = %result, "blockized");
    Ok(result)
}

/// The original block rebound to the inner iteration variables. The init
/// moves to the outer block; with an outer reduction the written buffers
/// are also read.
fn generate_inner(
    has_outer_reduction: bool,
    inner: IterBindings,
    predicate: PrimExpr,
    block: &Arc<Block>,
) -> BlockRealize {
    let mut new = block.to_fresh();
    new.iter_vars = inner.iter_vars;
    new.init = None;
    if has_outer_reduction {
        let mut reads = new.writes.clone();
        reads.extend(new.reads.iter().cloned());
        new.reads = reads;
    }
    BlockRealize::new(inner.values, predicate, Arc::new(new))
}

/// Init of the outer block: an `_init` block over the data-parallel inner
/// iteration variables the init uses, wrapped in copies of the loops that
/// feed their bindings.
fn generate_outer_init(init: &Stmt, inner_realize: &BlockRealize, loops: &[Arc<For>]) -> Stmt {
    let inner_block = &inner_realize.block;
    let mut subst = VarMap::new();
    let mut iter_vars = Vec::new();
    let mut values = Vec::new();
    for (iv, value) in inner_block.iter_vars.iter().zip(&inner_realize.iter_values) {
        if iv.iter_type != IterVarType::DataPar || !stmt_uses_var(init, |v| *v == iv.var) {
            continue;
        }
        let var = iv.var.copy_with_suffix("_init");
        subst.insert(iv.var.clone(), var.to_expr());
        iter_vars.push(IterVar::new(var, iv.dom.clone(), iv.iter_type));
        values.push(value.clone());
    }

    let init_block = Block::builder()
        .name(format!("{}_init", inner_block.name))
        .iter_vars(iter_vars)
        .writes(inner_block.writes.clone())
        .body(init.clone())
        .build();
    let mut stmt = Stmt::from(BlockRealize::new(values.clone(), inner_realize.predicate.clone(), Arc::new(init_block)));

    for op in loops {
        if !values.iter().any(|v| uses_var(v, |var| *var == op.loop_var)) {
            continue;
        }
        let mut copy = op.to_fresh();
        copy.loop_var = op.loop_var.copy_with_suffix("");
        copy.body = stmt;
        subst.insert(op.loop_var.clone(), copy.loop_var.to_expr());
        stmt = Stmt::from(copy);
    }
    substitute_stmt(&stmt, &subst)
}

/// Wrap `body` in fresh copies of `loops`, given innermost first.
pub fn make_loop_nest(body: Stmt, loops: &[Arc<For>]) -> Stmt {
    loops.iter().fold(body, |body, op| {
        let mut copy = op.to_fresh();
        copy.body = body;
        Stmt::from(copy)
    })
}

