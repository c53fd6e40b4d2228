//! Blockize of a consecutive run of sibling blocks.
//!
//! The targets must sit in one statement sequence directly below their
//! lowest common ancestor (LCA), one after another. The run is wrapped into a
//! new block whose iteration variables stand for the loops from the LCA up to
//! the enclosing block.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::{OptionExt, ensure};
use tessera_ir::arith::{Analyzer, IntSet};
use tessera_ir::visit::pre_order_visit;
use tessera_ir::{
    Block, BlockRealize, BufferRegion, ExprMutator, IterVar, IterVarType, NodeId, PrimExpr, Range, Stmt, StmtMutator,
    Var, VarMap,
};
use tracing::debug;

use super::region::{eval_set_regions, union_regions};
use super::rewrite::{substitute_block, substitute_expr};
use crate::error::*;
use crate::state::{BlockReuse, SRefNode, ScheduleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Before,
    InRun,
    After,
}

/// Outer iteration variables with their bindings and the loop variables
/// they stand for.
#[derive(Debug, Default)]
struct OuterIters {
    iter_vars: Vec<IterVar>,
    values: Vec<PrimExpr>,
    loop_subst: VarMap,
}

impl OuterIters {
    fn has_reduction(&self) -> bool {
        self.iter_vars.iter().any(|iv| iv.iter_type == IterVarType::CommReduce)
    }
}

/// One outer iteration variable per loop from the enclosing block down to
/// the LCA. Domain and kind come from the matching iteration variable of the
/// first block with iteration variables below the LCA; only that block is
/// checked against the loop extents.
fn collect_outer_iters(state: &ScheduleState, lca: NodeId) -> Result<OuterIters> {
    let mut loops = Vec::new();
    let mut current = Some(lca);
    while let Some(id) = current {
        let SRefNode::Loop(op) = &state.get_sref(id)?.node else {
            break;
        };
        loops.push(op.clone());
        current = state.parent(id)?;
    }
    loops.reverse();

    let body = match &state.get_sref(lca)?.node {
        SRefNode::Loop(op) => op.body.clone(),
        SRefNode::Block(op) => op.block.body.clone(),
    };
    let mut reference: Option<Arc<Block>> = None;
    pre_order_visit(&body, &mut |s| {
        if reference.is_some() {
            return false;
        }
        match s {
            Stmt::BlockRealize(r) if !r.block.iter_vars.is_empty() => {
                reference = Some(r.block.clone());
                false
            }
            _ => true,
        }
    });

    let analyzer = Analyzer::new();
    let mut outer = OuterIters::default();
    for (i, op) in loops.iter().enumerate() {
        let name = format!("v{}", op.loop_var.name());
        let iter_var = match reference.as_ref().and_then(|block| block.iter_vars.get(i)) {
            Some(iv) => {
                ensure!(
                    analyzer.can_prove_equal(&op.extent, &iv.dom.extent),
                    IterExtentMismatchSnafu {
                        var: iv.var.name().to_string(),
                        expected: op.extent.to_string(),
                        actual: iv.dom.extent.to_string(),
                    }
                );
                IterVar::new(iv.var.copy_with_name(name), iv.dom.clone(), iv.iter_type)
            }
            None => IterVar::new(
                op.loop_var.copy_with_name(name),
                Range::from_min_extent(op.min.clone(), op.extent.clone()),
                IterVarType::DataPar,
            ),
        };
        outer.loop_subst.insert(op.loop_var.clone(), iter_var.var.to_expr());
        outer.values.push(op.loop_var.to_expr());
        outer.iter_vars.push(iter_var);
    }
    Ok(outer)
}

/// Rebinds every target block to fresh `_i` iteration variables and
/// collects the regions the outer block has to declare.
struct TargetRewriter<'a> {
    targets: &'a [NodeId],
    loop_subst: &'a VarMap,
    analyzer: &'a Analyzer,
    reuse: BlockReuse,
    reads: Vec<BufferRegion>,
    writes: Vec<BufferRegion>,
    names: String,
    rewritten: Vec<NodeId>,
    error: Option<ScheduleError>,
}

impl TargetRewriter<'_> {
    fn rewrite_target(&mut self, op: &BlockRealize) -> Result<Stmt> {
        let block = &op.block;
        let mut analyzer = self.analyzer.clone();
        let mut subst = VarMap::new();
        let mut dom = HashMap::new();
        let mut iter_vars = Vec::with_capacity(block.iter_vars.len());
        for iv in &block.iter_vars {
            let var = iv.var.copy_with_suffix("_i");
            let inner = IterVar::new(var.clone(), Range::from_extent(iv.dom.extent.clone()), iv.iter_type);
            analyzer.bind(&var, &inner.dom);
            dom.insert(var.clone(), IntSet::from_range(&inner.dom));
            subst.insert(iv.var.clone(), var.to_expr());
            iter_vars.push(inner);
        }
        let block_subst = substitute_block(block, &subst, &mut self.reuse, &analyzer);

        if dom.is_empty() {
            self.reads.extend(block_subst.reads.iter().cloned());
            self.writes.extend(block_subst.writes.iter().cloned());
        } else {
            self.reads.extend(eval_set_regions(&block_subst.reads, &dom, &analyzer)?);
            self.writes.extend(eval_set_regions(&block_subst.writes, &dom, &analyzer)?);
        }
        self.names.push_str(&block.name);
        self.names.push('_');

        let iter_values = op.iter_values.iter().map(|v| substitute_expr(v, self.loop_subst, &analyzer)).collect();
        let predicate = substitute_expr(&op.predicate, self.loop_subst, &analyzer);
        let mut inner = block_subst.to_fresh();
        inner.iter_vars = iter_vars;
        self.reuse.insert(block.id(), inner.id());
        self.rewritten.push(block.id());
        Ok(Stmt::from(BlockRealize::new(iter_values, predicate, Arc::new(inner))))
    }
}

impl ExprMutator for TargetRewriter<'_> {
    fn mutate_var(&mut self, var: &Var, expr: &PrimExpr) -> PrimExpr {
        self.loop_subst.get(var).cloned().unwrap_or_else(|| expr.clone())
    }
}

impl StmtMutator for TargetRewriter<'_> {
    fn mutate_block_realize(&mut self, op: &Arc<BlockRealize>) -> Stmt {
        // Blocks other than the targets are opaque.
        if !self.targets.contains(&op.block.id()) {
            return Stmt::BlockRealize(op.clone());
        }
        match self.rewrite_target(op) {
            Ok(stmt) => stmt,
            Err(error) => {
                self.error.get_or_insert(error);
                Stmt::BlockRealize(op.clone())
            }
        }
    }
}

fn first_target(stmt: &Stmt, targets: &[NodeId]) -> Option<(NodeId, String)> {
    let mut found = None;
    pre_order_visit(stmt, &mut |s| {
        if found.is_some() {
            return false;
        }
        let Stmt::BlockRealize(r) = s else { return true };
        if targets.contains(&r.block.id()) {
            found = Some((r.block.id(), r.block.name.clone()));
        }
        false
    });
    found
}

/// Wrap the consecutive target blocks `blocks` into one new block and
/// return it.
#[tracing::instrument(skip_all, fields(blocks = blocks.len(), preserve_unit_iters))]
pub fn blockize_blocks(state: &mut ScheduleState, blocks: &[NodeId], preserve_unit_iters: bool) -> Result<NodeId> {
    ensure!(!blocks.is_empty(), EmptyTargetsSnafu);
    let mut targets = Vec::with_capacity(blocks.len());
    for &block in blocks {
        let id = state.resolve(block)?;
        state.get_block_realize(id)?;
        targets.push(id);
    }

    let mut lca = state.lowest_common_ancestor(&targets)?;
    if let [single] = targets.as_slice()
        && lca == *single
    {
        lca = state.parent(lca)?.context(TargetsNestedSnafu { lca })?;
    }
    ensure!(!targets.contains(&lca), TargetsNestedSnafu { lca });
    for &target in &targets {
        let ancestors = state.ancestors(target)?;
        ensure!(!ancestors.iter().any(|a| targets.contains(a)), TargetsNestedSnafu { lca });
    }

    let outer = collect_outer_iters(state, lca)?;
    if outer.has_reduction() {
        for &target in &targets {
            let block = state.get_block(target)?;
            if block.init.is_some() {
                tracing::error!(block = %target, "reduction iteration variable in the outer block");
                return OuterReductionInMultiBlockSnafu { block: target, block_name: block.name.clone() }.fail();
            }
        }
    }

    let lca_node = state.get_sref(lca)?.node.clone();
    let body = match &lca_node {
        SRefNode::Loop(op) => op.body.clone(),
        SRefNode::Block(op) => op.block.body.clone(),
    };
    let seq = match body.as_seq() {
        Some(seq) => seq.to_vec(),
        None => vec![body],
    };

    let mut analyzer = Analyzer::new();
    for iv in &outer.iter_vars {
        analyzer.bind(&iv.var, &iv.dom);
    }
    let mut rewriter = TargetRewriter {
        targets: &targets,
        loop_subst: &outer.loop_subst,
        analyzer: &analyzer,
        reuse: BlockReuse::new(),
        reads: Vec::new(),
        writes: Vec::new(),
        names: String::new(),
        rewritten: Vec::new(),
        error: None,
    };

    let (mut before, mut run, mut after) = (Vec::new(), Vec::new(), Vec::new());
    let mut run_state = RunState::Before;
    for stmt in &seq {
        run_state = match (run_state, first_target(stmt, &targets)) {
            (RunState::Before, None) => {
                before.push(stmt.clone());
                RunState::Before
            }
            (RunState::Before | RunState::InRun, Some(_)) => {
                run.push(rewriter.mutate_stmt(stmt));
                RunState::InRun
            }
            (RunState::InRun | RunState::After, None) => {
                after.push(stmt.clone());
                RunState::After
            }
            (RunState::After, Some((block, block_name))) => {
                tracing::error!(block = %block, "target blocks are not consecutive");
                return TargetsNotConsecutiveSnafu { block, block_name }.fail();
            }
        };
    }
    if let Some(error) = rewriter.error.take() {
        return Err(error);
    }
    ensure!(targets.iter().all(|t| rewriter.rewritten.contains(t)), TargetsNestedSnafu { lca });

    let (iter_vars, values) = if outer.iter_vars.is_empty() {
        (vec![IterVar::spatial(&Var::index("init_o"), 1)], vec![PrimExpr::int(0)])
    } else {
        (outer.iter_vars.clone(), outer.values.clone())
    };
    let outer_block = Block::builder()
        .name(format!("outer_{}", rewriter.names))
        .iter_vars(iter_vars)
        .reads(union_regions(&rewriter.reads, &analyzer))
        .writes(union_regions(&rewriter.writes, &analyzer))
        .body(Stmt::seq(run))
        .build();
    let result = outer_block.id();
    let reuse = rewriter.reuse;

    let new_body = Stmt::seq(
        before.into_iter().chain(std::iter::once(Stmt::from(BlockRealize::unconditional(values, outer_block)))).chain(after),
    );
    let new_lca = match &lca_node {
        SRefNode::Loop(op) => {
            let mut copy = op.to_fresh();
            copy.body = new_body;
            Stmt::from(copy)
        }
        SRefNode::Block(op) => {
            let mut block = op.block.to_fresh();
            block.body = new_body;
            Stmt::from(BlockRealize::new(op.iter_values.clone(), op.predicate.clone(), Arc::new(block)))
        }
    };
    state.replace(lca, new_lca, &reuse)?;

    let scope_root = state.get_scope_root(result)?;
    state.refresh_scope_info(scope_root)?;
    debug!(block = %result, lca = %lca, preserve_unit_iters, "blockized block run");
    Ok(result)
}
