//! Rebuilding traversal of expressions and statements.
//!
//! The default implementations rebuild a node only when one of its children
//! changed (by pointer identity), so an identity mutator returns the input
//! tree unchanged and shares every untouched subtree.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::buffer::{BufferRegion, MatchBufferRegion, Range};
use crate::expr::{ExprKind, PrimExpr, Var};
use crate::stmt::{Block, BlockRealize, BufferStore, For, IfThenElse, IterVar, Stmt};

/// Variable substitution map.
pub type VarMap = HashMap<Var, PrimExpr>;

pub trait ExprMutator {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        super_mutate_expr(self, expr)
    }

    /// Called for every variable use. `expr` is the variable expression itself.
    fn mutate_var(&mut self, _var: &Var, expr: &PrimExpr) -> PrimExpr {
        expr.clone()
    }
}

pub fn super_mutate_expr<M: ExprMutator + ?Sized>(m: &mut M, expr: &PrimExpr) -> PrimExpr {
    let dtype = expr.dtype();
    match expr.kind() {
        ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) => expr.clone(),
        ExprKind::Var(var) => m.mutate_var(var, expr),
        ExprKind::Binary(op, a, b) => {
            let (na, nb) = (m.mutate_expr(a), m.mutate_expr(b));
            if na.same_as(a) && nb.same_as(b) { expr.clone() } else { PrimExpr::binary(*op, na, nb) }
        }
        ExprKind::Cmp(op, a, b) => {
            let (na, nb) = (m.mutate_expr(a), m.mutate_expr(b));
            if na.same_as(a) && nb.same_as(b) { expr.clone() } else { PrimExpr::cmp(*op, na, nb) }
        }
        ExprKind::And(a, b) => {
            let (na, nb) = (m.mutate_expr(a), m.mutate_expr(b));
            if na.same_as(a) && nb.same_as(b) { expr.clone() } else { PrimExpr::and(na, nb) }
        }
        ExprKind::Or(a, b) => {
            let (na, nb) = (m.mutate_expr(a), m.mutate_expr(b));
            if na.same_as(a) && nb.same_as(b) { expr.clone() } else { PrimExpr::or(na, nb) }
        }
        ExprKind::Not(a) => {
            let na = m.mutate_expr(a);
            if na.same_as(a) { expr.clone() } else { PrimExpr::not(na) }
        }
        ExprKind::Select { cond, then_value, else_value } => {
            let nc = m.mutate_expr(cond);
            let nt = m.mutate_expr(then_value);
            let ne = m.mutate_expr(else_value);
            if nc.same_as(cond) && nt.same_as(then_value) && ne.same_as(else_value) {
                expr.clone()
            } else {
                PrimExpr::select(nc, nt, ne)
            }
        }
        ExprKind::Cast(a) => {
            let na = m.mutate_expr(a);
            if na.same_as(a) { expr.clone() } else { PrimExpr::new(ExprKind::Cast(na), dtype) }
        }
        ExprKind::Load { buffer, indices } => {
            let new_indices: SmallVec<[PrimExpr; 4]> = indices.iter().map(|i| m.mutate_expr(i)).collect();
            if all_same(indices, &new_indices) {
                expr.clone()
            } else {
                PrimExpr::load(buffer, new_indices)
            }
        }
    }
}

fn all_same(a: &[PrimExpr], b: &[PrimExpr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

fn mutate_exprs<M: ExprMutator + ?Sized>(m: &mut M, exprs: &[PrimExpr]) -> (Vec<PrimExpr>, bool) {
    let new: Vec<PrimExpr> = exprs.iter().map(|e| m.mutate_expr(e)).collect();
    let changed = !all_same(exprs, &new);
    (new, changed)
}

pub trait StmtMutator: ExprMutator {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        super_mutate_stmt(self, stmt)
    }

    fn mutate_for(&mut self, op: &Arc<For>) -> Stmt {
        super_mutate_for(self, op)
    }

    fn mutate_block_realize(&mut self, op: &Arc<BlockRealize>) -> Stmt {
        super_mutate_block_realize(self, op)
    }

    fn mutate_block(&mut self, op: &Arc<Block>) -> Arc<Block> {
        super_mutate_block(self, op)
    }

    fn mutate_range(&mut self, range: &Range) -> Range {
        let min = self.mutate_expr(&range.min);
        let extent = self.mutate_expr(&range.extent);
        Range { min, extent }
    }

    fn mutate_buffer_region(&mut self, region: &BufferRegion) -> BufferRegion {
        let ranges = region.region.iter().map(|r| self.mutate_range(r)).collect();
        BufferRegion { buffer: region.buffer.clone(), region: ranges }
    }

    /// Iteration variables are definitions: only the domain is mutated.
    fn mutate_iter_var(&mut self, iv: &IterVar) -> IterVar {
        IterVar { var: iv.var.clone(), dom: self.mutate_range(&iv.dom), iter_type: iv.iter_type }
    }
}

pub fn super_mutate_stmt<M: StmtMutator + ?Sized>(m: &mut M, stmt: &Stmt) -> Stmt {
    match stmt {
        Stmt::For(op) => m.mutate_for(op),
        Stmt::BlockRealize(op) => m.mutate_block_realize(op),
        Stmt::Seq(stmts) => {
            let new: Vec<Stmt> = stmts.iter().map(|s| m.mutate_stmt(s)).collect();
            if stmts.iter().zip(&new).all(|(a, b)| a.same_as(b)) { stmt.clone() } else { Stmt::seq(new) }
        }
        Stmt::IfThenElse(op) => {
            let condition = m.mutate_expr(&op.condition);
            let then_case = m.mutate_stmt(&op.then_case);
            let else_case = op.else_case.as_ref().map(|s| m.mutate_stmt(s));
            let else_same = match (&op.else_case, &else_case) {
                (Some(a), Some(b)) => a.same_as(b),
                _ => true,
            };
            if condition.same_as(&op.condition) && then_case.same_as(&op.then_case) && else_same {
                stmt.clone()
            } else {
                Stmt::IfThenElse(Arc::new(IfThenElse { condition, then_case, else_case }))
            }
        }
        Stmt::BufferStore(op) => {
            let value = m.mutate_expr(&op.value);
            let (indices, changed) = mutate_exprs(m, &op.indices);
            if !changed && value.same_as(&op.value) {
                stmt.clone()
            } else {
                Stmt::BufferStore(Arc::new(BufferStore { buffer: op.buffer.clone(), value, indices }))
            }
        }
        Stmt::Evaluate(expr) => {
            let new = m.mutate_expr(expr);
            if new.same_as(expr) { stmt.clone() } else { Stmt::Evaluate(new) }
        }
    }
}

pub fn super_mutate_for<M: StmtMutator + ?Sized>(m: &mut M, op: &Arc<For>) -> Stmt {
    let min = m.mutate_expr(&op.min);
    let extent = m.mutate_expr(&op.extent);
    let body = m.mutate_stmt(&op.body);
    if min.same_as(&op.min) && extent.same_as(&op.extent) && body.same_as(&op.body) {
        return Stmt::For(op.clone());
    }
    let mut new = op.to_fresh();
    new.min = min;
    new.extent = extent;
    new.body = body;
    Stmt::from(new)
}

pub fn super_mutate_block_realize<M: StmtMutator + ?Sized>(m: &mut M, op: &Arc<BlockRealize>) -> Stmt {
    let (iter_values, values_changed) = mutate_exprs(m, &op.iter_values);
    let predicate = m.mutate_expr(&op.predicate);
    let block = m.mutate_block(&op.block);
    if !values_changed && predicate.same_as(&op.predicate) && Arc::ptr_eq(&block, &op.block) {
        return Stmt::BlockRealize(op.clone());
    }
    Stmt::from(BlockRealize { iter_values, predicate, block })
}

pub fn super_mutate_block<M: StmtMutator + ?Sized>(m: &mut M, op: &Arc<Block>) -> Arc<Block> {
    let iter_vars: Vec<IterVar> = op.iter_vars.iter().map(|iv| m.mutate_iter_var(iv)).collect();
    let reads: Vec<BufferRegion> = op.reads.iter().map(|r| m.mutate_buffer_region(r)).collect();
    let writes: Vec<BufferRegion> = op.writes.iter().map(|r| m.mutate_buffer_region(r)).collect();
    let match_buffers: Vec<MatchBufferRegion> = op
        .match_buffers
        .iter()
        .map(|mb| MatchBufferRegion { buffer: mb.buffer.clone(), source: m.mutate_buffer_region(&mb.source) })
        .collect();
    let init = op.init.as_ref().map(|s| m.mutate_stmt(s));
    let body = m.mutate_stmt(&op.body);

    let init_same = match (&op.init, &init) {
        (Some(a), Some(b)) => a.same_as(b),
        _ => true,
    };
    let unchanged = init_same
        && body.same_as(&op.body)
        && iter_vars.iter().zip(&op.iter_vars).all(|(a, b)| a.var == b.var && range_same(&a.dom, &b.dom))
        && regions_same(&reads, &op.reads)
        && regions_same(&writes, &op.writes)
        && match_buffers.iter().zip(&op.match_buffers).all(|(a, b)| region_same(&a.source, &b.source));
    if unchanged {
        return op.clone();
    }

    let mut new = op.to_fresh();
    new.iter_vars = iter_vars;
    new.reads = reads;
    new.writes = writes;
    new.match_buffers = match_buffers;
    new.init = init;
    new.body = body;
    Arc::new(new)
}

fn range_same(a: &Range, b: &Range) -> bool {
    a.min.same_as(&b.min) && a.extent.same_as(&b.extent)
}

fn region_same(a: &BufferRegion, b: &BufferRegion) -> bool {
    a.buffer == b.buffer && a.region.len() == b.region.len() && a.region.iter().zip(&b.region).all(|(x, y)| range_same(x, y))
}

fn regions_same(a: &[BufferRegion], b: &[BufferRegion]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| region_same(x, y))
}

// =========================================================================
// Substitution
// =========================================================================

struct Substituter<'a> {
    map: &'a VarMap,
}

impl ExprMutator for Substituter<'_> {
    fn mutate_var(&mut self, var: &Var, expr: &PrimExpr) -> PrimExpr {
        self.map.get(var).cloned().unwrap_or_else(|| expr.clone())
    }
}

impl StmtMutator for Substituter<'_> {}

/// Replace every use of a mapped variable in `expr`.
pub fn substitute(expr: &PrimExpr, map: &VarMap) -> PrimExpr {
    if map.is_empty() {
        return expr.clone();
    }
    Substituter { map }.mutate_expr(expr)
}

/// Replace every use of a mapped variable in `stmt`. Definitions (loop
/// variables, block iteration variables) are left alone.
pub fn substitute_stmt(stmt: &Stmt, map: &VarMap) -> Stmt {
    if map.is_empty() {
        return stmt.clone();
    }
    Substituter { map }.mutate_stmt(stmt)
}

// =========================================================================
// Identity renewal
// =========================================================================

struct Renewer;

impl ExprMutator for Renewer {}

impl StmtMutator for Renewer {
    fn mutate_for(&mut self, op: &Arc<For>) -> Stmt {
        let mut new = op.to_fresh();
        new.body = self.mutate_stmt(&op.body);
        Stmt::from(new)
    }

    fn mutate_block(&mut self, op: &Arc<Block>) -> Arc<Block> {
        let mut new = op.to_fresh();
        new.init = op.init.as_ref().map(|s| self.mutate_stmt(s));
        new.body = self.mutate_stmt(&op.body);
        Arc::new(new)
    }

    fn mutate_block_realize(&mut self, op: &Arc<BlockRealize>) -> Stmt {
        let block = self.mutate_block(&op.block);
        Stmt::from(BlockRealize { iter_values: op.iter_values.clone(), predicate: op.predicate.clone(), block })
    }
}

/// Copy of `stmt` in which every loop and block has a new identity.
/// Expressions and variables are shared.
pub fn renew_ids(stmt: &Stmt) -> Stmt {
    Renewer.mutate_stmt(stmt)
}
