//! Read-only traversal of expressions and statements.

use std::collections::HashSet;

use crate::buffer::{BufferRegion, Range};
use crate::expr::{ExprKind, PrimExpr, Var};
use crate::stmt::{Block, BlockRealize, For, Stmt};

pub trait ExprVisitor {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        walk_expr(self, expr);
    }

    fn visit_var(&mut self, _var: &Var) {}
}

pub fn walk_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, expr: &PrimExpr) {
    if let ExprKind::Var(var) = expr.kind() {
        visitor.visit_var(var);
        return;
    }
    for child in expr.children() {
        visitor.visit_expr(child);
    }
}

pub trait StmtVisitor: ExprVisitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_for(&mut self, op: &For) {
        walk_for(self, op);
    }

    fn visit_block_realize(&mut self, op: &BlockRealize) {
        walk_block_realize(self, op);
    }

    fn visit_block(&mut self, op: &Block) {
        walk_block(self, op);
    }
}

pub fn walk_stmt<V: StmtVisitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::For(op) => visitor.visit_for(op),
        Stmt::BlockRealize(op) => visitor.visit_block_realize(op),
        Stmt::Seq(stmts) => stmts.iter().for_each(|s| visitor.visit_stmt(s)),
        Stmt::IfThenElse(op) => {
            visitor.visit_expr(&op.condition);
            visitor.visit_stmt(&op.then_case);
            if let Some(else_case) = &op.else_case {
                visitor.visit_stmt(else_case);
            }
        }
        Stmt::BufferStore(op) => {
            visitor.visit_expr(&op.value);
            op.indices.iter().for_each(|i| visitor.visit_expr(i));
        }
        Stmt::Evaluate(expr) => visitor.visit_expr(expr),
    }
}

pub fn walk_for<V: StmtVisitor + ?Sized>(visitor: &mut V, op: &For) {
    visitor.visit_expr(&op.min);
    visitor.visit_expr(&op.extent);
    visitor.visit_stmt(&op.body);
}

pub fn walk_block_realize<V: StmtVisitor + ?Sized>(visitor: &mut V, op: &BlockRealize) {
    op.iter_values.iter().for_each(|v| visitor.visit_expr(v));
    visitor.visit_expr(&op.predicate);
    visitor.visit_block(&op.block);
}

pub fn walk_block<V: StmtVisitor + ?Sized>(visitor: &mut V, op: &Block) {
    for iv in &op.iter_vars {
        walk_range(visitor, &iv.dom);
    }
    for region in op.reads.iter().chain(&op.writes) {
        walk_region(visitor, region);
    }
    for m in &op.match_buffers {
        walk_region(visitor, &m.source);
    }
    if let Some(init) = &op.init {
        visitor.visit_stmt(init);
    }
    visitor.visit_stmt(&op.body);
}

fn walk_range<V: ExprVisitor + ?Sized>(visitor: &mut V, range: &Range) {
    visitor.visit_expr(&range.min);
    visitor.visit_expr(&range.extent);
}

fn walk_region<V: ExprVisitor + ?Sized>(visitor: &mut V, region: &BufferRegion) {
    region.region.iter().for_each(|r| walk_range(visitor, r));
}

// =========================================================================
// Helpers
// =========================================================================

struct VarUse<F> {
    pred: F,
    found: bool,
}

impl<F: Fn(&Var) -> bool> ExprVisitor for VarUse<F> {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        if !self.found {
            walk_expr(self, expr);
        }
    }

    fn visit_var(&mut self, var: &Var) {
        self.found |= (self.pred)(var);
    }
}

impl<F: Fn(&Var) -> bool> StmtVisitor for VarUse<F> {}

/// Whether `expr` references a variable satisfying `pred`.
pub fn uses_var(expr: &PrimExpr, pred: impl Fn(&Var) -> bool) -> bool {
    let mut v = VarUse { pred, found: false };
    v.visit_expr(expr);
    v.found
}

/// Whether `stmt` references a variable satisfying `pred` in any expression.
pub fn stmt_uses_var(stmt: &Stmt, pred: impl Fn(&Var) -> bool) -> bool {
    let mut v = VarUse { pred, found: false };
    v.visit_stmt(stmt);
    v.found
}

#[derive(Default)]
struct VarCollector {
    seen: HashSet<Var>,
    order: Vec<Var>,
}

impl ExprVisitor for VarCollector {
    fn visit_var(&mut self, var: &Var) {
        if self.seen.insert(var.clone()) {
            self.order.push(var.clone());
        }
    }
}

/// Distinct variables of `expr` in first-occurrence order.
pub fn collect_vars(expr: &PrimExpr) -> Vec<Var> {
    let mut c = VarCollector::default();
    c.visit_expr(expr);
    c.order
}

/// Visit every statement of the tree in pre-order. Returning `false` from
/// `f` skips the children of that statement.
pub fn pre_order_visit(stmt: &Stmt, f: &mut impl FnMut(&Stmt) -> bool) {
    if !f(stmt) {
        return;
    }
    match stmt {
        Stmt::For(op) => pre_order_visit(&op.body, f),
        Stmt::BlockRealize(op) => {
            if let Some(init) = &op.block.init {
                pre_order_visit(init, f);
            }
            pre_order_visit(&op.block.body, f);
        }
        Stmt::Seq(stmts) => stmts.iter().for_each(|s| pre_order_visit(s, f)),
        Stmt::IfThenElse(op) => {
            pre_order_visit(&op.then_case, f);
            if let Some(else_case) = &op.else_case {
                pre_order_visit(else_case, f);
            }
        }
        Stmt::BufferStore(_) | Stmt::Evaluate(_) => {}
    }
}
