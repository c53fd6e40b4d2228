//! Variable substitution that tracks rebuilt blocks.

use std::sync::Arc;

use tessera_ir::arith::Analyzer;
use tessera_ir::mutate::{super_mutate_block, super_mutate_expr};
use tessera_ir::{Block, ExprMutator, PrimExpr, Stmt, StmtMutator, Var, VarMap};

use crate::state::BlockReuse;

struct Replacer<'a> {
    map: &'a VarMap,
    reuse: &'a mut BlockReuse,
    analyzer: &'a Analyzer,
}

impl ExprMutator for Replacer<'_> {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        let result = super_mutate_expr(self, expr);
        if result.same_as(expr) { result } else { self.analyzer.simplify(&result) }
    }

    fn mutate_var(&mut self, var: &Var, expr: &PrimExpr) -> PrimExpr {
        self.map.get(var).cloned().unwrap_or_else(|| expr.clone())
    }
}

impl StmtMutator for Replacer<'_> {
    fn mutate_block(&mut self, op: &Arc<Block>) -> Arc<Block> {
        let new = super_mutate_block(self, op);
        if !Arc::ptr_eq(&new, op) {
            self.reuse.insert(op.id(), new.id());
        }
        new
    }
}

/// Substitute `map` over `stmt`, simplifying every rewritten expression.
/// Each block whose content changed is recorded as `(old, new)` in `reuse`.
pub fn substitute_with_reuse(stmt: &Stmt, map: &VarMap, reuse: &mut BlockReuse, analyzer: &Analyzer) -> Stmt {
    Replacer { map, reuse, analyzer }.mutate_stmt(stmt)
}

/// [`substitute_with_reuse`] applied to a block itself.
pub fn substitute_block(block: &Arc<Block>, map: &VarMap, reuse: &mut BlockReuse, analyzer: &Analyzer) -> Arc<Block> {
    Replacer { map, reuse, analyzer }.mutate_block(block)
}

/// Expression form of [`substitute_with_reuse`].
pub fn substitute_expr(expr: &PrimExpr, map: &VarMap, analyzer: &Analyzer) -> PrimExpr {
    let mut reuse = BlockReuse::new();
    Replacer { map, reuse: &mut reuse, analyzer }.mutate_expr(expr)
}
