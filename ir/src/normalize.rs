//! Index dtype normalization.
//!
//! Rewrites every index computation of a function (loop bounds, block
//! iteration domains and bindings, buffer indices and regions) to a single
//! integer dtype. Loop and iteration variables of another width are replaced
//! by fresh variables of the target dtype.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_dtype::DType;

use crate::buffer::Range;
use crate::error::*;
use crate::expr::{ExprKind, PrimExpr, Var};
use crate::func::PrimFunc;
use crate::mutate::{ExprMutator, StmtMutator, super_mutate_block, super_mutate_expr, super_mutate_stmt};
use crate::stmt::{Block, BlockRealize, BufferStore, For, IterVar, Stmt};

pub struct IndexDataTypeNormalizer {
    target: DType,
    var_remap: HashMap<Var, Var>,
    in_index: bool,
}

impl IndexDataTypeNormalizer {
    pub fn new(target: DType) -> Self {
        Self { target, var_remap: HashMap::new(), in_index: false }
    }

    /// Normalizer for signed integers of `bits` width.
    pub fn with_bits(bits: u32) -> Result<Self> {
        let target = DType::int(bits).context(UnsupportedIndexBitsSnafu { bits })?;
        Ok(Self::new(target))
    }

    #[tracing::instrument(skip_all, fields(func = %func.name, target = %self.target))]
    pub fn rewrite(&mut self, func: &PrimFunc) -> PrimFunc {
        let body = self.mutate_stmt(&func.body);
        tracing::debug!(remapped = self.var_remap.len(), "normalized index dtype");
        func.with_body(body)
    }

    fn define(&mut self, var: &Var) -> Var {
        if !var.dtype().is_int() || var.dtype() == self.target {
            return var.clone();
        }
        self.var_remap.entry(var.clone()).or_insert_with(|| var.copy_with_dtype(self.target)).clone()
    }

    fn index_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        let prev = std::mem::replace(&mut self.in_index, true);
        let result = self.mutate_expr(expr);
        self.in_index = prev;
        result
    }
}

impl ExprMutator for IndexDataTypeNormalizer {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        match expr.kind() {
            ExprKind::Int(v) if self.in_index && expr.dtype() != self.target => PrimExpr::const_int(*v, self.target),
            ExprKind::Load { buffer, indices } => {
                let new: Vec<PrimExpr> = indices.iter().map(|i| self.index_expr(i)).collect();
                if new.iter().zip(indices.iter()).all(|(a, b)| a.same_as(b)) {
                    expr.clone()
                } else {
                    PrimExpr::load(buffer, new)
                }
            }
            _ => super_mutate_expr(self, expr),
        }
    }

    fn mutate_var(&mut self, var: &Var, expr: &PrimExpr) -> PrimExpr {
        self.var_remap.get(var).map(PrimExpr::from).unwrap_or_else(|| expr.clone())
    }
}

impl StmtMutator for IndexDataTypeNormalizer {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::BufferStore(op) => {
                let indices = op.indices.iter().map(|i| self.index_expr(i)).collect();
                let prev = std::mem::replace(&mut self.in_index, false);
                let value = self.mutate_expr(&op.value);
                self.in_index = prev;
                Stmt::BufferStore(Arc::new(BufferStore { buffer: op.buffer.clone(), value, indices }))
            }
            _ => super_mutate_stmt(self, stmt),
        }
    }

    fn mutate_for(&mut self, op: &Arc<For>) -> Stmt {
        let loop_var = self.define(&op.loop_var);
        let min = self.index_expr(&op.min);
        let extent = self.index_expr(&op.extent);
        let body = self.mutate_stmt(&op.body);
        let mut new = op.to_fresh();
        new.loop_var = loop_var;
        new.min = min;
        new.extent = extent;
        new.body = body;
        Stmt::from(new)
    }

    fn mutate_block_realize(&mut self, op: &Arc<BlockRealize>) -> Stmt {
        let iter_values = op.iter_values.iter().map(|v| self.index_expr(v)).collect();
        let predicate = self.index_expr(&op.predicate);
        let block = self.mutate_block(&op.block);
        Stmt::from(BlockRealize { iter_values, predicate, block })
    }

    fn mutate_block(&mut self, op: &Arc<Block>) -> Arc<Block> {
        for iv in &op.iter_vars {
            self.define(&iv.var);
        }
        super_mutate_block(self, op)
    }

    fn mutate_range(&mut self, range: &Range) -> Range {
        Range { min: self.index_expr(&range.min), extent: self.index_expr(&range.extent) }
    }

    fn mutate_iter_var(&mut self, iv: &IterVar) -> IterVar {
        let var = self.define(&iv.var);
        let dom = self.mutate_range(&iv.dom);
        IterVar { var, dom, iter_type: iv.iter_type }
    }
}
