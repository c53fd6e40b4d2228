//! Structural matching of a program subtree against an intrinsic description.
//!
//! The left-hand side is always the program, the right-hand side the
//! description. Variables match by definition: the first time a program
//! variable is defined opposite a description variable, the pair is bound
//! and every later use must agree. Buffers bind on first sight when their
//! dtype and scope agree. The regions declared by the scope block fix an
//! *index basis* per program buffer, and every later region or access is
//! compared after subtracting that basis.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::arith::Analyzer;
use tessera_ir::{Block, BlockRealize, Buffer, BufferRegion, ExprKind, For, PrimExpr, Stmt, Var};

use crate::error::*;

#[derive(Debug)]
pub struct TensorizeComparator {
    analyzer: Analyzer,
    equal_map: HashMap<Var, Var>,
    /// Program buffer bound to each description buffer.
    pub rhs_buffer_map: HashMap<Buffer, Buffer>,
    /// Index basis of each program buffer.
    pub buffer_indices: HashMap<Buffer, Vec<PrimExpr>>,
    is_scope_block: bool,
}

impl Default for TensorizeComparator {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch<T: Display + ?Sized>(reason: &'static str, lhs: &T, rhs: &T) -> Result<()> {
    TensorizeMismatchSnafu { reason, lhs: lhs.to_string(), rhs: rhs.to_string() }.fail()
}

fn stmt_kind(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::For(_) => "for",
        Stmt::BlockRealize(_) => "block",
        Stmt::Seq(_) => "sequence",
        Stmt::IfThenElse(_) => "if",
        Stmt::BufferStore(_) => "store",
        Stmt::Evaluate(_) => "evaluate",
    }
}

/// Same type code; widths may differ.
fn same_code(a: DType, b: DType) -> bool {
    a == b || (a.is_int() && b.is_int()) || (a.is_float() && b.is_float()) || (a.is_bool() && b.is_bool())
}

impl TensorizeComparator {
    pub fn new() -> Self {
        Self {
            analyzer: Analyzer::new(),
            equal_map: HashMap::new(),
            rhs_buffer_map: HashMap::new(),
            buffer_indices: HashMap::new(),
            is_scope_block: true,
        }
    }

    pub fn compare_stmt(&mut self, lhs: &Stmt, rhs: &Stmt) -> Result<()> {
        match (lhs, rhs) {
            (Stmt::For(a), Stmt::For(b)) => self.compare_for(a, b),
            (Stmt::BlockRealize(a), Stmt::BlockRealize(b)) => self.compare_block_realize(a, b),
            (Stmt::Seq(a), Stmt::Seq(b)) => {
                if a.len() != b.len() {
                    return mismatch("sequence length", &a.len(), &b.len());
                }
                a.iter().zip(b.iter()).try_for_each(|(x, y)| self.compare_stmt(x, y))
            }
            (Stmt::IfThenElse(a), Stmt::IfThenElse(b)) => {
                self.compare_expr(&a.condition, &b.condition)?;
                self.compare_stmt(&a.then_case, &b.then_case)?;
                match (&a.else_case, &b.else_case) {
                    (Some(x), Some(y)) => self.compare_stmt(x, y),
                    (None, None) => Ok(()),
                    _ => mismatch("else branch", &a.condition, &b.condition),
                }
            }
            (Stmt::BufferStore(a), Stmt::BufferStore(b)) => {
                self.compare_buffer_access(&a.buffer, &a.indices, &b.buffer, &b.indices)?;
                self.compare_expr(&a.value, &b.value)
            }
            (Stmt::Evaluate(a), Stmt::Evaluate(b)) => self.compare_expr(a, b),
            _ => mismatch("statement kind", stmt_kind(lhs), stmt_kind(rhs)),
        }
    }

    fn compare_for(&mut self, lhs: &For, rhs: &For) -> Result<()> {
        self.def_equal(&lhs.loop_var, &rhs.loop_var)?;
        self.compare_expr(&lhs.min, &rhs.min)?;
        self.compare_expr(&lhs.extent, &rhs.extent)?;
        if lhs.kind != rhs.kind {
            return mismatch("loop kind", &lhs.kind, &rhs.kind);
        }
        if lhs.annotations != rhs.annotations {
            return mismatch("loop annotations", &format!("{:?}", lhs.annotations), &format!("{:?}", rhs.annotations));
        }
        self.compare_stmt(&lhs.body, &rhs.body)
    }

    fn compare_block_realize(&mut self, lhs: &BlockRealize, rhs: &BlockRealize) -> Result<()> {
        if !self.is_scope_block {
            self.compare_exprs("block bindings", &lhs.iter_values, &rhs.iter_values)?;
        }
        self.compare_expr(&lhs.predicate, &rhs.predicate)?;
        self.compare_block(&lhs.block, &rhs.block)
    }

    fn compare_block(&mut self, lhs: &Arc<Block>, rhs: &Arc<Block>) -> Result<()> {
        if !self.is_scope_block {
            if lhs.iter_vars.len() != rhs.iter_vars.len() {
                return mismatch("iteration variable count", &lhs.iter_vars.len(), &rhs.iter_vars.len());
            }
            for (a, b) in lhs.iter_vars.iter().zip(&rhs.iter_vars) {
                self.def_equal(&a.var, &b.var)?;
                self.compare_expr(&a.dom.min, &b.dom.min)?;
                self.compare_expr(&a.dom.extent, &b.dom.extent)?;
                if a.iter_type != b.iter_type {
                    return mismatch("iteration variable kind", &a.iter_type, &b.iter_type);
                }
            }
            if lhs.annotations != rhs.annotations {
                return mismatch("block annotations", &lhs.name, &rhs.name);
            }
            if lhs.alloc_buffers.len() != rhs.alloc_buffers.len() {
                return mismatch("allocated buffer count", &lhs.alloc_buffers.len(), &rhs.alloc_buffers.len());
            }
            for (a, b) in lhs.alloc_buffers.iter().zip(&rhs.alloc_buffers) {
                self.compare_buffer(a, b)?;
            }
            match (&lhs.init, &rhs.init) {
                (Some(a), Some(b)) => self.compare_stmt(a, b)?,
                (None, None) => {}
                _ => return mismatch("block init", &lhs.name, &rhs.name),
            }
        }
        self.compare_regions("write regions", &lhs.writes, &rhs.writes)?;
        self.compare_regions("read regions", &lhs.reads, &rhs.reads)?;
        self.is_scope_block = false;
        self.compare_stmt(&lhs.body, &rhs.body)
    }

    fn compare_regions(&mut self, what: &'static str, lhs: &[BufferRegion], rhs: &[BufferRegion]) -> Result<()> {
        if lhs.len() != rhs.len() {
            return mismatch(what, &lhs.len(), &rhs.len());
        }
        lhs.iter().zip(rhs).try_for_each(|(a, b)| self.compare_buffer_region(a, b))
    }

    fn compare_exprs(&mut self, what: &'static str, lhs: &[PrimExpr], rhs: &[PrimExpr]) -> Result<()> {
        if lhs.len() != rhs.len() {
            return mismatch(what, &lhs.len(), &rhs.len());
        }
        lhs.iter().zip(rhs).try_for_each(|(a, b)| self.compare_expr(a, b))
    }

    /// Bind `lhs` to `rhs` at a definition site.
    fn def_equal(&mut self, lhs: &Var, rhs: &Var) -> Result<()> {
        if lhs == rhs {
            return Ok(());
        }
        match self.equal_map.get(lhs) {
            Some(bound) if bound == rhs => Ok(()),
            Some(_) => mismatch("variable definition", lhs, rhs),
            None => {
                self.equal_map.insert(lhs.clone(), rhs.clone());
                Ok(())
            }
        }
    }

    fn compare_buffer(&mut self, lhs: &Buffer, rhs: &Buffer) -> Result<()> {
        if lhs == rhs {
            return Ok(());
        }
        match self.rhs_buffer_map.get(rhs) {
            Some(bound) if bound == lhs => Ok(()),
            Some(_) => mismatch("buffer binding", lhs.name(), rhs.name()),
            None if lhs.dtype() == rhs.dtype() && lhs.scope() == rhs.scope() => {
                self.rhs_buffer_map.insert(rhs.clone(), lhs.clone());
                Ok(())
            }
            None => mismatch("buffer dtype or scope", lhs, rhs),
        }
    }

    fn compare_buffer_region(&mut self, lhs: &BufferRegion, rhs: &BufferRegion) -> Result<()> {
        self.compare_buffer(&lhs.buffer, &rhs.buffer)?;
        let Some(offset) = lhs.region.len().checked_sub(rhs.region.len()) else {
            return mismatch("region rank", &lhs.region.len(), &rhs.region.len());
        };
        match self.buffer_indices.get(&lhs.buffer).cloned() {
            None => {
                if !self.is_scope_block {
                    return mismatch("region of a buffer the scope block does not declare", lhs, rhs);
                }
                let mut base = Vec::with_capacity(lhs.region.len());
                for range in &lhs.region[..offset] {
                    if !range.extent.is_one() {
                        return mismatch("leading region extent", &range.extent, &PrimExpr::int(1));
                    }
                    base.push(range.min.clone());
                }
                for (l, r) in lhs.region[offset..].iter().zip(&rhs.region) {
                    if !self.analyzer.can_prove_equal(&l.extent, &r.extent) {
                        return mismatch("region extent", &l.extent, &r.extent);
                    }
                    base.push(l.min.clone());
                }
                self.buffer_indices.insert(lhs.buffer.clone(), base);
                Ok(())
            }
            Some(base) => {
                for (range, start) in lhs.region[..offset].iter().zip(&base) {
                    if !range.extent.is_one() || !self.analyzer.can_prove_equal(&range.min, start) {
                        return mismatch("leading region", &range.min, start);
                    }
                }
                for ((l, r), start) in lhs.region[offset..].iter().zip(&rhs.region).zip(&base[offset..]) {
                    if !self.analyzer.can_prove_equal(&l.extent, &r.extent) {
                        return mismatch("region extent", &l.extent, &r.extent);
                    }
                    let relative = self.analyzer.simplify(&(&l.min - start.clone()));
                    self.compare_expr(&relative, &r.min)?;
                }
                Ok(())
            }
        }
    }

    fn compare_buffer_access(
        &mut self,
        lhs_buffer: &Buffer,
        lhs_indices: &[PrimExpr],
        rhs_buffer: &Buffer,
        rhs_indices: &[PrimExpr],
    ) -> Result<()> {
        self.compare_buffer(lhs_buffer, rhs_buffer)?;
        let Some(offset) = lhs_indices.len().checked_sub(rhs_indices.len()) else {
            return mismatch("access rank", &lhs_indices.len(), &rhs_indices.len());
        };
        let Some(base) = self.buffer_indices.get(lhs_buffer).cloned() else {
            return mismatch("access to a buffer the scope block does not declare", lhs_buffer, rhs_buffer);
        };
        if base.len() != lhs_indices.len() {
            return mismatch("access rank", &lhs_indices.len(), &base.len());
        }
        for (index, start) in lhs_indices[..offset].iter().zip(&base) {
            if !self.analyzer.can_prove_equal(index, start) {
                return mismatch("leading index", index, start);
            }
        }
        for ((l, r), start) in lhs_indices[offset..].iter().zip(rhs_indices).zip(&base[offset..]) {
            let relative = self.analyzer.simplify(&(l - start.clone()));
            self.compare_expr(&relative, r)?;
        }
        Ok(())
    }

    pub fn compare_expr(&mut self, lhs: &PrimExpr, rhs: &PrimExpr) -> Result<()> {
        if lhs.same_as(rhs) {
            return Ok(());
        }
        if !same_code(lhs.dtype(), rhs.dtype()) {
            return mismatch("dtype", lhs, rhs);
        }
        match (lhs.kind(), rhs.kind()) {
            (ExprKind::Int(a), ExprKind::Int(b)) if a == b => Ok(()),
            (ExprKind::Float(a), ExprKind::Float(b)) if a == b => Ok(()),
            (ExprKind::Bool(a), ExprKind::Bool(b)) if a == b => Ok(()),
            (ExprKind::Var(a), ExprKind::Var(b)) => {
                if a == b || self.equal_map.get(a) == Some(b) {
                    Ok(())
                } else {
                    mismatch("variable", lhs, rhs)
                }
            }
            (ExprKind::Binary(op_a, a0, a1), ExprKind::Binary(op_b, b0, b1)) if op_a == op_b => {
                self.compare_expr(a0, b0)?;
                self.compare_expr(a1, b1)
            }
            (ExprKind::Cmp(op_a, a0, a1), ExprKind::Cmp(op_b, b0, b1)) if op_a == op_b => {
                self.compare_expr(a0, b0)?;
                self.compare_expr(a1, b1)
            }
            (ExprKind::And(a0, a1), ExprKind::And(b0, b1)) | (ExprKind::Or(a0, a1), ExprKind::Or(b0, b1)) => {
                self.compare_expr(a0, b0)?;
                self.compare_expr(a1, b1)
            }
            (ExprKind::Not(a), ExprKind::Not(b)) | (ExprKind::Cast(a), ExprKind::Cast(b)) => self.compare_expr(a, b),
            (
                ExprKind::Select { cond: ca, then_value: ta, else_value: ea },
                ExprKind::Select { cond: cb, then_value: tb, else_value: eb },
            ) => {
                self.compare_expr(ca, cb)?;
                self.compare_expr(ta, tb)?;
                self.compare_expr(ea, eb)
            }
            (ExprKind::Load { buffer: ba, indices: ia }, ExprKind::Load { buffer: bb, indices: ib }) => {
                self.compare_buffer_access(ba, ia, bb, ib)
            }
            _ => mismatch("expression", lhs, rhs),
        }
    }
}
