//! Outer and inner block bindings derived from a subspace division.

use tessera_ir::arith::{Analyzer, IterMapExpr, IterMark, MarkSource};
use tessera_ir::{IterVar, PrimExpr, Range, VarMap};

use super::divide::SubspaceDivision;
use crate::error::*;

/// Iteration variables of a new block with the values they are bound to.
#[derive(Debug, Clone, Default)]
pub struct IterBindings {
    pub iter_vars: Vec<IterVar>,
    pub values: Vec<PrimExpr>,
}

/// Create the outer (`_o`) and inner (`_i`) iteration variables for every
/// iteration variable of the original block and return the substitution
/// that rewrites the original block in terms of them.
///
/// With `reuse_outer`, the first `outer.iter_vars.len()` outer variables are
/// taken from `outer` instead of being created; their extent and binding
/// must be provably equal to the division's.
pub fn derive_block_binding(
    iter_vars: &[IterVar],
    division: &SubspaceDivision,
    outer: &mut IterBindings,
    inner: &mut IterBindings,
    preserve_unit_iters: bool,
    reuse_outer: bool,
) -> Result<VarMap> {
    let analyzer = Analyzer::new();
    let mut subst = VarMap::new();
    for (i, (iter_var, (outer_mark, inner_mark))) in iter_vars.iter().zip(&division.marks).enumerate() {
        let outer_binding = outer_mark.to_expr();
        let outer_var = if reuse_outer && i < outer.iter_vars.len() {
            let existing = outer.iter_vars[i].clone();
            snafu::ensure!(
                analyzer.can_prove_equal(&existing.dom.extent, &outer_mark.extent),
                IterExtentMismatchSnafu {
                    var: existing.var.name().to_string(),
                    expected: outer_mark.extent.to_string(),
                    actual: existing.dom.extent.to_string(),
                }
            );
            snafu::ensure!(
                analyzer.can_prove_equal(&outer.values[i], &outer_binding),
                IterBindingMismatchSnafu {
                    var: existing.var.name().to_string(),
                    expected: outer_binding.to_string(),
                    actual: outer.values[i].to_string(),
                }
            );
            existing.var
        } else {
            let var = iter_var.var.copy_with_suffix("_o");
            outer.iter_vars.push(IterVar::new(var.clone(), mark_domain(outer_mark), iter_var.iter_type));
            outer.values.push(outer_binding);
            var
        };

        let replacement = if inner_mark.extent.is_one() {
            // A unit outer iteration takes the single value of its domain.
            let value = mark_domain(outer_mark).min;
            if outer_mark.extent.is_one() && !preserve_unit_iters && value.as_int().is_some() {
                value
            } else {
                outer_var.to_expr()
            }
        } else {
            let inner_var = iter_var.var.copy_with_suffix("_i");
            inner.iter_vars.push(IterVar::new(
                inner_var.clone(),
                Range::from_extent(inner_mark.extent.clone()),
                iter_var.iter_type,
            ));
            inner.values.push(inner_mark.to_expr());
            if outer_mark.extent.is_one() {
                inner_var.to_expr()
            } else {
                outer_var.to_expr() * inner_mark.extent.clone() + inner_var.to_expr()
            }
        };
        subst.insert(iter_var.var.clone(), replacement);
    }
    Ok(subst)
}

/// Values taken by `mark`. A sum is offset by its constant base; every
/// other mark starts at zero.
pub fn mark_domain(mark: &IterMark) -> Range {
    match &mark.source {
        MarkSource::Iter(iter) => match iter.as_ref() {
            IterMapExpr::Sum(sum) if sum.base.as_int().is_some() => {
                Range::from_min_extent(sum.base.clone(), mark.extent.clone())
            }
            _ => Range::from_extent(mark.extent.clone()),
        },
        MarkSource::Expr(_) => Range::from_extent(mark.extent.clone()),
    }
}
