//! Structural well-formedness checks.

use snafu::ensure;

use crate::buffer::BufferRegion;
use crate::error::*;
use crate::func::PrimFunc;
use crate::stmt::Stmt;
use crate::visit::pre_order_visit;

fn check_region(region: &BufferRegion) -> Result<()> {
    ensure!(
        region.region.len() == region.buffer.ndim(),
        RegionRankSnafu { buffer: region.buffer.name().to_string(), expected: region.buffer.ndim(), actual: region.region.len() }
    );
    Ok(())
}

/// Check every block realization and buffer region of `stmt`.
///
/// - a realization binds exactly one value per block iteration variable
/// - every read, write and match-buffer source region has the buffer's rank
pub fn verify_stmt(stmt: &Stmt) -> Result<()> {
    let mut result = Ok(());
    pre_order_visit(stmt, &mut |s| {
        if result.is_err() {
            return false;
        }
        if let Stmt::BlockRealize(realize) = s {
            result = verify_realize(realize);
        }
        result.is_ok()
    });
    result
}

fn verify_realize(realize: &crate::stmt::BlockRealize) -> Result<()> {
    let block = &realize.block;
    ensure!(
        block.iter_vars.len() == realize.iter_values.len(),
        IterValueCountMismatchSnafu {
            block: block.name.clone(),
            expected: block.iter_vars.len(),
            actual: realize.iter_values.len(),
        }
    );
    for region in block.reads.iter().chain(&block.writes) {
        check_region(region)?;
    }
    for m in &block.match_buffers {
        check_region(&m.source)?;
    }
    Ok(())
}

pub fn verify_well_formed(func: &PrimFunc) -> Result<()> {
    verify_stmt(&func.body)
}
