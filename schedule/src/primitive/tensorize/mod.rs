//! Tensorize: replace a block or a blockized loop with a registered tensor
//! intrinsic.
//!
//! The target is matched structurally against the intrinsic's description.
//! On success the block keeps its iteration variables, bindings and regions,
//! its body becomes the intrinsic's implementation body, and one match buffer
//! per implementation parameter ties the implementation's buffers to the
//! program regions found during matching.

pub mod comparator;
pub mod intrin;

use std::collections::HashMap;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, ensure};
use tessera_ir::arith::Analyzer;
use tessera_ir::{
    Block, BlockRealize, Buffer, BufferRegion, IndexDataTypeNormalizer, MatchBufferRegion, NodeId, PrimExpr, Range,
    Stmt, renew_ids,
};
use tracing::{debug, warn};

pub use comparator::TensorizeComparator;
pub use intrin::TensorIntrin;

use super::blockize::blockize_impl;
use super::blockize::region::max_index_bits;
use crate::error::*;
use crate::state::{BlockReuse, SRefNode, ScheduleState};

/// Tensorize the block or loop `target` with the intrinsic registered as
/// `intrin_name`. Returns the block that now carries the implementation.
#[tracing::instrument(skip_all, fields(target = %target, intrin = intrin_name, preserve_unit_iters))]
pub fn tensorize(
    state: &mut ScheduleState,
    target: NodeId,
    intrin_name: &str,
    preserve_unit_iters: bool,
) -> Result<NodeId> {
    let intrin = TensorIntrin::get(intrin_name)?;
    let target = state.resolve(target)?;

    let (realize, replaced_block) = match &state.get_sref(target)?.node {
        SRefNode::Block(op) => (op.as_ref().clone(), Some(op.block.id())),
        SRefNode::Loop(_) => {
            // The reuse map of the intermediate blockize is not needed: the
            // inner block is discarded together with the loops.
            let mut reuse = BlockReuse::new();
            let mut analyzer = Analyzer::new();
            (blockize_impl(state, target, &mut reuse, &mut analyzer, preserve_unit_iters)?, None)
        }
    };
    let block = &realize.block;

    let bits = max_index_bits(block.reads.iter().chain(&block.writes));
    ensure!(bits > 0, IndexBitsNotPositiveSnafu { block: block.name.clone(), bits });
    let implementation = IndexDataTypeNormalizer::with_bits(bits).context(IrSnafu)?.rewrite(&intrin.implementation);

    let mut comparator = TensorizeComparator::new();
    comparator.compare_stmt(&Stmt::from(realize.clone()), &intrin.desc.body)?;

    let match_buffers = bind_match_buffers(&comparator, &intrin.desc.param_buffers().context(IrSnafu)?, &implementation)?;
    let impl_root = implementation.root_block().context(IrSnafu)?;

    let mut new_block = block.to_fresh();
    new_block.body = renew_ids(&impl_root.body);
    new_block.match_buffers = match_buffers;
    merge_annotations(&mut new_block, impl_root);
    let new_realize = BlockRealize::new(realize.iter_values.clone(), realize.predicate.clone(), Arc::new(new_block));
    let result = new_realize.block.id();

    let mut reuse = BlockReuse::new();
    if let Some(old) = replaced_block {
        reuse.insert(old, result);
    }
    state.replace(target, Stmt::from(new_realize), &reuse)?;

    let scope_root = state.get_scope_root(result)?;
    state.refresh_scope_info(scope_root)?;
    debug!(block = %result, intrin = intrin_name, "tensorized");
    Ok(result)
}

/// One match buffer per implementation parameter, in parameter order. The
/// program region starts at the index basis recorded for the program buffer;
/// leading dimensions the implementation does not have are unit.
fn bind_match_buffers(
    comparator: &TensorizeComparator,
    desc_params: &[Buffer],
    implementation: &tessera_ir::PrimFunc,
) -> Result<Vec<MatchBufferRegion>> {
    let impl_params = implementation.param_buffers().context(IrSnafu)?;
    ensure!(
        desc_params.len() == impl_params.len(),
        IntrinParamCountMismatchSnafu { desc: desc_params.len(), implementation: impl_params.len() }
    );

    let impl_root = implementation.root_block().context(IrSnafu)?;
    let mut impl_regions: HashMap<&Buffer, &BufferRegion> = HashMap::new();
    for region in impl_root.reads.iter().chain(&impl_root.writes) {
        impl_regions.entry(&region.buffer).or_insert(region);
    }

    desc_params
        .iter()
        .zip(&impl_params)
        .map(|(desc_buffer, impl_buffer)| {
            let program_buffer = comparator
                .rhs_buffer_map
                .get(desc_buffer)
                .context(MissingBufferBindingSnafu { buffer: desc_buffer.name(), what: "program buffer" })?;
            let impl_region = impl_regions
                .get(impl_buffer)
                .context(MissingBufferBindingSnafu { buffer: impl_buffer.name(), what: "implementation region" })?;
            let base = comparator
                .buffer_indices
                .get(program_buffer)
                .context(MissingBufferBindingSnafu { buffer: program_buffer.name(), what: "index basis" })?;
            let offset = base.len().checked_sub(impl_region.region.len()).context(RegionRankMismatchSnafu {
                buffer: program_buffer.name(),
                expected: base.len(),
                actual: impl_region.region.len(),
            })?;

            let leading = base[..offset].iter().map(|min| Range::from_min_extent(min.clone(), PrimExpr::one(min.dtype())));
            let matched = base[offset..].iter().zip(&impl_region.region).map(|(min, range)| {
                Range::from_min_extent(min.clone(), PrimExpr::cast(min.dtype(), range.extent.clone()))
            });
            Ok(MatchBufferRegion {
                buffer: impl_buffer.clone(),
                source: BufferRegion::new(program_buffer.clone(), leading.chain(matched)),
            })
        })
        .collect()
}

/// Copy the implementation's block annotations. A key the program block
/// already carries keeps the program's value.
fn merge_annotations(block: &mut Block, impl_root: &Block) {
    for (key, value) in &impl_root.annotations {
        match block.annotations.get(key) {
            Some(existing) if existing != value => {
                warn!(key = %key, kept = %existing, ignored = %value, "conflicting annotation on tensorized block");
            }
            Some(_) => {}
            None => {
                block.annotations.insert(key.clone(), value.clone());
            }
        }
    }
}
