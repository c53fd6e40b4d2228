//! Buffer regions of blockized blocks.

use std::collections::HashMap;

use snafu::ensure;
use tessera_ir::arith::{Analyzer, IntSet, eval_set};
use tessera_ir::{Buffer, BufferRegion, Range, Var};

use crate::error::*;

/// Relax the variables of `dom` in every region and clip the result to the
/// buffer's shape.
pub fn eval_set_regions(
    regions: &[BufferRegion],
    dom: &HashMap<Var, IntSet>,
    analyzer: &Analyzer,
) -> Result<Vec<BufferRegion>> {
    regions
        .iter()
        .map(|region| {
            let buffer = &region.buffer;
            ensure!(
                region.region.len() == buffer.ndim(),
                RegionRankMismatchSnafu {
                    buffer: buffer.name().to_string(),
                    expected: buffer.ndim(),
                    actual: region.region.len(),
                }
            );
            let ranges = region.region.iter().zip(buffer.shape()).map(|(range, extent)| {
                let last = &range.min + range.extent.clone() - 1;
                let set = IntSet { min: eval_set(&range.min, dom, analyzer).min, max: eval_set(&last, dom, analyzer).max };
                set.cover_range(&Range::from_extent(extent.clone()), analyzer)
            });
            Ok(BufferRegion::new(buffer.clone(), ranges))
        })
        .collect()
}

/// One region per buffer covering every region of that buffer in `regions`.
/// Buffers keep their first-seen order.
pub fn union_regions(regions: &[BufferRegion], analyzer: &Analyzer) -> Vec<BufferRegion> {
    let mut order: Vec<Buffer> = Vec::new();
    let mut sets: HashMap<Buffer, Vec<Vec<IntSet>>> = HashMap::new();
    for region in regions {
        let dims = sets.entry(region.buffer.clone()).or_insert_with(|| {
            order.push(region.buffer.clone());
            vec![Vec::new(); region.region.len()]
        });
        for (dim, range) in dims.iter_mut().zip(&region.region) {
            dim.push(IntSet::from_range(range));
        }
    }
    order
        .into_iter()
        .filter_map(|buffer| {
            let dims = sets.remove(&buffer)?;
            let ranges: Vec<Range> = dims
                .iter()
                .zip(buffer.shape())
                .map(|(dim, extent)| {
                    let union = IntSet::union(dim, analyzer);
                    match (union.min, union.max) {
                        (Some(min), Some(max)) => {
                            let min = analyzer.simplify(&min);
                            let end = analyzer.simplify(&(max + 1));
                            Range { extent: analyzer.simplify(&(&end - min.clone())), min }
                        }
                        _ => Range::from_extent(extent.clone()),
                    }
                })
                .collect();
            Some(BufferRegion::new(buffer, ranges))
        })
        .collect()
}

/// Largest bit width among the region minimums; 0 when there is none.
pub fn max_index_bits<'a>(regions: impl IntoIterator<Item = &'a BufferRegion>) -> u32 {
    regions
        .into_iter()
        .flat_map(|region| region.region.iter())
        .map(|range: &Range| range.min.dtype())
        .filter(|dtype| dtype.is_int())
        .map(|dtype| dtype.bits())
        .max()
        .unwrap_or(0)
}
