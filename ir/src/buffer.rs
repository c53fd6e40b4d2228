//! Buffers, ranges and buffer regions.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::expr::PrimExpr;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A multi-dimensional memory region with a unique identity.
///
/// Buffers compare by identity, the same way [`Var`](crate::Var) does.
#[derive(Clone)]
pub struct Buffer(Arc<BufferNode>);

#[derive(Debug)]
pub struct BufferNode {
    id: u64,
    pub name: String,
    pub dtype: DType,
    pub shape: SmallVec<[PrimExpr; 4]>,
    /// Storage scope, e.g. `global` or `shared`.
    pub scope: String,
}

impl Buffer {
    pub fn new(name: impl Into<String>, dtype: DType, shape: impl IntoIterator<Item = PrimExpr>) -> Self {
        Self::with_scope(name, dtype, shape, "global")
    }

    pub fn with_scope(
        name: impl Into<String>,
        dtype: DType,
        shape: impl IntoIterator<Item = PrimExpr>,
        scope: impl Into<String>,
    ) -> Self {
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(BufferNode {
            id,
            name: name.into(),
            dtype,
            shape: shape.into_iter().collect(),
            scope: scope.into(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    pub fn shape(&self) -> &[PrimExpr] {
        &self.0.shape
    }

    pub fn ndim(&self) -> usize {
        self.0.shape.len()
    }

    pub fn scope(&self) -> &str {
        &self.0.scope
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

impl std::fmt::Display for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Half-open integer interval `[min, min + extent)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub min: PrimExpr,
    pub extent: PrimExpr,
}

impl Range {
    pub fn from_min_extent(min: impl Into<PrimExpr>, extent: impl Into<PrimExpr>) -> Self {
        Self { min: min.into(), extent: extent.into() }
    }

    /// `[0, extent)` with the zero in the extent's dtype.
    pub fn from_extent(extent: impl Into<PrimExpr>) -> Self {
        let extent = extent.into();
        Self { min: PrimExpr::zero(extent.dtype()), extent }
    }

    /// `[begin, end)`. The extent is left unsimplified.
    pub fn from_begin_end(begin: PrimExpr, end: PrimExpr) -> Self {
        let extent = &end - begin.clone();
        Self { min: begin, extent }
    }

    /// Single point `[value, value + 1)`.
    pub fn point(value: PrimExpr) -> Self {
        let extent = PrimExpr::one(value.dtype());
        Self { min: value, extent }
    }

    pub fn is_unit(&self) -> bool {
        self.extent.is_one()
    }
}

/// A rectangular sub-region of a buffer, one [`Range`] per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferRegion {
    pub buffer: Buffer,
    pub region: SmallVec<[Range; 4]>,
}

impl BufferRegion {
    pub fn new(buffer: Buffer, region: impl IntoIterator<Item = Range>) -> Self {
        Self { buffer, region: region.into_iter().collect() }
    }

    /// Whole buffer.
    pub fn full(buffer: &Buffer) -> Self {
        let region = buffer.shape().iter().map(|extent| Range::from_extent(extent.clone())).collect();
        Self { buffer: buffer.clone(), region }
    }

    /// Single element at `indices`.
    pub fn from_point(buffer: &Buffer, indices: impl IntoIterator<Item = PrimExpr>) -> Self {
        Self { buffer: buffer.clone(), region: indices.into_iter().map(Range::point).collect() }
    }
}

/// Binds `buffer` (declared by a block) to a region of an outer buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchBufferRegion {
    pub buffer: Buffer,
    pub source: BufferRegion,
}
