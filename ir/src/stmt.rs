//! Statements: loops, blocks and their realizations.
//!
//! Loop and block nodes carry a stable [`NodeId`]. The id is assigned at
//! construction and never copied: [`For::to_fresh`] and [`Block::to_fresh`]
//! produce an editable copy with a new identity, which is how every rewrite in
//! the workspace derives a changed node from an existing one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bon::bon;
use tessera_dtype::DType;

use crate::buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
use crate::expr::{PrimExpr, Var};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a loop or block node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("#{_0}")]
pub struct NodeId(u64);

impl NodeId {
    pub fn fresh() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Value stored in a loop or block annotation.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum AnnotationValue {
    Int(i64),
    Bool(bool),
    #[display("{_0:?}")]
    Str(String),
    Expr(PrimExpr),
}

pub type Annotations = BTreeMap<String, AnnotationValue>;

// =========================================================================
// Loops
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ForKind {
    #[display("serial")]
    Serial,
    #[display("parallel")]
    Parallel,
    #[display("vectorized")]
    Vectorized,
    #[display("unroll")]
    Unrolled,
    #[display("thread_binding({_0:?})")]
    ThreadBinding(String),
}

/// Loop `for loop_var in [min, min + extent)`.
#[derive(derive_more::Debug)]
pub struct For {
    id: NodeId,
    pub loop_var: Var,
    pub min: PrimExpr,
    pub extent: PrimExpr,
    pub kind: ForKind,
    pub annotations: Annotations,
    #[debug(skip)]
    pub body: Stmt,
}

#[bon]
impl For {
    #[builder]
    pub fn new(
        loop_var: Var,
        min: Option<PrimExpr>,
        extent: PrimExpr,
        #[builder(default = ForKind::Serial)] kind: ForKind,
        #[builder(default)] annotations: Annotations,
        body: Stmt,
    ) -> Self {
        let min = min.unwrap_or_else(|| PrimExpr::zero(loop_var.dtype()));
        Self { id: NodeId::fresh(), loop_var, min, extent, kind, annotations, body }
    }
}

impl For {
    /// Serial loop over `[0, extent)` wrapped into a statement.
    pub fn serial(loop_var: &Var, extent: impl Into<PrimExpr>, body: Stmt) -> Stmt {
        Stmt::from(For::builder().loop_var(loop_var.clone()).extent(extent.into()).body(body).build())
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Copy with a new identity.
    pub fn to_fresh(&self) -> Self {
        Self {
            id: NodeId::fresh(),
            loop_var: self.loop_var.clone(),
            min: self.min.clone(),
            extent: self.extent.clone(),
            kind: self.kind.clone(),
            annotations: self.annotations.clone(),
            body: self.body.clone(),
        }
    }
}

// =========================================================================
// Blocks
// =========================================================================

/// Kind of a block iteration variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum IterVarType {
    /// Data-parallel ("spatial") iteration.
    #[display("spatial")]
    DataPar,
    /// Commutative reduction.
    #[display("reduce")]
    CommReduce,
}

/// Block iteration variable with its domain.
#[derive(Debug, Clone, PartialEq)]
pub struct IterVar {
    pub var: Var,
    pub dom: Range,
    pub iter_type: IterVarType,
}

impl IterVar {
    pub fn new(var: Var, dom: Range, iter_type: IterVarType) -> Self {
        Self { var, dom, iter_type }
    }

    pub fn spatial(var: &Var, extent: impl Into<PrimExpr>) -> Self {
        Self::new(var.clone(), Range::from_extent(extent), IterVarType::DataPar)
    }

    pub fn reduce(var: &Var, extent: impl Into<PrimExpr>) -> Self {
        Self::new(var.clone(), Range::from_extent(extent), IterVarType::CommReduce)
    }
}

/// A named computation scope with declared iteration domain and buffer accesses.
#[derive(derive_more::Debug)]
pub struct Block {
    id: NodeId,
    pub name: String,
    pub iter_vars: Vec<IterVar>,
    pub reads: Vec<BufferRegion>,
    pub writes: Vec<BufferRegion>,
    #[debug(skip)]
    pub init: Option<Stmt>,
    #[debug(skip)]
    pub body: Stmt,
    pub alloc_buffers: Vec<Buffer>,
    pub match_buffers: Vec<MatchBufferRegion>,
    pub annotations: Annotations,
}

#[bon]
impl Block {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(default)] iter_vars: Vec<IterVar>,
        #[builder(default)] reads: Vec<BufferRegion>,
        #[builder(default)] writes: Vec<BufferRegion>,
        init: Option<Stmt>,
        body: Stmt,
        #[builder(default)] alloc_buffers: Vec<Buffer>,
        #[builder(default)] match_buffers: Vec<MatchBufferRegion>,
        #[builder(default)] annotations: Annotations,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            iter_vars,
            reads,
            writes,
            init,
            body,
            alloc_buffers,
            match_buffers,
            annotations,
        }
    }
}

impl Block {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Copy with a new identity.
    pub fn to_fresh(&self) -> Self {
        Self {
            id: NodeId::fresh(),
            name: self.name.clone(),
            iter_vars: self.iter_vars.clone(),
            reads: self.reads.clone(),
            writes: self.writes.clone(),
            init: self.init.clone(),
            body: self.body.clone(),
            alloc_buffers: self.alloc_buffers.clone(),
            match_buffers: self.match_buffers.clone(),
            annotations: self.annotations.clone(),
        }
    }

    pub fn has_reduction(&self) -> bool {
        self.iter_vars.iter().any(|iv| iv.iter_type == IterVarType::CommReduce)
    }
}

/// Instantiates a block: binds each iteration variable to a value.
#[derive(Debug, Clone)]
pub struct BlockRealize {
    pub iter_values: Vec<PrimExpr>,
    pub predicate: PrimExpr,
    pub block: Arc<Block>,
}

impl BlockRealize {
    pub fn new(iter_values: Vec<PrimExpr>, predicate: PrimExpr, block: impl Into<Arc<Block>>) -> Self {
        Self { iter_values, predicate, block: block.into() }
    }

    /// Realization with a `true` predicate.
    pub fn unconditional(iter_values: Vec<PrimExpr>, block: impl Into<Arc<Block>>) -> Self {
        Self::new(iter_values, PrimExpr::bool(true), block)
    }
}

// =========================================================================
// Leaf statements
// =========================================================================

#[derive(Debug, Clone)]
pub struct BufferStore {
    pub buffer: Buffer,
    pub value: PrimExpr,
    pub indices: Vec<PrimExpr>,
}

#[derive(Debug, Clone)]
pub struct IfThenElse {
    pub condition: PrimExpr,
    pub then_case: Stmt,
    pub else_case: Option<Stmt>,
}

/// Statement tree node. Cloning is cheap; children are shared.
#[derive(Debug, Clone)]
pub enum Stmt {
    For(Arc<For>),
    BlockRealize(Arc<BlockRealize>),
    Seq(Arc<Vec<Stmt>>),
    IfThenElse(Arc<IfThenElse>),
    BufferStore(Arc<BufferStore>),
    Evaluate(PrimExpr),
}

impl Stmt {
    /// Sequence of statements. Nested sequences are flattened and a single
    /// statement is returned unwrapped.
    pub fn seq(stmts: impl IntoIterator<Item = Stmt>) -> Stmt {
        let mut flat = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Seq(inner) => flat.extend(inner.iter().cloned()),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.pop().unwrap_or_else(Stmt::no_op);
        }
        Stmt::Seq(Arc::new(flat))
    }

    pub fn store(buffer: &Buffer, value: PrimExpr, indices: impl IntoIterator<Item = PrimExpr>) -> Stmt {
        Stmt::BufferStore(Arc::new(BufferStore { buffer: buffer.clone(), value, indices: indices.into_iter().collect() }))
    }

    pub fn if_then_else(condition: PrimExpr, then_case: Stmt, else_case: Option<Stmt>) -> Stmt {
        Stmt::IfThenElse(Arc::new(IfThenElse { condition, then_case, else_case }))
    }

    pub fn no_op() -> Stmt {
        Stmt::Evaluate(PrimExpr::zero(DType::Int32))
    }

    /// Pointer identity.
    pub fn same_as(&self, other: &Stmt) -> bool {
        match (self, other) {
            (Stmt::For(a), Stmt::For(b)) => Arc::ptr_eq(a, b),
            (Stmt::BlockRealize(a), Stmt::BlockRealize(b)) => Arc::ptr_eq(a, b),
            (Stmt::Seq(a), Stmt::Seq(b)) => Arc::ptr_eq(a, b),
            (Stmt::IfThenElse(a), Stmt::IfThenElse(b)) => Arc::ptr_eq(a, b),
            (Stmt::BufferStore(a), Stmt::BufferStore(b)) => Arc::ptr_eq(a, b),
            (Stmt::Evaluate(a), Stmt::Evaluate(b)) => a.same_as(b),
            _ => false,
        }
    }

    /// Identity of the loop or realized block this statement is, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Stmt::For(f) => Some(f.id()),
            Stmt::BlockRealize(r) => Some(r.block.id()),
            _ => None,
        }
    }

    pub fn as_for(&self) -> Option<&Arc<For>> {
        match self {
            Stmt::For(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_block_realize(&self) -> Option<&Arc<BlockRealize>> {
        match self {
            Stmt::BlockRealize(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Stmt]> {
        match self {
            Stmt::Seq(s) => Some(s),
            _ => None,
        }
    }
}

impl From<For> for Stmt {
    fn from(value: For) -> Self {
        Stmt::For(Arc::new(value))
    }
}

impl From<BlockRealize> for Stmt {
    fn from(value: BlockRealize) -> Self {
        Stmt::BlockRealize(Arc::new(value))
    }
}
