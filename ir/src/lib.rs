//! Loop/block tensor IR for tessera.
//!
//! Programs are trees of loops ([`For`]) and block realizations
//! ([`BlockRealize`]) over buffers. Every node is an immutable value: a
//! transformation builds new nodes and shares untouched subtrees.
//!
//! # Module Organization
//!
//! - [`expr`] - scalar expressions and variables
//! - [`buffer`] - buffers, ranges and buffer regions
//! - [`stmt`] - loops, blocks and leaf statements
//! - [`func`] - functions with parameter buffers and a root block
//! - [`visit`] / [`mutate`] - traversal and rebuilding
//! - [`arith`] - integer analysis: bounds, simplification, interval sets, iteration maps
//! - [`normalize`] - index dtype normalization
//! - [`error`] - error types and result handling

pub mod arith;
pub mod buffer;
pub mod error;
pub mod expr;
pub mod func;
pub mod mutate;
pub mod normalize;
pub mod prelude;
pub mod printer;
pub mod stmt;
pub mod verify;
pub mod visit;


pub use buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
pub use error::{Error, Result};
pub use expr::{BinaryOp, CmpOp, ExprKind, PrimExpr, Var};
pub use func::PrimFunc;
pub use mutate::{ExprMutator, StmtMutator, VarMap, renew_ids, substitute, substitute_stmt};
pub use normalize::IndexDataTypeNormalizer;
pub use stmt::{
    AnnotationValue, Annotations, Block, BlockRealize, BufferStore, For, ForKind, IfThenElse, IterVar, IterVarType,
    NodeId, Stmt,
};
pub use visit::{ExprVisitor, StmtVisitor, collect_vars, stmt_uses_var, uses_var};

pub use tessera_dtype::DType;
