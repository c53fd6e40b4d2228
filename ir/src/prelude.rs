//! Common imports for building and inspecting programs.
//!
//! ```rust,ignore
//! use tessera_ir::prelude::*;
//! ```

pub use crate::arith::Analyzer;
pub use crate::buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
pub use crate::expr::{PrimExpr, Var, floordiv, floormod};
pub use crate::func::PrimFunc;
pub use crate::stmt::{Block, BlockRealize, For, ForKind, IterVar, IterVarType, NodeId, Stmt};

pub use tessera_dtype::DType;
