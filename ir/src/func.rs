//! Primitive functions: parameters, their buffers and a root block.

use std::sync::Arc;

use tessera_dtype::DType;

use crate::buffer::Buffer;
use crate::error::*;
use crate::expr::Var;
use crate::stmt::{Block, BlockRealize, Stmt};

/// A function over buffers. The body is always a realization of a block
/// named `root` with no iteration variables.
#[derive(Debug, Clone)]
pub struct PrimFunc {
    pub name: String,
    pub params: Vec<Var>,
    /// Buffer bound to each handle parameter, in parameter order.
    pub buffer_map: Vec<(Var, Buffer)>,
    pub body: Stmt,
}

impl PrimFunc {
    /// Function whose parameters are handles to `buffers`, in order. `body` is
    /// wrapped into the root block.
    pub fn new(name: impl Into<String>, buffers: impl IntoIterator<Item = Buffer>, body: Stmt) -> Self {
        let root = Block::builder().name("root").body(body).build();
        Self::with_root(name, buffers, Arc::new(root))
    }

    pub fn with_root(name: impl Into<String>, buffers: impl IntoIterator<Item = Buffer>, root: Arc<Block>) -> Self {
        let buffer_map: Vec<(Var, Buffer)> = buffers
            .into_iter()
            .map(|buffer| (Var::new(format!("{}_handle", buffer.name()), DType::Handle), buffer))
            .collect();
        let params = buffer_map.iter().map(|(var, _)| var.clone()).collect();
        let body = Stmt::from(BlockRealize::unconditional(Vec::new(), root));
        Self { name: name.into(), params, buffer_map, body }
    }

    /// Buffer bound to `param`.
    pub fn buffer_of(&self, param: &Var) -> Result<&Buffer> {
        self.buffer_map
            .iter()
            .find_map(|(var, buffer)| (var == param).then_some(buffer))
            .context(ParamBufferMissingSnafu { param: param.name().to_string() })
    }

    /// Buffers bound to the parameters, in parameter order.
    pub fn param_buffers(&self) -> Result<Vec<Buffer>> {
        self.params.iter().map(|param| self.buffer_of(param).cloned()).collect()
    }

    pub fn root_realize(&self) -> Result<&Arc<BlockRealize>> {
        self.body.as_block_realize().context(MissingRootBlockSnafu { func: self.name.clone() })
    }

    pub fn root_block(&self) -> Result<&Arc<Block>> {
        Ok(&self.root_realize()?.block)
    }

    /// Same function with a different body.
    pub fn with_body(&self, body: Stmt) -> Self {
        Self { name: self.name.clone(), params: self.params.clone(), buffer_map: self.buffer_map.clone(), body }
    }
}
