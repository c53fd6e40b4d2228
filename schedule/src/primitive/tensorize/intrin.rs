//! Process-wide registry of tensor intrinsics.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use snafu::{OptionExt, ensure};
use tessera_ir::PrimFunc;
use tracing::debug;

use crate::error::*;

/// A computation pattern (`desc`) paired with the function that replaces
/// it (`implementation`). Both take the same number of buffer parameters,
/// matched by position.
#[derive(Debug, Clone)]
pub struct TensorIntrin {
    pub desc: PrimFunc,
    pub implementation: PrimFunc,
}

/// Lookups take the read lock; only registration writes.
static REGISTRY: Lazy<RwLock<HashMap<String, Arc<TensorIntrin>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

impl TensorIntrin {
    pub fn new(desc: PrimFunc, implementation: PrimFunc) -> Result<Self> {
        ensure!(
            desc.params.len() == implementation.params.len(),
            IntrinParamCountMismatchSnafu { desc: desc.params.len(), implementation: implementation.params.len() }
        );
        Ok(Self { desc, implementation })
    }

    /// Register an intrinsic under `name`. An existing entry is replaced only
    /// with `override_existing`.
    pub fn register(
        name: impl Into<String>,
        desc: PrimFunc,
        implementation: PrimFunc,
        override_existing: bool,
    ) -> Result<()> {
        let name = name.into();
        let intrin = Self::new(desc, implementation)?;
        let mut registry = REGISTRY.write();
        ensure!(override_existing || !registry.contains_key(&name), IntrinAlreadyRegisteredSnafu { name });
        debug!(name = %name, override_existing, "registered tensor intrinsic");
        registry.insert(name, Arc::new(intrin));
        Ok(())
    }

    pub fn get(name: &str) -> Result<Arc<TensorIntrin>> {
        REGISTRY.read().get(name).cloned().context(IntrinNotFoundSnafu { name })
    }

    /// Names of every registered intrinsic, sorted.
    pub fn names() -> Vec<String> {
        let mut names: Vec<String> = REGISTRY.read().keys().cloned().collect();
        names.sort();
        names
    }
}
