//! User-facing schedule: a [`ScheduleState`] plus the trace of the
//! primitives applied to it.
//!
//! ```rust,ignore
//! let mut sch = Schedule::new(func)?;
//! let block = sch.get_block("C")?;
//! let loops = sch.get_loops(block)?;
//! let outer = sch.blockize(Target::Loop(loops[1]))?;
//! sch.tensorize_with().target(Target::Block(outer)).intrin("mma_4x4").call()?;
//! ```

use bon::bon;
use snafu::OptionExt;
use tessera_ir::{NodeId, PrimFunc};
use tracing::debug;

use crate::config::ScheduleConfig;
use crate::error::*;
use crate::primitive;
use crate::state::ScheduleState;
use crate::trace::{Instruction, Trace};

/// What a primitive applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Loop(NodeId),
    Block(NodeId),
    BlockList(Vec<NodeId>),
}

impl Target {
    /// Every node id the target names.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Loop(id) | Self::Block(id) => vec![*id],
            Self::BlockList(ids) => ids.clone(),
        }
    }

    /// Same kind of target over other ids, in order.
    pub fn with_nodes(&self, mut ids: impl Iterator<Item = NodeId>) -> Self {
        match self {
            Self::Loop(id) => Self::Loop(ids.next().unwrap_or(*id)),
            Self::Block(id) => Self::Block(ids.next().unwrap_or(*id)),
            Self::BlockList(list) => Self::BlockList(list.iter().map(|id| ids.next().unwrap_or(*id)).collect()),
        }
    }
}

impl From<Vec<NodeId>> for Target {
    fn from(ids: Vec<NodeId>) -> Self {
        Self::BlockList(ids)
    }
}

impl From<&[NodeId]> for Target {
    fn from(ids: &[NodeId]) -> Self {
        Self::BlockList(ids.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    state: ScheduleState,
    trace: Trace,
    config: ScheduleConfig,
}

#[bon]
impl Schedule {
    /// Schedule over `func` with the configuration from the environment.
    pub fn new(func: PrimFunc) -> Result<Self> {
        Self::with_config(func, ScheduleConfig::from_env())
    }

    pub fn with_config(func: PrimFunc, config: ScheduleConfig) -> Result<Self> {
        let state = ScheduleState::new(func, &config)?;
        Ok(Self { state, trace: Trace::default(), config })
    }

    /// The current program.
    pub fn mod_(&self) -> &PrimFunc {
        self.state.func()
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    fn record(&mut self, instruction: Instruction) {
        if self.config.record_trace {
            self.trace.push(instruction);
        }
    }

    /// The unique block named `name`.
    pub fn get_block(&mut self, name: &str) -> Result<NodeId> {
        let found = self.state.find_blocks(name);
        let block = match found.as_slice() {
            [block] => *block,
            [] => return NodeNotFoundSnafu { kind: "block", name }.fail(),
            _ => return AmbiguousNameSnafu { name, count: found.len() }.fail(),
        };
        self.record(Instruction::GetBlock { name: name.to_string(), output: block });
        Ok(block)
    }

    /// Loops above `block` up to its scope root, outermost first.
    pub fn get_loops(&mut self, block: NodeId) -> Result<Vec<NodeId>> {
        let block = self.state.resolve(block)?;
        self.state.get_block_realize(block)?;
        let loops = self.state.get_loops(block)?;
        self.record(Instruction::GetLoops { block, outputs: loops.clone() });
        Ok(loops)
    }

    /// Blockize `target` with the configured `preserve_unit_iters`.
    pub fn blockize(&mut self, target: impl Into<Target>) -> Result<NodeId> {
        let preserve_unit_iters = self.config.preserve_unit_iters;
        self.blockize_with().target(target.into()).preserve_unit_iters(preserve_unit_iters).call()
    }

    /// Blockize a loop, a block or a run of consecutive sibling blocks and
    /// return the new outer block.
    #[builder]
    pub fn blockize_with(&mut self, #[builder(into)] target: Target, preserve_unit_iters: Option<bool>) -> Result<NodeId> {
        let preserve_unit_iters = preserve_unit_iters.unwrap_or(self.config.preserve_unit_iters);
        let block = match &target {
            Target::Loop(id) => primitive::blockize(&mut self.state, *id, preserve_unit_iters)?,
            Target::Block(id) => primitive::blockize_blocks(&mut self.state, &[*id], preserve_unit_iters)?,
            Target::BlockList(ids) => primitive::blockize_blocks(&mut self.state, ids, preserve_unit_iters)?,
        };
        debug!(block = %block, "schedule blockize");
        self.record(Instruction::Blockize { target, preserve_unit_iters, output: block });
        Ok(block)
    }

    /// Tensorize `target` with the configured `preserve_unit_iters`.
    pub fn tensorize(&mut self, target: impl Into<Target>, intrin: &str) -> Result<()> {
        let preserve_unit_iters = self.config.preserve_unit_iters;
        self.tensorize_with().target(target.into()).intrin(intrin).preserve_unit_iters(preserve_unit_iters).call()
    }

    /// Replace a loop or a block with the intrinsic registered as `intrin`.
    #[builder]
    pub fn tensorize_with(
        &mut self,
        #[builder(into)] target: Target,
        intrin: &str,
        preserve_unit_iters: Option<bool>,
    ) -> Result<()> {
        let preserve_unit_iters = preserve_unit_iters.unwrap_or(self.config.preserve_unit_iters);
        let node = match &target {
            Target::Loop(id) => {
                self.state.get_for(self.state.resolve(*id)?)?;
                *id
            }
            Target::Block(id) => {
                self.state.get_block_realize(self.state.resolve(*id)?)?;
                *id
            }
            Target::BlockList(ids) => {
                let node = ids.first().copied().context(EmptyTargetsSnafu)?;
                return WrongTargetKindSnafu { op: "tensorize", node, expected: "loop or block", found: "block list" }
                    .fail();
            }
        };
        primitive::tensorize(&mut self.state, node, intrin, preserve_unit_iters)?;
        self.record(Instruction::Tensorize { target, intrin: intrin.to_string(), preserve_unit_iters });
        Ok(())
    }
}
