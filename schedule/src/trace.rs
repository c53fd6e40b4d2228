//! Record of the primitives applied by a [`Schedule`].
//!
//! Every handle a trace mentions is the output of an earlier instruction, so
//! a trace renders as a self-contained script and replays onto a fresh
//! schedule over the same function.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use tessera_ir::NodeId;
use tracing::debug;

use crate::error::*;
use crate::schedule::{Schedule, Target};

#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Instruction {
    GetBlock { name: String, output: NodeId },
    GetLoops { block: NodeId, outputs: Vec<NodeId> },
    Blockize { target: Target, preserve_unit_iters: bool, output: NodeId },
    Tensorize { target: Target, intrin: String, preserve_unit_iters: bool },
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Handles this instruction produces, with their rendering prefix.
    fn outputs(&self) -> Vec<(NodeId, char)> {
        match self {
            Self::GetBlock { output, .. } | Self::Blockize { output, .. } => vec![(*output, 'b')],
            Self::GetLoops { outputs, .. } => outputs.iter().map(|id| (*id, 'l')).collect(),
            Self::Tensorize { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    instructions: Vec<Instruction>,
}

impl Trace {
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Apply every instruction to `sch`, translating recorded handles to the
    /// ones `sch` produces.
    #[tracing::instrument(skip_all, fields(instructions = self.instructions.len()))]
    pub fn apply_to(&self, sch: &mut Schedule) -> Result<()> {
        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        let translate = |map: &HashMap<NodeId, NodeId>, id: NodeId| map.get(&id).copied().unwrap_or(id);

        for instruction in &self.instructions {
            debug!(instruction = instruction.name(), "replay");
            match instruction {
                Instruction::GetBlock { name, output } => {
                    let block = sch.get_block(name)?;
                    map.insert(*output, block);
                }
                Instruction::GetLoops { block, outputs } => {
                    let loops = sch.get_loops(translate(&map, *block))?;
                    map.extend(outputs.iter().copied().zip(loops));
                }
                Instruction::Blockize { target, preserve_unit_iters, output } => {
                    let target = target.with_nodes(target.nodes().into_iter().map(|id| translate(&map, id)));
                    let block = sch.blockize_with().target(target).preserve_unit_iters(*preserve_unit_iters).call()?;
                    map.insert(*output, block);
                }
                Instruction::Tensorize { target, intrin, preserve_unit_iters } => {
                    let target = target.with_nodes(target.nodes().into_iter().map(|id| translate(&map, id)));
                    sch.tensorize_with()
                        .target(target)
                        .intrin(intrin)
                        .preserve_unit_iters(*preserve_unit_iters)
                        .call()?;
                }
            }
        }
        Ok(())
    }
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

struct Names(HashMap<NodeId, String>);

impl Names {
    fn get(&self, id: NodeId) -> String {
        self.0.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn target(&self, target: &Target) -> String {
        match target {
            Target::Loop(id) | Target::Block(id) => self.get(*id),
            Target::BlockList(ids) => {
                let names: Vec<String> = ids.iter().map(|id| self.get(*id)).collect();
                format!("[{}]", names.join(", "))
            }
        }
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names = Names(HashMap::new());
        let mut counter = 0usize;
        for instruction in &self.instructions {
            let call = match instruction {
                Instruction::GetBlock { name, .. } => format!("sch.get_block(name={name:?})"),
                Instruction::GetLoops { block, .. } => format!("sch.get_loops(block={})", names.get(*block)),
                Instruction::Blockize { target, preserve_unit_iters, .. } => format!(
                    "sch.blockize(target={}, preserve_unit_iters={})",
                    names.target(target),
                    py_bool(*preserve_unit_iters)
                ),
                Instruction::Tensorize { target, intrin, preserve_unit_iters } => format!(
                    "sch.tensorize(block_or_loop={}, tensor_intrin={intrin:?}, preserve_unit_iters={})",
                    names.target(target),
                    py_bool(*preserve_unit_iters)
                ),
            };

            let outputs: Vec<String> = instruction
                .outputs()
                .into_iter()
                .map(|(id, prefix)| {
                    let name = format!("{prefix}{counter}");
                    counter += 1;
                    names.0.insert(id, name.clone());
                    name
                })
                .collect();
            match (instruction, outputs.as_slice()) {
                (_, []) => writeln!(f, "{call}")?,
                (Instruction::GetLoops { .. }, [single]) => writeln!(f, "{single}, = {call}")?,
                _ => writeln!(f, "{} = {call}", outputs.join(", "))?,
            }
        }
        Ok(())
    }
}
