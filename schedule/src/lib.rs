//! Blockize and tensorize schedule primitives for tessera.
//!
//! A [`Schedule`] owns a function under transformation. Primitives take
//! handles ([`NodeId`]) to loops and blocks, rebuild the affected subtree and
//! hand the result to [`ScheduleState::replace`], which keeps old handles
//! pointing at their successors.
//!
//! # Module Organization
//!
//! - [`state`] - program index, handle forwarding and per-block info
//! - [`primitive`] - blockize (single loop and block runs) and tensorize
//! - [`schedule`] - user-facing schedule over a state and a trace
//! - [`trace`] - recorded instructions, rendering and replay
//! - [`config`] - behavior switches
//! - [`error`] - error types and result handling

pub mod config;
pub mod error;
pub mod primitive;
pub mod schedule;
pub mod state;
pub mod trace;


pub use config::ScheduleConfig;
pub use error::{Result, ScheduleError};
pub use primitive::{TensorIntrin, TensorizeComparator};
pub use schedule::{Schedule, Target};
pub use state::{BlockInfo, BlockReuse, ScheduleState, StmtSRef};
pub use trace::{Instruction, Trace};

pub use tessera_ir::NodeId;
