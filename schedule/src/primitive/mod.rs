//! Schedule primitives operating on a [`ScheduleState`](crate::state::ScheduleState).

pub mod blockize;
pub mod tensorize;

pub use blockize::{blockize, blockize_blocks, blockize_impl};
pub use tensorize::{TensorIntrin, TensorizeComparator, tensorize};
