//! Blockize: wrap a loop subtree or a run of sibling blocks into a new
//! outer block.
//!
//! - [`single`] - one loop and the single block under it, split into an
//!   outer and an inner iteration space
//! - [`multi`] - consecutive sibling blocks under their common ancestor
//! - [`divide`] - subspace division of block bindings at a loop
//! - [`binding`] - outer and inner iteration variables from a division
//! - [`region`] - read and write regions of the new blocks

pub mod binding;
pub mod divide;
pub mod multi;
pub mod region;
pub mod rewrite;
pub mod single;

pub use multi::blockize_blocks;
pub use single::{blockize, blockize_impl};
