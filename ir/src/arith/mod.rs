//! Integer arithmetic analysis over index expressions.
//!
//! - [`bound`] - constant interval bounds
//! - [`simplify`] - canonical linear simplification
//! - [`analyzer`] - [`Analyzer`], the context object most callers use
//! - [`int_set`] - symbolic intervals and variable relaxation
//! - [`iter_map`] - iteration marks, affine map detection and subspace division

pub mod analyzer;
pub mod bound;
pub mod int_set;
pub mod iter_map;
pub mod simplify;

pub use analyzer::Analyzer;
pub use bound::{ConstIntBound, const_int_bound};
pub use int_set::{IntSet, eval_set};
pub use iter_map::{
    IterMapExpr, IterMapLevel, IterMark, IterSplitExpr, IterSumExpr, MarkSource, detect_iter_map,
    normalize_iter_map_to_expr, subspace_divide,
};
