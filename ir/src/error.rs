use snafu::Snafu;
pub use snafu::{OptionExt, ResultExt};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Function parameter without a bound buffer.
    #[snafu(display("parameter '{param}' has no buffer in the buffer map"))]
    ParamBufferMissing { param: String },

    /// Function body is not a block realization.
    #[snafu(display("body of function '{func}' is not a root block realization"))]
    MissingRootBlock { func: String },

    /// Index dtype width with no signed integer type.
    #[snafu(display("no signed integer index type with {bits} bits"))]
    UnsupportedIndexBits { bits: u32 },

    /// Block realization binds a different number of values than the block declares.
    #[snafu(display("block '{block}' declares {expected} iteration variables but is bound to {actual} values"))]
    IterValueCountMismatch { block: String, expected: usize, actual: usize },

    /// Region rank differs from the buffer rank.
    #[snafu(display("region of buffer '{buffer}' has rank {actual}, buffer has rank {expected}"))]
    RegionRank { buffer: String, expected: usize, actual: usize },
}
