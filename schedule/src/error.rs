use snafu::Snafu;
use tessera_ir::NodeId;

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum ScheduleError {
    // ------------------------------------------------------------------
    // Structural
    // ------------------------------------------------------------------
    #[snafu(display("loop {loop_id} must have exactly one child block, found {count}"))]
    NotSingleChildBlock { loop_id: NodeId, count: usize },

    #[snafu(display("target blocks are not consecutive: block '{block_name}' ({block}) is separated from the others"))]
    TargetsNotConsecutive { block: NodeId, block_name: String },

    #[snafu(display("target blocks must not be nested with each other (common ancestor {lca})"))]
    TargetsNested { lca: NodeId },

    #[snafu(display("no target blocks given"))]
    EmptyTargets,

    #[snafu(display("{op} expects a {expected} at {node}, found a {found}"))]
    WrongTargetKind { op: &'static str, node: NodeId, expected: &'static str, found: &'static str },

    #[snafu(display(
        "the bindings of block '{block_name}' ({block}) cannot be divided at loop {loop_id} into an outer and an inner iteration"
    ))]
    SubspaceNotDivisible { block: NodeId, block_name: String, loop_id: NodeId },

    // ------------------------------------------------------------------
    // Tensorize
    // ------------------------------------------------------------------
    #[snafu(display("tensorize mismatch ({reason}): program `{lhs}` does not match description `{rhs}`"))]
    TensorizeMismatch { reason: &'static str, lhs: String, rhs: String },

    #[snafu(display("tensor intrinsic '{name}' is not registered"))]
    IntrinNotFound { name: String },

    #[snafu(display("tensor intrinsic '{name}' is already registered"))]
    IntrinAlreadyRegistered { name: String },

    #[snafu(display("intrinsic description has {desc} parameters but the implementation has {implementation}"))]
    IntrinParamCountMismatch { desc: usize, implementation: usize },

    #[snafu(display("buffer '{buffer}' has no matching {what}"))]
    MissingBufferBinding { buffer: String, what: &'static str },

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------
    #[snafu(display("index dtype of block '{block}' has {bits} bits; no region carries an integer index"))]
    IndexBitsNotPositive { block: String, bits: u32 },

    #[snafu(display("region of buffer '{buffer}' has {actual} dimensions, expected {expected}"))]
    RegionRankMismatch { buffer: String, expected: usize, actual: usize },

    #[snafu(display(
        "block '{block_name}' ({block}) has an init statement; reduction iteration variables are not allowed in the outer block"
    ))]
    OuterReductionInMultiBlock { block: NodeId, block_name: String },

    #[snafu(display("extent of '{var}' is {actual}, which cannot be proven equal to {expected}"))]
    IterExtentMismatch { var: String, expected: String, actual: String },

    #[snafu(display("outer binding of '{var}' is {actual}, which cannot be proven equal to {expected}"))]
    IterBindingMismatch { var: String, expected: String, actual: String },

    // ------------------------------------------------------------------
    // Host state
    // ------------------------------------------------------------------
    #[snafu(display("node {node} is no longer part of the program"))]
    StaleSRef { node: NodeId },

    #[snafu(display("no {kind} named '{name}'"))]
    NodeNotFound { kind: &'static str, name: String },

    #[snafu(display("{count} blocks are named '{name}'"))]
    AmbiguousName { name: String, count: usize },

    #[snafu(display("IR error: {source}"))]
    Ir { source: tessera_ir::Error },
}

impl ScheduleError {
    /// Program nodes the error points at.
    pub fn locations(&self) -> Vec<NodeId> {
        match self {
            Self::NotSingleChildBlock { loop_id, .. } => vec![*loop_id],
            Self::TargetsNotConsecutive { block, .. } | Self::OuterReductionInMultiBlock { block, .. } => vec![*block],
            Self::TargetsNested { lca } => vec![*lca],
            Self::WrongTargetKind { node, .. } | Self::StaleSRef { node } => vec![*node],
            Self::SubspaceNotDivisible { block, loop_id, .. } => vec![*block, *loop_id],
            _ => Vec::new(),
        }
    }
}
