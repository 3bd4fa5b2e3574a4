use thiserror::Error;

// Unified error type for distbench

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistError {
    #[error("unsupported process count {count}: no process grid is defined for it")]
    UnsupportedProcessCount { count: usize },
    #[error("global dimension {dim} of size {global} is not divisible by {parts} processes")]
    NonDivisiblePartition { dim: usize, global: usize, parts: usize },
    #[error("rank {rank} is outside a grid of {size} processes")]
    RankOutOfRange { rank: usize, size: usize },
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("missing kernel argument `{0}`")]
    MissingArgument(&'static str),
    #[error("unknown kernel `{0}`")]
    UnknownKernel(String),
    #[error("invalid sizes for {kernel}: {reason}")]
    InvalidSizes { kernel: &'static str, reason: String },
    #[error("communication error: {0}")]
    Communication(String),
}
