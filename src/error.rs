use thiserror::Error;

/// Errors surfaced by tree construction and insertion.
///
/// Only caller mistakes are represented here. Structural damage the
/// tree cannot recover from (an unresolvable overflow, a broken leaf
/// chain) is a defect in this crate and panics instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A construction parameter was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A point's length differs from previously inserted points.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
