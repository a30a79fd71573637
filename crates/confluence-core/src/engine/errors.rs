//! Error types for agglomeration runs.

use thiserror::Error;

/// Errors that can occur while constructing or running an agglomeration.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// All public APIs return `Result<T, MergeError>` to avoid panics in library
/// code. Stale or deleted queue entries are *not* errors; they are expected
/// outcomes of the lazy queue discipline and are reported through the merge
/// visitor instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MergeError {
    /// An input array does not have the length implied by the volume shape.
    #[error("shape mismatch for {what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        /// Which input failed validation (e.g. "affinities", "segmentation").
        what: &'static str,
        /// Element count implied by the declared shape.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
    },

    /// A threshold parameter is outside its valid range or inconsistent.
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    /// An affinity value is NaN or infinite.
    #[error("non-finite affinity at linear index {index}")]
    NonFiniteAffinity {
        /// Linear index into the affinity array.
        index: usize,
    },

    /// A seed id in a pre-supplied segmentation or unmerge list exceeds the
    /// declared node range.
    #[error("seed id {id} out of range (max {max})")]
    SeedOutOfRange {
        /// The offending seed id.
        id: u64,
        /// Largest valid seed id.
        max: u64,
    },

    /// Internal engine error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
