//! Error types for vecquant.

use thiserror::Error;

/// Errors that can occur while training, encoding, indexing or searching.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VecError {
    /// Input dimension differs from the configured one.
    ///
    /// For batch inputs (`&[f32]` holding several rows) `actual` is the length of
    /// the trailing partial row.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Inference was attempted before training.
    #[error("{0} is not trained")]
    NotTrained(&'static str),

    /// A configuration constraint between dimensions is violated.
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    /// The operation is deliberately absent on this index variant.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Id out of bounds.
    #[error("id {id} out of range (ntotal = {ntotal})")]
    OutOfRange { id: usize, ntotal: usize },

    /// Malformed index descriptor.
    #[error("could not parse index descriptor: {0}")]
    DescriptorParse(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl VecError {
    /// `UnsupportedOperation` for `op` on the variant named `variant`.
    pub(crate) fn unsupported(op: &str, variant: &str) -> Self {
        Self::UnsupportedOperation(format!("{op} not implemented for {variant}"))
    }
}

pub type Result<T> = std::result::Result<T, VecError>;
