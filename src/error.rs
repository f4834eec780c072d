//! Error type shared by every stage of the analysis pipeline.
//!
//! Only boundary problems are errors: bad parameters, inconsistent
//! vectors, a failing embedding provider or clustering backend.
//! Degraded inputs (empty text, tiny datasets) and the density ->
//! partition fallback are handled inside the pipeline and reported
//! through `RunMetadata` instead.

/// Errors produced by the analysis pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A parameter is outside its accepted range.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name as exposed on the control surface.
        name: &'static str,
        /// Offending value, rendered for the message.
        value: String,
        /// Accepted range or rule.
        reason: &'static str,
    },

    /// Vectors of inconsistent dimensionality reached the core.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension of the first vector / the provider.
        expected: usize,
        /// Dimension actually received.
        got: usize,
    },

    /// Two records share the same identifier.
    #[error("duplicate item id: {0}")]
    DuplicateItemId(String),

    /// The embedding provider failed or returned malformed output.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The clustering backend failed.
    #[error("clustering failed: {0}")]
    Clustering(String),

    /// Payload or parameter (de)serialisation failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: &'static str,
    ) -> Self {
        GraphError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
