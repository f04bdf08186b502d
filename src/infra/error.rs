//! Error types for the verification engine.

use thiserror::Error;

/// Failures at the ledger/storage collaborator boundary.
///
/// The transient/permanent split drives the retry layer: timeouts and
/// connection failures are retried with backoff, everything else surfaces
/// immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Call exceeded its deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (reset, refused, DNS)
    #[error("connection failed: {0}")]
    Connection(String),

    /// The collaborator answered but the referenced object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator answered with something that does not parse
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Any other collaborator failure
    #[error("collaborator failure: {0}")]
    Other(String),
}

impl CollaboratorError {
    /// Whether a retry with backoff could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Timeout(_) | CollaboratorError::Connection(_))
    }
}

/// Errors surfaced to callers of the verification engine.
///
/// Hashing and proof mismatches are never errors: they terminate in a
/// [`crate::domain::VerificationVerdict`]. This enum covers request-shape
/// problems and collaborator failures only.
#[derive(Error, Debug)]
pub enum VerifierError {
    /// A hint field failed validation; never silently dropped
    #[error("invalid hint field `{field}`: {reason}")]
    InvalidHint { field: &'static str, reason: String },

    /// A value's type is outside the canonical encoding's supported set
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Collaborator failure that exhausted its retries
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Deadline or cancellation aborted the attempt
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Result type for verifier operations
pub type Result<T, E = VerifierError> = std::result::Result<T, E>;
