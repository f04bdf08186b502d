//! Verification verdicts.
//!
//! Every verification attempt terminates in exactly one verdict. Hashing,
//! search and proof failures are captured here rather than propagated, so a
//! batch run never aborts on one bad record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::BatchId;
use super::proof::MerkleProof;
use super::record::OperationKind;
use super::types::{option_digest_hex, Hash256};

/// Terminal outcome kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// Membership proof validated against the ledger-anchored root
    Verified,
    /// Record digest present but the proof does not reproduce the anchored
    /// root: evidence of alteration, distinct from mere absence
    Tampered,
    /// No candidate batch contains the record; a valid outcome, not an error
    NotFound,
    /// Several candidates tied at top relevance; caller should narrow the
    /// hint and retry
    Ambiguous,
    /// Collaborator failure, cancellation, or an unencodable record
    Error,
}

/// Structured outcome of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub outcome: VerdictKind,

    /// Batch the record was matched against, when one was singled out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,

    /// Canonical digest computed for the record, when encoding succeeded
    #[serde(default, with = "option_digest_hex", skip_serializing_if = "Option::is_none")]
    pub record_digest: Option<Hash256>,

    /// Ledger-anchored root the proof was checked against
    #[serde(default, with = "option_digest_hex", skip_serializing_if = "Option::is_none")]
    pub expected_root: Option<Hash256>,

    /// The validated proof, on `Verified` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<MerkleProof>,

    /// Candidate batches considered, in rank order (diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<BatchId>,

    /// Ledger timestamp of the matched batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<DateTime<Utc>>,

    /// Operation kind of the matched leaf, when the batch declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,

    /// Set when the candidate search hit its bounded-cost guard and may be
    /// incomplete
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub search_truncated: bool,

    /// Human-readable explanation of the outcome
    pub reason: String,

    /// Wall-clock time spent on this attempt
    pub elapsed_ms: u64,
}

impl VerificationVerdict {
    fn base(outcome: VerdictKind, reason: String) -> Self {
        Self {
            outcome,
            batch_id: None,
            record_digest: None,
            expected_root: None,
            proof: None,
            candidates: Vec::new(),
            anchored_at: None,
            operation: None,
            search_truncated: false,
            reason,
            elapsed_ms: 0,
        }
    }

    pub fn verified(
        digest: Hash256,
        batch_id: BatchId,
        expected_root: Hash256,
        proof: MerkleProof,
        anchored_at: DateTime<Utc>,
    ) -> Self {
        let mut v = Self::base(
            VerdictKind::Verified,
            format!("membership proof validated against batch {batch_id}"),
        );
        v.record_digest = Some(digest);
        v.batch_id = Some(batch_id);
        v.expected_root = Some(expected_root);
        v.proof = Some(proof);
        v.anchored_at = Some(anchored_at);
        v
    }

    pub fn tampered(
        digest: Hash256,
        batch_id: BatchId,
        expected_root: Hash256,
        reason: impl Into<String>,
    ) -> Self {
        let mut v = Self::base(VerdictKind::Tampered, reason.into());
        v.record_digest = Some(digest);
        v.batch_id = Some(batch_id);
        v.expected_root = Some(expected_root);
        v
    }

    pub fn not_found(digest: Hash256, reason: impl Into<String>) -> Self {
        let mut v = Self::base(VerdictKind::NotFound, reason.into());
        v.record_digest = Some(digest);
        v
    }

    pub fn ambiguous(digest: Hash256, tied: Vec<BatchId>, reason: impl Into<String>) -> Self {
        let mut v = Self::base(VerdictKind::Ambiguous, reason.into());
        v.record_digest = Some(digest);
        v.candidates = tied;
        v
    }

    pub fn failure(digest: Option<Hash256>, reason: impl Into<String>) -> Self {
        let mut v = Self::base(VerdictKind::Error, reason.into());
        v.record_digest = digest;
        v
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::base(VerdictKind::Error, format!("cancelled: {}", reason.into()))
    }

    pub fn with_candidates(mut self, candidates: Vec<BatchId>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_operation(mut self, operation: Option<OperationKind>) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_search_truncated(mut self, truncated: bool) -> Self {
        self.search_truncated = truncated;
        self
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn is_verified(&self) -> bool {
        self.outcome == VerdictKind::Verified
    }

    /// Whether the outcome reflects a cancellation deadline.
    pub fn is_cancelled(&self) -> bool {
        self.outcome == VerdictKind::Error && self.reason.starts_with("cancelled:")
    }
}
