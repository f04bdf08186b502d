//! Batch descriptors and batch contents.
//!
//! A batch is an immutable, ledger-anchored group of transaction records under
//! one Merkle root. The descriptor is what the ledger index returns; the full
//! contents (leaves and proofs) live in object storage and are fetched only
//! when a candidate batch must actually be checked.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::proof::MerkleProof;
use super::record::OperationKind;
use super::types::{digest_hex, Hash256};
use crate::infra::VerifierError;

/// Batch identifier: `BATCH-YYYY-MM-DD-<suffix>`.
///
/// Lexicographic order follows creation date, which the search layer relies on
/// for recency ordering without extra index round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub const PREFIX: &'static str = "BATCH-";

    /// Validate and wrap a batch identifier.
    pub fn parse(s: &str) -> Result<Self, VerifierError> {
        let invalid = |reason: String| VerifierError::InvalidHint {
            field: "batch_id",
            reason,
        };

        if !s.is_ascii() {
            return Err(invalid(format!("`{s}` contains non-ASCII characters")));
        }
        let rest = s.strip_prefix(Self::PREFIX).ok_or_else(|| {
            invalid(format!("`{s}` does not start with `{}`", Self::PREFIX))
        })?;
        if rest.len() < 12 || rest.as_bytes().get(10) != Some(&b'-') {
            return Err(invalid(format!(
                "`{s}` is not of the form BATCH-YYYY-MM-DD-<suffix>"
            )));
        }
        let (date_part, suffix) = (&rest[..10], &rest[11..]);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| invalid(format!("`{s}` embeds an invalid date `{date_part}`")))?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid(format!(
                "`{s}` has an empty or non-alphanumeric suffix"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation date embedded in the identifier.
    pub fn embedded_date(&self) -> NaiveDate {
        // Shape was validated at construction.
        NaiveDate::parse_from_str(&self.0[Self::PREFIX.len()..Self::PREFIX.len() + 10], "%Y-%m-%d")
            .unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BatchId {
    type Err = VerifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Half-open UTC time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, VerifierError> {
        if start >= end {
            return Err(VerifierError::InvalidHint {
                field: "time_range",
                reason: format!("start `{start}` is not before end `{end}`"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Per-operation transaction counts declared in the batch metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub inserts: u32,
    pub updates: u32,
    pub deletes: u32,
}

impl OperationCounts {
    pub fn count_for(&self, op: OperationKind) -> u32 {
        match op {
            OperationKind::Insert => self.inserts,
            OperationKind::Update => self.updates,
            OperationKind::Delete => self.deletes,
        }
    }

    pub fn total(&self) -> u32 {
        self.inserts + self.updates + self.deletes
    }
}

/// Opaque locator for a batch's full contents in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Batch metadata as anchored on the ledger.
///
/// Immutable after anchoring. The `merkle_root` read from the ledger is the
/// trust anchor: it is never recomputed from anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub batch_id: BatchId,

    #[serde(with = "digest_hex")]
    pub merkle_root: Hash256,

    /// Ledger-assigned creation timestamp (authoritative)
    pub created_at: DateTime<Utc>,

    pub database: String,
    pub table: String,

    pub transaction_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_counts: Option<OperationCounts>,

    pub storage: StorageRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// One leaf of a batch's Merkle tree: the record digest plus the operation
/// that produced it. The operation tag is what lets an `expected_operation`
/// hint tell an INSERT apart from a DELETE of identical column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLeaf {
    #[serde(with = "digest_hex")]
    pub digest: Hash256,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,
}

/// Full batch contents fetched from object storage: leaves and their
/// inclusion proofs, aligned by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchContents {
    pub leaves: Vec<BatchLeaf>,
    pub proofs: Vec<MerkleProof>,
}

impl BatchContents {
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Proof for the leaf at `index`, if the contents carry one.
    pub fn proof_for(&self, index: usize) -> Option<&MerkleProof> {
        self.proofs.get(index)
    }

    /// Index of the first leaf matching `digest`, optionally narrowed by an
    /// expected operation. A leaf with no declared operation matches any
    /// expectation.
    pub fn find_leaf(&self, digest: &Hash256, expected: Option<OperationKind>) -> Option<usize> {
        self.leaves.iter().position(|leaf| {
            if leaf.digest != *digest {
                return false;
            }
            match (expected, leaf.operation) {
                (Some(want), Some(have)) => want == have,
                _ => true,
            }
        })
    }
}
