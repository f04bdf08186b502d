//! Collaborator boundary traits.
//!
//! The engine consumes two read-only collaborators: the ledger (batch index
//! and anchored descriptors) and object storage (full batch contents). Both
//! may fail transiently; neither is implemented here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::domain::{BatchContents, BatchDescriptor, BatchId, StorageRef};

use super::error::CollaboratorError;

/// Filter for ledger batch-index queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchIndexFilter {
    pub database: Option<String>,
    pub table: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound, pairing with `created_after` as `[after, before)`
    pub created_before: Option<DateTime<Utc>>,
    /// Cap on returned descriptors; the most recent win
    pub limit: Option<usize>,
}

/// Read-only view of the ledger's batch index.
///
/// Invariant: a descriptor's Merkle root never changes for a given batch
/// identifier once anchored; whatever this trait returns is authoritative.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Query the batch index. Results are ordered by creation timestamp
    /// descending (ties broken by batch id descending) and truncated to
    /// `filter.limit` when set.
    async fn query_batch_index(
        &self,
        filter: &BatchIndexFilter,
    ) -> Result<Vec<BatchDescriptor>, CollaboratorError>;

    /// Fetch one anchored descriptor by identifier. `Ok(None)` means the
    /// ledger has no such batch, which is not a failure.
    async fn get_batch(
        &self,
        batch_id: &BatchId,
    ) -> Result<Option<BatchDescriptor>, CollaboratorError>;
}

/// Read-only view of batch contents in object storage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetch the leaves and proofs a storage reference points at.
    async fn fetch_batch_contents(
        &self,
        storage: &StorageRef,
    ) -> Result<BatchContents, CollaboratorError>;
}
