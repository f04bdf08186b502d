//! Core domain types: transaction records, batch metadata, proofs, verdicts.

pub mod batch;
pub mod proof;
pub mod record;
pub mod types;
pub mod verdict;

pub use batch::{
    BatchContents, BatchDescriptor, BatchId, BatchLeaf, OperationCounts, StorageRef, TimeRange,
};
pub use proof::{MerkleProof, ProofStep, SiblingSide};
pub use record::{ColumnValue, OperationKind, TransactionRecord};
pub use types::{digest_from_hex, digest_hex, option_digest_hex, Hash256};
pub use verdict::{VerdictKind, VerificationVerdict};
