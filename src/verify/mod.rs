//! Single-transaction verification.
//!
//! Runs the one-directional flow: resolve hints, search candidates, check for
//! top-relevance ties, fetch batch contents, locate the leaf, verify the
//! membership proof against the ledger-anchored root. Every path terminates
//! in a verdict; collaborator failures and deadlines are captured, never
//! thrown past this module.

pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use crate::crypto::{record_digest, verify_inclusion};
use crate::domain::{BatchId, TransactionRecord, VerificationVerdict};
use crate::infra::{Result, RetryPolicy, StorageClient};
use crate::search::{BatchSearch, RecordContext, ResolvedConstraint, VerificationHint};

pub use orchestrator::{BatchVerificationReport, BatchVerifier, VerifyRequest};

/// Verifies one transaction record against the anchored batch population.
pub struct TransactionVerifier {
    search: Arc<BatchSearch>,
    storage: Arc<dyn StorageClient>,
    storage_retry: RetryPolicy,
    /// Score distance within which top candidates count as tied
    tie_margin: f64,
    /// Deadline for a single verification attempt
    timeout: Duration,
}

impl TransactionVerifier {
    pub fn new(
        search: Arc<BatchSearch>,
        storage: Arc<dyn StorageClient>,
        storage_retry: RetryPolicy,
        tie_margin: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            search,
            storage,
            storage_retry,
            tie_margin,
            timeout,
        }
    }

    /// Resolve the hint and verify under the configured deadline.
    ///
    /// `Err` is returned only for request-shape problems (an invalid hint);
    /// everything after resolution terminates in a verdict, including the
    /// deadline itself.
    pub async fn verify(
        &self,
        record: &TransactionRecord,
        hint: Option<&VerificationHint>,
    ) -> Result<VerificationVerdict> {
        let constraint = match hint {
            Some(hint) => ResolvedConstraint::resolve(hint)?,
            None => ResolvedConstraint::default(),
        };

        match tokio::time::timeout(self.timeout, self.verify_resolved(record, &constraint)).await {
            Ok(verdict) => Ok(verdict),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "verification aborted at deadline"
                );
                Ok(VerificationVerdict::cancelled(format!(
                    "verification deadline of {}ms exceeded",
                    self.timeout.as_millis()
                ))
                .with_elapsed(self.timeout))
            }
        }
    }

    /// Verify under an already-resolved constraint. Infallible by
    /// construction: every outcome is a verdict.
    pub async fn verify_resolved(
        &self,
        record: &TransactionRecord,
        constraint: &ResolvedConstraint,
    ) -> VerificationVerdict {
        let started = std::time::Instant::now();

        let digest = match record_digest(record) {
            Ok(digest) => digest,
            Err(e) => {
                return VerificationVerdict::failure(None, format!("record not encodable: {e}"))
                    .with_elapsed(started.elapsed());
            }
        };

        tracing::debug!(
            digest = %hex::encode(digest),
            table = %record.table,
            "hints resolved, searching candidate batches"
        );

        let target = RecordContext::of(record);
        let outcome = match self.search.search(constraint, Some(&target)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return VerificationVerdict::failure(
                    Some(digest),
                    format!("candidate search failed: {e}"),
                )
                .with_elapsed(started.elapsed());
            }
        };
        let candidate_ids = outcome.candidate_ids();

        if outcome.candidates.is_empty() {
            let reason = match &constraint.batch_id {
                Some(id) => format!("hinted batch {id} is not anchored on the ledger"),
                None => "no candidate batches matched the search constraint".to_string(),
            };
            return VerificationVerdict::not_found(digest, reason)
                .with_search_truncated(outcome.truncated)
                .with_elapsed(started.elapsed());
        }

        // Tie detection happens before any contents are fetched: a caller
        // that cannot be pointed at one batch should narrow the hint rather
        // than trust whichever batch happened to win a coin toss.
        if constraint.batch_id.is_none() && outcome.candidates.len() > 1 {
            let top = outcome.candidates[0].score;
            let tied: Vec<BatchId> = outcome
                .candidates
                .iter()
                .take_while(|c| (top - c.score) <= self.tie_margin)
                .map(|c| c.descriptor.batch_id.clone())
                .collect();
            if tied.len() > 1 {
                let reason = format!(
                    "{} candidate batches tied at top relevance; supply a narrower hint (e.g. batch_id or time range)",
                    tied.len()
                );
                return VerificationVerdict::ambiguous(digest, tied, reason)
                    .with_search_truncated(outcome.truncated)
                    .with_elapsed(started.elapsed());
            }
        }

        for candidate in &outcome.candidates {
            let descriptor = &candidate.descriptor;
            tracing::debug!(
                batch_id = %descriptor.batch_id,
                score = candidate.score,
                "fetching batch contents for candidate"
            );

            let contents = match self
                .storage_retry
                .run_transient("storage.fetch_batch_contents", || {
                    self.storage.fetch_batch_contents(&descriptor.storage)
                })
                .await
            {
                Ok(contents) => contents,
                Err(e) => {
                    return VerificationVerdict::failure(
                        Some(digest),
                        format!("batch contents fetch failed for {}: {e}", descriptor.batch_id),
                    )
                    .with_candidates(candidate_ids)
                    .with_search_truncated(outcome.truncated)
                    .with_elapsed(started.elapsed());
                }
            };

            let Some(index) = contents.find_leaf(&digest, constraint.expected_operation) else {
                // Absence from this batch is not evidence of tampering; the
                // record may legitimately live in a later candidate.
                continue;
            };
            let leaf_operation = contents.leaves[index].operation;

            let Some(proof) = contents.proof_for(index) else {
                tracing::warn!(
                    batch_id = %descriptor.batch_id,
                    leaf_index = index,
                    "leaf present but batch contents carry no proof for it"
                );
                return VerificationVerdict::tampered(
                    digest,
                    descriptor.batch_id.clone(),
                    descriptor.merkle_root,
                    format!(
                        "leaf {index} of batch {} has no membership proof in the stored contents",
                        descriptor.batch_id
                    ),
                )
                .with_operation(leaf_operation)
                .with_candidates(candidate_ids)
                .with_search_truncated(outcome.truncated)
                .with_elapsed(started.elapsed());
            };

            return if verify_inclusion(&digest, proof, &descriptor.merkle_root) {
                tracing::info!(
                    batch_id = %descriptor.batch_id,
                    leaf_index = index,
                    "membership proof validated against anchored root"
                );
                VerificationVerdict::verified(
                    digest,
                    descriptor.batch_id.clone(),
                    descriptor.merkle_root,
                    proof.clone(),
                    descriptor.created_at,
                )
                .with_operation(leaf_operation)
                .with_candidates(candidate_ids)
                .with_search_truncated(outcome.truncated)
                .with_elapsed(started.elapsed())
            } else {
                tracing::warn!(
                    batch_id = %descriptor.batch_id,
                    leaf_index = index,
                    "proof does not reproduce the anchored root"
                );
                VerificationVerdict::tampered(
                    digest,
                    descriptor.batch_id.clone(),
                    descriptor.merkle_root,
                    format!(
                        "recomputed root does not match the anchored root of batch {}",
                        descriptor.batch_id
                    ),
                )
                .with_operation(leaf_operation)
                .with_candidates(candidate_ids)
                .with_search_truncated(outcome.truncated)
                .with_elapsed(started.elapsed())
            };
        }

        VerificationVerdict::not_found(
            digest,
            format!(
                "record digest not present in any of {} candidate batch(es)",
                outcome.candidates.len()
            ),
        )
        .with_candidates(candidate_ids)
        .with_search_truncated(outcome.truncated)
        .with_elapsed(started.elapsed())
    }
}
