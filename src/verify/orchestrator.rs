//! Parallel batch verification.
//!
//! Fans a collection of records out to independent verifier runs under a
//! bounded worker pool. Results land in pre-sized, index-addressed slots, so
//! output order equals input order no matter how completion interleaves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::{TransactionRecord, VerdictKind, VerificationVerdict};
use crate::search::VerificationHint;

use super::TransactionVerifier;

/// One record to verify, with its own optional hint.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub record: TransactionRecord,
    pub hint: Option<VerificationHint>,
}

impl VerifyRequest {
    pub fn new(record: TransactionRecord) -> Self {
        Self { record, hint: None }
    }

    pub fn with_hint(mut self, hint: VerificationHint) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone)]
pub struct BatchVerificationReport {
    pub total: usize,
    pub verified: usize,
    pub failed: usize,
    pub results: Vec<VerificationVerdict>,
    pub elapsed_ms: u64,
}

impl BatchVerificationReport {
    pub fn from_verdicts(results: Vec<VerificationVerdict>, elapsed: Duration) -> Self {
        let total = results.len();
        let verified = results.iter().filter(|v| v.is_verified()).count();
        Self {
            total,
            verified,
            failed: total - verified,
            results,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.verified as f64 / self.total as f64
    }
}

/// Bounded-concurrency fan-out over a [`TransactionVerifier`].
pub struct BatchVerifier {
    verifier: Arc<TransactionVerifier>,
    max_concurrency: usize,
    /// Overall deadline for the whole batch; pending entries are marked
    /// cancelled when it expires
    overall_timeout: Option<Duration>,
}

impl BatchVerifier {
    pub fn new(
        verifier: Arc<TransactionVerifier>,
        max_concurrency: usize,
        overall_timeout: Option<Duration>,
    ) -> Self {
        Self {
            verifier,
            max_concurrency: max_concurrency.max(1),
            overall_timeout,
        }
    }

    /// Verify every request, returning verdicts in input order.
    ///
    /// One record's failure never aborts the others: request-shape errors and
    /// collaborator failures are captured into that record's slot. On overall
    /// deadline expiry, completed verdicts are kept and still-pending slots
    /// become cancelled `Error` verdicts.
    pub async fn verify_many(&self, requests: Vec<VerifyRequest>) -> Vec<VerificationVerdict> {
        let started = std::time::Instant::now();
        let total = requests.len();
        let mut slots: Vec<Option<VerificationVerdict>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<(usize, VerificationVerdict)> = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let verifier = self.verifier.clone();
            tasks.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    return (index, VerificationVerdict::cancelled("worker pool shut down"));
                }
                let verdict = match verifier
                    .verify(&request.record, request.hint.as_ref())
                    .await
                {
                    Ok(verdict) => verdict,
                    Err(e) => VerificationVerdict::failure(None, e.to_string()),
                };
                (index, verdict)
            });
        }

        let deadline = self.overall_timeout;
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((index, verdict)) = joined {
                    slots[index] = Some(verdict);
                }
            }
        };

        match deadline {
            Some(limit) => {
                if tokio::time::timeout(limit, collect).await.is_err() {
                    tracing::warn!(
                        limit_ms = limit.as_millis() as u64,
                        completed = slots.iter().filter(|s| s.is_some()).count(),
                        total,
                        "batch verification deadline expired, cancelling pending entries"
                    );
                    tasks.abort_all();
                }
            }
            None => collect.await,
        }

        let elapsed = started.elapsed();
        let verdicts: Vec<VerificationVerdict> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    VerificationVerdict::cancelled("batch deadline expired before this entry completed")
                        .with_elapsed(elapsed)
                })
            })
            .collect();

        tracing::info!(
            total,
            verified = verdicts.iter().filter(|v| v.is_verified()).count(),
            errors = verdicts
                .iter()
                .filter(|v| v.outcome == VerdictKind::Error)
                .count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "batch verification finished"
        );
        verdicts
    }

    /// `verify_many` plus the aggregate summary.
    pub async fn verify_many_report(
        &self,
        requests: Vec<VerifyRequest>,
    ) -> BatchVerificationReport {
        let started = std::time::Instant::now();
        let results = self.verify_many(requests).await;
        BatchVerificationReport::from_verdicts(results, started.elapsed())
    }
}
