//! Service facade for the tool-facing operations.
//!
//! Wires the cache, search, verifier and orchestrator together and exposes
//! the five logical operations of the verification surface. Transport is not
//! this crate's concern; handlers for whatever protocol hosts these
//! operations call straight into [`VerifierService`].

pub mod types;

use std::sync::Arc;

use crate::config::VerifierConfig;
use crate::domain::{BatchId, VerificationVerdict};
use crate::infra::{BatchCache, LedgerClient, Result, RetryPolicy, StorageClient};
use crate::search::{BatchSearch, SearchLimits};
use crate::verify::{BatchVerificationReport, BatchVerifier, TransactionVerifier};

pub use types::{
    BatchFilterInput, BatchInfo, BatchListResponse, BatchSummary, HintInput, SearchCriteriaInput,
    SearchMatch, SearchResponse, TransactionInput, VerifyItemInput,
};

/// The verification engine behind the tool surface.
pub struct VerifierService {
    cache: Arc<BatchCache>,
    search: Arc<BatchSearch>,
    verifier: Arc<TransactionVerifier>,
    orchestrator: BatchVerifier,
}

impl VerifierService {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        storage: Arc<dyn StorageClient>,
        config: VerifierConfig,
    ) -> Self {
        let cache = Arc::new(BatchCache::new(config.cache_capacity, config.cache_ttl));
        let limits = SearchLimits {
            max_candidates: config.max_candidates,
            page_cap: config.list_page_cap,
            search_cap: config.search_result_cap,
        };
        let search = Arc::new(BatchSearch::new(
            ledger,
            cache.clone(),
            RetryPolicy::ledger().with_max_retries(config.max_retries),
            limits,
        ));
        let verifier = Arc::new(TransactionVerifier::new(
            search.clone(),
            storage,
            RetryPolicy::storage().with_max_retries(config.max_retries),
            config.tie_margin,
            config.verify_timeout,
        ));
        let orchestrator = BatchVerifier::new(
            verifier.clone(),
            config.worker_count,
            config.batch_timeout,
        );

        Self {
            cache,
            search,
            verifier,
            orchestrator,
        }
    }

    /// Verify a single transaction. `Err` only for request-shape problems
    /// (unencodable record, invalid hint); everything else is a verdict.
    pub async fn verify_transaction(
        &self,
        transaction: &TransactionInput,
        hints: Option<&HintInput>,
    ) -> Result<VerificationVerdict> {
        let record = transaction.to_record()?;
        let hint = hints.map(HintInput::to_hint).transpose()?;
        self.verifier.verify(&record, hint.as_ref()).await
    }

    /// Verify many transactions in parallel, order-preserving. A malformed
    /// entry fails only its own slot.
    pub async fn verify_batch(&self, items: &[VerifyItemInput]) -> BatchVerificationReport {
        let started = std::time::Instant::now();

        let mut prefilled: Vec<Option<VerificationVerdict>> = vec![None; items.len()];
        let mut requests = Vec::with_capacity(items.len());
        let mut positions = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item.to_request() {
                Ok(request) => {
                    positions.push(index);
                    requests.push(request);
                }
                Err(e) => {
                    prefilled[index] =
                        Some(VerificationVerdict::failure(None, e.to_string()));
                }
            }
        }

        let verdicts = self.orchestrator.verify_many(requests).await;
        for (position, verdict) in positions.into_iter().zip(verdicts) {
            prefilled[position] = Some(verdict);
        }

        let results: Vec<VerificationVerdict> = prefilled
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    VerificationVerdict::failure(None, "internal: result slot never filled")
                })
            })
            .collect();

        BatchVerificationReport::from_verdicts(results, started.elapsed())
    }

    /// Fetch one batch's metadata, read-through the descriptor cache.
    pub async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchInfo>> {
        let id = BatchId::parse(batch_id)?;
        let descriptor = self.search.descriptor(&id).await?;
        Ok(descriptor.map(BatchInfo::from))
    }

    /// List batches newest-first with paging.
    pub async fn list_batches(
        &self,
        filter: Option<&BatchFilterInput>,
        limit: usize,
        offset: usize,
    ) -> Result<BatchListResponse> {
        let filter = filter.map(BatchFilterInput::to_filter).transpose()?.unwrap_or_default();
        let page = self.search.list(&filter, limit, offset).await?;
        Ok(BatchListResponse {
            batches: page.batches.into_iter().map(BatchSummary::from).collect(),
            offset: page.offset,
            limit: page.limit,
            has_more: page.has_more,
        })
    }

    /// Criteria-based batch search with relevance ranking.
    pub async fn search_batches(
        &self,
        criteria: &SearchCriteriaInput,
        max_results: usize,
    ) -> Result<SearchResponse> {
        let criteria = criteria.to_criteria()?;
        let found = self.search.search_by_criteria(&criteria, max_results).await?;

        let matches: Vec<SearchMatch> =
            found.matches.into_iter().map(SearchMatch::from).collect();
        let suggestions = matches.is_empty().then(|| {
            vec![
                "widen the time range".to_string(),
                "check the database and table names".to_string(),
                "list recent batches without criteria to see what is anchored".to_string(),
            ]
        });

        Ok(SearchResponse {
            total_matches: matches.len(),
            matches,
            truncated: found.truncated,
            suggestions,
        })
    }

    /// The descriptor cache, for periodic expiry sweeps and stats reporting
    /// by the hosting process.
    pub fn cache(&self) -> &Arc<BatchCache> {
        &self.cache
    }
}
