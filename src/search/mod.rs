//! Candidate batch search.
//!
//! Finds the batches plausibly containing a record: a direct-lookup fast path
//! when a batch identifier hint exists, otherwise a filtered ledger index
//! query followed by relevance ranking. Results are deduplicated, ordered
//! deterministically, and bounded when the constraint would otherwise scan
//! the full batch population.

pub mod constraint;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{BatchDescriptor, BatchId, Hash256, OperationKind, TimeRange};
use crate::infra::{
    BatchCache, BatchIndexFilter, CollaboratorError, LedgerClient, RetryPolicy,
};

pub use constraint::{parse_utc_timestamp, RecordContext, ResolvedConstraint, VerificationHint};

/// Relevance weights. Exact database/table matches dominate; time-range
/// presence and operation plausibility refine; recency breaks ties.
const SCORE_DATABASE_MATCH: f64 = 2.0;
const SCORE_TABLE_MATCH: f64 = 2.0;
const SCORE_IN_TIME_RANGE: f64 = 1.0;
const SCORE_OPERATION_PLAUSIBLE: f64 = 0.5;
/// Direct batch-id lookups skip scoring entirely; the sentinel keeps them
/// above any ranked candidate in diagnostics.
const SCORE_DIRECT_LOOKUP: f64 = 100.0;

/// Bounds on search and paging fan-out.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Cap on candidates for an unconstrained scan (bounded-cost guard)
    pub max_candidates: usize,
    /// Cap on a single `list` page
    pub page_cap: usize,
    /// Cap on `search_by_criteria` results
    pub search_cap: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_candidates: 100,
            page_cap: 1000,
            search_cap: 200,
        }
    }
}

/// A candidate batch with its relevance score and the reason it matched.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub descriptor: BatchDescriptor,
    pub score: f64,
    pub match_reason: String,
}

/// Ordered, deduplicated candidate set.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<ScoredBatch>,
    /// Set when the bounded-cost guard dropped older batches; the set may be
    /// incomplete
    pub truncated: bool,
}

impl SearchOutcome {
    pub fn candidate_ids(&self) -> Vec<BatchId> {
        self.candidates
            .iter()
            .map(|c| c.descriptor.batch_id.clone())
            .collect()
    }
}

/// Filter for batch listing.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub database: Option<String>,
    pub table: Option<String>,
    pub time_range: Option<TimeRange>,
    pub min_transaction_count: Option<u32>,
    pub max_transaction_count: Option<u32>,
}

/// One page of batch descriptors, newest first.
#[derive(Debug, Clone)]
pub struct BatchPage {
    pub batches: Vec<BatchDescriptor>,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Flexible search criteria beyond plain listing.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub database: Option<String>,
    pub table: Option<String>,
    pub time_range: Option<TimeRange>,
    pub expected_operation: Option<OperationKind>,
    pub merkle_root: Option<Hash256>,
    pub min_transaction_count: Option<u32>,
    /// Substring match on the batch identifier
    pub batch_id_pattern: Option<String>,
}

/// Ranked matches for criteria-based search.
#[derive(Debug, Clone, Default)]
pub struct SearchMatches {
    pub matches: Vec<ScoredBatch>,
    pub truncated: bool,
}

/// Candidate batch search over the ledger index, read-through the descriptor
/// cache.
pub struct BatchSearch {
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<BatchCache>,
    retry: RetryPolicy,
    limits: SearchLimits,
}

impl BatchSearch {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<BatchCache>,
        retry: RetryPolicy,
        limits: SearchLimits,
    ) -> Self {
        Self {
            ledger,
            cache,
            retry,
            limits,
        }
    }

    /// Fetch one descriptor by id, read-through the cache with single-flight
    /// fetches and transient-failure retries.
    pub async fn descriptor(
        &self,
        batch_id: &BatchId,
    ) -> Result<Option<BatchDescriptor>, CollaboratorError> {
        self.cache
            .get_or_fetch(batch_id, || {
                self.retry
                    .run_transient("ledger.get_batch", || self.ledger.get_batch(batch_id))
            })
            .await
    }

    /// Search for candidate batches under a resolved constraint.
    ///
    /// `target`, when present, supplies soft ranking evidence from the record
    /// being verified; it never filters the index query. Output ordering is
    /// deterministic for identical inputs and index state.
    pub async fn search(
        &self,
        constraint: &ResolvedConstraint,
        target: Option<&RecordContext<'_>>,
    ) -> Result<SearchOutcome, CollaboratorError> {
        if let Some(batch_id) = &constraint.batch_id {
            let candidates = self
                .descriptor(batch_id)
                .await?
                .map(|descriptor| ScoredBatch {
                    descriptor,
                    score: SCORE_DIRECT_LOOKUP,
                    match_reason: "batch identifier hint (direct lookup)".to_string(),
                })
                .into_iter()
                .collect();
            return Ok(SearchOutcome {
                candidates,
                truncated: false,
            });
        }

        let unconstrained = constraint.is_unconstrained();
        let filter = BatchIndexFilter {
            database: constraint.database.clone(),
            table: constraint.table.clone(),
            created_after: constraint.time_range.map(|r| r.start),
            created_before: constraint.time_range.map(|r| r.end),
            limit: unconstrained.then_some(self.limits.max_candidates + 1),
        };

        let mut descriptors = self
            .retry
            .run_transient("ledger.query_batch_index", || {
                self.ledger.query_batch_index(&filter)
            })
            .await?;

        let truncated = unconstrained && descriptors.len() > self.limits.max_candidates;
        if truncated {
            tracing::debug!(
                cap = self.limits.max_candidates,
                "unconstrained search hit the bounded-cost guard; candidate set may be incomplete"
            );
            descriptors.truncate(self.limits.max_candidates);
        }

        // Dedup by id, keeping the best score per batch.
        let mut best: HashMap<BatchId, ScoredBatch> = HashMap::new();
        for descriptor in descriptors {
            let (score, match_reason) = score_descriptor(&descriptor, constraint, target);
            let candidate = ScoredBatch {
                descriptor,
                score,
                match_reason,
            };
            match best.entry(candidate.descriptor.batch_id.clone()) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    if candidate.score > slot.get().score {
                        slot.insert(candidate);
                    }
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }

        let mut candidates: Vec<ScoredBatch> = best.into_values().collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.descriptor.created_at.cmp(&a.descriptor.created_at))
                .then_with(|| a.descriptor.batch_id.cmp(&b.descriptor.batch_id))
        });

        Ok(SearchOutcome {
            candidates,
            truncated,
        })
    }

    /// List batches, newest first, with paging.
    pub async fn list(
        &self,
        filter: &BatchFilter,
        limit: usize,
        offset: usize,
    ) -> Result<BatchPage, CollaboratorError> {
        let limit = limit.clamp(1, self.limits.page_cap);

        // Count-range filters apply after the index query, so the fetch can
        // only be pre-bounded when they are absent.
        let count_filtered =
            filter.min_transaction_count.is_some() || filter.max_transaction_count.is_some();
        let index_filter = BatchIndexFilter {
            database: filter.database.clone(),
            table: filter.table.clone(),
            created_after: filter.time_range.map(|r| r.start),
            created_before: filter.time_range.map(|r| r.end),
            limit: (!count_filtered).then_some(offset + limit + 1),
        };

        let descriptors = self
            .retry
            .run_transient("ledger.query_batch_index", || {
                self.ledger.query_batch_index(&index_filter)
            })
            .await?;

        let filtered: Vec<BatchDescriptor> = descriptors
            .into_iter()
            .filter(|d| {
                filter
                    .min_transaction_count
                    .is_none_or(|min| d.transaction_count >= min)
                    && filter
                        .max_transaction_count
                        .is_none_or(|max| d.transaction_count <= max)
            })
            .collect();

        let has_more = filtered.len() > offset + limit;
        let batches = filtered.into_iter().skip(offset).take(limit).collect();

        Ok(BatchPage {
            batches,
            offset,
            limit,
            has_more,
        })
    }

    /// Criteria-based search: the ranked candidate search plus the
    /// post-filters plain listing cannot express.
    pub async fn search_by_criteria(
        &self,
        criteria: &SearchCriteria,
        max_results: usize,
    ) -> Result<SearchMatches, CollaboratorError> {
        let constraint = ResolvedConstraint {
            batch_id: None,
            database: criteria.database.clone(),
            table: criteria.table.clone(),
            time_range: criteria.time_range,
            expected_operation: criteria.expected_operation,
        };
        let outcome = self.search(&constraint, None).await?;

        let max = max_results.clamp(1, self.limits.search_cap);
        let mut matches: Vec<ScoredBatch> = outcome
            .candidates
            .into_iter()
            .filter(|c| {
                criteria
                    .merkle_root
                    .is_none_or(|root| c.descriptor.merkle_root == root)
                    && criteria
                        .min_transaction_count
                        .is_none_or(|min| c.descriptor.transaction_count >= min)
                    && criteria
                        .batch_id_pattern
                        .as_deref()
                        .is_none_or(|p| c.descriptor.batch_id.as_str().contains(p))
            })
            .collect();

        let truncated = outcome.truncated || matches.len() > max;
        matches.truncate(max);

        Ok(SearchMatches { matches, truncated })
    }
}

/// Score one descriptor against the constraint and the record context.
fn score_descriptor(
    descriptor: &BatchDescriptor,
    constraint: &ResolvedConstraint,
    target: Option<&RecordContext<'_>>,
) -> (f64, String) {
    let mut score = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    let want_database = constraint
        .database
        .as_deref()
        .or(target.map(|t| t.database));
    if want_database == Some(descriptor.database.as_str()) {
        score += SCORE_DATABASE_MATCH;
        reasons.push("database match");
    }

    let want_table = constraint.table.as_deref().or(target.map(|t| t.table));
    if want_table == Some(descriptor.table.as_str()) {
        score += SCORE_TABLE_MATCH;
        reasons.push("table match");
    }

    if let Some(range) = constraint.time_range {
        if range.contains(descriptor.created_at) {
            score += SCORE_IN_TIME_RANGE;
            reasons.push("within hinted time range");
        }

        let expected = constraint
            .expected_operation
            .or(target.map(|t| t.operation));
        if let Some(op) = expected {
            let plausible = descriptor.transaction_count > 0
                && descriptor
                    .operation_counts
                    .map(|counts| counts.count_for(op) > 0)
                    .unwrap_or(false);
            if plausible {
                score += SCORE_OPERATION_PLAUSIBLE;
                reasons.push("declared operation counts include expected operation");
            }
        }
    }

    let match_reason = if reasons.is_empty() {
        "recency only".to_string()
    } else {
        reasons.join("; ")
    };
    (score, match_reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationCounts, StorageRef};
    use crate::infra::MockLedgerClient;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn descriptor(id: &str, database: &str, table: &str, age_minutes: i64) -> BatchDescriptor {
        BatchDescriptor {
            batch_id: BatchId::parse(id).unwrap(),
            merkle_root: [1u8; 32],
            created_at: base_time() - ChronoDuration::minutes(age_minutes),
            database: database.to_string(),
            table: table.to_string(),
            transaction_count: 8,
            operation_counts: Some(OperationCounts { inserts: 8, updates: 0, deletes: 0 }),
            storage: StorageRef {
                bucket: "audit".to_string(),
                key: format!("{id}.json"),
                region: None,
            },
            size_bytes: None,
        }
    }

    /// In-memory ledger applying the documented filter semantics.
    struct StubLedger {
        batches: Vec<BatchDescriptor>,
    }

    #[async_trait]
    impl LedgerClient for StubLedger {
        async fn query_batch_index(
            &self,
            filter: &BatchIndexFilter,
        ) -> Result<Vec<BatchDescriptor>, CollaboratorError> {
            let mut out: Vec<BatchDescriptor> = self
                .batches
                .iter()
                .filter(|d| {
                    filter.database.as_deref().is_none_or(|db| d.database == db)
                        && filter.table.as_deref().is_none_or(|t| d.table == t)
                        && filter.created_after.is_none_or(|a| d.created_at >= a)
                        && filter.created_before.is_none_or(|b| d.created_at < b)
                })
                .cloned()
                .collect();
            out.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.batch_id.cmp(&a.batch_id))
            });
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        }

        async fn get_batch(
            &self,
            batch_id: &BatchId,
        ) -> Result<Option<BatchDescriptor>, CollaboratorError> {
            Ok(self.batches.iter().find(|d| &d.batch_id == batch_id).cloned())
        }
    }

    fn search_over(batches: Vec<BatchDescriptor>) -> BatchSearch {
        BatchSearch::new(
            Arc::new(StubLedger { batches }),
            Arc::new(BatchCache::new(64, Duration::from_secs(300))),
            RetryPolicy::fast(),
            SearchLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_fast_path_single_candidate() {
        let search = search_over(vec![
            descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 10),
            descriptor("BATCH-2025-07-01-bbb222", "bankdb", "accounts", 20),
        ]);
        let constraint = ResolvedConstraint {
            batch_id: Some(BatchId::parse("BATCH-2025-07-01-bbb222").unwrap()),
            ..Default::default()
        };

        let outcome = search.search(&constraint, None).await.unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(
            outcome.candidates[0].descriptor.batch_id.as_str(),
            "BATCH-2025-07-01-bbb222"
        );
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_fast_path_uses_cache() {
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_get_batch()
            .times(1)
            .returning(|id| {
                let id = id.as_str().to_string();
                Ok(Some(descriptor(&id, "bankdb", "accounts", 5)))
            });

        let search = BatchSearch::new(
            Arc::new(ledger),
            Arc::new(BatchCache::new(64, Duration::from_secs(300))),
            RetryPolicy::fast(),
            SearchLimits::default(),
        );
        let constraint = ResolvedConstraint {
            batch_id: Some(BatchId::parse("BATCH-2025-07-01-abc123").unwrap()),
            ..Default::default()
        };

        // Second search is served from the cache; the mock allows one call.
        search.search(&constraint, None).await.unwrap();
        let outcome = search.search(&constraint, None).await.unwrap();
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_record_context_ranks_matching_table_first() {
        let search = search_over(vec![
            descriptor("BATCH-2025-07-01-aaa111", "bankdb", "orders", 5),
            descriptor("BATCH-2025-07-01-bbb222", "bankdb", "accounts", 30),
        ]);
        let target = RecordContext {
            database: "bankdb",
            table: "accounts",
            operation: OperationKind::Insert,
        };

        let outcome = search
            .search(&ResolvedConstraint::default(), Some(&target))
            .await
            .unwrap();

        // The older batch wins on table match despite recency.
        assert_eq!(
            outcome.candidates[0].descriptor.batch_id.as_str(),
            "BATCH-2025-07-01-bbb222"
        );
        assert!(outcome.candidates[0].score > outcome.candidates[1].score);
        assert!(outcome.candidates[0].match_reason.contains("table match"));
    }

    #[tokio::test]
    async fn test_equal_scores_ordered_by_recency_then_id() {
        let search = search_over(vec![
            descriptor("BATCH-2025-07-01-ccc333", "bankdb", "accounts", 10),
            descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 10),
            descriptor("BATCH-2025-07-01-bbb222", "bankdb", "accounts", 5),
        ]);

        let outcome = search
            .search(&ResolvedConstraint::default(), None)
            .await
            .unwrap();
        let ids: Vec<&str> = outcome
            .candidates
            .iter()
            .map(|c| c.descriptor.batch_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "BATCH-2025-07-01-bbb222",
                "BATCH-2025-07-01-aaa111",
                "BATCH-2025-07-01-ccc333",
            ]
        );
    }

    #[tokio::test]
    async fn test_unconstrained_scan_bounded_and_flagged() {
        let batches: Vec<BatchDescriptor> = (0..150)
            .map(|i| {
                descriptor(
                    &format!("BATCH-2025-07-01-n{i:04}"),
                    "bankdb",
                    "accounts",
                    i,
                )
            })
            .collect();
        let search = search_over(batches);

        let outcome = search
            .search(&ResolvedConstraint::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), SearchLimits::default().max_candidates);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_adding_hint_never_grows_candidate_set() {
        let batches = vec![
            descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 5),
            descriptor("BATCH-2025-07-01-bbb222", "bankdb", "orders", 10),
            descriptor("BATCH-2025-07-01-ccc333", "otherdb", "accounts", 15),
        ];
        let search = search_over(batches);

        let unconstrained = search
            .search(&ResolvedConstraint::default(), None)
            .await
            .unwrap();
        let narrowed = search
            .search(
                &ResolvedConstraint {
                    database: Some("bankdb".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert!(narrowed.candidates.len() <= unconstrained.candidates.len());
        // The true batch for a bankdb record survives narrowing.
        assert!(narrowed
            .candidates
            .iter()
            .any(|c| c.descriptor.batch_id.as_str() == "BATCH-2025-07-01-aaa111"));
    }

    #[tokio::test]
    async fn test_operation_plausibility_requires_time_range() {
        let mut insert_only = descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 5);
        insert_only.operation_counts =
            Some(OperationCounts { inserts: 8, updates: 0, deletes: 0 });
        let search = search_over(vec![insert_only]);

        let range = TimeRange::new(
            base_time() - ChronoDuration::hours(1),
            base_time() + ChronoDuration::hours(1),
        )
        .unwrap();

        let with_range = search
            .search(
                &ResolvedConstraint {
                    time_range: Some(range),
                    expected_operation: Some(OperationKind::Insert),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        let without_range = search
            .search(
                &ResolvedConstraint {
                    expected_operation: Some(OperationKind::Insert),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert!(with_range.candidates[0].score > without_range.candidates[0].score);
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let batches: Vec<BatchDescriptor> = (0..5)
            .map(|i| {
                descriptor(
                    &format!("BATCH-2025-07-01-n{i:04}"),
                    "bankdb",
                    "accounts",
                    i,
                )
            })
            .collect();
        let search = search_over(batches);

        let page1 = search.list(&BatchFilter::default(), 2, 0).await.unwrap();
        assert_eq!(page1.batches.len(), 2);
        assert!(page1.has_more);
        assert_eq!(page1.batches[0].batch_id.as_str(), "BATCH-2025-07-01-n0000");

        let page3 = search.list(&BatchFilter::default(), 2, 4).await.unwrap();
        assert_eq!(page3.batches.len(), 1);
        assert!(!page3.has_more);
    }

    #[tokio::test]
    async fn test_list_transaction_count_filter() {
        let mut small = descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 5);
        small.transaction_count = 2;
        let big = descriptor("BATCH-2025-07-01-bbb222", "bankdb", "accounts", 10);
        let search = search_over(vec![small, big]);

        let filter = BatchFilter {
            min_transaction_count: Some(5),
            ..Default::default()
        };
        let page = search.list(&filter, 10, 0).await.unwrap();
        assert_eq!(page.batches.len(), 1);
        assert_eq!(page.batches[0].batch_id.as_str(), "BATCH-2025-07-01-bbb222");
    }

    #[tokio::test]
    async fn test_search_by_criteria_pattern_and_root() {
        let mut special = descriptor("BATCH-2025-07-01-xyz789", "bankdb", "accounts", 5);
        special.merkle_root = [7u8; 32];
        let search = search_over(vec![
            special,
            descriptor("BATCH-2025-07-01-aaa111", "bankdb", "accounts", 10),
        ]);

        let by_pattern = search
            .search_by_criteria(
                &SearchCriteria {
                    batch_id_pattern: Some("xyz".to_string()),
                    ..Default::default()
                },
                50,
            )
            .await
            .unwrap();
        assert_eq!(by_pattern.matches.len(), 1);

        let by_root = search
            .search_by_criteria(
                &SearchCriteria {
                    merkle_root: Some([7u8; 32]),
                    ..Default::default()
                },
                50,
            )
            .await
            .unwrap();
        assert_eq!(by_root.matches.len(), 1);
        assert_eq!(by_root.matches[0].descriptor.batch_id.as_str(), "BATCH-2025-07-01-xyz789");
    }
}
