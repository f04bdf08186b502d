//! JSON request/response shapes for the tool-facing operations.
//!
//! These mirror the wire contract: transaction records arrive as JSON objects
//! of column values, timestamps are ISO-8601 strings with an explicit UTC
//! offset, operations are the INSERT/UPDATE/DELETE enum, digests are hex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    digest_from_hex, digest_hex, BatchDescriptor, Hash256, OperationCounts, OperationKind,
    StorageRef, TimeRange, TransactionRecord,
};
use crate::infra::{Result, VerifierError};
use crate::search::{
    parse_utc_timestamp, BatchFilter, ScoredBatch, SearchCriteria, VerificationHint,
};
use crate::verify::VerifyRequest;

/// A transaction record as submitted for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    pub database_name: String,
    pub table_name: String,
    pub operation: OperationKind,
    /// Column name -> JSON value; nested arrays/objects are rejected
    pub column_values: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl TransactionInput {
    pub fn to_record(&self) -> Result<TransactionRecord> {
        let mut record = TransactionRecord::from_json_columns(
            self.database_name.clone(),
            self.table_name.clone(),
            self.operation,
            &self.column_values,
        )?;
        record.recorded_at = self.recorded_at;
        Ok(record)
    }
}

/// Optional verification hints, all fields independent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// ISO-8601 with explicit offset, e.g. `2025-07-01T09:54:00Z`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_operation: Option<OperationKind>,
}

impl HintInput {
    pub fn to_hint(&self) -> Result<VerificationHint> {
        Ok(VerificationHint {
            batch_id: self.batch_id.clone(),
            database: self.database_name.clone(),
            table: self.table_name.clone(),
            time_start: self
                .time_start
                .as_deref()
                .map(|s| parse_utc_timestamp(s, "time_start"))
                .transpose()?,
            time_end: self
                .time_end
                .as_deref()
                .map(|s| parse_utc_timestamp(s, "time_end"))
                .transpose()?,
            expected_operation: self.expected_operation,
        })
    }
}

/// One entry of a batch verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyItemInput {
    pub transaction: TransactionInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<HintInput>,
}

impl VerifyItemInput {
    pub fn to_request(&self) -> Result<VerifyRequest> {
        let record = self.transaction.to_record()?;
        let mut request = VerifyRequest::new(record);
        if let Some(hints) = &self.hints {
            request = request.with_hint(hints.to_hint()?);
        }
        Ok(request)
    }
}

fn optional_range(
    time_start: Option<&str>,
    time_end: Option<&str>,
) -> Result<Option<TimeRange>> {
    match (time_start, time_end) {
        (Some(start), Some(end)) => {
            let start = parse_utc_timestamp(start, "time_start")?;
            let end = parse_utc_timestamp(end, "time_end")?;
            Ok(Some(TimeRange::new(start, end)?))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(VerifierError::InvalidHint {
            field: "time_end",
            reason: "time_start given without time_end; a range needs both".to_string(),
        }),
        (None, Some(_)) => Err(VerifierError::InvalidHint {
            field: "time_start",
            reason: "time_end given without time_start; a range needs both".to_string(),
        }),
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFilterInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_transaction_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transaction_count: Option<u32>,
}

impl BatchFilterInput {
    pub fn to_filter(&self) -> Result<BatchFilter> {
        Ok(BatchFilter {
            database: self.database_name.clone(),
            table: self.table_name.clone(),
            time_range: optional_range(self.time_start.as_deref(), self.time_end.as_deref())?,
            min_transaction_count: self.min_transaction_count,
            max_transaction_count: self.max_transaction_count,
        })
    }
}

/// Criteria-based search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteriaInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_operation: Option<OperationKind>,
    /// Hex digest of a batch root to look up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_transaction_count: Option<u32>,
    /// Substring match on the batch identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id_pattern: Option<String>,
}

impl SearchCriteriaInput {
    pub fn to_criteria(&self) -> Result<SearchCriteria> {
        let merkle_root = self
            .merkle_root
            .as_deref()
            .map(|s| {
                digest_from_hex(s).ok_or(VerifierError::InvalidHint {
                    field: "merkle_root",
                    reason: format!("`{s}` is not a 32-byte hex digest"),
                })
            })
            .transpose()?;

        Ok(SearchCriteria {
            database: self.database_name.clone(),
            table: self.table_name.clone(),
            time_range: optional_range(self.time_start.as_deref(), self.time_end.as_deref())?,
            expected_operation: self.expected_operation,
            merkle_root,
            min_transaction_count: self.min_transaction_count,
            batch_id_pattern: self.batch_id_pattern.clone(),
        })
    }
}

/// Full batch metadata, returned by `get_batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub database_name: String,
    pub table_name: String,
    pub transaction_count: u32,
    #[serde(with = "digest_hex")]
    pub merkle_root: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_counts: Option<OperationCounts>,
    pub storage: StorageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl From<BatchDescriptor> for BatchInfo {
    fn from(d: BatchDescriptor) -> Self {
        Self {
            batch_id: d.batch_id.to_string(),
            created_at: d.created_at,
            database_name: d.database,
            table_name: d.table,
            transaction_count: d.transaction_count,
            merkle_root: d.merkle_root,
            operation_counts: d.operation_counts,
            storage: d.storage,
            size_bytes: d.size_bytes,
        }
    }
}

/// Condensed batch metadata for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub database_name: String,
    pub table_name: String,
    pub transaction_count: u32,
    #[serde(with = "digest_hex")]
    pub merkle_root: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl From<BatchDescriptor> for BatchSummary {
    fn from(d: BatchDescriptor) -> Self {
        Self {
            batch_id: d.batch_id.to_string(),
            created_at: d.created_at,
            database_name: d.database,
            table_name: d.table,
            transaction_count: d.transaction_count,
            merkle_root: d.merkle_root,
            size_bytes: d.size_bytes,
        }
    }
}

/// One page of batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchListResponse {
    pub batches: Vec<BatchSummary>,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// One ranked search match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    #[serde(flatten)]
    pub batch: BatchSummary,
    pub relevance_score: f64,
    pub match_reason: String,
}

impl From<ScoredBatch> for SearchMatch {
    fn from(s: ScoredBatch) -> Self {
        Self {
            batch: s.descriptor.into(),
            relevance_score: s.score,
            match_reason: s.match_reason,
        }
    }
}

/// Criteria-search response with ranked matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<SearchMatch>,
    pub total_matches: usize,
    /// Set when the bounded-cost guard may have dropped older batches
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Populated when nothing matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_input_to_record() {
        let input: TransactionInput = serde_json::from_value(json!({
            "database_name": "bankdb",
            "table_name": "accounts",
            "operation": "INSERT",
            "column_values": {"id": 7, "holder": "alice", "balance": 100.5}
        }))
        .unwrap();

        let record = input.to_record().unwrap();
        assert_eq!(record.database, "bankdb");
        assert_eq!(record.operation, OperationKind::Insert);
        assert_eq!(record.columns.len(), 3);
    }

    #[test]
    fn test_transaction_input_rejects_nested_values() {
        let input: TransactionInput = serde_json::from_value(json!({
            "database_name": "bankdb",
            "table_name": "accounts",
            "operation": "UPDATE",
            "column_values": {"tags": ["a", "b"]}
        }))
        .unwrap();

        assert!(matches!(input.to_record(), Err(VerifierError::Encoding(_))));
    }

    #[test]
    fn test_hint_input_rejects_naive_timestamp() {
        let input = HintInput {
            time_start: Some("2025-07-01T09:54:00".to_string()),
            time_end: Some("2025-07-01T09:56:00Z".to_string()),
            ..Default::default()
        };
        let err = input.to_hint().unwrap_err();
        assert!(matches!(err, VerifierError::InvalidHint { field: "time_start", .. }));
    }

    #[test]
    fn test_search_criteria_rejects_bad_root() {
        let input = SearchCriteriaInput {
            merkle_root: Some("nothex".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            input.to_criteria(),
            Err(VerifierError::InvalidHint { field: "merkle_root", .. })
        ));
    }

    #[test]
    fn test_operation_enum_wire_format() {
        assert_eq!(
            serde_json::to_value(OperationKind::Delete).unwrap(),
            json!("DELETE")
        );
        let parsed: OperationKind = serde_json::from_value(json!("UPDATE")).unwrap();
        assert_eq!(parsed, OperationKind::Update);
    }
}
