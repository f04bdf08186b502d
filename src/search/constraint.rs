//! Hint validation and resolution.
//!
//! Caller-supplied hints are advisory performance aids, but they are never
//! silently dropped: anything malformed fails resolution with the offending
//! field named. An empty hint is valid and means an unconstrained search.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BatchId, OperationKind, TimeRange, TransactionRecord};
use crate::infra::{Result, VerifierError};

/// Raw verification hint. All fields independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationHint {
    /// Direct batch lookup; when present, every other field is advisory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_operation: Option<OperationKind>,
}

impl VerificationHint {
    pub fn is_empty(&self) -> bool {
        self.batch_id.is_none()
            && self.database.is_none()
            && self.table.is_none()
            && self.time_start.is_none()
            && self.time_end.is_none()
            && self.expected_operation.is_none()
    }
}

/// Validated search constraint.
///
/// A present `batch_id` short-circuits candidate search to the direct-lookup
/// fast path; the remaining fields then only serve diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConstraint {
    pub batch_id: Option<BatchId>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub time_range: Option<TimeRange>,
    pub expected_operation: Option<OperationKind>,
}

impl ResolvedConstraint {
    /// Validate a raw hint into a constraint.
    pub fn resolve(hint: &VerificationHint) -> Result<Self> {
        let batch_id = hint.batch_id.as_deref().map(BatchId::parse).transpose()?;

        let time_range = match (hint.time_start, hint.time_end) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(VerifierError::InvalidHint {
                    field: "time_end",
                    reason: "time_start given without time_end; a range needs both".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(VerifierError::InvalidHint {
                    field: "time_start",
                    reason: "time_end given without time_start; a range needs both".to_string(),
                })
            }
        };

        Ok(Self {
            batch_id,
            database: hint.database.clone(),
            table: hint.table.clone(),
            time_range,
            expected_operation: hint.expected_operation,
        })
    }

    /// True when no index-level filter applies (full-population scan).
    pub fn is_unconstrained(&self) -> bool {
        self.batch_id.is_none()
            && self.database.is_none()
            && self.table.is_none()
            && self.time_range.is_none()
    }
}

/// Soft ranking evidence drawn from the record under verification. Never
/// filters the index query; only orders candidates.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub database: &'a str,
    pub table: &'a str,
    pub operation: OperationKind,
}

impl<'a> RecordContext<'a> {
    pub fn of(record: &'a TransactionRecord) -> Self {
        Self {
            database: &record.database,
            table: &record.table,
            operation: record.operation,
        }
    }
}

/// Parse an ISO-8601 timestamp that must carry a UTC offset.
///
/// Naive (offset-less) timestamps are rejected rather than assumed UTC:
/// local-vs-UTC confusion at this boundary silently verifies the wrong time
/// window.
pub fn parse_utc_timestamp(value: &str, field: &'static str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"));
    if naive.is_ok() {
        return Err(VerifierError::InvalidHint {
            field,
            reason: format!(
                "`{value}` has no UTC offset; timezone-naive timestamps are ambiguous, use e.g. `2025-07-01T09:54:00Z`"
            ),
        });
    }
    Err(VerifierError::InvalidHint {
        field,
        reason: format!("`{value}` is not an ISO-8601 timestamp"),
    })
}
