//! Transaction records as captured from the audited database.
//!
//! A record's identity is its canonical content digest (see [`crate::crypto`]);
//! database, table, operation kind and the local capture timestamp are matching
//! metadata, not identity. Two operations on identical column values (an INSERT
//! and a later DELETE of the same row) therefore share a digest and are told
//! apart by operation kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::VerifierError;

/// Database operation kind recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = VerifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(VerifierError::InvalidHint {
                field: "expected_operation",
                reason: format!("unknown operation kind `{other}`, expected INSERT, UPDATE or DELETE"),
            }),
        }
    }
}

/// Typed column value.
///
/// The supported set is fixed and versioned together with the canonical
/// encoding; anything outside it fails with an encoding error rather than
/// being coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    /// Convert an untyped JSON value into a typed column value.
    ///
    /// Nested arrays and objects are not part of the supported set. JSON
    /// strings stay strings; callers that mean a timestamp construct
    /// [`ColumnValue::Timestamp`] directly.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, VerifierError> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(ColumnValue::Null),
            Value::Bool(b) => Ok(ColumnValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ColumnValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    if !f.is_finite() {
                        return Err(VerifierError::Encoding(format!(
                            "non-finite float value `{f}` is not encodable"
                        )));
                    }
                    Ok(ColumnValue::Float(f))
                } else {
                    Err(VerifierError::Encoding(format!(
                        "numeric value `{n}` does not fit a 64-bit integer or float"
                    )))
                }
            }
            Value::String(s) => Ok(ColumnValue::Text(s.clone())),
            Value::Array(_) => Err(VerifierError::Encoding(
                "array column values are not supported".to_string(),
            )),
            Value::Object(_) => Err(VerifierError::Encoding(
                "nested object column values are not supported".to_string(),
            )),
        }
    }
}

/// A single database transaction as captured by the recording pipeline.
///
/// Immutable once constructed. Column values are held in a `BTreeMap`, so the
/// canonical name ordering holds regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Source database name
    pub database: String,

    /// Source table name
    pub table: String,

    /// Operation that produced this record
    pub operation: OperationKind,

    /// Column name -> typed value, ordered by name
    pub columns: BTreeMap<String, ColumnValue>,

    /// Local capture timestamp, if the source recorded one. Informational
    /// only; the ledger-assigned batch timestamp is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        operation: OperationKind,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            operation,
            columns: BTreeMap::new(),
            recorded_at: None,
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, value: ColumnValue) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    pub fn with_recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(at);
        self
    }

    /// Build a record from an untyped JSON object of column values.
    pub fn from_json_columns(
        database: impl Into<String>,
        table: impl Into<String>,
        operation: OperationKind,
        columns: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, VerifierError> {
        let mut record = Self::new(database, table, operation);
        for (name, value) in columns {
            let typed = ColumnValue::from_json(value)?;
            record.columns.insert(name.clone(), typed);
        }
        Ok(record)
    }
}
