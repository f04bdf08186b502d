//! Canonical record hashing with domain separation.
//!
//! All digests are SHA-256 over domain-prefixed preimages:
//! - Record digests use a fixed, versioned, type-tagged binary encoding of the
//!   column values sorted by name, so field-value-equal records hash
//!   identically regardless of construction order, and `1` never collides
//!   with `"1"`.
//! - Integers are big-endian; strings are length-prefixed UTF-8.
//!
//! The record digest covers column values only. Database, table, operation
//! kind and the local capture timestamp are matching metadata: an INSERT and
//! a DELETE of identical values share a digest by design of the upstream
//! recorder, and are disambiguated by the per-leaf operation tag.

use sha2::{Digest, Sha256};

use crate::domain::{ColumnValue, Hash256, TransactionRecord};
use crate::infra::VerifierError;

/// Version of the canonical record encoding, bound into every preimage.
pub const CANONICAL_VERSION: u32 = 1;

/// Domain prefix for record content digests
pub const DOMAIN_RECORD: &[u8] = b"TRAILPROOF_RECORD_V1";

/// Domain prefix for Merkle internal nodes
pub const DOMAIN_NODE: &[u8] = b"TRAILPROOF_NODE_V1";

/// Domain prefix for the padding leaf
pub const DOMAIN_PAD_LEAF: &[u8] = b"TRAILPROOF_PAD_LEAF_V1";

// Value type tags of the canonical encoding.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_TIMESTAMP: u8 = 5;

/// Encode a u32 as 4 bytes big-endian
#[inline]
pub fn u32_be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Encode a u64 as 8 bytes big-endian
#[inline]
pub fn u64_be(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Encode a string as length-prefixed UTF-8 bytes: `U32_BE(len) || bytes`
pub fn encode_str(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&u32_be(bytes.len() as u32));
    out.extend_from_slice(bytes);
    out
}

/// Append the type-tagged encoding of one column value.
fn encode_value(value: &ColumnValue, out: &mut Vec<u8>) -> Result<(), VerifierError> {
    match value {
        ColumnValue::Null => out.push(TAG_NULL),
        ColumnValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        ColumnValue::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        ColumnValue::Float(f) => {
            if !f.is_finite() {
                return Err(VerifierError::Encoding(format!(
                    "non-finite float value `{f}` is not encodable"
                )));
            }
            // Normalize -0.0 so numerically equal values hash equally.
            let normalized = if *f == 0.0 { 0.0f64 } else { *f };
            out.push(TAG_FLOAT);
            out.extend_from_slice(&normalized.to_be_bytes());
        }
        ColumnValue::Text(s) => {
            out.push(TAG_TEXT);
            out.extend_from_slice(&encode_str(s));
        }
        ColumnValue::Timestamp(ts) => {
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&ts.timestamp_micros().to_be_bytes());
        }
    }
    Ok(())
}

/// Compute the canonical content digest of a transaction record.
///
/// ```text
/// preimage =
///   b"TRAILPROOF_RECORD_V1" ||
///   U32_BE(version) ||
///   U32_BE(column_count) ||
///   for each column sorted by name: ENC_STR(name) || tagged_value
///
/// record_digest = SHA256(preimage)
/// ```
pub fn record_digest(record: &TransactionRecord) -> Result<Hash256, VerifierError> {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RECORD);
    hasher.update(u32_be(CANONICAL_VERSION));
    hasher.update(u32_be(record.columns.len() as u32));

    // BTreeMap iterates in byte-lexicographic name order.
    let mut buf = Vec::new();
    for (name, value) in &record.columns {
        buf.clear();
        buf.extend_from_slice(&encode_str(name));
        encode_value(value, &mut buf)?;
        hasher.update(&buf);
    }

    Ok(hasher.finalize().into())
}

/// Combine two child digests into a Merkle internal node:
/// `SHA256(b"TRAILPROOF_NODE_V1" || left || right)`
pub fn node_digest(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_NODE);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Padding leaf used by the recorder to fill trees to a power of two:
/// `SHA256(b"TRAILPROOF_PAD_LEAF_V1")`
pub fn pad_leaf() -> Hash256 {
    static PAD_LEAF: std::sync::OnceLock<Hash256> = std::sync::OnceLock::new();
    *PAD_LEAF.get_or_init(|| {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_PAD_LEAF);
        hasher.finalize().into()
    })
}

/// SHA-256 of raw bytes, no domain prefix.
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
