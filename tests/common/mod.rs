//! Common test fixtures: in-memory ledger/storage collaborators and a real
//! Merkle tree builder sharing the crate's hashing convention.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use trailproof::crypto::{node_digest, pad_leaf, record_digest};
use trailproof::domain::{
    BatchContents, BatchDescriptor, BatchId, BatchLeaf, Hash256, MerkleProof, OperationCounts,
    OperationKind, StorageRef, TransactionRecord,
};
use trailproof::infra::{BatchIndexFilter, CollaboratorError, LedgerClient, StorageClient};
use trailproof::ColumnValue;

/// Build a padded Merkle tree over `leaves`, returning the root and one
/// inclusion proof per real leaf.
pub fn build_tree(leaves: &[Hash256]) -> (Hash256, Vec<MerkleProof>) {
    assert!(!leaves.is_empty(), "a batch has at least one leaf");
    let width = leaves.len().next_power_of_two();
    let mut level: Vec<Hash256> = leaves.to_vec();
    level.resize(width, pad_leaf());

    let mut levels = vec![level];
    while levels.last().unwrap().len() > 1 {
        let prev = levels.last().unwrap();
        let next: Vec<Hash256> = prev
            .chunks(2)
            .map(|pair| node_digest(&pair[0], &pair[1]))
            .collect();
        levels.push(next);
    }
    let root = levels.last().unwrap()[0];

    let proofs = (0..leaves.len())
        .map(|index| {
            let mut siblings = Vec::new();
            let mut idx = index;
            for level in &levels[..levels.len() - 1] {
                siblings.push(level[idx ^ 1]);
                idx /= 2;
            }
            MerkleProof::from_siblings(index as u64, siblings)
        })
        .collect();

    (root, proofs)
}

/// A reference instant all fixtures hang timestamps off.
pub fn anchor_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 55, 0).unwrap()
}

/// Sample account-row record.
pub fn account_record(id: i64, holder: &str, balance: f64) -> TransactionRecord {
    TransactionRecord::new("bankdb", "accounts", OperationKind::Insert)
        .with_column("id", ColumnValue::Int(id))
        .with_column("holder", ColumnValue::Text(holder.to_string()))
        .with_column("balance", ColumnValue::Float(balance))
}

/// Anchor a batch over `records`: builds the real tree and returns the
/// descriptor plus the stored contents.
pub fn anchor_batch(
    batch_id: &str,
    created_at: DateTime<Utc>,
    records: &[TransactionRecord],
) -> (BatchDescriptor, BatchContents) {
    let digests: Vec<Hash256> = records
        .iter()
        .map(|r| record_digest(r).expect("fixture records are encodable"))
        .collect();
    let (root, proofs) = build_tree(&digests);

    let leaves: Vec<BatchLeaf> = records
        .iter()
        .zip(&digests)
        .map(|(record, digest)| BatchLeaf {
            digest: *digest,
            operation: Some(record.operation),
        })
        .collect();

    let mut counts = OperationCounts::default();
    for record in records {
        match record.operation {
            OperationKind::Insert => counts.inserts += 1,
            OperationKind::Update => counts.updates += 1,
            OperationKind::Delete => counts.deletes += 1,
        }
    }

    let first = &records[0];
    let descriptor = BatchDescriptor {
        batch_id: BatchId::parse(batch_id).expect("fixture batch ids are well-formed"),
        merkle_root: root,
        created_at,
        database: first.database.clone(),
        table: first.table.clone(),
        transaction_count: records.len() as u32,
        operation_counts: Some(counts),
        storage: StorageRef {
            bucket: "audit-batches".to_string(),
            key: format!("{batch_id}.json"),
            region: Some("us-west-2".to_string()),
        },
        size_bytes: Some(records.len() as u64 * 512),
    };

    (descriptor, BatchContents { leaves, proofs })
}

/// In-memory ledger with optional injected transient failures.
pub struct InMemoryLedger {
    batches: Mutex<Vec<BatchDescriptor>>,
    transient_failures: AtomicU32,
    pub index_queries: AtomicU32,
    pub descriptor_fetches: AtomicU32,
}

impl InMemoryLedger {
    pub fn new(batches: Vec<BatchDescriptor>) -> Self {
        Self {
            batches: Mutex::new(batches),
            transient_failures: AtomicU32::new(0),
            index_queries: AtomicU32::new(0),
            descriptor_fetches: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` calls with a transient error before recovering.
    pub fn fail_transiently(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn anchor(&self, descriptor: BatchDescriptor) {
        self.batches.lock().unwrap().push(descriptor);
    }

    fn maybe_fail(&self) -> Result<(), CollaboratorError> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CollaboratorError::Connection("ledger rpc reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn query_batch_index(
        &self,
        filter: &BatchIndexFilter,
    ) -> Result<Vec<BatchDescriptor>, CollaboratorError> {
        self.index_queries.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let mut out: Vec<BatchDescriptor> = self
            .batches
            .lock()
            .unwrap()
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
        self.descriptor_fetches.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .find(|d| &d.batch_id == batch_id)
            .cloned())
    }
}

/// In-memory object storage with per-key latency and failure injection.
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, BatchContents>>,
    latencies: Mutex<HashMap<String, Duration>>,
    transient_failures: AtomicU32,
    permanent_failure: Mutex<Option<CollaboratorError>>,
    pub fetches: AtomicU32,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            latencies: Mutex::new(HashMap::new()),
            transient_failures: AtomicU32::new(0),
            permanent_failure: Mutex::new(None),
            fetches: AtomicU32::new(0),
        }
    }

    pub fn put(&self, key: &str, contents: BatchContents) {
        self.objects.lock().unwrap().insert(key.to_string(), contents);
    }

    /// Delay fetches of `key` by `latency`.
    pub fn set_latency(&self, key: &str, latency: Duration) {
        self.latencies.lock().unwrap().insert(key.to_string(), latency);
    }

    pub fn fail_transiently(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_permanently(&self, error: CollaboratorError) {
        *self.permanent_failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn fetch_batch_contents(
        &self,
        storage: &StorageRef,
    ) -> Result<BatchContents, CollaboratorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let latency = self.latencies.lock().unwrap().get(&storage.key).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.permanent_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CollaboratorError::Timeout("object store slow".into()));
        }

        self.objects
            .lock()
            .unwrap()
            .get(&storage.key)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("no object at {}", storage.key)))
    }
}
