use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::storage::{
    Decision, IdempotencyRecord, IdempotencyStatus, IdempotencyStore, Lease, ResponseSnapshot,
};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-process idempotency store.
///
/// The map mutex stands in for the storage uniqueness constraint, so this
/// store only guarantees at-most-once execution within a single process.
/// Used for single-instance deployments and in tests.
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
    ttl_seconds: i64,
    in_flight_ttl_seconds: i64,
}

impl InMemoryIdempotencyStore {
    pub fn new(ttl_seconds: i64, in_flight_ttl_seconds: i64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl_seconds,
            in_flight_ttl_seconds,
        }
    }

    pub fn len(&self) -> usize {
        self.records().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, IdempotencyRecord>>> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("idempotency store lock poisoned")))
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(86400, 3600)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn begin(&self, key: &str, fingerprint: &Fingerprint) -> Result<Decision> {
        let mut records = self.records()?;

        match records.entry(key.to_string()) {
            Entry::Occupied(existing) => existing.get().decide(fingerprint),
            Entry::Vacant(slot) => {
                let record =
                    IdempotencyRecord::new(key.to_string(), fingerprint, self.in_flight_ttl_seconds);
                let lease = record.lease();
                slot.insert(record);
                Ok(Decision::Proceed(lease))
            }
        }
    }

    async fn complete(&self, lease: &Lease, snapshot: &ResponseSnapshot) -> Result<()> {
        let mut records = self.records()?;

        match records.get_mut(&lease.key) {
            Some(record) if record.id == lease.id && record.status == IdempotencyStatus::InProgress => {
                record.complete(snapshot, self.ttl_seconds);
                Ok(())
            }
            _ => Err(AppError::IdempotencyState(format!(
                "no in-progress record owned by lease {}",
                lease.id
            ))),
        }
    }

    async fn abandon(&self, lease: &Lease) -> Result<bool> {
        let mut records = self.records()?;

        let owned = matches!(
            records.get(&lease.key),
            Some(record) if record.id == lease.id && record.status == IdempotencyStatus::InProgress
        );
        if owned {
            records.remove(&lease.key);
        }

        Ok(owned)
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.records()?.get(key).cloned())
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired());

        Ok((before - records.len()) as u64)
    }
}
