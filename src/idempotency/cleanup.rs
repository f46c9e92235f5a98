use crate::error::Result;
use crate::idempotency::storage::IdempotencyStore;
use crate::scheduler::JobDescriptor;
use async_trait::async_trait;
use std::sync::Arc;

pub const CLEANUP_INTERVAL_KEY: &str = "idempotency_cleanup_interval_minutes";
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 60;

/// Background job pruning expired idempotency records.
pub struct IdempotencyCleanupJob {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyCleanupJob {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobDescriptor for IdempotencyCleanupJob {
    fn name(&self) -> &str {
        "idempotency_cleanup"
    }

    fn interval_config_key(&self) -> &str {
        CLEANUP_INTERVAL_KEY
    }

    fn default_interval_minutes(&self) -> u64 {
        DEFAULT_CLEANUP_INTERVAL_MINUTES
    }

    async fn run(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }
}
