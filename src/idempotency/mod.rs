pub mod cleanup;
pub mod fingerprint;
pub mod memory;
pub mod middleware;
pub mod storage;

pub use cleanup::IdempotencyCleanupJob;
pub use fingerprint::{canonical_body, Fingerprint};
pub use memory::InMemoryIdempotencyStore;
pub use middleware::{
    idempotency_middleware, IdempotencyConfig, IdempotencyLayer, IdempotencyMetrics,
    MetricsSnapshot, REPLAYED_HEADER,
};
pub use storage::{
    ConflictKind, Decision, IdempotencyRecord, IdempotencyStatus, IdempotencyStore, Lease,
    PostgresIdempotencyStore, ResponseSnapshot,
};
