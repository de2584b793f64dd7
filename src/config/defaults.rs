//! Default constants for offerfold configuration.

// =============================================================================
// Consumer Defaults
// =============================================================================

/// Partitions processed at the same time.
pub const DEFAULT_PARTITIONS_CONSUMED_CONCURRENTLY: usize = 3;

/// Batches queued per partition before `submit` waits.
pub const DEFAULT_PARTITION_QUEUE_CAPACITY: usize = crate::transport::PARTITION_QUEUE_CAPACITY;

// =============================================================================
// Topic Defaults
// =============================================================================

/// Topic carrying offer snapshots and deltas.
pub const DEFAULT_TOPIC: &str = "offers";

// =============================================================================
// Store Defaults
// =============================================================================

/// Simulated read latency of the in-memory store (ms). Zero disables it.
pub const DEFAULT_READ_LATENCY_MS: u64 = 0;

/// Simulated write latency of the in-memory store (ms).
pub const DEFAULT_WRITE_LATENCY_MS: u64 = 0;
