//! # Store Module
//!
//! The per-aggregate store contract the engine reads from and writes to, an
//! in-memory implementation with latency and fault injection, and a metering
//! decorator that counts backend traffic.

use crate::error::StoreError;
use crate::key::CompositeKey;
use crate::model::{Contest, MarketAggregate, PropositionAggregate};
use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A materialized record the engine can store and patch.
pub trait Aggregate: Clone + Send + Sync + 'static {
    /// Partial update accepted by [`AggregateStore::update`].
    type Patch: Send + Sync + 'static;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    fn key(&self) -> CompositeKey;

    /// Overlay `patch` onto `self`. Must be idempotent.
    fn apply(&mut self, patch: &Self::Patch);
}

/// Read/write contract of a backing store for one aggregate type.
///
/// Implementations must tolerate concurrent calls for disjoint keys.
#[async_trait]
pub trait AggregateStore<A: Aggregate>: Send + Sync {
    async fn get(&self, key: &CompositeKey) -> Result<Option<A>, StoreError>;

    /// Insert or replace the aggregate under its own key.
    async fn insert(&self, aggregate: A) -> Result<(), StoreError>;

    /// Apply `patch` to the stored aggregate and return the result.
    async fn update(&self, key: &CompositeKey, patch: &A::Patch) -> Result<A, StoreError>;

    /// Remove the aggregate. Returns whether one was stored.
    async fn delete(&self, key: &CompositeKey) -> Result<bool, StoreError>;
}

/// Backend traffic counters.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl StoreMetrics {
    #[inline]
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

/// Simulated per-call latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreLatency {
    pub read: Duration,
    pub write: Duration,
}

impl StoreLatency {
    pub fn from_millis(read_ms: u64, write_ms: u64) -> Self {
        Self {
            read: Duration::from_millis(read_ms),
            write: Duration::from_millis(write_ms),
        }
    }
}

/// In-memory store backed by a hash map.
pub struct MemoryStore<A> {
    entries: RwLock<HashMap<CompositeKey, A>>,
    latency: StoreLatency,
    metrics: StoreMetrics,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<A: Aggregate> Default for MemoryStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> MemoryStore<A> {
    pub fn new() -> Self {
        Self::with_latency(StoreLatency::default())
    }

    pub fn with_latency(latency: StoreLatency) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            latency,
            metrics: StoreMetrics::default(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Load aggregates directly, bypassing latency and metrics.
    pub fn seed(&self, aggregates: impl IntoIterator<Item = A>) {
        let mut entries = self.entries.write();
        for aggregate in aggregates {
            entries.insert(aggregate.key(), aggregate);
        }
    }

    /// Every stored aggregate ordered by key.
    pub fn snapshot(&self) -> BTreeMap<CompositeKey, A> {
        self.entries
            .read()
            .iter()
            .map(|(key, aggregate)| (key.clone(), aggregate.clone()))
            .collect()
    }

    pub fn peek(&self, key: &str) -> Option<A> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Make every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn simulate(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, flag: &AtomicBool, op: &'static str, key: &CompositeKey) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                op,
                aggregate: A::NAME,
                key: key.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<A: Aggregate> AggregateStore<A> for MemoryStore<A> {
    async fn get(&self, key: &CompositeKey) -> Result<Option<A>, StoreError> {
        self.simulate(self.latency.read).await;
        self.check(&self.fail_reads, "get", key)?;
        self.metrics.record_read();
        Ok(self.entries.read().get(key).cloned())
    }

    async fn insert(&self, aggregate: A) -> Result<(), StoreError> {
        let key = aggregate.key();
        self.simulate(self.latency.write).await;
        self.check(&self.fail_writes, "insert", &key)?;
        self.metrics.record_write();
        trace!(aggregate = A::NAME, key = %key, "insert");
        self.entries.write().insert(key, aggregate);
        Ok(())
    }

    async fn update(&self, key: &CompositeKey, patch: &A::Patch) -> Result<A, StoreError> {
        self.simulate(self.latency.write).await;
        self.check(&self.fail_writes, "update", key)?;
        self.metrics.record_write();
        let mut entries = self.entries.write();
        let aggregate = entries.get_mut(key).ok_or_else(|| StoreError::NotFound {
            aggregate: A::NAME,
            key: key.clone(),
        })?;
        aggregate.apply(patch);
        Ok(aggregate.clone())
    }

    async fn delete(&self, key: &CompositeKey) -> Result<bool, StoreError> {
        self.simulate(self.latency.write).await;
        self.check(&self.fail_writes, "delete", key)?;
        self.metrics.record_write();
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// Decorator counting the calls that reach the wrapped store.
pub struct MeteredStore<A> {
    inner: Arc<dyn AggregateStore<A>>,
    metrics: StoreMetrics,
}

impl<A: Aggregate> MeteredStore<A> {
    pub fn new(inner: Arc<dyn AggregateStore<A>>) -> Self {
        Self {
            inner,
            metrics: StoreMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }
}

#[async_trait]
impl<A: Aggregate> AggregateStore<A> for MeteredStore<A> {
    async fn get(&self, key: &CompositeKey) -> Result<Option<A>, StoreError> {
        self.metrics.record_read();
        self.inner.get(key).await
    }

    async fn insert(&self, aggregate: A) -> Result<(), StoreError> {
        self.metrics.record_write();
        self.inner.insert(aggregate).await
    }

    async fn update(&self, key: &CompositeKey, patch: &A::Patch) -> Result<A, StoreError> {
        self.metrics.record_write();
        self.inner.update(key, patch).await
    }

    async fn delete(&self, key: &CompositeKey) -> Result<bool, StoreError> {
        self.metrics.record_write();
        self.inner.delete(key).await
    }
}

/// One store per aggregate type.
#[derive(Clone)]
pub struct Stores {
    pub contests: Arc<dyn AggregateStore<Contest>>,
    pub propositions: Arc<dyn AggregateStore<PropositionAggregate>>,
    pub markets: Arc<dyn AggregateStore<MarketAggregate>>,
}

/// In-memory stores with typed handles kept for inspection.
#[derive(Clone)]
pub struct MemoryStores {
    pub contests: Arc<MemoryStore<Contest>>,
    pub propositions: Arc<MemoryStore<PropositionAggregate>>,
    pub markets: Arc<MemoryStore<MarketAggregate>>,
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new(StoreLatency::default())
    }
}

impl MemoryStores {
    pub fn new(latency: StoreLatency) -> Self {
        Self {
            contests: Arc::new(MemoryStore::with_latency(latency)),
            propositions: Arc::new(MemoryStore::with_latency(latency)),
            markets: Arc::new(MemoryStore::with_latency(latency)),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            contests: self.contests.clone(),
            propositions: self.propositions.clone(),
            markets: self.markets.clone(),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.contests.fail_writes(fail);
        self.propositions.fail_writes(fail);
        self.markets.fail_writes(fail);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.contests.fail_reads(fail);
        self.propositions.fail_reads(fail);
        self.markets.fail_reads(fail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContestPatch, ContestStatus};

    fn contest(key: &str, name: &str) -> Contest {
        Contest {
            contest_key: key.to_string(),
            name: name.to_string(),
            kind: "Match".to_string(),
            start_timestamp: "t0".to_string(),
            end_timestamp: "t9".to_string(),
            status: ContestStatus::PreGame,
            timestamp: "t0".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = MemoryStore::<Contest>::new();
        store.insert(contest("c1", "Final")).await.unwrap();
        let found = store.get(&CompositeKey::contest("c1")).await.unwrap();
        assert_eq!(found.map(|c| c.name), Some("Final".to_string()));
        assert_eq!(store.get(&CompositeKey::contest("c2")).await.unwrap(), None);
        assert_eq!(store.metrics().reads(), 2);
        assert_eq!(store.metrics().writes(), 1);
    }

    #[tokio::test]
    async fn update_patches_and_rejects_missing_keys() {
        let store = MemoryStore::<Contest>::new();
        store.seed([contest("c1", "Final")]);
        let patch = ContestPatch {
            status: Some(ContestStatus::InPlay),
            ..Default::default()
        };

        let updated = store.update(&CompositeKey::contest("c1"), &patch).await.unwrap();
        assert_eq!(updated.status, ContestStatus::InPlay);
        assert_eq!(updated.name, "Final");

        let missing = store.update(&CompositeKey::contest("c9"), &patch).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::<Contest>::new();
        store.seed([contest("c1", "Final")]);
        assert!(store.delete(&CompositeKey::contest("c1")).await.unwrap());
        assert!(!store.delete(&CompositeKey::contest("c1")).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_backend_errors() {
        let store = MemoryStore::<Contest>::new();
        store.fail_writes(true);
        let err = store.insert(contest("c1", "Final")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { op: "insert", .. }));
        assert!(store.is_empty());

        store.fail_writes(false);
        store.fail_reads(true);
        assert!(store.get(&CompositeKey::contest("c1")).await.is_err());
    }

    #[tokio::test]
    async fn metered_store_counts_forwarded_calls() {
        let inner: Arc<dyn AggregateStore<Contest>> = Arc::new(MemoryStore::new());
        let metered = MeteredStore::new(inner);
        metered.insert(contest("c1", "Final")).await.unwrap();
        metered.get(&CompositeKey::contest("c1")).await.unwrap();
        metered.get(&CompositeKey::contest("c1")).await.unwrap();
        assert_eq!(metered.metrics().reads(), 2);
        assert_eq!(metered.metrics().writes(), 1);
    }
}
