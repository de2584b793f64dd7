//! # Batch Cache
//!
//! Store access for one batch: the backing store wrapped in a metering
//! decorator and, when enabled, a read-through cache that lives exactly as
//! long as the batch.

use crate::error::StoreError;
use crate::key::CompositeKey;
use crate::store::{Aggregate, AggregateStore, MeteredStore};
use async_trait::async_trait;
use futures::future::try_join_all;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Read-through cache in front of a store.
///
/// Absent results are cached too, so a key is read from the backend at most
/// once while the cache is alive. Writes go to the backend first and are
/// cached only once they succeed.
pub struct BatchCache<A> {
    inner: Arc<dyn AggregateStore<A>>,
    entries: Mutex<HashMap<CompositeKey, Option<A>>>,
}

impl<A: Aggregate> BatchCache<A> {
    pub fn new(inner: Arc<dyn AggregateStore<A>>) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl<A: Aggregate> AggregateStore<A> for BatchCache<A> {
    async fn get(&self, key: &CompositeKey) -> Result<Option<A>, StoreError> {
        let hit = self.entries.lock().get(key).cloned();
        if let Some(cached) = hit {
            return Ok(cached);
        }
        let found = self.inner.get(key).await?;
        self.entries.lock().insert(key.clone(), found.clone());
        Ok(found)
    }

    async fn insert(&self, aggregate: A) -> Result<(), StoreError> {
        let key = aggregate.key();
        self.inner.insert(aggregate.clone()).await?;
        self.entries.lock().insert(key, Some(aggregate));
        Ok(())
    }

    async fn update(&self, key: &CompositeKey, patch: &A::Patch) -> Result<A, StoreError> {
        let updated = self.inner.update(key, patch).await?;
        self.entries.lock().insert(key.clone(), Some(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, key: &CompositeKey) -> Result<bool, StoreError> {
        let removed = self.inner.delete(key).await?;
        self.entries.lock().insert(key.clone(), None);
        Ok(removed)
    }
}

/// Per-batch access to one aggregate store.
///
/// Built at batch start and dropped at batch end, which discards the cache
/// whether the batch succeeded or not.
pub struct StoreAccess<A> {
    metered: Arc<MeteredStore<A>>,
    store: Arc<dyn AggregateStore<A>>,
}

impl<A: Aggregate> StoreAccess<A> {
    pub fn new(backend: Arc<dyn AggregateStore<A>>, with_cache: bool) -> Self {
        let metered = Arc::new(MeteredStore::new(backend));
        let store: Arc<dyn AggregateStore<A>> = if with_cache {
            Arc::new(BatchCache::new(metered.clone()))
        } else {
            metered.clone()
        };
        Self { metered, store }
    }

    pub async fn fetch(&self, key: &CompositeKey) -> Result<Option<A>, StoreError> {
        self.store.get(key).await
    }

    /// Fetch every key concurrently. Keys with no stored aggregate are
    /// missing from the result.
    pub async fn fetch_many(
        &self,
        keys: impl IntoIterator<Item = CompositeKey>,
    ) -> Result<HashMap<CompositeKey, A>, StoreError> {
        let lookups = keys.into_iter().map(|key| async move {
            let found = self.store.get(&key).await?;
            Ok::<_, StoreError>((key, found))
        });
        let found = try_join_all(lookups).await?;
        Ok(found
            .into_iter()
            .filter_map(|(key, aggregate)| aggregate.map(|aggregate| (key, aggregate)))
            .collect())
    }

    pub async fn upsert(&self, aggregate: A) -> Result<(), StoreError> {
        self.store.insert(aggregate).await
    }

    /// Persist every aggregate concurrently.
    pub async fn upsert_many(&self, aggregates: impl IntoIterator<Item = A>) -> Result<(), StoreError> {
        try_join_all(aggregates.into_iter().map(|aggregate| self.store.insert(aggregate))).await?;
        Ok(())
    }

    /// Reads that reached the backing store.
    pub fn backend_reads(&self) -> u64 {
        self.metered.metrics().reads()
    }

    /// Writes that reached the backing store.
    pub fn backend_writes(&self) -> u64 {
        self.metered.metrics().writes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Market, MarketAggregate};
    use crate::store::MemoryStore;

    fn market(proposition: &str) -> MarketAggregate {
        MarketAggregate::from(Market {
            contest_key: "c1".into(),
            proposition_key: proposition.into(),
            is_available: true,
            timestamp: "t0".into(),
        })
    }

    #[tokio::test]
    async fn cached_access_reads_each_key_once() {
        let backend = Arc::new(MemoryStore::<MarketAggregate>::new());
        backend.seed([market("p1")]);
        let access = StoreAccess::new(backend.clone(), true);

        let key = CompositeKey::proposition("c1", "p1");
        let missing = CompositeKey::proposition("c1", "p2");
        for _ in 0..3 {
            assert!(access.fetch(&key).await.unwrap().is_some());
            assert!(access.fetch(&missing).await.unwrap().is_none());
        }
        assert_eq!(access.backend_reads(), 2);
        assert_eq!(backend.metrics().reads(), 2);
    }

    #[tokio::test]
    async fn uncached_access_reads_every_time() {
        let backend = Arc::new(MemoryStore::<MarketAggregate>::new());
        backend.seed([market("p1")]);
        let access = StoreAccess::new(backend, false);
        let key = CompositeKey::proposition("c1", "p1");
        access.fetch(&key).await.unwrap();
        access.fetch(&key).await.unwrap();
        assert_eq!(access.backend_reads(), 2);
    }

    #[tokio::test]
    async fn writes_are_visible_to_later_cached_reads() {
        let backend = Arc::new(MemoryStore::<MarketAggregate>::new());
        let access = StoreAccess::new(backend.clone(), true);
        let key = CompositeKey::proposition("c1", "p1");

        assert!(access.fetch(&key).await.unwrap().is_none());
        access.upsert(market("p1")).await.unwrap();
        assert!(access.fetch(&key).await.unwrap().is_some());
        assert_eq!(access.backend_reads(), 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let backend = Arc::new(MemoryStore::<MarketAggregate>::new());
        let cache = BatchCache::new(backend.clone());
        backend.fail_writes(true);
        assert!(cache.insert(market("p1")).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn fetch_many_skips_absent_keys() {
        let backend = Arc::new(MemoryStore::<MarketAggregate>::new());
        backend.seed([market("p1"), market("p2")]);
        let access = StoreAccess::new(backend, false);
        let found = access
            .fetch_many(["p1", "p2", "p3"].map(|p| CompositeKey::proposition("c1", p)))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(access.backend_reads(), 3);
    }
}
