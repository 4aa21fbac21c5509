use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{
    BuyerId, CustomerBasket, Result, StoreError, Version,
    store::{BasketStore, RECENT_WRITE_IDS, SetOptions, StoredBasket},
};

#[derive(Debug, Clone)]
struct Entry {
    basket: CustomerBasket,
    version: Version,
    expires_at: Option<Instant>,
    write_ids: VecDeque<String>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn stored(&self) -> StoredBasket {
        StoredBasket {
            basket: self.basket.clone(),
            version: self.version,
        }
    }
}

/// In-memory basket store.
///
/// Provides the same interface as the PostgreSQL implementation, plus fault
/// injection so callers can be tested against an unreachable or slow
/// backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBasketStore {
    entries: Arc<RwLock<HashMap<BuyerId, Entry>>>,
    ttl: Option<Duration>,
    unavailable: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryBasketStore {
    /// Creates a new empty store whose baskets never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that evicts baskets `ttl` after their last write.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Makes every subsequent operation fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the number of live baskets.
    pub async fn basket_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Removes all baskets.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drops expired baskets and returns how many were removed.
    ///
    /// Writes purge expired baskets on their own; this is for callers that
    /// want to reclaim memory without writing.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    async fn check_backend(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BasketStore for InMemoryBasketStore {
    #[tracing::instrument(skip(self), fields(store = "memory"))]
    async fn get(&self, buyer_id: &BuyerId) -> Result<Option<StoredBasket>> {
        self.check_backend().await?;
        metrics::counter!("basket_store_operations_total", "operation" => "get").increment(1);

        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(buyer_id)
            .filter(|entry| entry.is_live(now))
            .map(Entry::stored))
    }

    #[tracing::instrument(skip(self, basket), fields(store = "memory", buyer_id = %basket.buyer_id))]
    async fn set(&self, basket: CustomerBasket, options: SetOptions) -> Result<StoredBasket> {
        self.check_backend().await?;
        basket.validate()?;
        metrics::counter!("basket_store_operations_total", "operation" => "set").increment(1);

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if self.ttl.is_some() {
            entries.retain(|_, entry| entry.is_live(now));
        }

        let current = entries.get(&basket.buyer_id);
        let current_version = current
            .map(|entry| entry.version)
            .unwrap_or_else(Version::initial);

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            if let (Some(entry), Some(write_id)) = (current, options.write_id.as_deref())
                && entry.write_ids.iter().any(|id| id == write_id)
            {
                tracing::debug!(write_id, version = %entry.version, "write already applied");
                return Ok(entry.stored());
            }
            return Err(StoreError::ConcurrencyConflict {
                buyer_id: basket.buyer_id,
                expected,
                actual: current_version,
            });
        }

        let mut write_ids = current
            .map(|entry| entry.write_ids.clone())
            .unwrap_or_default();
        if let Some(write_id) = options.write_id {
            write_ids.push_back(write_id);
            if write_ids.len() > RECENT_WRITE_IDS {
                write_ids.pop_front();
            }
        }

        let version = current_version.next();
        entries.insert(
            basket.buyer_id.clone(),
            Entry {
                basket: basket.clone(),
                version,
                expires_at: self.ttl.map(|ttl| now + ttl),
                write_ids,
            },
        );

        Ok(StoredBasket { basket, version })
    }

    #[tracing::instrument(skip(self), fields(store = "memory"))]
    async fn delete(&self, buyer_id: &BuyerId) -> Result<bool> {
        self.check_backend().await?;
        metrics::counter!("basket_store_operations_total", "operation" => "delete").increment(1);

        let now = Instant::now();
        let removed = self.entries.write().await.remove(buyer_id);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    #[tracing::instrument(skip(self), fields(store = "memory"))]
    async fn delete_at(&self, buyer_id: &BuyerId, expected: Version) -> Result<bool> {
        self.check_backend().await?;
        metrics::counter!("basket_store_operations_total", "operation" => "delete").increment(1);

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let matches = entries
            .get(buyer_id)
            .is_some_and(|entry| entry.is_live(now) && entry.version == expected);
        if matches {
            entries.remove(buyer_id);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use common::BasketItem;

    use super::*;
    use crate::store::BasketStoreExt;

    fn buyer(id: &str) -> BuyerId {
        BuyerId::parse(id).unwrap()
    }

    fn basket_with(buyer_id: &str, products: &[i32]) -> CustomerBasket {
        let mut basket = CustomerBasket::new(buyer(buyer_id));
        for product_id in products {
            basket.items.push(BasketItem::for_product(*product_id));
        }
        basket
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryBasketStore::new();
        assert!(store.get(&buyer("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryBasketStore::new();
        let basket = basket_with("alice", &[1, 2]);

        let stored = store.upsert(basket.clone()).await.unwrap();
        assert_eq!(stored.version, Version::new(1));

        let loaded = store.get(&buyer("alice")).await.unwrap().unwrap();
        assert_eq!(loaded.basket, basket);
        assert_eq!(loaded.version, Version::new(1));
    }

    #[tokio::test]
    async fn empty_basket_is_distinct_from_missing() {
        let store = InMemoryBasketStore::new();
        store.upsert(basket_with("alice", &[])).await.unwrap();

        let loaded = store.get_basket(&buyer("alice")).await.unwrap();
        assert!(loaded.is_some_and(|b| b.is_empty()));
    }

    #[tokio::test]
    async fn unconditional_set_is_last_write_wins() {
        let store = InMemoryBasketStore::new();
        store.upsert(basket_with("alice", &[1])).await.unwrap();
        let second = store.upsert(basket_with("alice", &[2, 3])).await.unwrap();

        assert_eq!(second.version, Version::new(2));
        let loaded = store.get_basket(&buyer("alice")).await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].product_id, 2);
    }

    #[tokio::test]
    async fn conditional_set_detects_conflict() {
        let store = InMemoryBasketStore::new();
        store
            .set(basket_with("alice", &[1]), SetOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .set(basket_with("alice", &[2]), SetOptions::expect_new())
            .await;

        match result {
            Err(StoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::initial());
                assert_eq!(actual, Version::new(1));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conditional_set_with_matching_version_succeeds() {
        let store = InMemoryBasketStore::new();
        let first = store.upsert(basket_with("alice", &[1])).await.unwrap();

        let second = store
            .set(
                basket_with("alice", &[1, 2]),
                SetOptions::expect_version(first.version),
            )
            .await
            .unwrap();
        assert_eq!(second.version, Version::new(2));
    }

    #[tokio::test]
    async fn set_rejects_invalid_basket() {
        let store = InMemoryBasketStore::new();
        let result = store.upsert(basket_with("alice", &[4, 4])).await;
        assert!(matches!(result, Err(StoreError::InvalidBasket(_))));
        assert_eq!(store.basket_count().await, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryBasketStore::new();
        store.upsert(basket_with("alice", &[1])).await.unwrap();

        assert!(store.delete(&buyer("alice")).await.unwrap());
        assert!(!store.delete(&buyer("alice")).await.unwrap());
        assert!(store.get(&buyer("alice")).await.unwrap().is_none());
        assert_eq!(
            store.current_version(&buyer("alice")).await.unwrap(),
            Version::initial()
        );
    }

    #[tokio::test]
    async fn unavailable_is_distinct_from_missing() {
        let store = InMemoryBasketStore::new();
        store.set_unavailable(true);

        let err = store.get(&buyer("alice")).await.unwrap_err();
        assert!(err.is_unavailable());

        store.set_unavailable(false);
        assert!(store.get(&buyer("alice")).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_baskets_read_as_missing() {
        let store = InMemoryBasketStore::with_ttl(Duration::from_secs(60));
        store.upsert(basket_with("alice", &[1])).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.get(&buyer("alice")).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get(&buyer("alice")).await.unwrap().is_none());
        assert_eq!(store.basket_count().await, 0);

        // An expired basket counts as absent for conditional writes.
        let stored = store
            .set(basket_with("alice", &[2]), SetOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(stored.version, Version::new(1));
    }

    #[tokio::test]
    async fn baskets_are_isolated_per_buyer() {
        let store = InMemoryBasketStore::new();
        store.upsert(basket_with("alice", &[1])).await.unwrap();
        store.upsert(basket_with("bob", &[2])).await.unwrap();

        store.delete(&buyer("alice")).await.unwrap();
        assert!(store.get(&buyer("bob")).await.unwrap().is_some());
        assert_eq!(store.basket_count().await, 1);
    }

    #[tokio::test]
    async fn resent_write_is_recognised_by_its_id() {
        let store = InMemoryBasketStore::new();
        let options = SetOptions::expect_new().with_write_id("w-1");

        let first = store
            .set(basket_with("alice", &[1]), options.clone())
            .await
            .unwrap();
        // Someone else writes after us; the resent copy must still not apply.
        store.upsert(basket_with("alice", &[1, 2])).await.unwrap();

        let replayed = store
            .set(basket_with("alice", &[1]), options)
            .await
            .unwrap();
        assert_eq!(first.version, Version::new(1));
        assert_eq!(replayed.version, Version::new(2));
        assert_eq!(replayed.basket.items.len(), 2);

        let other = store
            .set(
                basket_with("alice", &[3]),
                SetOptions::expect_new().with_write_id("w-2"),
            )
            .await;
        assert!(matches!(other, Err(StoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn delete_at_only_removes_the_expected_version() {
        let store = InMemoryBasketStore::new();
        let first = store.upsert(basket_with("alice", &[1])).await.unwrap();
        store.upsert(basket_with("alice", &[1, 2])).await.unwrap();

        assert!(!store.delete_at(&buyer("alice"), first.version).await.unwrap());
        assert!(store.get(&buyer("alice")).await.unwrap().is_some());

        assert!(store.delete_at(&buyer("alice"), Version::new(2)).await.unwrap());
        assert!(store.get(&buyer("alice")).await.unwrap().is_none());
        assert!(!store.delete_at(&buyer("alice"), Version::new(2)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_purge_expired_baskets() {
        let store = InMemoryBasketStore::with_ttl(Duration::from_secs(60));
        store.upsert(basket_with("alice", &[1])).await.unwrap();
        store.upsert(basket_with("bob", &[1])).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        store.upsert(basket_with("carol", &[1])).await.unwrap();

        assert_eq!(store.entries.read().await.len(), 1);
        assert_eq!(store.purge_expired().await, 0);
    }
}
