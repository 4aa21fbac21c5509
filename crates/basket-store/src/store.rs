use async_trait::async_trait;

use crate::{BuyerId, CustomerBasket, Result, Version};

/// How many recent write ids a store remembers per basket.
pub const RECENT_WRITE_IDS: usize = 16;

/// Options for writing a basket to the store.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Expected current version for optimistic concurrency control.
    /// If None, the write replaces whatever is stored (last write wins).
    pub expected_version: Option<Version>,
    /// Caller-chosen id of this logical write.
    ///
    /// A conditional write whose id is among the basket's recent write ids
    /// has already been applied; the store returns the current basket
    /// instead of a conflict.
    pub write_id: Option<String>,
}

impl SetOptions {
    /// Creates options for an unconditional write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the basket to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
            write_id: None,
        }
    }

    /// Creates options expecting the basket to not exist.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
            write_id: None,
        }
    }

    /// Tags the write with an id so a resent copy is recognised.
    #[must_use]
    pub fn with_write_id(mut self, write_id: impl Into<String>) -> Self {
        self.write_id = Some(write_id.into());
        self
    }
}

/// A basket as held by the store, together with its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBasket {
    pub basket: CustomerBasket,
    pub version: Version,
}

/// Core trait for basket store implementations.
///
/// Implementations must report an unreachable backend as
/// [`StoreError::Unavailable`](crate::StoreError::Unavailable), never as a
/// missing basket.
#[async_trait]
pub trait BasketStore: Send + Sync {
    /// Loads the basket for a buyer.
    ///
    /// Returns None if no basket is stored or it has expired.
    async fn get(&self, buyer_id: &BuyerId) -> Result<Option<StoredBasket>>;

    /// Writes the full basket under its buyer id, replacing any stored value.
    ///
    /// If `options.expected_version` is set, the write fails with
    /// `ConcurrencyConflict` when the stored version differs.
    /// Returns the basket as persisted with its new version.
    async fn set(&self, basket: CustomerBasket, options: SetOptions) -> Result<StoredBasket>;

    /// Removes the basket for a buyer.
    ///
    /// Returns whether a basket was removed; deleting a missing basket is
    /// not an error.
    async fn delete(&self, buyer_id: &BuyerId) -> Result<bool>;

    /// Removes the basket only if it is still at `expected`.
    ///
    /// Returns false, leaving the stored basket untouched, when it is
    /// missing or at another version.
    async fn delete_at(&self, buyer_id: &BuyerId, expected: Version) -> Result<bool>;
}

/// Extension trait providing convenience methods for basket stores.
#[async_trait]
pub trait BasketStoreExt: BasketStore {
    /// Loads only the basket, dropping its version.
    async fn get_basket(&self, buyer_id: &BuyerId) -> Result<Option<CustomerBasket>> {
        Ok(self.get(buyer_id).await?.map(|stored| stored.basket))
    }

    /// Writes the basket unconditionally.
    async fn upsert(&self, basket: CustomerBasket) -> Result<StoredBasket> {
        self.set(basket, SetOptions::new()).await
    }

    /// Returns the current version, or [`Version::initial`] if absent.
    async fn current_version(&self, buyer_id: &BuyerId) -> Result<Version> {
        Ok(self
            .get(buyer_id)
            .await?
            .map(|stored| stored.version)
            .unwrap_or_else(Version::initial))
    }
}

// Blanket implementation for all BasketStore implementations
impl<T: BasketStore + ?Sized> BasketStoreExt for T {}
