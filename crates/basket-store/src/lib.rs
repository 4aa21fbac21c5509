//! Basket persistence keyed by buyer id.
//!
//! Stores hold exactly one entity kind: a buyer's basket. Writes are full
//! replacements. Every write bumps a per-basket [`Version`], which callers
//! may use for compare-and-swap updates through [`SetOptions`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{BuyerId, CustomerBasket, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryBasketStore;
pub use postgres::PostgresBasketStore;
pub use store::{BasketStore, BasketStoreExt, SetOptions, StoredBasket};
