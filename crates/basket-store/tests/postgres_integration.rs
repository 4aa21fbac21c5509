//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p basket-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use basket_store::{
    BasketStore, BasketStoreExt, BuyerId, CustomerBasket, PostgresBasketStore, SetOptions,
    StoreError, Version,
};
use common::BasketItem;
use rust_decimal::Decimal;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_baskets_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/003_add_basket_write_ids.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresBasketStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE baskets")
        .execute(&pool)
        .await
        .unwrap();

    PostgresBasketStore::new(pool)
}

fn buyer(id: &str) -> BuyerId {
    BuyerId::parse(id).unwrap()
}

fn basket_with(buyer_id: &str, products: &[i32]) -> CustomerBasket {
    let mut basket = CustomerBasket::new(buyer(buyer_id));
    for product_id in products {
        let mut item = BasketItem::for_product(*product_id);
        item.unit_price = Decimal::new(1999, 2);
        basket.items.push(item);
    }
    basket
}

#[tokio::test]
async fn set_and_get_basket() {
    let store = get_test_store().await;
    let basket = basket_with("alice", &[1, 2]);

    let stored = store.upsert(basket.clone()).await.unwrap();
    assert_eq!(stored.version, Version::new(1));

    let loaded = store.get(&buyer("alice")).await.unwrap().unwrap();
    assert_eq!(loaded.basket.buyer_id, basket.buyer_id);
    assert_eq!(loaded.basket.items.len(), 2);
    assert_eq!(loaded.basket.items[0].id, basket.items[0].id);
    assert_eq!(loaded.basket.items[0].unit_price, Decimal::new(1999, 2));
    assert_eq!(loaded.version, Version::new(1));
}

#[tokio::test]
async fn missing_basket_returns_none() {
    let store = get_test_store().await;
    assert!(store.get(&buyer("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn unconditional_writes_bump_version() {
    let store = get_test_store().await;

    store.upsert(basket_with("alice", &[1])).await.unwrap();
    let second = store.upsert(basket_with("alice", &[2])).await.unwrap();
    assert_eq!(second.version, Version::new(2));

    let loaded = store.get_basket(&buyer("alice")).await.unwrap().unwrap();
    assert_eq!(loaded.items[0].product_id, 2);
}

#[tokio::test]
async fn expect_new_conflicts_with_existing_basket() {
    let store = get_test_store().await;

    store
        .set(basket_with("alice", &[1]), SetOptions::expect_new())
        .await
        .unwrap();
    let result = store
        .set(basket_with("alice", &[2]), SetOptions::expect_new())
        .await;

    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
    ));
}

#[tokio::test]
async fn expect_version_conflicts_on_stale_version() {
    let store = get_test_store().await;

    let first = store.upsert(basket_with("alice", &[1])).await.unwrap();
    store.upsert(basket_with("alice", &[1, 2])).await.unwrap();

    let result = store
        .set(
            basket_with("alice", &[3]),
            SetOptions::expect_version(first.version),
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { .. })
    ));

    let fresh = store
        .set(
            basket_with("alice", &[3]),
            SetOptions::expect_version(Version::new(2)),
        )
        .await
        .unwrap();
    assert_eq!(fresh.version, Version::new(3));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = get_test_store().await;
    store.upsert(basket_with("alice", &[1])).await.unwrap();

    assert!(store.delete(&buyer("alice")).await.unwrap());
    assert!(!store.delete(&buyer("alice")).await.unwrap());
    assert!(store.get(&buyer("alice")).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_basket_reads_as_missing() {
    let store = get_test_store().await.with_ttl(Duration::from_millis(200));
    store.upsert(basket_with("alice", &[1])).await.unwrap();
    assert!(store.get(&buyer("alice")).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.get(&buyer("alice")).await.unwrap().is_none());

    let stored = store
        .set(basket_with("alice", &[2]), SetOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(stored.version, Version::new(1));
}

#[tokio::test]
async fn closed_pool_reports_unavailable() {
    let store = get_test_store().await;
    store.pool().close().await;

    let err = store.get(&buyer("alice")).await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn resent_write_is_applied_once() {
    let store = get_test_store().await;
    let options = SetOptions::expect_new().with_write_id("w-1");

    store
        .set(basket_with("alice", &[1]), options.clone())
        .await
        .unwrap();
    store.upsert(basket_with("alice", &[1, 2])).await.unwrap();

    let replayed = store.set(basket_with("alice", &[1]), options).await.unwrap();
    assert_eq!(replayed.version, Version::new(2));
    assert_eq!(replayed.basket.items.len(), 2);

    let result = store
        .set(
            basket_with("alice", &[9]),
            SetOptions::expect_version(Version::new(1)).with_write_id("w-2"),
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { .. })
    ));
}

#[tokio::test]
async fn delete_at_checks_version() {
    let store = get_test_store().await;
    let first = store.upsert(basket_with("alice", &[1])).await.unwrap();
    let second = store.upsert(basket_with("alice", &[1, 2])).await.unwrap();

    let buyer = BuyerId::parse("alice").unwrap();
    assert!(!store.delete_at(&buyer, first.version).await.unwrap());
    assert!(store.get(&buyer).await.unwrap().is_some());
    assert!(store.delete_at(&buyer, second.version).await.unwrap());
    assert!(store.get(&buyer).await.unwrap().is_none());
}
