use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::BasketItem;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    BuyerId, CustomerBasket, Result, StoreError, Version,
    store::{BasketStore, RECENT_WRITE_IDS, SetOptions, StoredBasket},
};

/// PostgreSQL-backed basket store.
///
/// Each basket is one row keyed by buyer id, with its items held as JSONB.
/// Rows past their `expires_at` are treated as absent and lazily replaced.
#[derive(Clone)]
pub struct PostgresBasketStore {
    pool: PgPool,
    ttl: Option<Duration>,
}

impl PostgresBasketStore {
    /// Creates a new PostgreSQL basket store whose baskets never expire.
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ttl: None }
    }

    /// Sets the expiry applied to every write.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(self.ttl?).ok()?;
        Utc::now().checked_add_signed(ttl)
    }

    fn row_to_basket(row: PgRow) -> Result<StoredBasket> {
        let buyer_id: String = row.try_get("buyer_id")?;
        let buyer_id = BuyerId::parse(buyer_id).map_err(|e| {
            StoreError::Serialization(serde_json::Error::io(std::io::Error::other(e)))
        })?;
        let items: Vec<BasketItem> = serde_json::from_value(row.try_get("items")?)?;

        Ok(StoredBasket {
            basket: CustomerBasket { buyer_id, items },
            version: Version::new(row.try_get("version")?),
        })
    }

    /// Loads the live row after a conditional write matched nothing, noting
    /// whether `write_id` was already applied to it.
    async fn after_conflict(
        &self,
        buyer_id: &BuyerId,
        write_id: Option<&str>,
    ) -> Result<Option<(StoredBasket, bool)>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT buyer_id, items, version,
                   ($2::TEXT IS NOT NULL AND $2::TEXT = ANY(write_ids)) AS applied
            FROM baskets
            WHERE buyer_id = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(buyer_id.as_str())
        .bind(write_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<(StoredBasket, bool)> {
            let applied: bool = row.try_get("applied")?;
            Ok((Self::row_to_basket(row)?, applied))
        })
        .transpose()
    }
}

#[async_trait]
impl BasketStore for PostgresBasketStore {
    #[tracing::instrument(skip(self), fields(store = "postgres"))]
    async fn get(&self, buyer_id: &BuyerId) -> Result<Option<StoredBasket>> {
        metrics::counter!("basket_store_operations_total", "operation" => "get").increment(1);

        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT buyer_id, items, version
            FROM baskets
            WHERE buyer_id = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(buyer_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_basket).transpose()
    }

    #[tracing::instrument(skip(self, basket), fields(store = "postgres", buyer_id = %basket.buyer_id))]
    async fn set(&self, basket: CustomerBasket, options: SetOptions) -> Result<StoredBasket> {
        basket.validate()?;
        metrics::counter!("basket_store_operations_total", "operation" => "set").increment(1);

        let items = serde_json::to_value(&basket.items)?;
        let expires_at = self.expires_at();
        let write_ids: Vec<String> = options.write_id.iter().cloned().collect();
        let keep = i32::try_from(RECENT_WRITE_IDS).unwrap_or(i32::MAX);

        // Expired rows restart at version 1, as if the basket had been deleted.
        let new_version: Option<i64> = match options.expected_version {
            None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO baskets (buyer_id, items, version, expires_at, write_ids, updated_at)
                    VALUES ($1, $2, 1, $3, $4, now())
                    ON CONFLICT (buyer_id) DO UPDATE SET
                        items = EXCLUDED.items,
                        version = CASE
                            WHEN baskets.expires_at IS NOT NULL AND baskets.expires_at <= now() THEN 1
                            ELSE baskets.version + 1
                        END,
                        write_ids = recent_write_ids(
                            CASE
                                WHEN baskets.expires_at IS NOT NULL AND baskets.expires_at <= now() THEN '{}'::TEXT[]
                                ELSE baskets.write_ids
                            END,
                            EXCLUDED.write_ids,
                            $5
                        ),
                        expires_at = EXCLUDED.expires_at,
                        updated_at = now()
                    RETURNING version
                    "#,
                )
                .bind(basket.buyer_id.as_str())
                .bind(&items)
                .bind(expires_at)
                .bind(&write_ids)
                .bind(keep)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) if expected == Version::initial() => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO baskets (buyer_id, items, version, expires_at, write_ids, updated_at)
                    VALUES ($1, $2, 1, $3, $4, now())
                    ON CONFLICT (buyer_id) DO UPDATE SET
                        items = EXCLUDED.items,
                        version = 1,
                        write_ids = EXCLUDED.write_ids,
                        expires_at = EXCLUDED.expires_at,
                        updated_at = now()
                    WHERE baskets.expires_at IS NOT NULL AND baskets.expires_at <= now()
                    RETURNING version
                    "#,
                )
                .bind(basket.buyer_id.as_str())
                .bind(&items)
                .bind(expires_at)
                .bind(&write_ids)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE baskets SET
                        items = $2,
                        version = version + 1,
                        write_ids = recent_write_ids(write_ids, $5, $6),
                        expires_at = $3,
                        updated_at = now()
                    WHERE buyer_id = $1
                        AND version = $4
                        AND (expires_at IS NULL OR expires_at > now())
                    RETURNING version
                    "#,
                )
                .bind(basket.buyer_id.as_str())
                .bind(&items)
                .bind(expires_at)
                .bind(expected.as_i64())
                .bind(&write_ids)
                .bind(keep)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        if let Some(version) = new_version {
            return Ok(StoredBasket {
                basket,
                version: Version::new(version),
            });
        }

        let current = self
            .after_conflict(&basket.buyer_id, options.write_id.as_deref())
            .await?;
        match current {
            Some((stored, true)) => {
                tracing::debug!(version = %stored.version, "write already applied");
                Ok(stored)
            }
            current => Err(StoreError::ConcurrencyConflict {
                buyer_id: basket.buyer_id,
                expected: options.expected_version.unwrap_or_else(Version::initial),
                actual: current
                    .map(|(stored, _)| stored.version)
                    .unwrap_or_else(Version::initial),
            }),
        }
    }

    #[tracing::instrument(skip(self), fields(store = "postgres"))]
    async fn delete(&self, buyer_id: &BuyerId) -> Result<bool> {
        metrics::counter!("basket_store_operations_total", "operation" => "delete").increment(1);

        let removed: Option<bool> = sqlx::query_scalar(
            r#"
            DELETE FROM baskets WHERE buyer_id = $1
            RETURNING (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(buyer_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(removed.unwrap_or(false))
    }

    #[tracing::instrument(skip(self), fields(store = "postgres"))]
    async fn delete_at(&self, buyer_id: &BuyerId, expected: Version) -> Result<bool> {
        metrics::counter!("basket_store_operations_total", "operation" => "delete").increment(1);

        let removed: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM baskets
            WHERE buyer_id = $1
                AND version = $2
                AND (expires_at IS NULL OR expires_at > now())
            RETURNING buyer_id
            "#,
        )
        .bind(buyer_id.as_str())
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(removed.is_some())
    }
}
