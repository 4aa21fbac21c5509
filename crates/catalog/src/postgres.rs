use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::Result;
use crate::item::CatalogItem;
use crate::paging::Cursor;
use crate::source::CatalogSource;

const ITEM_COLUMNS: &str = r#"
    SELECT i.id, i.name, i.description, i.price, i.picture_file_name,
           i.catalog_brand_id, b.brand, i.catalog_type_id, t.type
    FROM catalog_items i
    JOIN catalog_brands b ON b.id = i.catalog_brand_id
    JOIN catalog_types t ON t.id = i.catalog_type_id
"#;

/// PostgreSQL-backed catalog source.
///
/// Pages are keyset queries on `catalog_items.id`; the `(catalog_brand_id,
/// id)` index serves the brand-filtered variant.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_item(row: PgRow) -> Result<CatalogItem> {
        let id: i32 = row.try_get("id")?;
        Ok(CatalogItem {
            id,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            picture_uri: Some(CatalogItem::image_path(id)),
            picture_file_name: row.try_get("picture_file_name")?,
            catalog_brand_id: row.try_get("catalog_brand_id")?,
            catalog_brand: row.try_get("brand")?,
            catalog_type_id: row.try_get("catalog_type_id")?,
            catalog_type: row.try_get("type")?,
        })
    }
}

#[async_trait]
impl CatalogSource for PostgresCatalog {
    #[tracing::instrument(skip(self), fields(source = "postgres"))]
    async fn fetch_page(
        &self,
        brand_id: Option<i32>,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        let (before, after, order) = match cursor {
            Cursor::First => (None, None, "ASC"),
            Cursor::After(after) => (None, Some(after), "ASC"),
            Cursor::Before(before) => (Some(before), None, "DESC"),
        };

        let sql = format!(
            r#"
            {ITEM_COLUMNS}
            WHERE ($1::INTEGER IS NULL OR i.catalog_brand_id = $1)
              AND ($2::INTEGER IS NULL OR i.id < $2)
              AND ($3::INTEGER IS NULL OR i.id > $3)
            ORDER BY i.id {order}
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(brand_id)
            .bind(before)
            .bind(after)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut items = rows
            .into_iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;

        if matches!(cursor, Cursor::Before(_)) {
            items.reverse();
        }

        Ok(items)
    }

    #[tracing::instrument(skip(self), fields(source = "postgres"))]
    async fn find_item(&self, id: i32) -> Result<Option<CatalogItem>> {
        let sql = format!("{ITEM_COLUMNS} WHERE i.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_item).transpose()
    }
}
