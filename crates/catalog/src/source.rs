//! Where catalog items come from.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{CatalogError, Result};
use crate::item::CatalogItem;
use crate::paging::Cursor;

/// Read access to the catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches up to `limit` items starting at `cursor`, optionally
    /// restricted to one brand, in ascending id order.
    ///
    /// For [`Cursor::Before`] the rows are the `limit` highest ids below
    /// the cursor.
    async fn fetch_page(
        &self,
        brand_id: Option<i32>,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<CatalogItem>>;

    /// Looks up a single item.
    async fn find_item(&self, id: i32) -> Result<Option<CatalogItem>>;
}

#[async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for Arc<T> {
    async fn fetch_page(
        &self,
        brand_id: Option<i32>,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        (**self).fetch_page(brand_id, cursor, limit).await
    }

    async fn find_item(&self, id: i32) -> Result<Option<CatalogItem>> {
        (**self).find_item(id).await
    }
}

/// In-memory catalog, kept sorted by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<Vec<CatalogItem>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    pub fn new(mut items: Vec<CatalogItem>) -> Self {
        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);
        Self {
            items: Arc::new(items),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A small demo catalog.
    pub fn seeded() -> Self {
        const BRANDS: [(i32, &str); 3] = [(1, "Daybreak"), (2, "Gravel"), (3, "Alpine Works")];
        const TYPES: [(i32, &str); 3] = [(1, "Jacket"), (2, "Backpack"), (3, "Boots")];
        const PRODUCTS: [(&str, &str, i64, usize, usize); 12] = [
            ("Trail Shell", "Lightweight waterproof shell", 12900, 0, 0),
            ("Summit Parka", "Insulated parka for cold summits", 24900, 2, 0),
            ("Ridge Daypack", "22L pack with hip belt", 8900, 1, 1),
            ("Canyon Hauler", "45L pack for multi-day trips", 17900, 1, 1),
            ("Scree Runner", "Low-cut approach shoe", 11900, 1, 2),
            ("Glacier Boot", "Crampon-compatible mountaineering boot", 32900, 2, 2),
            ("Fleece Midlayer", "Grid fleece for layering", 6900, 0, 0),
            ("Rain Poncho", "Packable poncho that covers a pack", 3900, 0, 0),
            ("Hydration Vest", "Running vest with two soft flasks", 9900, 1, 1),
            ("Winter Hiker", "Insulated hiking boot", 18900, 2, 2),
            ("Wind Shirt", "Breathable wind layer", 7900, 0, 0),
            ("Approach Sling", "Minimal sling bag for the crag", 4900, 2, 1),
        ];

        let items = PRODUCTS
            .iter()
            .zip(1..)
            .map(|(&(name, description, cents, brand, kind), id)| CatalogItem {
                id,
                name: name.to_string(),
                description: description.to_string(),
                price: Decimal::new(cents, 2),
                picture_uri: Some(CatalogItem::image_path(id)),
                picture_file_name: format!("{id}.jpg"),
                catalog_brand_id: BRANDS[brand].0,
                catalog_brand: BRANDS[brand].1.to_string(),
                catalog_type_id: TYPES[kind].0,
                catalog_type: TYPES[kind].1.to_string(),
            })
            .collect();

        Self::new(items)
    }

    /// Makes every subsequent read fail as if the catalog were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check_backend(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(
                "in-memory catalog marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn fetch_page(
        &self,
        brand_id: Option<i32>,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        self.check_backend()?;

        let matches = self
            .items
            .iter()
            .filter(|item| brand_id.is_none_or(|brand| item.catalog_brand_id == brand));

        let page = match cursor {
            Cursor::First => matches.take(limit).cloned().collect(),
            Cursor::After(after) => matches
                .filter(|item| item.id > after)
                .take(limit)
                .cloned()
                .collect(),
            Cursor::Before(before) => {
                let mut page: Vec<CatalogItem> = matches
                    .rev()
                    .filter(|item| item.id < before)
                    .take(limit)
                    .cloned()
                    .collect();
                page.reverse();
                page
            }
        };

        Ok(page)
    }

    async fn find_item(&self, id: i32) -> Result<Option<CatalogItem>> {
        self.check_backend()?;
        Ok(self
            .items
            .binary_search_by_key(&id, |item| item.id)
            .ok()
            .and_then(|index| self.items.get(index))
            .cloned())
    }
}
