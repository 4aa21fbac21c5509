//! Catalog items and pages as served to callers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product in the catalog. Read-only from this crate's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub picture_uri: Option<String>,
    /// File under the images directory; never sent over the wire.
    #[serde(skip)]
    pub picture_file_name: String,
    pub catalog_brand_id: i32,
    pub catalog_brand: String,
    pub catalog_type_id: i32,
    pub catalog_type: String,
}

impl CatalogItem {
    /// Route at which the item's image is served.
    pub fn image_path(id: i32) -> String {
        format!("/api/v1/catalog/items/{id}/image")
    }
}

/// One page of a keyset-paginated listing.
///
/// `first_id` and `next_id` are the ids of the first and last item on the
/// page, or 0 when the page is empty. `next_id` is the `after` cursor of
/// the following page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub first_id: i32,
    pub next_id: i32,
    pub is_last_page: bool,
    pub data: Vec<CatalogItem>,
}

impl CatalogPage {
    /// Builds a page from the rows fetched for a request of `page_size`.
    ///
    /// `items` must already be in ascending id order and hold at most
    /// `page_size` rows.
    pub fn assemble(items: Vec<CatalogItem>, page_size: usize) -> Self {
        let (first_id, next_id) = match items.as_slice() {
            [] => (0, 0),
            [only] => (only.id, only.id),
            [first, .., last] => (first.id, last.id),
        };

        Self {
            first_id,
            next_id,
            is_last_page: items.len() < page_size,
            data: items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_item(id: i32, brand_id: i32) -> CatalogItem {
    CatalogItem {
        id,
        name: format!("Item {id}"),
        description: String::new(),
        price: Decimal::new(i64::from(id) * 100, 2),
        picture_uri: Some(CatalogItem::image_path(id)),
        picture_file_name: format!("{id}.jpg"),
        catalog_brand_id: brand_id,
        catalog_brand: format!("Brand {brand_id}"),
        catalog_type_id: 1,
        catalog_type: "T-Shirt".to_string(),
    }
}
