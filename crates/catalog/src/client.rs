//! Caller-side access to the catalog: single pages and full walks.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::{Client, Url};

use crate::error::{CatalogError, Result};
use crate::item::{CatalogItem, CatalogPage};
use crate::paging::{Cursor, PageParams};
use crate::routes::CatalogState;
use crate::source::CatalogSource;

/// A lazy sequence of catalog pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<CatalogPage>> + Send + 'a>>;

/// Fetches one page of the catalog listing.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_page(&self, brand_id: Option<i32>, cursor: Cursor) -> Result<CatalogPage>;
}

#[async_trait]
impl<T: CatalogApi + ?Sized> CatalogApi for Arc<T> {
    async fn get_page(&self, brand_id: Option<i32>, cursor: Cursor) -> Result<CatalogPage> {
        (**self).get_page(brand_id, cursor).await
    }
}

/// Serves pages straight from the route state, without HTTP.
#[async_trait]
impl<C: CatalogSource> CatalogApi for CatalogState<C> {
    async fn get_page(&self, brand_id: Option<i32>, cursor: Cursor) -> Result<CatalogPage> {
        let (before, after) = match cursor {
            Cursor::First => (None, None),
            Cursor::Before(id) => (Some(id), None),
            Cursor::After(id) => (None, Some(id)),
        };
        let params = PageParams {
            before,
            after,
            page_size: None,
        };
        self.page(brand_id, &params).await
    }
}

/// HTTP client for the catalog listing routes.
#[derive(Debug, Clone)]
pub struct HttpCatalogApi {
    http: Client,
    base_url: Url,
}

impl HttpCatalogApi {
    /// Creates a client for the catalog service at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::InvalidUrl(format!("'{base_url}': {e}")))?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn listing_url(&self, brand_id: Option<i32>) -> Result<Url> {
        let path = match brand_id {
            Some(brand_id) => format!("/api/v1/catalog/items/type/all/brand/{brand_id}"),
            None => "/api/v1/catalog/items/type/all".to_string(),
        };
        self.base_url
            .join(&path)
            .map_err(|e| CatalogError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    async fn get_page(&self, brand_id: Option<i32>, cursor: Cursor) -> Result<CatalogPage> {
        let response = self
            .http
            .get(self.listing_url(brand_id)?)
            .query(&cursor.query_pairs())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::UnexpectedResponse { status, body });
        }

        Ok(response.json().await?)
    }
}

/// Result of walking the whole catalog.
///
/// `error` is set when the walk stopped early; `items` then holds what was
/// collected before the failure.
#[derive(Debug, Default)]
pub struct CatalogWalk {
    pub items: Vec<CatalogItem>,
    pub error: Option<CatalogError>,
}

impl CatalogWalk {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

enum WalkState {
    Next(Cursor),
    Done,
}

/// Caller-facing catalog client.
pub struct CatalogServiceClient<A: CatalogApi> {
    api: A,
}

impl CatalogServiceClient<HttpCatalogApi> {
    pub fn connect(base_url: &str) -> Result<Self> {
        Ok(Self::new(HttpCatalogApi::new(base_url)?))
    }
}

impl<A: CatalogApi> CatalogServiceClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Fetches one page. Supplying both cursors is rejected without a call.
    pub async fn get_items(&self, before: Option<i32>, after: Option<i32>) -> Result<CatalogPage> {
        let cursor = Cursor::from_bounds(before, after)?;
        self.api.get_page(None, cursor).await
    }

    /// Fetches one page of a brand's items.
    pub async fn get_brand_items(
        &self,
        brand_id: i32,
        before: Option<i32>,
        after: Option<i32>,
    ) -> Result<CatalogPage> {
        let cursor = Cursor::from_bounds(before, after)?;
        self.api.get_page(Some(brand_id), cursor).await
    }

    /// Lazily walks the catalog forward from the first page.
    ///
    /// The stream ends after the last page, after a page with no items, or
    /// right after yielding the first error. Each call starts a fresh walk.
    pub fn pages(&self, brand_id: Option<i32>) -> PageStream<'_> {
        Box::pin(stream::unfold(
            WalkState::Next(Cursor::First),
            move |state| async move {
                let WalkState::Next(cursor) = state else {
                    return None;
                };

                match self.api.get_page(brand_id, cursor).await {
                    Ok(page) => {
                        let next = if page.is_last_page || page.is_empty() {
                            WalkState::Done
                        } else {
                            WalkState::Next(Cursor::After(page.next_id))
                        };
                        Some((Ok(page), next))
                    }
                    Err(e) => Some((Err(e), WalkState::Done)),
                }
            },
        ))
    }

    /// Collects every item by walking all pages.
    ///
    /// Never fails: an error ends the walk and is reported in
    /// [`CatalogWalk::error`] next to the items gathered so far.
    pub async fn get_all_items(&self) -> CatalogWalk {
        self.walk(None).await
    }

    /// Collects every item of one brand.
    pub async fn get_all_brand_items(&self, brand_id: i32) -> CatalogWalk {
        self.walk(Some(brand_id)).await
    }

    async fn walk(&self, brand_id: Option<i32>) -> CatalogWalk {
        let mut walk = CatalogWalk::default();
        let mut pages = self.pages(brand_id);

        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => walk.items.extend(page.data),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        collected = walk.items.len(),
                        "catalog walk stopped early"
                    );
                    walk.error = Some(e);
                }
            }
        }

        walk
    }
}
