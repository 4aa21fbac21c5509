//! Catalog HTTP endpoints under `/api/v1/catalog`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{CatalogError, Result};
use crate::item::CatalogPage;
use crate::paging::{PageParams, PageRequest, PagingConfig};
use crate::source::CatalogSource;

/// Shared state of the catalog routes.
pub struct CatalogState<C: CatalogSource> {
    pub source: C,
    pub images_dir: PathBuf,
    pub paging: PagingConfig,
}

impl<C: CatalogSource> CatalogState<C> {
    pub fn new(source: C, images_dir: impl Into<PathBuf>, paging: PagingConfig) -> Self {
        Self {
            source,
            images_dir: images_dir.into(),
            paging,
        }
    }

    /// Validates a request and assembles the page.
    pub async fn page(&self, brand_id: Option<i32>, params: &PageParams) -> Result<CatalogPage> {
        let request = PageRequest::parse(brand_id, params, &self.paging)?;
        let items = self
            .source
            .fetch_page(request.brand_id, request.cursor, request.page_size)
            .await?;
        let page = CatalogPage::assemble(items, request.page_size);

        metrics::counter!("catalog_pages_served_total").increment(1);
        tracing::debug!(
            brand_id = ?request.brand_id,
            cursor = ?request.cursor,
            page_size = request.page_size,
            returned = page.data.len(),
            is_last_page = page.is_last_page,
            "catalog page served"
        );

        Ok(page)
    }
}

/// Creates the router serving the catalog endpoints.
pub fn catalog_router<C: CatalogSource + 'static>(state: Arc<CatalogState<C>>) -> Router {
    Router::new()
        .route("/api/v1/catalog/items/type/all", get(list_items::<C>))
        .route(
            "/api/v1/catalog/items/type/all/brand/{brand_id}",
            get(list_brand_items::<C>),
        )
        .route("/api/v1/catalog/items/{id}/image", get(item_image::<C>))
        .with_state(state)
}

/// GET /api/v1/catalog/items/type/all
async fn list_items<C: CatalogSource + 'static>(
    State(state): State<Arc<CatalogState<C>>>,
    Query(params): Query<PageParams>,
) -> Result<Json<CatalogPage>> {
    state.page(None, &params).await.map(Json)
}

/// GET /api/v1/catalog/items/type/all/brand/{brand_id}
async fn list_brand_items<C: CatalogSource + 'static>(
    State(state): State<Arc<CatalogState<C>>>,
    Path(brand_id): Path<i32>,
    Query(params): Query<PageParams>,
) -> Result<Json<CatalogPage>> {
    state.page(Some(brand_id), &params).await.map(Json)
}

/// GET /api/v1/catalog/items/{id}/image
async fn item_image<C: CatalogSource + 'static>(
    State(state): State<Arc<CatalogState<C>>>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let Some(item) = state.source.find_item(id).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    // File names come from the catalog; refuse anything that would leave
    // the images directory.
    let file_name = std::path::Path::new(&item.picture_file_name);
    if item.picture_file_name.is_empty()
        || file_name.components().count() != 1
        || file_name.file_name().is_none()
    {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    match tokio::fs::read(state.images_dir.join(file_name)).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(e) => Err(CatalogError::Io(e)),
    }
}
