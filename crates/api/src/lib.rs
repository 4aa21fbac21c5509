//! HTTP server hosting the basket RPC surface and the catalog API.
//!
//! Serves the `basket.Basket` methods, the catalog listing and image
//! routes, and Prometheus metrics from one axum router, with structured
//! logging (tracing) on every request.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use basket_service::{BasketRpc, BasketService, InMemoryOrderPlacement, rpc_router};
use basket_store::{InMemoryBasketStore, PostgresBasketStore};
use catalog::{CatalogSource, CatalogState, InMemoryCatalog, PostgresCatalog, catalog_router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

/// Basket service over the in-memory store.
pub type InMemoryBasketService = BasketService<InMemoryBasketStore, InMemoryOrderPlacement>;

/// Basket service over PostgreSQL.
pub type PostgresBasketService = BasketService<PostgresBasketStore, InMemoryOrderPlacement>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, C>(
    basket: Arc<R>,
    catalog: Arc<CatalogState<C>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    R: BasketRpc + 'static,
    C: CatalogSource + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .merge(rpc_router(basket))
        .merge(catalog_router(catalog))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds services backed by in-memory stores and the demo catalog.
pub fn in_memory_services(
    config: &Config,
) -> (Arc<InMemoryBasketService>, Arc<CatalogState<InMemoryCatalog>>) {
    let store = match config.basket_ttl {
        Some(ttl) => InMemoryBasketStore::with_ttl(ttl),
        None => InMemoryBasketStore::new(),
    };
    let basket = Arc::new(BasketService::new(store, InMemoryOrderPlacement::new()));
    let catalog = Arc::new(CatalogState::new(
        InMemoryCatalog::seeded(),
        config.images_dir.clone(),
        config.paging,
    ));
    (basket, catalog)
}

/// Connects to PostgreSQL, runs migrations and builds services on it.
pub async fn postgres_services(
    config: &Config,
    database_url: &str,
) -> Result<(Arc<PostgresBasketService>, Arc<CatalogState<PostgresCatalog>>), StartupError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    let mut store = PostgresBasketStore::new(pool.clone());
    if let Some(ttl) = config.basket_ttl {
        store = store.with_ttl(ttl);
    }
    store.run_migrations().await?;

    let basket = Arc::new(BasketService::new(store, InMemoryOrderPlacement::new()));
    let catalog = Arc::new(CatalogState::new(
        PostgresCatalog::new(pool),
        config.images_dir.clone(),
        config.paging,
    ));
    Ok((basket, catalog))
}
