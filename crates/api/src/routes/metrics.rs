//! Prometheus metrics endpoint and metric descriptions.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter};
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for the counters emitted across the workspace.
pub fn describe() {
    describe_counter!(
        "basket_store_operations_total",
        Unit::Count,
        "Basket store operations by operation"
    );
    describe_counter!(
        "basket_rpc_requests_total",
        Unit::Count,
        "Basket RPC calls by method and status code"
    );
    describe_counter!(
        "basket_checkouts_total",
        Unit::Count,
        "Checkouts that placed an order"
    );
    describe_counter!(
        "basket_client_events_total",
        Unit::Count,
        "Basket client events by kind"
    );
    describe_counter!(
        "basket_client_unavailable_total",
        Unit::Count,
        "Basket lookups degraded to unavailable"
    );
    describe_counter!(
        "catalog_pages_served_total",
        Unit::Count,
        "Catalog pages assembled"
    );
}

/// GET /metrics
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
