//! HTTP binding of the RPC surface.
//!
//! Each method is a `POST /basket.Basket/{Method}` taking and returning
//! JSON. Non-OK statuses travel as the matching HTTP status with a
//! `{ "code", "message" }` body.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::rpc::{
    BasketRequest, BasketRpc, CheckoutCustomerBasketRequest, CheckoutCustomerBasketResponse,
    CustomerBasketRequest, CustomerBasketResponse, DeleteCustomerBasketRequest,
    DeleteCustomerBasketResponse, Status, method_path, methods,
};

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(code = %self.code, message = %self.message, "rpc call failed");
        }
        (status, Json(self)).into_response()
    }
}

/// Creates the router serving the basket RPC methods.
pub fn rpc_router<R: BasketRpc + 'static>(rpc: Arc<R>) -> Router {
    Router::new()
        .route(
            &method_path(methods::GET_BASKET_BY_ID),
            post(get_basket_by_id::<R>),
        )
        .route(&method_path(methods::UPDATE_BASKET), post(update_basket::<R>))
        .route(
            &method_path(methods::CHECKOUT_BASKET),
            post(checkout_basket::<R>),
        )
        .route(&method_path(methods::DELETE_BASKET), post(delete_basket::<R>))
        .with_state(rpc)
}

async fn get_basket_by_id<R: BasketRpc + 'static>(
    State(rpc): State<Arc<R>>,
    Json(request): Json<BasketRequest>,
) -> Result<Json<CustomerBasketResponse>, Status> {
    rpc.get_basket_by_id(request).await.map(Json)
}

async fn update_basket<R: BasketRpc + 'static>(
    State(rpc): State<Arc<R>>,
    Json(request): Json<CustomerBasketRequest>,
) -> Result<Json<CustomerBasketResponse>, Status> {
    rpc.update_basket(request).await.map(Json)
}

async fn checkout_basket<R: BasketRpc + 'static>(
    State(rpc): State<Arc<R>>,
    Json(request): Json<CheckoutCustomerBasketRequest>,
) -> Result<Json<CheckoutCustomerBasketResponse>, Status> {
    rpc.checkout_basket(request).await.map(Json)
}

async fn delete_basket<R: BasketRpc + 'static>(
    State(rpc): State<Arc<R>>,
    Json(request): Json<DeleteCustomerBasketRequest>,
) -> Result<Json<DeleteCustomerBasketResponse>, Status> {
    rpc.delete_basket(request).await.map(Json)
}
