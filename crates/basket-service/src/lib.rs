//! Basket service: the `basket.Basket` remote procedure surface over a
//! [`BasketStore`](basket_store::BasketStore).
//!
//! Methods:
//! - `GetBasketById`: the stored basket, or an empty buyer id when none exists
//! - `UpdateBasket`: full-replace upsert, optionally conditional on a version
//! - `CheckoutBasket`: places an order for the contents and clears the basket
//! - `DeleteBasket`: removes the basket
//!
//! Store outages are reported as [`Code::Unavailable`], never as an empty
//! basket.

pub mod error;
pub mod ordering;
pub mod routes;
pub mod rpc;
pub mod service;

pub use ordering::{BasketCheckout, InMemoryOrderPlacement, OrderPlacement, OrderPlacementError};
pub use routes::rpc_router;
pub use rpc::{
    BasketItemMessage, BasketRequest, BasketRpc, CheckoutCustomerBasketRequest,
    CheckoutCustomerBasketResponse, Code, CustomerBasketRequest, CustomerBasketResponse,
    DeleteCustomerBasketRequest, DeleteCustomerBasketResponse, Status,
};
pub use service::BasketService;
