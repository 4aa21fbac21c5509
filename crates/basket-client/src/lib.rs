//! Resilient caller-side client for the basket service.
//!
//! [`BasketServiceClient`] wraps any [`BasketRpc`](basket_service::BasketRpc)
//! implementation, either the in-process service or [`HttpBasketClient`],
//! with a [`ResiliencePolicy`] and the cart rules:
//! - adding a product already in the basket bumps its quantity instead of
//!   adding a second line
//! - writes are conditional on the version read and are redone on conflict
//! - a lookup against an unreachable or slow service reports
//!   [`BasketLookup::Unavailable`] instead of failing

pub mod client;
pub mod error;
pub mod observer;
pub mod policy;
pub mod transport;

pub use client::{BasketLookup, BasketServiceClient};
pub use error::{ClientError, Result};
pub use observer::{BasketEvent, BasketObserver, NoopObserver, TracingObserver};
pub use policy::ResiliencePolicy;
pub use transport::{HttpBasketClient, HttpBasketConfig};
