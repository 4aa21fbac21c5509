//! Downstream order placement triggered by checkout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BasketItem, BuyerId, CustomerBasket};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Snapshot of a basket handed to order placement at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketCheckout {
    pub checkout_id: Uuid,
    pub buyer_id: BuyerId,
    pub items: Vec<BasketItem>,
    pub total: Decimal,
    pub requested_at: DateTime<Utc>,
}

impl BasketCheckout {
    /// Captures the contents of a basket for checkout.
    pub fn from_basket(basket: &CustomerBasket) -> Self {
        Self {
            checkout_id: Uuid::new_v4(),
            buyer_id: basket.buyer_id.clone(),
            items: basket.items.clone(),
            total: basket.total_price(),
            requested_at: Utc::now(),
        }
    }
}

/// Errors reported by order placement.
#[derive(Debug, Clone, Error)]
pub enum OrderPlacementError {
    /// The ordering backend could not be reached.
    #[error("Ordering unavailable: {0}")]
    Unavailable(String),

    /// The ordering backend refused the order.
    #[error("Order rejected: {0}")]
    Rejected(String),
}

/// Trait for the ordering system that receives checked-out baskets.
#[async_trait]
pub trait OrderPlacement: Send + Sync {
    /// Places an order for the checked-out basket.
    async fn place_order(&self, checkout: BasketCheckout) -> Result<(), OrderPlacementError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: Vec<BasketCheckout>,
}

/// In-memory order placement for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderPlacement {
    state: Arc<Mutex<InMemoryOrderState>>,
    fail_on_place: Arc<AtomicBool>,
}

impl InMemoryOrderPlacement {
    /// Creates a new in-memory order placement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to report itself unavailable on placement.
    pub fn set_fail_on_place(&self, fail: bool) {
        self.fail_on_place.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of orders placed.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns all orders placed, oldest first.
    pub async fn placed_orders(&self) -> Vec<BasketCheckout> {
        self.state.lock().await.orders.clone()
    }
}

#[async_trait]
impl OrderPlacement for InMemoryOrderPlacement {
    async fn place_order(&self, checkout: BasketCheckout) -> Result<(), OrderPlacementError> {
        if self.fail_on_place.load(Ordering::SeqCst) {
            return Err(OrderPlacementError::Unavailable(
                "ordering backend unreachable".to_string(),
            ));
        }

        tracing::info!(
            checkout_id = %checkout.checkout_id,
            buyer_id = %checkout.buyer_id,
            lines = checkout.items.len(),
            "order placed"
        );
        self.state.lock().await.orders.push(checkout);
        Ok(())
    }
}
