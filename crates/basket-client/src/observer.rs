//! Observability hook for client operations.
//!
//! The client reports what it does through a [`BasketObserver`] handed to
//! it at construction; it never logs on its own.

use std::time::Duration;

use basket_service::Code;
use common::{BuyerId, ItemId};

use crate::error::ClientError;

/// Something the client did or ran into.
#[derive(Debug)]
pub enum BasketEvent<'a> {
    /// A basket lookup completed.
    BasketFetched {
        buyer_id: &'a BuyerId,
        found: bool,
        item_count: u32,
    },
    /// A basket lookup degraded to "unavailable".
    BasketUnavailable {
        buyer_id: &'a BuyerId,
        reason: &'a ClientError,
    },
    /// An existing line had its quantity bumped.
    ItemIncremented {
        buyer_id: &'a BuyerId,
        product_id: i32,
        quantity: u32,
    },
    /// A new line was appended.
    ItemAppended {
        buyer_id: &'a BuyerId,
        product_id: i32,
        item_id: &'a ItemId,
    },
    /// A line was removed.
    ItemRemoved {
        buyer_id: &'a BuyerId,
        product_id: i32,
    },
    /// The service accepted an updated basket.
    BasketUpdated {
        buyer_id: &'a BuyerId,
        total_items: u32,
    },
    /// A conditional update lost to a concurrent writer and will be redone.
    UpdateConflict { buyer_id: &'a BuyerId, attempt: u32 },
    /// A failed call will be retried after `delay`.
    RetryScheduled {
        operation: &'static str,
        attempt: u32,
        delay: Duration,
        code: Code,
    },
    /// Checkout was forwarded to the service.
    CheckedOut { buyer_id: &'a BuyerId },
    /// Deletion was forwarded to the service.
    BasketDeleted { buyer_id: &'a BuyerId },
}

impl BasketEvent<'_> {
    /// Short stable name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BasketEvent::BasketFetched { .. } => "basket_fetched",
            BasketEvent::BasketUnavailable { .. } => "basket_unavailable",
            BasketEvent::ItemIncremented { .. } => "item_incremented",
            BasketEvent::ItemAppended { .. } => "item_appended",
            BasketEvent::ItemRemoved { .. } => "item_removed",
            BasketEvent::BasketUpdated { .. } => "basket_updated",
            BasketEvent::UpdateConflict { .. } => "update_conflict",
            BasketEvent::RetryScheduled { .. } => "retry_scheduled",
            BasketEvent::CheckedOut { .. } => "checked_out",
            BasketEvent::BasketDeleted { .. } => "basket_deleted",
        }
    }
}

/// Receives client events.
pub trait BasketObserver: Send + Sync {
    fn on_event(&self, event: &BasketEvent<'_>);
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BasketObserver for NoopObserver {
    fn on_event(&self, _event: &BasketEvent<'_>) {}
}

/// Observer that emits structured `tracing` events and `metrics` counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BasketObserver for TracingObserver {
    fn on_event(&self, event: &BasketEvent<'_>) {
        metrics::counter!("basket_client_events_total", "kind" => event.kind()).increment(1);

        match event {
            BasketEvent::BasketFetched {
                buyer_id,
                found,
                item_count,
            } => {
                tracing::debug!(%buyer_id, found, item_count, "basket fetched");
            }
            BasketEvent::BasketUnavailable { buyer_id, reason } => {
                metrics::counter!("basket_client_unavailable_total").increment(1);
                tracing::warn!(%buyer_id, error = %reason, "basket service unavailable");
            }
            BasketEvent::ItemIncremented {
                buyer_id,
                product_id,
                quantity,
            } => {
                tracing::info!(%buyer_id, product_id, quantity, "basket item quantity increased");
            }
            BasketEvent::ItemAppended {
                buyer_id,
                product_id,
                item_id,
            } => {
                tracing::info!(%buyer_id, product_id, %item_id, "basket item added");
            }
            BasketEvent::ItemRemoved {
                buyer_id,
                product_id,
            } => {
                tracing::info!(%buyer_id, product_id, "basket item removed");
            }
            BasketEvent::BasketUpdated {
                buyer_id,
                total_items,
            } => {
                tracing::info!(%buyer_id, total_items, "basket updated");
            }
            BasketEvent::UpdateConflict { buyer_id, attempt } => {
                tracing::debug!(%buyer_id, attempt, "basket update conflicted, retrying");
            }
            BasketEvent::RetryScheduled {
                operation,
                attempt,
                delay,
                code,
            } => {
                tracing::debug!(operation, attempt, ?delay, %code, "retrying basket call");
            }
            BasketEvent::CheckedOut { buyer_id } => {
                tracing::info!(%buyer_id, "basket checkout requested");
            }
            BasketEvent::BasketDeleted { buyer_id } => {
                tracing::info!(%buyer_id, "basket delete requested");
            }
        }
    }
}
