//! Mapping of store and ordering failures onto RPC status codes.

use basket_store::StoreError;

use crate::ordering::OrderPlacementError;
use crate::rpc::Status;

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Unavailable(_) => Status::unavailable(err.to_string()),
            StoreError::ConcurrencyConflict { .. } => Status::aborted(err.to_string()),
            StoreError::InvalidBasket(_) => Status::invalid_argument(err.to_string()),
            StoreError::Database(_) | StoreError::Migration(_) | StoreError::Serialization(_) => {
                tracing::error!(error = %err, "basket store failure");
                Status::internal(err.to_string())
            }
        }
    }
}

impl From<OrderPlacementError> for Status {
    fn from(err: OrderPlacementError) -> Self {
        match &err {
            OrderPlacementError::Unavailable(_) => Status::unavailable(err.to_string()),
            OrderPlacementError::Rejected(_) => Status::internal(err.to_string()),
        }
    }
}
