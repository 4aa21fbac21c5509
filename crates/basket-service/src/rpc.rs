//! Wire messages, status codes and the service trait of the `basket.Basket`
//! remote procedure surface.

use std::sync::Arc;

use async_trait::async_trait;
use common::{BasketItem, BuyerId, CustomerBasket, ItemId, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name under which the service's methods are routed.
pub const SERVICE_NAME: &str = "basket.Basket";

/// Method names of the service.
pub mod methods {
    pub const GET_BASKET_BY_ID: &str = "GetBasketById";
    pub const UPDATE_BASKET: &str = "UpdateBasket";
    pub const CHECKOUT_BASKET: &str = "CheckoutBasket";
    pub const DELETE_BASKET: &str = "DeleteBasket";
}

/// Returns the route path of a method, e.g. `/basket.Basket/UpdateBasket`.
pub fn method_path(method: &str) -> String {
    format!("/{SERVICE_NAME}/{method}")
}

/// Transport-level status code of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    Cancelled,
    InvalidArgument,
    NotFound,
    DeadlineExceeded,
    /// A conditional write lost against a concurrent writer.
    Aborted,
    Internal,
    /// The backend could not be reached.
    Unavailable,
}

impl Code {
    /// HTTP status used when the status travels over HTTP.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Cancelled => 499,
            Code::InvalidArgument => 400,
            Code::NotFound => 404,
            Code::DeadlineExceeded => 504,
            Code::Aborted => 409,
            Code::Internal => 500,
            Code::Unavailable => 503,
        }
    }

    /// Best-effort reverse of [`Code::http_status`] for responses without a
    /// status body (e.g. from a proxy).
    pub fn from_http_status(status: u16) -> Self {
        match status {
            499 => Code::Cancelled,
            400 | 422 => Code::InvalidArgument,
            404 => Code::NotFound,
            504 | 408 => Code::DeadlineExceeded,
            409 => Code::Aborted,
            502 | 503 => Code::Unavailable,
            _ => Code::Internal,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Code::Cancelled => "Cancelled",
            Code::InvalidArgument => "InvalidArgument",
            Code::NotFound => "NotFound",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::Aborted => "Aborted",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}

/// Status of a failed call.
///
/// Failures are never folded into a success payload: callers branch on the
/// code, not on message contents.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("status {code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }
}

// -- Messages --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketItemMessage {
    pub id: String,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub old_unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBasketRequest {
    pub buyer_id: String,
    pub items: Vec<BasketItemMessage>,
    /// Version the caller read; when set, the update is rejected with
    /// [`Code::Aborted`] if the stored basket moved on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
    /// Id of this logical write. A resent copy of a write that was already
    /// applied returns the stored basket instead of [`Code::Aborted`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_id: Option<String>,
}

/// A stored basket, or "no basket" when `buyer_id` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBasketResponse {
    pub buyer_id: String,
    pub items: Vec<BasketItemMessage>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCustomerBasketRequest {
    pub buyer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckoutCustomerBasketResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCustomerBasketRequest {
    pub buyer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteCustomerBasketResponse {}

// -- Mapping between wire and domain --

impl From<&BasketItem> for BasketItemMessage {
    fn from(item: &BasketItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id,
            quantity: i32::try_from(item.quantity).unwrap_or(i32::MAX),
            unit_price: item.unit_price,
            old_unit_price: item.old_unit_price,
        }
    }
}

impl TryFrom<BasketItemMessage> for BasketItem {
    type Error = Status;

    fn try_from(message: BasketItemMessage) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(message.quantity)
            .ok()
            .filter(|quantity| *quantity > 0)
            .ok_or_else(|| {
                Status::invalid_argument(format!(
                    "item {} has quantity {}; quantities must be positive",
                    message.id, message.quantity
                ))
            })?;
        if message.id.is_empty() {
            return Err(Status::invalid_argument("item id must not be empty"));
        }

        Ok(BasketItem {
            id: ItemId::new(message.id),
            product_id: message.product_id,
            quantity,
            unit_price: message.unit_price,
            old_unit_price: message.old_unit_price,
        })
    }
}

/// Parses a buyer id received on the wire.
pub fn parse_buyer_id(raw: &str) -> Result<BuyerId, Status> {
    BuyerId::parse(raw).map_err(|e| Status::invalid_argument(e.to_string()))
}

impl CustomerBasketRequest {
    /// Builds an unconditional update request for a basket.
    pub fn from_basket(basket: &CustomerBasket) -> Self {
        Self {
            buyer_id: basket.buyer_id.to_string(),
            items: basket.items.iter().map(BasketItemMessage::from).collect(),
            expected_version: None,
            write_id: None,
        }
    }

    /// Tags the update with the id of the logical write it carries.
    pub fn with_write_id(mut self, write_id: impl Into<String>) -> Self {
        self.write_id = Some(write_id.into());
        self
    }

    /// Makes the update conditional on the stored basket being at `version`.
    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version.as_i64());
        self
    }

    /// Converts the request into a domain basket.
    pub fn into_basket(self) -> Result<CustomerBasket, Status> {
        let buyer_id = parse_buyer_id(&self.buyer_id)?;
        let items = self
            .items
            .into_iter()
            .map(BasketItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CustomerBasket { buyer_id, items })
    }
}

impl CustomerBasketResponse {
    /// The response for a buyer with no stored basket.
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Builds the response for a stored basket.
    pub fn from_basket(basket: &CustomerBasket, version: Version) -> Self {
        Self {
            buyer_id: basket.buyer_id.to_string(),
            items: basket.items.iter().map(BasketItemMessage::from).collect(),
            version: version.as_i64(),
        }
    }

    /// Converts the response into a domain basket and its version.
    ///
    /// Returns None when the response says no basket is stored, so callers
    /// never compare against the empty-string sentinel themselves.
    pub fn into_basket(self) -> Result<Option<(CustomerBasket, Version)>, Status> {
        if self.buyer_id.is_empty() {
            return Ok(None);
        }
        let buyer_id = parse_buyer_id(&self.buyer_id)?;
        let items = self
            .items
            .into_iter()
            .map(BasketItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((CustomerBasket { buyer_id, items }, Version::new(self.version))))
    }
}

/// The `basket.Basket` service.
///
/// Implemented by the server-side [`BasketService`](crate::BasketService)
/// and by remote clients, so callers can swap an in-process service for a
/// network transport.
#[async_trait]
pub trait BasketRpc: Send + Sync {
    /// Returns the stored basket, or [`CustomerBasketResponse::not_found`].
    async fn get_basket_by_id(
        &self,
        request: BasketRequest,
    ) -> Result<CustomerBasketResponse, Status>;

    /// Replaces the stored basket and returns it as persisted.
    async fn update_basket(
        &self,
        request: CustomerBasketRequest,
    ) -> Result<CustomerBasketResponse, Status>;

    /// Places an order for the basket contents and clears the basket.
    async fn checkout_basket(
        &self,
        request: CheckoutCustomerBasketRequest,
    ) -> Result<CheckoutCustomerBasketResponse, Status>;

    /// Removes the basket; succeeds when it is already absent.
    async fn delete_basket(
        &self,
        request: DeleteCustomerBasketRequest,
    ) -> Result<DeleteCustomerBasketResponse, Status>;
}

#[async_trait]
impl<T: BasketRpc + ?Sized> BasketRpc for Arc<T> {
    async fn get_basket_by_id(
        &self,
        request: BasketRequest,
    ) -> Result<CustomerBasketResponse, Status> {
        (**self).get_basket_by_id(request).await
    }

    async fn update_basket(
        &self,
        request: CustomerBasketRequest,
    ) -> Result<CustomerBasketResponse, Status> {
        (**self).update_basket(request).await
    }

    async fn checkout_basket(
        &self,
        request: CheckoutCustomerBasketRequest,
    ) -> Result<CheckoutCustomerBasketResponse, Status> {
        (**self).checkout_basket(request).await
    }

    async fn delete_basket(
        &self,
        request: DeleteCustomerBasketRequest,
    ) -> Result<DeleteCustomerBasketResponse, Status> {
        (**self).delete_basket(request).await
    }
}
