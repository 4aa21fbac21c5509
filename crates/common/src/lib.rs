//! Shared types for the basket and catalog services.

pub mod basket;
pub mod types;

pub use basket::{BasketItem, BasketValidationError, CartChange, CustomerBasket};
pub use types::{BuyerId, InvalidBuyerId, ItemId, Version};
