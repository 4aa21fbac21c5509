//! Basket entity and its line items.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BuyerId, ItemId};

/// A single line in a buyer's basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketItem {
    pub id: ItemId,
    pub product_id: i32,
    pub quantity: u32,
    /// Current price at the time of the last write.
    pub unit_price: Decimal,
    /// Price recorded before the most recent price change.
    pub old_unit_price: Decimal,
}

impl BasketItem {
    /// Largest quantity a line can hold; quantities travel as `int32`.
    pub const MAX_QUANTITY: u32 = i32::MAX as u32;

    /// Creates a fresh line for `product_id` with quantity 1 and zero prices.
    pub fn for_product(product_id: i32) -> Self {
        Self {
            id: ItemId::generate(),
            product_id,
            quantity: 1,
            unit_price: Decimal::ZERO,
            old_unit_price: Decimal::ZERO,
        }
    }

    /// Returns true if the price changed since it was first recorded.
    pub fn has_price_changed(&self) -> bool {
        !self.old_unit_price.is_zero() && self.old_unit_price != self.unit_price
    }
}

/// Outcome of adding a product to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// An existing line for the product had its quantity bumped.
    Incremented { item_id: ItemId, quantity: u32 },
    /// A new line was appended.
    Appended { item_id: ItemId },
}

/// Validation failures for a basket about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BasketValidationError {
    #[error("item {item_id} has quantity 0; remove the item instead")]
    ZeroQuantity { item_id: ItemId },

    #[error("item id {0} appears more than once")]
    DuplicateItemId(ItemId),

    #[error("product {0} appears on more than one line")]
    DuplicateProduct(i32),

    #[error("item {item_id} is already at the maximum quantity")]
    QuantityOverflow { item_id: ItemId },
}

/// The mutable cart state of one buyer.
///
/// A basket with no items is a valid state, distinct from having no
/// stored basket at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBasket {
    pub buyer_id: BuyerId,
    pub items: Vec<BasketItem>,
}

impl CustomerBasket {
    /// Creates an empty basket for a buyer.
    pub fn new(buyer_id: BuyerId) -> Self {
        Self {
            buyer_id,
            items: Vec::new(),
        }
    }

    /// Returns the total number of units across all lines.
    pub fn total_item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Returns the basket total at current unit prices.
    pub fn total_price(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }

    /// Returns true if the basket holds no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finds the line for a product, if any.
    pub fn item_for_product(&self, product_id: i32) -> Option<&BasketItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Adds one unit of a product.
    ///
    /// An existing line for the product is incremented in place; otherwise a
    /// new line with a freshly generated id and quantity 1 is appended. A
    /// product never occupies more than one line.
    ///
    /// Fails without changing the basket when the line is already at
    /// [`BasketItem::MAX_QUANTITY`].
    pub fn add_product(&mut self, product_id: i32) -> Result<CartChange, BasketValidationError> {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
        {
            item.quantity = item
                .quantity
                .checked_add(1)
                .filter(|quantity| *quantity <= BasketItem::MAX_QUANTITY)
                .ok_or_else(|| BasketValidationError::QuantityOverflow {
                    item_id: item.id.clone(),
                })?;
            return Ok(CartChange::Incremented {
                item_id: item.id.clone(),
                quantity: item.quantity,
            });
        }

        let item = BasketItem::for_product(product_id);
        let item_id = item.id.clone();
        self.items.push(item);
        Ok(CartChange::Appended { item_id })
    }

    /// Removes the line for a product, returning it if present.
    pub fn remove_product(&mut self, product_id: i32) -> Option<BasketItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.product_id == product_id)?;
        Some(self.items.remove(index))
    }

    /// Checks the per-basket invariants: quantities are positive, and both
    /// item ids and product ids are unique.
    pub fn validate(&self) -> Result<(), BasketValidationError> {
        let mut item_ids = HashSet::with_capacity(self.items.len());
        let mut products = HashSet::with_capacity(self.items.len());

        for item in &self.items {
            if item.quantity == 0 {
                return Err(BasketValidationError::ZeroQuantity {
                    item_id: item.id.clone(),
                });
            }
            if !item_ids.insert(&item.id) {
                return Err(BasketValidationError::DuplicateItemId(item.id.clone()));
            }
            if !products.insert(item.product_id) {
                return Err(BasketValidationError::DuplicateProduct(item.product_id));
            }
        }

        Ok(())
    }
}
