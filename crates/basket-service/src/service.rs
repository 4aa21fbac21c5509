//! Basket service exposing store operations over the RPC surface.

use async_trait::async_trait;
use basket_store::{BasketStore, SetOptions, StoreError};
use common::CustomerBasket;

use crate::ordering::{BasketCheckout, OrderPlacement};
use crate::rpc::{
    BasketRequest, BasketRpc, CheckoutCustomerBasketRequest, CheckoutCustomerBasketResponse,
    CustomerBasketRequest, CustomerBasketResponse, DeleteCustomerBasketRequest,
    DeleteCustomerBasketResponse, Status, methods, parse_buyer_id,
};

/// Service for reading and mutating baskets.
///
/// A missing basket is a normal response with an empty buyer id; store
/// outages surface as [`Code::Unavailable`](crate::Code::Unavailable).
pub struct BasketService<S: BasketStore, O: OrderPlacement> {
    store: S,
    orders: O,
}

impl<S: BasketStore, O: OrderPlacement> BasketService<S, O> {
    /// Creates a new basket service over a store and an ordering backend.
    pub fn new(store: S, orders: O) -> Self {
        Self { store, orders }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the ordering backend.
    pub fn orders(&self) -> &O {
        &self.orders
    }

    async fn get(&self, request: BasketRequest) -> Result<CustomerBasketResponse, Status> {
        let buyer_id = parse_buyer_id(&request.id)?;

        match self.store.get(&buyer_id).await? {
            Some(stored) => Ok(CustomerBasketResponse::from_basket(
                &stored.basket,
                stored.version,
            )),
            None => {
                tracing::debug!(%buyer_id, "no basket stored");
                Ok(CustomerBasketResponse::not_found())
            }
        }
    }

    async fn update(
        &self,
        request: CustomerBasketRequest,
    ) -> Result<CustomerBasketResponse, Status> {
        let mut options = match request.expected_version {
            Some(version) => SetOptions::expect_version(version.into()),
            None => SetOptions::new(),
        };
        options.write_id = request.write_id.clone();
        let basket = request.into_basket()?;

        let stored = self.store.set(basket, options).await?;
        tracing::debug!(
            buyer_id = %stored.basket.buyer_id,
            version = %stored.version,
            lines = stored.basket.items.len(),
            "basket updated"
        );

        Ok(CustomerBasketResponse::from_basket(
            &stored.basket,
            stored.version,
        ))
    }

    async fn checkout(
        &self,
        request: CheckoutCustomerBasketRequest,
    ) -> Result<CheckoutCustomerBasketResponse, Status> {
        let buyer_id = parse_buyer_id(&request.buyer_id)?;

        let Some(stored) = self.store.get(&buyer_id).await? else {
            tracing::debug!(%buyer_id, "checkout of missing basket acknowledged");
            return Ok(CheckoutCustomerBasketResponse::default());
        };
        if stored.basket.is_empty() {
            tracing::debug!(%buyer_id, "checkout of empty basket acknowledged");
            return Ok(CheckoutCustomerBasketResponse::default());
        }

        // Claim the contents first so a concurrent checkout sees an empty basket.
        let claimed = self
            .store
            .set(
                CustomerBasket::new(buyer_id.clone()),
                SetOptions::expect_version(stored.version),
            )
            .await
            .map_err(|e| match e {
                StoreError::ConcurrencyConflict { .. } => {
                    Status::aborted(format!("basket {buyer_id} changed during checkout"))
                }
                other => Status::from(other),
            })?;

        let checkout = BasketCheckout::from_basket(&stored.basket);
        let checkout_id = checkout.checkout_id;
        if let Err(err) = self.orders.place_order(checkout).await {
            tracing::warn!(%buyer_id, error = %err, "order placement failed, restoring basket");
            if let Err(restore_err) = self
                .store
                .set(stored.basket, SetOptions::expect_version(claimed.version))
                .await
            {
                tracing::error!(%buyer_id, error = %restore_err, "failed to restore basket after checkout failure");
            }
            return Err(err.into());
        }

        // Lines added after the claim belong to the next checkout.
        if !self.store.delete_at(&buyer_id, claimed.version).await? {
            tracing::info!(%buyer_id, "basket changed during checkout, keeping newer contents");
        }
        metrics::counter!("basket_checkouts_total").increment(1);
        tracing::info!(%buyer_id, %checkout_id, "basket checked out");

        Ok(CheckoutCustomerBasketResponse::default())
    }

    async fn delete(
        &self,
        request: DeleteCustomerBasketRequest,
    ) -> Result<DeleteCustomerBasketResponse, Status> {
        let buyer_id = parse_buyer_id(&request.buyer_id)?;
        let removed = self.store.delete(&buyer_id).await?;
        tracing::debug!(%buyer_id, removed, "basket delete requested");
        Ok(DeleteCustomerBasketResponse::default())
    }
}

fn observe<T>(method: &'static str, result: &Result<T, Status>) {
    let code = match result {
        Ok(_) => "Ok".to_string(),
        Err(status) => status.code.to_string(),
    };
    metrics::counter!("basket_rpc_requests_total", "method" => method, "code" => code)
        .increment(1);
}

#[async_trait]
impl<S: BasketStore, O: OrderPlacement> BasketRpc for BasketService<S, O> {
    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.id))]
    async fn get_basket_by_id(
        &self,
        request: BasketRequest,
    ) -> Result<CustomerBasketResponse, Status> {
        let result = self.get(request).await;
        observe(methods::GET_BASKET_BY_ID, &result);
        result
    }

    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    async fn update_basket(
        &self,
        request: CustomerBasketRequest,
    ) -> Result<CustomerBasketResponse, Status> {
        let result = self.update(request).await;
        observe(methods::UPDATE_BASKET, &result);
        result
    }

    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    async fn checkout_basket(
        &self,
        request: CheckoutCustomerBasketRequest,
    ) -> Result<CheckoutCustomerBasketResponse, Status> {
        let result = self.checkout(request).await;
        observe(methods::CHECKOUT_BASKET, &result);
        result
    }

    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    async fn delete_basket(
        &self,
        request: DeleteCustomerBasketRequest,
    ) -> Result<DeleteCustomerBasketResponse, Status> {
        let result = self.delete(request).await;
        observe(methods::DELETE_BASKET, &result);
        result
    }
}
