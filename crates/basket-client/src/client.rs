//! Caller-facing basket client.

use std::sync::Arc;

use basket_service::rpc::methods;
use basket_service::{
    BasketRequest, BasketRpc, CheckoutCustomerBasketRequest, Code, CustomerBasketRequest,
    CustomerBasketResponse, DeleteCustomerBasketRequest,
};
use common::{BuyerId, CartChange, CustomerBasket, Version};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::observer::{BasketEvent, BasketObserver, TracingObserver};
use crate::policy::ResiliencePolicy;
use crate::transport::{HttpBasketClient, HttpBasketConfig};

/// Outcome of a basket lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasketLookup {
    /// A basket is stored (it may have no items).
    Found(CustomerBasket),
    /// The service answered and no basket is stored.
    Missing,
    /// The service could not be reached in time.
    Unavailable,
}

impl BasketLookup {
    /// Returns `(basket, is_available)`.
    pub fn into_parts(self) -> (Option<CustomerBasket>, bool) {
        match self {
            BasketLookup::Found(basket) => (Some(basket), true),
            BasketLookup::Missing => (None, true),
            BasketLookup::Unavailable => (None, false),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, BasketLookup::Unavailable)
    }

    pub fn basket(&self) -> Option<&CustomerBasket> {
        match self {
            BasketLookup::Found(basket) => Some(basket),
            _ => None,
        }
    }
}

/// What a read-modify-write step decided to do with the basket it read.
enum Edit {
    Write {
        basket: CustomerBasket,
        change: LineChange,
    },
    Keep(Option<CustomerBasket>),
}

/// The line change carried by a write, reported once the write commits.
enum LineChange {
    Added(CartChange),
    Removed,
}

/// Basket client with retry/timeout policy and cart rules.
///
/// Every remote call runs under the [`ResiliencePolicy`]. Only
/// [`get_basket`](Self::get_basket) degrades failures into an availability
/// flag; mutations return the error.
pub struct BasketServiceClient<R: BasketRpc> {
    rpc: R,
    policy: ResiliencePolicy,
    observer: Arc<dyn BasketObserver>,
    max_conflict_retries: u32,
}

impl BasketServiceClient<HttpBasketClient> {
    /// Creates a client talking to a remote basket service over HTTP.
    pub fn connect(config: HttpBasketConfig) -> Result<Self> {
        Ok(Self::new(HttpBasketClient::new(config)?))
    }
}

impl<R: BasketRpc> BasketServiceClient<R> {
    /// Creates a client with the default policy and a [`TracingObserver`].
    pub fn new(rpc: R) -> Self {
        Self {
            rpc,
            policy: ResiliencePolicy::default(),
            observer: Arc::new(TracingObserver),
            max_conflict_retries: 5,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BasketObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// How many times a conflicting conditional update is redone.
    #[must_use]
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Looks up a buyer's basket.
    ///
    /// `Unavailable` statuses and policy timeouts become
    /// [`BasketLookup::Unavailable`]; any other failure is returned.
    pub async fn get_basket(&self, buyer_id: &BuyerId) -> Result<BasketLookup> {
        match self.fetch(buyer_id).await {
            Ok(Some((basket, _))) => Ok(BasketLookup::Found(basket)),
            Ok(None) => Ok(BasketLookup::Missing),
            Err(err) if err.is_unavailability() => {
                self.observer.on_event(&BasketEvent::BasketUnavailable {
                    buyer_id,
                    reason: &err,
                });
                Ok(BasketLookup::Unavailable)
            }
            Err(err) => Err(err),
        }
    }

    /// Adds one unit of `product_id` to the buyer's basket and returns the
    /// basket as stored by the service.
    ///
    /// The basket is created when the buyer has none. The write is
    /// conditional on the version read, and is redone on conflict.
    pub async fn add_to_cart(&self, buyer_id: &BuyerId, product_id: i32) -> Result<CustomerBasket> {
        let stored = self
            .modify(buyer_id, product_id, |current| {
                let mut basket = current.unwrap_or_else(|| CustomerBasket::new(buyer_id.clone()));
                let change = basket.add_product(product_id)?;
                Ok(Edit::Write {
                    basket,
                    change: LineChange::Added(change),
                })
            })
            .await?;

        stored.ok_or_else(|| {
            ClientError::UnexpectedResponse("UpdateBasket returned no basket".to_string())
        })
    }

    /// Removes the line for `product_id` from the buyer's basket.
    ///
    /// Returns the resulting basket, or None when the buyer has no basket.
    /// Nothing is written when the product is not in the basket.
    pub async fn remove_from_cart(
        &self,
        buyer_id: &BuyerId,
        product_id: i32,
    ) -> Result<Option<CustomerBasket>> {
        self.modify(buyer_id, product_id, |current| {
            Ok(match current {
                Some(mut basket) => {
                    if basket.remove_product(product_id).is_some() {
                        Edit::Write {
                            basket,
                            change: LineChange::Removed,
                        }
                    } else {
                        Edit::Keep(Some(basket))
                    }
                }
                None => Edit::Keep(None),
            })
        })
        .await
    }

    /// Checks the buyer's basket out. Safe to call on an empty or missing
    /// basket.
    pub async fn checkout(&self, buyer_id: &BuyerId) -> Result<()> {
        let request = CheckoutCustomerBasketRequest {
            buyer_id: buyer_id.to_string(),
        };
        self.policy
            .execute(methods::CHECKOUT_BASKET, self.observer.as_ref(), || {
                self.rpc.checkout_basket(request.clone())
            })
            .await?;

        self.observer
            .on_event(&BasketEvent::CheckedOut { buyer_id });
        Ok(())
    }

    /// Deletes the buyer's basket. Succeeds when none exists.
    pub async fn delete_basket(&self, buyer_id: &BuyerId) -> Result<()> {
        let request = DeleteCustomerBasketRequest {
            buyer_id: buyer_id.to_string(),
        };
        self.policy
            .execute(methods::DELETE_BASKET, self.observer.as_ref(), || {
                self.rpc.delete_basket(request.clone())
            })
            .await?;

        self.observer
            .on_event(&BasketEvent::BasketDeleted { buyer_id });
        Ok(())
    }

    async fn fetch(&self, buyer_id: &BuyerId) -> Result<Option<(CustomerBasket, Version)>> {
        let request = BasketRequest {
            id: buyer_id.to_string(),
        };
        let response = self
            .policy
            .execute(methods::GET_BASKET_BY_ID, self.observer.as_ref(), || {
                self.rpc.get_basket_by_id(request.clone())
            })
            .await?;

        let found = decode(response)?;
        self.observer.on_event(&BasketEvent::BasketFetched {
            buyer_id,
            found: found.is_some(),
            item_count: found
                .as_ref()
                .map_or(0, |(basket, _)| basket.total_item_count()),
        });
        Ok(found)
    }

    /// Reads the basket, applies `edit`, and writes the result conditional
    /// on the version read. A lost race re-reads and re-applies.
    ///
    /// Each write carries a fresh write id, so a copy resent by the policy
    /// after a lost reply is recognised by the service instead of being
    /// mistaken for a conflict and applied twice.
    async fn modify<F>(
        &self,
        buyer_id: &BuyerId,
        product_id: i32,
        mut edit: F,
    ) -> Result<Option<CustomerBasket>>
    where
        F: FnMut(Option<CustomerBasket>) -> Result<Edit>,
    {
        let attempts = self.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let (current, version) = match self.fetch(buyer_id).await? {
                Some((basket, version)) => (Some(basket), version),
                None => (None, Version::initial()),
            };

            let (basket, change) = match edit(current)? {
                Edit::Write { basket, change } => (basket, change),
                Edit::Keep(basket) => return Ok(basket),
            };

            let request = CustomerBasketRequest::from_basket(&basket)
                .expecting(version)
                .with_write_id(Uuid::new_v4().simple().to_string());
            let outcome = self
                .policy
                .execute(methods::UPDATE_BASKET, self.observer.as_ref(), || {
                    self.rpc.update_basket(request.clone())
                })
                .await;

            match outcome {
                Ok(response) => {
                    let stored = decode(response)?.map(|(basket, _)| basket);
                    self.report(buyer_id, product_id, &change);
                    if let Some(basket) = &stored {
                        self.observer.on_event(&BasketEvent::BasketUpdated {
                            buyer_id,
                            total_items: basket.total_item_count(),
                        });
                    }
                    return Ok(stored);
                }
                Err(ClientError::Rpc(status)) if status.code == Code::Aborted => {
                    self.observer
                        .on_event(&BasketEvent::UpdateConflict { buyer_id, attempt });
                }
                Err(err) => return Err(err),
            }
        }

        Err(ClientError::ConflictRetriesExhausted { attempts })
    }

    fn report(&self, buyer_id: &BuyerId, product_id: i32, change: &LineChange) {
        let event = match change {
            LineChange::Added(CartChange::Incremented { quantity, .. }) => {
                BasketEvent::ItemIncremented {
                    buyer_id,
                    product_id,
                    quantity: *quantity,
                }
            }
            LineChange::Added(CartChange::Appended { item_id }) => BasketEvent::ItemAppended {
                buyer_id,
                product_id,
                item_id,
            },
            LineChange::Removed => BasketEvent::ItemRemoved {
                buyer_id,
                product_id,
            },
        };
        self.observer.on_event(&event);
    }
}

fn decode(response: CustomerBasketResponse) -> Result<Option<(CustomerBasket, Version)>> {
    response
        .into_basket()
        .map_err(|status| ClientError::UnexpectedResponse(status.message))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use basket_service::{
        BasketService, CheckoutCustomerBasketResponse, DeleteCustomerBasketResponse,
        InMemoryOrderPlacement, Status,
    };
    use basket_store::{BasketStore, InMemoryBasketStore};

    use super::*;
    use crate::observer::NoopObserver;

    type LocalService = Arc<BasketService<InMemoryBasketStore, InMemoryOrderPlacement>>;

    #[derive(Default)]
    struct RecordingObserver {
        kinds: Mutex<Vec<&'static str>>,
    }

    impl RecordingObserver {
        fn kinds(&self) -> Vec<&'static str> {
            self.kinds.lock().unwrap().clone()
        }
    }

    impl BasketObserver for RecordingObserver {
        fn on_event(&self, event: &BasketEvent<'_>) {
            self.kinds.lock().unwrap().push(event.kind());
        }
    }

    fn fast_policy() -> ResiliencePolicy {
        ResiliencePolicy::new()
            .with_attempt_timeout(Duration::from_millis(200))
            .with_total_timeout(Duration::from_secs(1))
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40))
    }

    fn setup() -> (BasketServiceClient<LocalService>, LocalService) {
        let service = Arc::new(BasketService::new(
            InMemoryBasketStore::new(),
            InMemoryOrderPlacement::new(),
        ));
        let client = BasketServiceClient::new(service.clone())
            .with_policy(fast_policy())
            .with_observer(Arc::new(NoopObserver));
        (client, service)
    }

    fn buyer(id: &str) -> BuyerId {
        BuyerId::parse(id).unwrap()
    }

    /// Fails every call with a fixed status.
    struct FailingRpc(Status);

    #[async_trait]
    impl BasketRpc for FailingRpc {
        async fn get_basket_by_id(
            &self,
            _request: BasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            Err(self.0.clone())
        }

        async fn update_basket(
            &self,
            _request: CustomerBasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            Err(self.0.clone())
        }

        async fn checkout_basket(
            &self,
            _request: CheckoutCustomerBasketRequest,
        ) -> std::result::Result<CheckoutCustomerBasketResponse, Status> {
            Err(self.0.clone())
        }

        async fn delete_basket(
            &self,
            _request: DeleteCustomerBasketRequest,
        ) -> std::result::Result<DeleteCustomerBasketResponse, Status> {
            Err(self.0.clone())
        }
    }

    #[tokio::test]
    async fn new_buyer_has_no_basket_and_service_is_available() {
        let (client, _) = setup();

        let lookup = client.get_basket(&buyer("alice")).await.unwrap();

        assert_eq!(lookup.into_parts(), (None, true));
    }

    #[tokio::test]
    async fn adding_same_product_twice_merges_into_one_line() {
        let (client, _) = setup();
        let alice = buyer("alice");

        let first = client.add_to_cart(&alice, 7).await.unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].product_id, 7);
        assert_eq!(first.items[0].quantity, 1);

        let second = client.add_to_cart(&alice, 7).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].quantity, 2);
        assert_eq!(second.items[0].id, first.items[0].id);

        let (stored, available) = client.get_basket(&alice).await.unwrap().into_parts();
        assert!(available);
        assert_eq!(stored.unwrap(), second);
    }

    #[tokio::test]
    async fn distinct_products_get_distinct_lines() {
        let (client, _) = setup();
        let alice = buyer("alice");

        client.add_to_cart(&alice, 1).await.unwrap();
        let basket = client.add_to_cart(&alice, 2).await.unwrap();

        assert_eq!(basket.items.len(), 2);
        assert_ne!(basket.items[0].id, basket.items[1].id);
    }

    #[tokio::test]
    async fn checkout_twice_does_not_fail() {
        let (client, service) = setup();
        let alice = buyer("alice");
        client.add_to_cart(&alice, 3).await.unwrap();

        client.checkout(&alice).await.unwrap();
        client.checkout(&alice).await.unwrap();

        assert_eq!(service.orders().order_count().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_basket() {
        let (client, _) = setup();
        let alice = buyer("alice");
        client.add_to_cart(&alice, 3).await.unwrap();

        client.delete_basket(&alice).await.unwrap();
        client.delete_basket(&alice).await.unwrap();

        assert_eq!(
            client.get_basket(&alice).await.unwrap(),
            BasketLookup::Missing
        );
    }

    #[tokio::test]
    async fn remove_from_cart_drops_the_line() {
        let (client, _) = setup();
        let alice = buyer("alice");
        client.add_to_cart(&alice, 1).await.unwrap();
        client.add_to_cart(&alice, 2).await.unwrap();

        let basket = client.remove_from_cart(&alice, 1).await.unwrap().unwrap();
        assert_eq!(basket.items.len(), 1);
        assert_eq!(basket.items[0].product_id, 2);

        let unchanged = client.remove_from_cart(&alice, 99).await.unwrap().unwrap();
        assert_eq!(unchanged, basket);

        assert_eq!(client.remove_from_cart(&buyer("bob"), 1).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_degrades_to_unavailable() {
        let (client, service) = setup();
        service.store().set_unavailable(true);

        let lookup = client.get_basket(&buyer("alice")).await.unwrap();

        assert_eq!(lookup.into_parts(), (None, false));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_degrades_to_unavailable() {
        let (client, service) = setup();
        service.store().set_latency(Duration::from_secs(30));

        let lookup = client.get_basket(&buyer("alice")).await.unwrap();

        assert!(!lookup.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn outage_is_reported_to_observer() {
        let observer = Arc::new(RecordingObserver::default());
        let client = BasketServiceClient::new(FailingRpc(Status::unavailable("down")))
            .with_policy(fast_policy())
            .with_observer(observer.clone());

        client.get_basket(&buyer("alice")).await.unwrap();

        let kinds = observer.kinds();
        assert_eq!(
            kinds.iter().filter(|k| **k == "retry_scheduled").count(),
            2
        );
        assert_eq!(kinds.last(), Some(&"basket_unavailable"));
    }

    #[tokio::test]
    async fn internal_errors_are_not_swallowed() {
        let client = BasketServiceClient::new(FailingRpc(Status::internal("boom")))
            .with_policy(fast_policy())
            .with_observer(Arc::new(NoopObserver));

        let err = client.get_basket(&buyer("alice")).await.unwrap_err();

        assert_eq!(err.code(), Some(Code::Internal));
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_surface_unavailability() {
        let (client, service) = setup();
        service.store().set_unavailable(true);

        let err = client.add_to_cart(&buyer("alice"), 1).await.unwrap_err();

        assert!(err.is_unavailability());
        service.store().set_unavailable(false);
        assert_eq!(service.store().basket_count().await, 0);
    }

    /// Reads always miss and every conditional write loses.
    struct AlwaysStale;

    #[async_trait]
    impl BasketRpc for AlwaysStale {
        async fn get_basket_by_id(
            &self,
            _request: BasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            Ok(CustomerBasketResponse::not_found())
        }

        async fn update_basket(
            &self,
            _request: CustomerBasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            Err(Status::aborted("stale"))
        }

        async fn checkout_basket(
            &self,
            _request: CheckoutCustomerBasketRequest,
        ) -> std::result::Result<CheckoutCustomerBasketResponse, Status> {
            Ok(CheckoutCustomerBasketResponse::default())
        }

        async fn delete_basket(
            &self,
            _request: DeleteCustomerBasketRequest,
        ) -> std::result::Result<DeleteCustomerBasketResponse, Status> {
            Ok(DeleteCustomerBasketResponse::default())
        }
    }

    #[tokio::test]
    async fn persistent_conflicts_give_up() {
        let observer = Arc::new(RecordingObserver::default());
        let client = BasketServiceClient::new(AlwaysStale)
            .with_policy(fast_policy())
            .with_observer(observer.clone())
            .with_max_conflict_retries(2);

        let err = client.add_to_cart(&buyer("alice"), 1).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::ConflictRetriesExhausted { attempts: 3 }
        ));
        let conflicts = observer
            .kinds()
            .iter()
            .filter(|k| **k == "update_conflict")
            .count();
        assert_eq!(conflicts, 3);
        assert!(!observer.kinds().contains(&"item_appended"));
    }

    /// Forwards to a real service, but the first update's reply arrives
    /// long after the service committed it.
    struct SlowFirstReply {
        inner: LocalService,
        delayed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl BasketRpc for SlowFirstReply {
        async fn get_basket_by_id(
            &self,
            request: BasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            self.inner.get_basket_by_id(request).await
        }

        async fn update_basket(
            &self,
            request: CustomerBasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            let result = self.inner.update_basket(request).await;
            if !self.delayed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            result
        }

        async fn checkout_basket(
            &self,
            request: CheckoutCustomerBasketRequest,
        ) -> std::result::Result<CheckoutCustomerBasketResponse, Status> {
            self.inner.checkout_basket(request).await
        }

        async fn delete_basket(
            &self,
            request: DeleteCustomerBasketRequest,
        ) -> std::result::Result<DeleteCustomerBasketResponse, Status> {
            self.inner.delete_basket(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resent_update_after_lost_reply_adds_once() {
        let (_, service) = setup();
        let observer = Arc::new(RecordingObserver::default());
        let client = BasketServiceClient::new(SlowFirstReply {
            inner: service.clone(),
            delayed: std::sync::atomic::AtomicBool::new(false),
        })
        .with_policy(
            fast_policy()
                .with_attempt_timeout(Duration::from_millis(100))
                .with_total_timeout(Duration::from_secs(5)),
        )
        .with_observer(observer.clone());
        let alice = buyer("alice");

        let basket = client.add_to_cart(&alice, 7).await.unwrap();

        assert_eq!(basket.items[0].quantity, 1);
        let stored = service.store().get(&alice).await.unwrap().unwrap();
        assert_eq!(stored.basket.total_item_count(), 1);
        let kinds = observer.kinds();
        assert!(kinds.contains(&"retry_scheduled"));
        assert!(!kinds.contains(&"update_conflict"));
        assert_eq!(kinds.iter().filter(|k| **k == "item_appended").count(), 1);
    }

    /// Forwards to a real service, but loses the first conditional update.
    struct StaleOnce {
        inner: LocalService,
        lost: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl BasketRpc for StaleOnce {
        async fn get_basket_by_id(
            &self,
            request: BasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            self.inner.get_basket_by_id(request).await
        }

        async fn update_basket(
            &self,
            request: CustomerBasketRequest,
        ) -> std::result::Result<CustomerBasketResponse, Status> {
            if !self.lost.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(Status::aborted("stale"));
            }
            self.inner.update_basket(request).await
        }

        async fn checkout_basket(
            &self,
            request: CheckoutCustomerBasketRequest,
        ) -> std::result::Result<CheckoutCustomerBasketResponse, Status> {
            self.inner.checkout_basket(request).await
        }

        async fn delete_basket(
            &self,
            request: DeleteCustomerBasketRequest,
        ) -> std::result::Result<DeleteCustomerBasketResponse, Status> {
            self.inner.delete_basket(request).await
        }
    }

    #[tokio::test]
    async fn line_events_follow_the_committed_write() {
        let (_, service) = setup();
        let observer = Arc::new(RecordingObserver::default());
        let client = BasketServiceClient::new(StaleOnce {
            inner: service,
            lost: std::sync::atomic::AtomicBool::new(false),
        })
        .with_policy(fast_policy())
        .with_observer(observer.clone());

        client.add_to_cart(&buyer("alice"), 3).await.unwrap();

        let kinds: Vec<_> = observer
            .kinds()
            .into_iter()
            .filter(|k| *k != "basket_fetched")
            .collect();
        assert_eq!(kinds, vec!["update_conflict", "item_appended", "basket_updated"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_lose_no_update() {
        let (client, _) = setup();
        let client = Arc::new(client.with_max_conflict_retries(50));
        let alice = buyer("alice");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let client = client.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                client.add_to_cart(&alice, 42).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let (basket, _) = client.get_basket(&alice).await.unwrap().into_parts();
        let basket = basket.unwrap();
        assert_eq!(basket.items.len(), 1);
        assert_eq!(basket.items[0].quantity, 10);
    }
}
