//! HTTP transport for the basket RPC surface.

use std::time::Duration;

use async_trait::async_trait;
use basket_service::rpc::{method_path, methods};
use basket_service::{
    BasketRequest, BasketRpc, CheckoutCustomerBasketRequest, CheckoutCustomerBasketResponse, Code,
    CustomerBasketRequest, CustomerBasketResponse, DeleteCustomerBasketRequest,
    DeleteCustomerBasketResponse, Status,
};
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

/// Configuration for [`HttpBasketClient`].
#[derive(Debug, Clone)]
pub struct HttpBasketConfig {
    /// Base URL of the basket service, e.g. `"http://localhost:3000"`.
    pub base_url: String,
    /// Connect timeout for new connections.
    pub connect_timeout: Duration,
}

impl Default for HttpBasketConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl HttpBasketConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// [`BasketRpc`] over HTTP.
///
/// Transport failures are reported as statuses: refused or reset
/// connections become `Unavailable`, reqwest timeouts become
/// `DeadlineExceeded`. Per-call deadlines belong to the
/// [`ResiliencePolicy`](crate::ResiliencePolicy), not to this client.
#[derive(Debug, Clone)]
pub struct HttpBasketClient {
    http: Client,
    base_url: Url,
}

impl HttpBasketClient {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the base URL does not parse or
    /// the HTTP client cannot be built.
    pub fn new(config: HttpBasketConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ClientError::Config(format!("Invalid base URL '{}': {e}", config.base_url))
        })?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(format!("basket-client/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {e}")))?;

        tracing::debug!(base_url = %base_url, "created basket http client");

        Ok(Self { http, base_url })
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> std::result::Result<Resp, Status>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(&method_path(method))
            .map_err(|e| Status::internal(format!("Invalid URL: {e}")))?;

        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(status_from_send_error)?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(serde_json::from_slice::<Status>(&body).unwrap_or_else(|_| {
                Status::new(
                    Code::from_http_status(http_status.as_u16()),
                    format!(
                        "{method} failed with HTTP {http_status}: {}",
                        String::from_utf8_lossy(&body)
                    ),
                )
            }));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| Status::internal(format!("Malformed {method} response: {e}")))
    }
}

fn status_from_send_error(error: reqwest::Error) -> Status {
    if error.is_timeout() {
        Status::deadline_exceeded(error.to_string())
    } else if error.is_connect() || error.is_request() {
        Status::unavailable(error.to_string())
    } else {
        Status::internal(error.to_string())
    }
}

#[async_trait]
impl BasketRpc for HttpBasketClient {
    async fn get_basket_by_id(
        &self,
        request: BasketRequest,
    ) -> std::result::Result<CustomerBasketResponse, Status> {
        self.call(methods::GET_BASKET_BY_ID, &request).await
    }

    async fn update_basket(
        &self,
        request: CustomerBasketRequest,
    ) -> std::result::Result<CustomerBasketResponse, Status> {
        self.call(methods::UPDATE_BASKET, &request).await
    }

    async fn checkout_basket(
        &self,
        request: CheckoutCustomerBasketRequest,
    ) -> std::result::Result<CheckoutCustomerBasketResponse, Status> {
        self.call(methods::CHECKOUT_BASKET, &request).await
    }

    async fn delete_basket(
        &self,
        request: DeleteCustomerBasketRequest,
    ) -> std::result::Result<DeleteCustomerBasketResponse, Status> {
        self.call(methods::DELETE_BASKET, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_base_url() {
        let err = HttpBasketClient::new(HttpBasketConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpBasketClient::new(HttpBasketConfig::new(format!("http://{addr}"))).unwrap();
        let err = client
            .get_basket_by_id(BasketRequest {
                id: "alice".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, Code::Unavailable);
    }
}
