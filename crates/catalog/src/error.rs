//! Catalog error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur reading or paging the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Both `before` and `after` were supplied.
    #[error(
        "Invalid paging parameters. Only one of before or after can be specified, not both."
    )]
    InvalidPaging,

    /// The requested page size is below 1.
    #[error("Invalid page size {0}; page size must be at least 1")]
    InvalidPageSize(i64),

    /// The catalog source could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Image file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error on the client side.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A catalog service URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The catalog service answered with a non-2xx status.
    #[error("Unexpected response {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl CatalogError {
    /// Returns true for errors caused by the request rather than the
    /// service.
    pub fn is_client_error(&self) -> bool {
        match self {
            CatalogError::InvalidPaging | CatalogError::InvalidPageSize(_) => true,
            CatalogError::UnexpectedResponse { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CatalogError::Unavailable(err.to_string()),
            other => CatalogError::Database(other),
        }
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match &self {
            CatalogError::InvalidPaging | CatalogError::InvalidPageSize(_) => {
                StatusCode::BAD_REQUEST
            }
            CatalogError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "catalog request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
