//! Errors raised while starting the server.

use basket_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    /// The database could not be reached.
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The basket store could not be prepared (e.g. migrations failed).
    #[error("Basket store setup failed: {0}")]
    Store(#[from] StoreError),

    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(std::io::Error),

    /// The Prometheus recorder could not be installed.
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),
}
