//! Client error types.

use std::time::Duration;

use basket_service::{Code, Status};
use common::BasketValidationError;
use thiserror::Error;

/// Errors returned by the basket client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered with a non-OK status.
    #[error("Basket service error: {0}")]
    Rpc(Status),

    /// The resilience policy ran out of time or attempts waiting for answers.
    #[error("Basket service timed out after {attempts} attempt(s) in {elapsed:?}")]
    TimedOut { attempts: u32, elapsed: Duration },

    /// Every conditional write lost against a concurrent writer.
    #[error("Basket update kept conflicting after {attempts} attempt(s)")]
    ConflictRetriesExhausted { attempts: u32 },

    /// The service answered with something that does not match the contract.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The requested change would break a basket invariant.
    #[error("Invalid basket change: {0}")]
    InvalidBasket(#[from] BasketValidationError),

    /// Client configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns true for the two failures that degrade to "basket unavailable":
    /// an `Unavailable` status, or the policy timing out.
    pub fn is_unavailability(&self) -> bool {
        match self {
            ClientError::Rpc(status) => status.code == Code::Unavailable,
            ClientError::TimedOut { .. } => true,
            _ => false,
        }
    }

    /// Returns the status code if the error came from the service.
    pub fn code(&self) -> Option<Code> {
        match self {
            ClientError::Rpc(status) => Some(status.code),
            _ => None,
        }
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Rpc(status)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
