use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a buyer identifier is empty or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("buyer id must not be empty")]
pub struct InvalidBuyerId;

/// Identity a basket is keyed by.
///
/// Assigned externally (by the storefront's identity provider) and never
/// empty, so an empty string on the wire can never be confused with a
/// real buyer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuyerId(String);

impl BuyerId {
    /// Parses a buyer id, rejecting empty or whitespace-only input.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidBuyerId> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(InvalidBuyerId);
        }
        Ok(Self(value))
    }

    /// Returns the buyer id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuyerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BuyerId {
    type Error = InvalidBuyerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for BuyerId {
    type Error = InvalidBuyerId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BuyerId> for String {
    fn from(id: BuyerId) -> Self {
        id.0
    }
}

impl AsRef<str> for BuyerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier of a basket line.
///
/// Freshly generated ids are random 128-bit values rendered as 32 lowercase
/// hex characters without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generates a new random item id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing item id as received from the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Version of a stored basket, used for optimistic concurrency control.
///
/// `0` means the basket does not exist; every successful write bumps the
/// version by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a basket that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}
