//! Keyset cursors and page request validation.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CatalogError, Result};

/// Where a page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// The lowest ids.
    First,
    /// Ids strictly below the given id; the page holds the highest of them.
    Before(i32),
    /// Ids strictly above the given id.
    After(i32),
}

impl Cursor {
    /// Builds a cursor from optional query values.
    ///
    /// Values ≤ 0 count as absent. Both cursors set is rejected with
    /// [`CatalogError::InvalidPaging`].
    pub fn from_bounds(before: Option<i32>, after: Option<i32>) -> Result<Self> {
        let before = before.filter(|id| *id > 0);
        let after = after.filter(|id| *id > 0);

        match (before, after) {
            (None, None) => Ok(Cursor::First),
            (Some(before), None) => Ok(Cursor::Before(before)),
            (None, Some(after)) => Ok(Cursor::After(after)),
            (Some(_), Some(_)) => Err(CatalogError::InvalidPaging),
        }
    }

    /// Query parameters for this cursor, as `(name, value)` pairs.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Cursor::First => Vec::new(),
            Cursor::Before(id) => vec![("before", id.to_string())],
            Cursor::After(id) => vec![("after", id.to_string())],
        }
    }
}

/// Page size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 8,
            max_page_size: 100,
        }
    }
}

impl PagingConfig {
    /// Resolves a requested page size: absent means the default, sizes
    /// below 1 are rejected, sizes above the maximum are capped.
    pub fn page_size(&self, requested: Option<i64>) -> Result<usize> {
        match requested {
            None => Ok(self.default_page_size.clamp(1, self.max_page_size.max(1))),
            Some(size) if size < 1 => Err(CatalogError::InvalidPageSize(size)),
            Some(size) => Ok(usize::try_from(size)
                .unwrap_or(usize::MAX)
                .min(self.max_page_size.max(1))),
        }
    }
}

/// Query string of the listing routes.
///
/// Empty values (`?before=&after=`) read as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub before: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub after: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub page_size: Option<i64>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    use serde::de::Error;

    let value: Option<String> = Option::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("cannot parse '{raw}': {e}"))),
    }
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub brand_id: Option<i32>,
    pub cursor: Cursor,
    pub page_size: usize,
}

impl PageRequest {
    pub fn parse(brand_id: Option<i32>, params: &PageParams, config: &PagingConfig) -> Result<Self> {
        Ok(Self {
            brand_id,
            cursor: Cursor::from_bounds(params.before, params.after)?,
            page_size: config.page_size(params.page_size)?,
        })
    }
}
