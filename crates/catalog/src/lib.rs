//! Catalog read path with keyset pagination.
//!
//! Pages are bounded by item id rather than offset: `after` yields the ids
//! above a cursor, `before` the ids below it. Each page reports its first
//! and last id so callers can keep walking with `after = next_id` until a
//! page comes back short.
//!
//! - [`CatalogSource`]: where items come from ([`InMemoryCatalog`],
//!   [`PostgresCatalog`])
//! - [`catalog_router`]: the HTTP listing and image routes
//! - [`CatalogServiceClient`]: single pages, a lazy page stream and
//!   best-effort full walks

pub mod client;
pub mod error;
pub mod item;
pub mod paging;
pub mod postgres;
pub mod routes;
pub mod source;

pub use client::{
    CatalogApi, CatalogServiceClient, CatalogWalk, HttpCatalogApi, PageStream,
};
pub use error::{CatalogError, Result};
pub use item::{CatalogItem, CatalogPage};
pub use paging::{Cursor, PageParams, PageRequest, PagingConfig};
pub use postgres::PostgresCatalog;
pub use routes::{CatalogState, catalog_router};
pub use source::{CatalogSource, InMemoryCatalog};
