//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use catalog::PagingConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on in-memory
///   stores with a demo catalog
/// - `BASKET_TTL_SECS`: basket expiry after the last write (default: none)
/// - `CATALOG_IMAGES_DIR`: directory holding item images (default: `"./images"`)
/// - `CATALOG_DEFAULT_PAGE_SIZE`: page size when none is requested (default: `8`)
/// - `CATALOG_MAX_PAGE_SIZE`: upper bound for requested page sizes (default: `100`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub basket_ttl: Option<Duration>,
    pub images_dir: PathBuf,
    pub paging: PagingConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            basket_ttl: parsed("BASKET_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            images_dir: lookup("CATALOG_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            paging: PagingConfig {
                default_page_size: parsed("CATALOG_DEFAULT_PAGE_SIZE")
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.paging.default_page_size),
                max_page_size: parsed("CATALOG_MAX_PAGE_SIZE")
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.paging.max_page_size),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            basket_ttl: None,
            images_dir: PathBuf::from("./images"),
            paging: PagingConfig::default(),
        }
    }
}
