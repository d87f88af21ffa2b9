use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelf-Scout
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub mercadona: Option<MercadonaConfig>,
    #[serde(default)]
    pub carrefour: Option<CarrefourConfig>,
}

/// Pipeline behavior shared by every source
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingConfig {
    /// Number of products flushed to the sink per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for a single network operation (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for a request that timed out or hit a 5xx
    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Pause between sibling category fetches (milliseconds)
    #[serde(rename = "category-delay-ms", default = "default_category_delay_ms")]
    pub category_delay_ms: u64,

    /// Failed category fetches tolerated before a traversal is aborted
    #[serde(
        rename = "max-category-failures",
        default = "default_max_category_failures"
    )]
    pub max_category_failures: usize,
}

impl ScrapingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn category_delay(&self) -> Duration {
        Duration::from_millis(self.category_delay_ms)
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            category_delay_ms: default_category_delay_ms(),
            max_category_failures: default_max_category_failures(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_category_delay_ms() -> u64 {
    200
}

fn default_max_category_failures() -> usize {
    10
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name sent in the User-Agent header
    pub name: String,

    /// Version sent in the User-Agent header
    pub version: String,

    /// Email address for scraper-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+mailto:email)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+mailto:{})",
            self.name, self.version, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Mercadona API source
#[derive(Debug, Clone, Deserialize)]
pub struct MercadonaConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Storefront root, visited during setup to obtain session cookies
    #[serde(rename = "base-url", default = "default_mercadona_base")]
    pub base_url: String,

    /// JSON API root
    #[serde(rename = "api-url", default = "default_mercadona_api")]
    pub api_url: String,

    /// Postal code that selects the warehouse (and therefore the assortment)
    #[serde(rename = "postal-code", default = "default_postal_code")]
    pub postal_code: String,
}

impl Default for MercadonaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_mercadona_base(),
            api_url: default_mercadona_api(),
            postal_code: default_postal_code(),
        }
    }
}

fn default_mercadona_base() -> String {
    "https://tienda.mercadona.es".to_string()
}

fn default_mercadona_api() -> String {
    "https://tienda.mercadona.es/api".to_string()
}

fn default_postal_code() -> String {
    "28001".to_string()
}

/// Carrefour HTML source
#[derive(Debug, Clone, Deserialize)]
pub struct CarrefourConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(rename = "base-url", default = "default_carrefour_base")]
    pub base_url: String,

    /// Top-level category pages to walk
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

fn default_carrefour_base() -> String {
    "https://www.carrefour.es".to_string()
}

/// A category page configured by path
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub path: String,
}

fn default_enabled() -> bool {
    true
}
