//! Source module: everything a retailer implementation needs
//!
//! This module contains:
//! - The `Source` lifecycle contract (identity, setup, item stream, teardown)
//! - The tag-keyed `SourceRegistry` the coordinator resolves runs against
//! - The generic category tree walker sources compose internally
//! - HTTP session helpers with retry and per-request timeouts
//! - Concrete retailers

mod carrefour;
mod http;
mod mercadona;
mod walker;

pub use carrefour::{parse_product_cards, CarrefourSource, ProductCard};
pub use http::{build_http_client, HttpSession};
pub use mercadona::{parse_mercadona_product, MercadonaSource};
pub use walker::{
    walk_catalog, CatalogClient, CategoryNode, WalkerConfig, BREADCRUMB_SEPARATOR,
};

use crate::config::{Config, ScrapingConfig};
use crate::model::{Item, SourceTag};
use crate::SourceResult;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite, non-restartable sequence of items
pub type ItemStream<'a> = BoxStream<'a, SourceResult<Item>>;

/// Lifecycle contract every retailer implements
///
/// A run drives one instance through `setup` → `produce_items` → `teardown`.
/// `teardown` is called on every exit path once `setup` has been attempted,
/// including when `setup` itself failed, so it must tolerate partially
/// acquired resources. An instance yields its stream once; a fresh instance
/// is needed to scrape again.
#[async_trait]
pub trait Source: Send {
    fn tag(&self) -> SourceTag;

    fn name(&self) -> &str {
        self.tag().display_name()
    }

    fn identity(&self) -> (SourceTag, &str) {
        (self.tag(), self.name())
    }

    /// Acquires the session the source needs; failures map to
    /// `SourceError::Unavailable` and abort the run before any item
    async fn setup(&mut self) -> SourceResult<()> {
        Ok(())
    }

    /// Returns the item stream; may fail mid-stream with a `SourceError`
    fn produce_items(&mut self) -> ItemStream<'_>;

    /// Releases whatever `setup` acquired
    async fn teardown(&mut self) -> SourceResult<()> {
        Ok(())
    }
}

/// Builds a fresh source instance for one run
pub type SourceFactory = Box<dyn Fn() -> Box<dyn Source> + Send + Sync>;

/// Tag-keyed lookup table of source factories
///
/// Iteration order is registration order and never changes, which is what
/// gives `run_all` its deterministic sequence.
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<(SourceTag, SourceFactory)>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the enabled retailers of `config`, in tag order
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        if let Some(mercadona) = config.mercadona.clone().filter(|m| m.enabled) {
            let scraping = config.scraping.clone();
            let user_agent = config.user_agent.clone();
            registry.register(SourceTag::Mercadona, move || {
                Box::new(MercadonaSource::new(
                    mercadona.clone(),
                    scraping.clone(),
                    user_agent.clone(),
                ))
            });
        }

        if let Some(carrefour) = config.carrefour.clone().filter(|c| c.enabled) {
            let scraping = config.scraping.clone();
            let user_agent = config.user_agent.clone();
            registry.register(SourceTag::Carrefour, move || {
                Box::new(CarrefourSource::new(
                    carrefour.clone(),
                    scraping.clone(),
                    user_agent.clone(),
                ))
            });
        }

        registry
    }

    /// Registers `factory` under `tag`; re-registering keeps its position
    pub fn register<F>(&mut self, tag: SourceTag, factory: F)
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        let factory: SourceFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((tag, factory)),
        }
    }

    pub fn contains(&self, tag: SourceTag) -> bool {
        self.entries.iter().any(|(t, _)| *t == tag)
    }

    /// Creates a new instance of the source registered under `tag`
    pub fn create(&self, tag: SourceTag) -> Option<Box<dyn Source>> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, factory)| factory())
    }

    /// Registered tags in run order
    pub fn tags(&self) -> Vec<SourceTag> {
        self.entries.iter().map(|(tag, _)| *tag).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WalkerConfig {
    pub fn from_scraping(config: &ScrapingConfig) -> Self {
        Self {
            pacing: config.category_delay(),
            max_failures: config.max_category_failures,
        }
    }
}
