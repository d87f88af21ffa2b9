//! Storage module for persisting scraped products
//!
//! This module handles the persistence sink the ingestion pipeline writes to:
//! - The `ProductSink` trait the pipeline depends on
//! - A SQLite implementation upserting on `(external_id, source)`
//! - A discarding sink for dry runs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{open_sink, SqliteSink};
pub use traits::{ProductSink, SinkResult};

use crate::model::Item;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A product row as stored in the database
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub item: Item,
    pub created_at: String,
    pub updated_at: String,
}

/// Sink that accepts every batch and only counts it
#[derive(Debug, Default)]
pub struct DiscardSink {
    received: AtomicU64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total items accepted so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProductSink for DiscardSink {
    async fn bulk_upsert(&self, batch: &[Item]) -> SinkResult<usize> {
        self.received
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(batch.len())
    }
}
