//! Sink trait
//!
//! The pipeline's only requirement on persistence: a bulk upsert keyed on
//! `(external_id, source)`.

use crate::model::Item;
use crate::SinkError;
use async_trait::async_trait;

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for persistence sink implementations
///
/// Implementations must be idempotent under retry and must fail a batch as a
/// unit: on `Err` the pipeline assumes nothing from the batch was written.
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Inserts or updates every item of `batch`, keyed on `(external_id, source)`
    ///
    /// # Returns
    ///
    /// The number of rows the sink reports as written
    async fn bulk_upsert(&self, batch: &[Item]) -> SinkResult<usize>;
}
