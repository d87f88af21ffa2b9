//! Streaming batch ingestor
//!
//! Consumes a source's item stream and persists it in bounded batches. At
//! most `batch_size` items are buffered at any time. A sink failure loses
//! only the batch it was handed; the stream keeps being consumed. A stream
//! failure flushes what is buffered and ends the ingest. A panic raised while
//! polling the stream is treated as a stream failure.

use crate::model::{Item, SourceTag};
use crate::source::ItemStream;
use crate::storage::ProductSink;
use crate::{panic_message, SourceError};
use futures::StreamExt;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Items between two progress log lines
const PROGRESS_INTERVAL: u64 = 100;

/// Counters of one ingest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Items pulled from the stream
    pub found: u64,
    /// Items the sink reported as written
    pub inserted: u64,
    /// Items lost in failed batches
    pub errored: u64,
    /// Sink calls made
    pub batches: u64,
}

/// Stats plus the stream error that cut the ingest short, if any
#[derive(Debug)]
pub struct IngestOutcome {
    pub stats: IngestStats,
    pub failure: Option<SourceError>,
}

impl IngestOutcome {
    /// True when the stream ran to its end
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drains item streams into a sink
#[derive(Clone)]
pub struct BatchIngestor {
    sink: Arc<dyn ProductSink>,
    batch_size: NonZeroUsize,
}

impl BatchIngestor {
    pub fn new(sink: Arc<dyn ProductSink>, batch_size: NonZeroUsize) -> Self {
        Self { sink, batch_size }
    }

    /// Maximum items per sink call
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Ingests `stream` to completion
    ///
    /// Never returns an error itself: a stream failure is reported in
    /// [`IngestOutcome::failure`] together with the counts gathered so far.
    pub async fn ingest(&self, source: SourceTag, stream: ItemStream<'_>) -> IngestOutcome {
        let size = self.batch_size.get();
        let mut stats = IngestStats::default();
        let mut batch: Vec<Item> = Vec::with_capacity(size);
        let mut failure = None;

        // A panicking poll ends the stream like an `Err` item
        let mut stream = AssertUnwindSafe(stream).catch_unwind();
        while let Some(polled) = stream.next().await {
            let next = polled
                .unwrap_or_else(|panic| Err(SourceError::Panicked(panic_message(&*panic))));
            match next {
                Ok(item) => {
                    stats.found += 1;
                    batch.push(item);

                    if stats.found % PROGRESS_INTERVAL == 0 {
                        tracing::info!(source = %source, found = stats.found, "Progress");
                    }

                    if batch.len() >= size {
                        self.flush(source, &mut batch, &mut stats).await;
                    }
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Item stream failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        // Release the stream (and whatever the source holds through it) first
        drop(stream);
        self.flush(source, &mut batch, &mut stats).await;

        IngestOutcome { stats, failure }
    }

    async fn flush(&self, source: SourceTag, batch: &mut Vec<Item>, stats: &mut IngestStats) {
        if batch.is_empty() {
            return;
        }

        stats.batches += 1;
        let len = batch.len() as u64;
        match self.sink.bulk_upsert(batch).await {
            Ok(written) => {
                stats.inserted += (written as u64).min(len);
                tracing::debug!(source = %source, batch = stats.batches, written, "Batch saved");
            }
            Err(e) => {
                stats.errored += len;
                tracing::error!(
                    source = %source,
                    batch = stats.batches,
                    size = len,
                    error = %e,
                    "Batch failed"
                );
            }
        }
        batch.clear();
    }
}
