//! Run coordinator - single-flight orchestration of source runs
//!
//! The coordinator owns the process-wide `RunStatus`. It admits one run at a
//! time: `run_one` and `run_all` both check-and-set the running flag under a
//! short lock and are rejected with `AlreadyRunning` while another run is in
//! flight. The lock is never held across an await, so `get_status` is never
//! blocked by a run in progress.
//!
//! Every run drives a fresh source instance through
//! setup → item stream → batch ingest → teardown. Whatever happens in
//! between (setup failure, stream failure, a panicking source) the caller
//! gets a `RunResult` and the status returns to idle.

use crate::config::Config;
use crate::ingest::{BatchIngestor, IngestStats};
use crate::model::{RunResult, RunStatus, SourceTag};
use crate::source::{Source, SourceRegistry};
use crate::storage::ProductSink;
use crate::{panic_message, ConfigError, ScrapeError, SourceError};
use chrono::Utc;
use futures::FutureExt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Main coordinator structure
pub struct Coordinator {
    registry: SourceRegistry,
    ingestor: BatchIngestor,
    status: Mutex<RunStatus>,
}

impl Coordinator {
    /// Creates a coordinator over `registry`, writing to `sink`
    ///
    /// # Arguments
    ///
    /// * `registry` - Sources that can be run, in `run_all` order
    /// * `sink` - Persistence sink shared by every run
    /// * `batch_size` - Items per sink call
    pub fn new(
        registry: SourceRegistry,
        sink: Arc<dyn ProductSink>,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            registry,
            ingestor: BatchIngestor::new(sink, batch_size),
            status: Mutex::new(RunStatus::default()),
        }
    }

    /// Creates a coordinator for the sources enabled in `config`
    pub fn from_config(config: &Config, sink: Arc<dyn ProductSink>) -> crate::Result<Self> {
        let batch_size = NonZeroUsize::new(config.scraping.batch_size).ok_or_else(|| {
            ConfigError::Validation("batch-size must be at least 1".to_string())
        })?;

        Ok(Self::new(SourceRegistry::from_config(config), sink, batch_size))
    }

    /// Snapshot of the current run state
    pub fn get_status(&self) -> RunStatus {
        self.lock_status().clone()
    }

    /// True while a run is in flight
    pub fn is_running(&self) -> bool {
        self.lock_status().running
    }

    /// Registered sources in `run_all` order
    pub fn list_sources(&self) -> Vec<SourceTag> {
        self.registry.tags()
    }

    /// Runs a single source
    ///
    /// # Returns
    ///
    /// * `Ok(RunResult)` - The run happened; check `success` for its outcome
    /// * `Err(ScrapeError::UnknownSource)` - Nothing registered under `tag`
    /// * `Err(ScrapeError::AlreadyRunning)` - Another run is in flight
    pub async fn run_one(&self, tag: SourceTag) -> crate::Result<RunResult> {
        if !self.registry.contains(tag) {
            return Err(ScrapeError::UnknownSource(tag.to_string()));
        }

        let _guard = self.begin()?;
        Ok(self.execute(tag).await)
    }

    /// Runs the source named `name` (a tag such as `"mercadona"`)
    pub async fn run_named(&self, name: &str) -> crate::Result<RunResult> {
        let tag: SourceTag = name.parse()?;
        self.run_one(tag).await
    }

    /// Runs every registered source, one after another
    ///
    /// A failing source does not stop the sweep; the returned results follow
    /// registry order.
    pub async fn run_all(&self) -> crate::Result<Vec<RunResult>> {
        let _guard = self.begin()?;
        let tags = self.registry.tags();
        tracing::info!(sources = tags.len(), "Starting run of all sources");

        let mut results = Vec::with_capacity(tags.len());
        for tag in tags {
            results.push(self.execute(tag).await);
        }

        let inserted: u64 = results.iter().map(|r| r.inserted).sum();
        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            sources = results.len(),
            failed,
            inserted,
            "Run of all sources completed"
        );
        Ok(results)
    }

    /// Transitions Idle → Running, or rejects the request
    fn begin(&self) -> crate::Result<RunGuard<'_>> {
        let mut status = self.lock_status();
        if status.running {
            tracing::warn!("Rejecting run request: a run is already in progress");
            return Err(ScrapeError::AlreadyRunning);
        }

        status.running = true;
        status.current_source = None;
        status.last_results.clear();
        Ok(RunGuard {
            status: &self.status,
        })
    }

    /// Runs one source to completion and records its result
    async fn execute(&self, tag: SourceTag) -> RunResult {
        self.lock_status().current_source = Some(tag);
        let started = Instant::now();

        let result = match self.registry.create(tag) {
            Some(source) => {
                tracing::info!(source = %tag, name = source.name(), "Starting scrape");

                let mut lease = SourceLease::new(tag, source);
                let result = match lease.source.as_deref_mut() {
                    Some(source) => self.drive_guarded(source, tag, started).await,
                    None => RunResult::failed(
                        tag,
                        IngestStats::default(),
                        started.elapsed(),
                        "source was released before it ran",
                    ),
                };

                lease.release().await;
                result
            }
            None => RunResult::failed(
                tag,
                IngestStats::default(),
                started.elapsed(),
                ScrapeError::UnknownSource(tag.to_string()),
            ),
        };

        if result.success {
            tracing::info!(source = %tag, "{}", result.summary());
        } else {
            tracing::error!(source = %tag, "{}", result.summary());
        }

        self.lock_status().last_results.push(result.clone());
        result
    }

    /// Runs `drive`, turning a panic in setup or stream creation into a failed result
    async fn drive_guarded(
        &self,
        source: &mut dyn Source,
        tag: SourceTag,
        started: Instant,
    ) -> RunResult {
        match AssertUnwindSafe(self.drive(source, tag, started))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => RunResult::failed(
                tag,
                IngestStats::default(),
                started.elapsed(),
                SourceError::Panicked(panic_message(&*panic)),
            ),
        }
    }

    async fn drive(&self, source: &mut dyn Source, tag: SourceTag, started: Instant) -> RunResult {
        if let Err(e) = source.setup().await {
            tracing::error!(source = %tag, error = %e, "Source setup failed");
            return RunResult::failed(tag, IngestStats::default(), started.elapsed(), e);
        }

        let outcome = self.ingestor.ingest(tag, source.produce_items()).await;
        match outcome.failure {
            None => RunResult::completed(tag, outcome.stats, started.elapsed()),
            Some(e) => RunResult::failed(tag, outcome.stats, started.elapsed(), e),
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, RunStatus> {
        lock_status(&self.status)
    }
}

/// Calls `teardown`; its failures are logged and never change the run's result
async fn release(source: &mut dyn Source, tag: SourceTag) {
    match AssertUnwindSafe(source.teardown()).catch_unwind().await {
        Ok(Ok(())) => tracing::debug!(source = %tag, "Source released"),
        Ok(Err(e)) => tracing::warn!(source = %tag, error = %e, "Source teardown failed"),
        Err(panic) => tracing::warn!(
            source = %tag,
            panic = %panic_message(&*panic),
            "Source teardown panicked"
        ),
    }
}

/// Status survives a panic while locked; the data is plain and always consistent
fn lock_status(status: &Mutex<RunStatus>) -> MutexGuard<'_, RunStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns a source for the length of a run
///
/// `release` awaits teardown in place. If the run future is dropped first,
/// the source is handed to a background task that tears it down.
struct SourceLease {
    tag: SourceTag,
    source: Option<Box<dyn Source>>,
}

impl SourceLease {
    fn new(tag: SourceTag, source: Box<dyn Source>) -> Self {
        Self {
            tag,
            source: Some(source),
        }
    }

    async fn release(mut self) {
        if let Some(mut source) = self.source.take() {
            release(source.as_mut(), self.tag).await;
        }
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };

        let tag = self.tag;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    source = %tag,
                    "Run abandoned; tearing source down in the background"
                );
                handle.spawn(async move {
                    release(source.as_mut(), tag).await;
                });
            }
            Err(_) => tracing::warn!(
                source = %tag,
                "Run abandoned outside a runtime; source not torn down"
            ),
        }
    }
}

/// Returns the coordinator to idle when dropped
///
/// Dropping happens on every exit path of a run, including when the caller
/// drops the run future midway.
struct RunGuard<'a> {
    status: &'a Mutex<RunStatus>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut status = lock_status(self.status);
        status.running = false;
        status.current_source = None;
        status.last_run = Some(Utc::now());
    }
}
