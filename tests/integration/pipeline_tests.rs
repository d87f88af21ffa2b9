//! Integration tests for the run pipeline
//!
//! These tests drive the coordinator with scripted in-memory sources and
//! recording sinks to check the run-level guarantees: single-flight,
//! cleanup on failure, bounded batches and sequential aggregation.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use shelf_scout::model::Item;
use shelf_scout::source::ItemStream;
use shelf_scout::storage::{ProductSink, SinkResult};
use shelf_scout::{
    Coordinator, RunStatus, ScrapeError, SinkError, Source, SourceError, SourceRegistry,
    SourceResult, SourceTag, SqliteSink,
};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Notify;

/// A source whose behavior is fixed up front
#[derive(Clone)]
struct Scripted {
    tag: SourceTag,
    items: usize,
    fail_setup: bool,
    fail_after: bool,
    panic_after: bool,
    gate: Option<Arc<Notify>>,
    teardowns: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(tag: SourceTag, items: usize) -> Self {
        Self {
            tag,
            items,
            fail_setup: false,
            fail_after: false,
            panic_after: false,
            gate: None,
            teardowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Source for Scripted {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    async fn setup(&mut self) -> SourceResult<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_setup {
            return Err(SourceError::Unavailable("login rejected".to_string()));
        }
        Ok(())
    }

    fn produce_items(&mut self) -> ItemStream<'_> {
        let tag = self.tag;
        let items = (0..self.items).map(move |i| {
            Ok(Item::new(format!("{}-{}", tag, i), tag, "Queso curado", Decimal::TEN).unwrap())
        });
        let tail = self.fail_after.then(|| {
            Err(SourceError::Timeout {
                url: "https://example.com/categories/7/".to_string(),
            })
        });
        let items = stream::iter(items.chain(tail));
        if self.panic_after {
            items.chain(stream::poll_fn(explode)).boxed()
        } else {
            items.boxed()
        }
    }

    async fn teardown(&mut self) -> SourceResult<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn explode(_: &mut Context<'_>) -> Poll<Option<SourceResult<Item>>> {
    panic!("unexpected category layout")
}

/// Records the size of every batch; fails the calls listed in `fail_on` (1-based)
#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<usize>>,
    fail_on: Vec<usize>,
}

impl RecordingSink {
    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductSink for RecordingSink {
    async fn bulk_upsert(&self, batch: &[Item]) -> SinkResult<usize> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(batch.len());
        if self.fail_on.contains(&calls.len()) {
            return Err(SinkError::Rejected("disk full".to_string()));
        }
        Ok(batch.len())
    }
}

fn registry_of(sources: Vec<Scripted>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for source in sources {
        let tag = source.tag;
        registry.register(tag, move || Box::new(source.clone()));
    }
    registry
}

fn batch(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap()
}

#[tokio::test]
async fn test_concurrent_runs_are_single_flight() {
    let gate = Arc::new(Notify::new());
    let mut slow = Scripted::new(SourceTag::Mercadona, 3);
    slow.gate = Some(gate.clone());
    let fast = Scripted::new(SourceTag::Carrefour, 1);

    let coordinator = Coordinator::new(
        registry_of(vec![slow, fast]),
        Arc::new(RecordingSink::default()),
        batch(10),
    );

    let (first, second) = tokio::join!(coordinator.run_one(SourceTag::Mercadona), async {
        let rejected = coordinator.run_one(SourceTag::Carrefour).await;
        let all_rejected = coordinator.run_all().await;

        let status = coordinator.get_status();
        assert!(status.running);
        assert_eq!(status.current_source, Some(SourceTag::Mercadona));

        gate.notify_one();
        (rejected, all_rejected)
    });

    let first = first.unwrap();
    assert!(first.success);
    assert_eq!(first.found, 3);
    assert!(matches!(second.0, Err(ScrapeError::AlreadyRunning)));
    assert!(matches!(second.1, Err(ScrapeError::AlreadyRunning)));

    let status = coordinator.get_status();
    assert!(!status.running);
    assert_eq!(status.last_results, vec![first]);
}

#[tokio::test]
async fn test_stream_failure_flushes_buffer_and_keeps_counts() {
    let mut failing = Scripted::new(SourceTag::Dia, 10);
    failing.fail_after = true;
    let teardowns = failing.teardowns.clone();
    let sink = Arc::new(RecordingSink::default());

    let coordinator = Coordinator::new(registry_of(vec![failing]), sink.clone(), batch(4));
    let result = coordinator.run_one(SourceTag::Dia).await.unwrap();

    assert_eq!(sink.calls(), vec![4, 4, 2]);
    assert!(!result.success);
    assert_eq!(result.found, 10);
    assert_eq!(result.inserted, 10);
    assert!(result.error_message.unwrap().contains("timeout"));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_abandoned_run_still_tears_down_source() {
    let mut stuck = Scripted::new(SourceTag::Mercadona, 3);
    stuck.gate = Some(Arc::new(Notify::new()));
    let teardowns = stuck.teardowns.clone();

    let coordinator = Coordinator::new(
        registry_of(vec![stuck]),
        Arc::new(RecordingSink::default()),
        batch(2),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        coordinator.run_one(SourceTag::Mercadona),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!coordinator.is_running());

    // Teardown happens on a background task
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(coordinator.get_status().last_results.is_empty());
}

#[tokio::test]
async fn test_stream_panic_keeps_committed_counts() {
    let mut panicking = Scripted::new(SourceTag::Dia, 4);
    panicking.panic_after = true;
    let teardowns = panicking.teardowns.clone();
    let sink = Arc::new(RecordingSink::default());

    let coordinator = Coordinator::new(registry_of(vec![panicking]), sink.clone(), batch(2));
    let result = coordinator.run_one(SourceTag::Dia).await.unwrap();

    assert_eq!(sink.calls(), vec![2, 2]);
    assert!(!result.success);
    assert_eq!(result.found, 4);
    assert_eq!(result.inserted, 4);
    assert!(result
        .error_message
        .unwrap()
        .contains("unexpected category layout"));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_unknown_source_leaves_status_untouched() {
    let coordinator = Coordinator::new(
        registry_of(vec![Scripted::new(SourceTag::Dia, 1)]),
        Arc::new(RecordingSink::default()),
        batch(4),
    );

    let err = coordinator.run_one(SourceTag::Lidl).await.unwrap_err();
    assert!(matches!(err, ScrapeError::UnknownSource(ref name) if name == "lidl"));
    assert_eq!(coordinator.get_status(), RunStatus::default());
}

#[tokio::test]
async fn test_run_all_continues_past_failing_source() {
    let mut broken = Scripted::new(SourceTag::Carrefour, 5);
    broken.fail_setup = true;
    let broken_teardowns = broken.teardowns.clone();

    let coordinator = Coordinator::new(
        registry_of(vec![
            Scripted::new(SourceTag::Mercadona, 3),
            broken,
            Scripted::new(SourceTag::Alcampo, 2),
        ]),
        Arc::new(RecordingSink::default()),
        batch(2),
    );

    let results = coordinator.run_all().await.unwrap();

    let tags: Vec<SourceTag> = results.iter().map(|r| r.source).collect();
    assert_eq!(
        tags,
        vec![SourceTag::Mercadona, SourceTag::Carrefour, SourceTag::Alcampo]
    );
    let outcomes: Vec<bool> = results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, vec![true, false, true]);

    assert_eq!(results[1].found, 0);
    assert!(results[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("login rejected"));
    // Teardown still runs when setup fails
    assert_eq!(broken_teardowns.load(Ordering::SeqCst), 1);

    let status = coordinator.get_status();
    assert_eq!(status.last_results, results);
    assert!(status.last_run.is_some());
}

#[tokio::test]
async fn test_sink_calls_are_bounded_by_batch_size() {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Coordinator::new(
        registry_of(vec![Scripted::new(SourceTag::Eroski, 25)]),
        sink.clone(),
        batch(7),
    );

    let result = coordinator.run_one(SourceTag::Eroski).await.unwrap();

    assert_eq!(sink.calls(), vec![7, 7, 7, 4]);
    assert_eq!(result.found, 25);
}

#[tokio::test]
async fn test_failed_batches_are_counted_without_failing_run() {
    let sink = Arc::new(RecordingSink {
        fail_on: vec![1, 3],
        ..Default::default()
    });
    let coordinator = Coordinator::new(
        registry_of(vec![Scripted::new(SourceTag::Lidl, 9)]),
        sink.clone(),
        batch(3),
    );

    let result = coordinator.run_one(SourceTag::Lidl).await.unwrap();

    assert!(result.success);
    assert_eq!(sink.calls(), vec![3, 3, 3]);
    assert_eq!(result.inserted, 3);
    assert_eq!(result.errored, 6);
    assert!(result.inserted + result.errored <= result.found);
}

#[tokio::test]
async fn test_repeated_runs_upsert_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(SqliteSink::new(&dir.path().join("products.db")).unwrap());

    let coordinator = Coordinator::new(
        registry_of(vec![Scripted::new(SourceTag::Mercadona, 12)]),
        sink.clone(),
        batch(5),
    );

    let first = coordinator.run_one(SourceTag::Mercadona).await.unwrap();
    let second = coordinator.run_one(SourceTag::Mercadona).await.unwrap();

    assert_eq!(first.inserted, 12);
    assert_eq!(second.inserted, 12);
    assert_eq!(sink.count_total().unwrap(), 12);
}
