//! Category tree walker
//!
//! Turns a retailer's category hierarchy into one flat, deduplicated, lazy
//! stream of items. The traversal is depth-first: a node's children are
//! walked before the node's own items are emitted. Only the current path of
//! the tree is held in memory; category details are fetched as the consumer
//! pulls.
//!
//! Failure policy:
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Root listing fails | Stream yields the error and ends |
//! | Category detail fails | Logged, category skipped |
//! | More than `max_failures` category failures | Stream yields `TooManyFailures` and ends |
//! | Item payload fails to parse | Logged, record dropped |
//! | Item id already yielded | Silently dropped |
//! | Node id already visited | Skipped (cycle guard) |

use crate::model::Item;
use crate::source::ItemStream;
use crate::{RecordParseError, SourceError, SourceResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Separator used when building breadcrumbs, e.g. `Congelados > Pescado`
pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// One node of a retailer's category taxonomy
///
/// A node with neither children nor items is a stub: the walker asks the
/// client for its detail before descending. A node may carry both children
/// and items.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode<P> {
    pub id: String,
    pub name: String,
    pub children: Vec<CategoryNode<P>>,
    pub items: Vec<P>,
}

impl<P> CategoryNode<P> {
    pub fn stub(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<CategoryNode<P>>) -> Self {
        self.children = children;
        self
    }

    pub fn with_items(mut self, items: Vec<P>) -> Self {
        self.items = items;
        self
    }

    pub fn is_stub(&self) -> bool {
        self.children.is_empty() && self.items.is_empty()
    }
}

/// Request/response access to a retailer's catalog
#[async_trait]
pub trait CatalogClient: Send + Sync + 'static {
    /// Raw item payload as delivered by the retailer
    type Payload: Send + 'static;

    /// Top-level categories
    async fn root_categories(&self) -> SourceResult<Vec<CategoryNode<Self::Payload>>>;

    /// Resolves a stub; `None` when the category no longer exists
    async fn category_detail(
        &self,
        id: &str,
    ) -> SourceResult<Option<CategoryNode<Self::Payload>>>;

    /// Normalizes one payload found under `breadcrumb`
    fn parse_item(
        &self,
        payload: &Self::Payload,
        breadcrumb: &str,
    ) -> Result<Item, RecordParseError>;
}

/// Walker policy parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Pause before every category fetch after the first
    pub pacing: Duration,
    /// Failed category fetches tolerated per traversal
    pub max_failures: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(200),
            max_failures: 10,
        }
    }
}

/// Walks the catalog exposed by `client`
///
/// The returned stream owns its dedup set; nothing is shared across calls.
pub fn walk_catalog<C: CatalogClient>(
    client: Arc<C>,
    config: WalkerConfig,
) -> ItemStream<'static> {
    stream::unfold(Walk::new(client, config), |mut walk| async move {
        let next = walk.next_item().await?;
        Some((next, walk))
    })
    .boxed()
}

enum Task<P> {
    Visit {
        node: CategoryNode<P>,
        parent_path: String,
    },
    Emit {
        items: std::vec::IntoIter<P>,
        path: String,
    },
}

#[derive(Debug, Default)]
struct WalkStats {
    categories: usize,
    yielded: usize,
    duplicates: usize,
    dropped: usize,
    failures: usize,
}

struct Walk<C: CatalogClient> {
    client: Arc<C>,
    config: WalkerConfig,
    stack: Vec<Task<C::Payload>>,
    seen_items: HashSet<String>,
    visited_nodes: HashSet<String>,
    started: bool,
    finished: bool,
    fetches: usize,
    stats: WalkStats,
}

impl<C: CatalogClient> Walk<C> {
    fn new(client: Arc<C>, config: WalkerConfig) -> Self {
        Self {
            client,
            config,
            stack: Vec::new(),
            seen_items: HashSet::new(),
            visited_nodes: HashSet::new(),
            started: false,
            finished: false,
            fetches: 0,
            stats: WalkStats::default(),
        }
    }

    async fn next_item(&mut self) -> Option<SourceResult<Item>> {
        if self.finished {
            return None;
        }

        if !self.started {
            self.started = true;
            match self.client.root_categories().await {
                Ok(roots) => {
                    tracing::info!("Found {} top-level categories", roots.len());
                    self.push_children(roots, "");
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }

        while let Some(task) = self.stack.pop() {
            match task {
                Task::Emit { mut items, path } => {
                    while let Some(payload) = items.next() {
                        match self.client.parse_item(&payload, &path) {
                            Ok(item) => {
                                if !self.seen_items.insert(item.external_id.clone()) {
                                    self.stats.duplicates += 1;
                                    tracing::trace!(
                                        id = %item.external_id,
                                        "Duplicate product skipped"
                                    );
                                    continue;
                                }
                                self.stats.yielded += 1;
                                self.stack.push(Task::Emit { items, path });
                                return Some(Ok(item));
                            }
                            Err(e) => {
                                self.stats.dropped += 1;
                                tracing::warn!(
                                    category = %path,
                                    error = %e,
                                    "Dropping unparsable product"
                                );
                            }
                        }
                    }
                }
                Task::Visit { node, parent_path } => {
                    if let Err(e) = self.visit(node, &parent_path).await {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
        }

        self.finished = true;
        tracing::info!(
            categories = self.stats.categories,
            products = self.stats.yielded,
            duplicates = self.stats.duplicates,
            dropped = self.stats.dropped,
            failures = self.stats.failures,
            "Catalog walk completed"
        );
        None
    }

    /// Expands one node onto the stack; only returns an error once the
    /// failure budget is exhausted
    async fn visit(
        &mut self,
        node: CategoryNode<C::Payload>,
        parent_path: &str,
    ) -> SourceResult<()> {
        if !self.visited_nodes.insert(node.id.clone()) {
            tracing::debug!(id = %node.id, "Category already visited, skipping");
            return Ok(());
        }

        let path = if parent_path.is_empty() {
            node.name.clone()
        } else {
            format!("{}{}{}", parent_path, BREADCRUMB_SEPARATOR, node.name)
        };

        let node = if node.is_stub() {
            match self.fetch_detail(&node.id, &path).await? {
                Some(detail) => detail,
                None => return Ok(()),
            }
        } else {
            node
        };

        self.stats.categories += 1;
        if !node.items.is_empty() {
            self.stack.push(Task::Emit {
                items: node.items.into_iter(),
                path: path.clone(),
            });
        }
        self.push_children(node.children, &path);
        Ok(())
    }

    async fn fetch_detail(
        &mut self,
        id: &str,
        path: &str,
    ) -> SourceResult<Option<CategoryNode<C::Payload>>> {
        if self.fetches > 0 && !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }
        self.fetches += 1;

        tracing::debug!(category = %path, "Fetching category");
        match self.client.category_detail(id).await {
            Ok(detail) => {
                if detail.is_none() {
                    tracing::debug!(category = %path, "Category not found, skipping");
                }
                Ok(detail)
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(category = %path, error = %e, "Category fetch failed");
                if self.stats.failures > self.config.max_failures {
                    Err(SourceError::TooManyFailures {
                        failures: self.stats.failures,
                    })
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn push_children(&mut self, children: Vec<CategoryNode<C::Payload>>, parent_path: &str) {
        for child in children.into_iter().rev() {
            self.stack.push(Task::Visit {
                node: child,
                parent_path: parent_path.to_string(),
            });
        }
    }
}
