//! Concurrent recursive crawler over a secret tree.
//!
//! The store can only list the direct children of a folder, so the tree is
//! discovered level by level. A pool of worker tasks reads from one shared
//! unbounded queue: expanding a folder enqueues its children, fetching a leaf
//! emits a [`SecretMetadata`] on an unbounded output channel that backs the
//! returned [`CrawlStream`].
//!
//! ## Termination
//!
//! An outstanding-work counter starts at the number of roots. A worker adds
//! the number of children *before* enqueueing them and only then subtracts
//! its own item, so the counter cannot reach zero while work is queued or in
//! flight. The worker that observes the transition to zero stops the pool;
//! once the last worker exits the output channel closes and the stream ends.
//!
//! ## Failures
//!
//! A failure on a requested root is fatal: the stream yields a single
//! [`InventoryError::CrawlRoot`] and the crawl stops. Failures on nodes found
//! during the crawl are logged, counted and skipped.

use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn, Instrument};

use super::client::StoreClient;
use super::metadata::SecretMetadata;
use super::path::SecretPath;
use crate::errors::{InventoryError, Result};

/// Unit of work on the crawl queue
#[derive(Debug, Clone)]
enum WorkItem {
    /// List a root or folder
    Expand { path: SecretPath, root: bool },
    /// Read a leaf's metadata
    Fetch { path: SecretPath, root: bool },
}

impl WorkItem {
    fn target(&self) -> (SecretPath, bool) {
        match self {
            WorkItem::Expand { path, root } | WorkItem::Fetch { path, root } => {
                (path.clone(), *root)
            }
        }
    }

    fn for_path(path: SecretPath, root: bool) -> Self {
        if path.is_leaf() {
            WorkItem::Fetch { path, root }
        } else {
            WorkItem::Expand { path, root }
        }
    }
}

/// Counters for one crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub folders_listed: u64,
    pub leaves_read: u64,
    pub nodes_skipped: u64,
}

#[derive(Debug, Default)]
struct CrawlCounters {
    folders_listed: AtomicU64,
    leaves_read: AtomicU64,
    nodes_skipped: AtomicU64,
}

impl CrawlCounters {
    fn folder_listed(&self) {
        self.folders_listed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vault_inventory_folders_listed_total").increment(1);
    }

    fn leaf_read(&self) {
        self.leaves_read.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vault_inventory_leaves_read_total").increment(1);
    }

    fn node_skipped(&self) {
        self.nodes_skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vault_inventory_nodes_skipped_total").increment(1);
    }

    fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            folders_listed: self.folders_listed.load(Ordering::Relaxed),
            leaves_read: self.leaves_read.load(Ordering::Relaxed),
            nodes_skipped: self.nodes_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Enumerates every leaf below a set of roots.
#[derive(Clone)]
pub struct TreeCrawler {
    store: Arc<dyn StoreClient>,
    concurrency: usize,
}

impl TreeCrawler {
    /// `concurrency` is the number of workers; 0 is treated as 1.
    pub fn new(store: Arc<dyn StoreClient>, concurrency: usize) -> Self {
        Self { store, concurrency: concurrency.max(1) }
    }

    /// Start crawling `roots` and stream leaf metadata as it is discovered.
    ///
    /// Must be called within a tokio runtime. Dropping the returned stream
    /// cancels the crawl.
    pub fn crawl(&self, roots: Vec<SecretPath>) -> CrawlStream {
        let cancel = CancellationToken::new();
        let counters = Arc::new(CrawlCounters::default());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let span = crate::crawl_span!(roots.len(), concurrency = self.concurrency);
        info!(parent: &span, roots = roots.len(), "Starting secret tree crawl");

        let outstanding = Arc::new(AtomicUsize::new(roots.len()));
        for root in roots {
            // receiver is alive until the workers below exit
            let _ = queue_tx.send(WorkItem::for_path(root, true));
        }
        if outstanding.load(Ordering::Acquire) == 0 {
            cancel.cancel();
        }

        let worker = CrawlWorker {
            store: Arc::clone(&self.store),
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            output_tx,
            outstanding,
            aborted: Arc::new(AtomicBool::new(false)),
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
        };

        for worker_id in 0..self.concurrency {
            let worker = worker.clone();
            tokio::spawn(worker.run(worker_id).instrument(span.clone()));
        }

        CrawlStream {
            inner: UnboundedReceiverStream::new(output_rx),
            counters,
            key_prefix: None,
            _guard: cancel.drop_guard(),
        }
    }
}

/// State shared by the workers of one crawl
#[derive(Clone)]
struct CrawlWorker {
    store: Arc<dyn StoreClient>,
    queue_tx: mpsc::UnboundedSender<WorkItem>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    output_tx: mpsc::UnboundedSender<Result<SecretMetadata>>,
    outstanding: Arc<AtomicUsize>,
    aborted: Arc<AtomicBool>,
    counters: Arc<CrawlCounters>,
    cancel: CancellationToken,
}

impl CrawlWorker {
    async fn run(self, worker_id: usize) {
        debug!(worker_id, "Crawl worker started");

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = async {
                    let mut rx = self.queue_rx.lock().await;
                    rx.recv().await
                } => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            // a panicking store call costs one node, not the worker
            let (path, root) = item.target();
            let task = tokio::spawn(self.clone().process(item).in_current_span());
            let abort = task.abort_handle();

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    abort.abort();
                    break;
                }
                joined = task => {
                    if let Err(e) = joined {
                        self.fail(&path, root, InventoryError::internal(format!(
                            "Store call panicked: {}",
                            e
                        )));
                    }
                }
            }

            // children were counted inside process(), so this cannot hit zero early
            if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                info!(stats = ?self.counters.snapshot(), "Secret tree crawl complete");
                self.cancel.cancel();
            }
        }

        debug!(worker_id, "Crawl worker stopped");
    }

    async fn process(self, item: WorkItem) {
        match item {
            WorkItem::Expand { path, root } => self.expand(path, root).await,
            WorkItem::Fetch { path, root } => self.fetch(path, root).await,
        }
    }

    async fn expand(&self, path: SecretPath, root: bool) {
        let folder = path.key();
        match self.store.list(&path.mount, &folder).await {
            Ok(children) => {
                self.counters.folder_listed();
                debug!(path = %path, children = children.len(), "Listed folder");

                self.outstanding.fetch_add(children.len(), Ordering::AcqRel);
                for child in children {
                    let _ = self.queue_tx.send(WorkItem::for_path(path.child(child), false));
                }
            }
            Err(e) => self.fail(&path, root, e),
        }
    }

    async fn fetch(&self, path: SecretPath, root: bool) {
        match self.store.read_metadata(&path.mount, &path.key()).await {
            Ok(Some(raw)) => {
                self.counters.leaf_read();
                let _ = self.output_tx.send(Ok(SecretMetadata::from_raw(path, raw)));
            }
            Ok(None) => debug!(path = %path, "Secret no longer exists, skipping"),
            Err(e) => self.fail(&path, root, e),
        }
    }

    fn fail(&self, path: &SecretPath, root: bool, error: InventoryError) {
        if root {
            if !self.aborted.swap(true, Ordering::AcqRel) {
                warn!(path = %path, error = %error, "Crawl root failed, aborting crawl");
                let _ = self
                    .output_tx
                    .send(Err(InventoryError::crawl_root(path.mount.clone(), error.to_string())));
            }
            self.cancel.cancel();
            return;
        }

        let error = InventoryError::crawl_node(path.to_string(), error.to_string());
        warn!(error = %error, "Skipping secret tree node");
        self.counters.node_skipped();
    }
}

/// Stream of leaf metadata produced by a running crawl.
///
/// Records arrive in no particular order. Dropping the stream stops the crawl.
pub struct CrawlStream {
    inner: UnboundedReceiverStream<Result<SecretMetadata>>,
    counters: Arc<CrawlCounters>,
    key_prefix: Option<String>,
    _guard: DropGuard,
}

impl CrawlStream {
    /// Only yield records whose key starts with `prefix`. Errors always pass.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Counters so far; final once the stream has ended
    pub fn stats(&self) -> CrawlStats {
        self.counters.snapshot()
    }

    fn matches(&self, item: &Result<SecretMetadata>) -> bool {
        match (item, &self.key_prefix) {
            (Ok(metadata), Some(prefix)) => metadata.key().starts_with(prefix.as_str()),
            _ => true,
        }
    }
}

impl Stream for CrawlStream {
    type Item = Result<SecretMetadata>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(item)) if !this.matches(&item) => continue,
                other => return other,
            }
        }
    }
}
