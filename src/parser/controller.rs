//! Parser lifecycle - starts, stops and inspects the aggregation worker
//!
//! Two locks with different jobs:
//! - `lifecycle` (async) serializes start/stop so a second worker can never
//!   be spawned while one is running or still shutting down
//! - `shared` (sync) guards the running flag and the status table and is
//!   never held across an await

use super::classifier::{Classifier, Fingerprinter};
use super::filter::{CollectionFilter, DocsFilter};
use super::report::Report;
use super::status::{request_status, Ping};
use super::worker::{Worker, WorkerChannels};
use crate::config::QanConfig;
use crate::profile::ProfileDocument;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const PARSER_NAME: &str = "qan-parser";

/// Source of "now" for the first window (replaceable in tests)
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Receiving end of the report channel
///
/// Cloning shares the same underlying channel; `start()` hands out clones of
/// one stream for as long as the worker runs.
#[derive(Clone)]
pub struct ReportStream {
    inner: Arc<tokio::sync::Mutex<mpsc::Receiver<Report>>>,
}

impl ReportStream {
    fn new(rx: mpsc::Receiver<Report>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Next report, or `None` once the worker has exited and the channel is drained
    pub async fn recv(&self) -> Option<Report> {
        self.inner.lock().await.recv().await
    }

    /// True if both handles read from the same channel
    pub fn same_channel(&self, other: &ReportStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug)]
pub enum ParserError {
    /// The input receiver was lost with a worker that did not exit cleanly
    InputUnavailable,
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserError::InputUnavailable => write!(f, "input stream is no longer available"),
        }
    }
}

impl std::error::Error for ParserError {}

struct RunningWorker {
    reports: ReportStream,
    done: watch::Sender<bool>,
    handle: JoinHandle<mpsc::Receiver<ProfileDocument>>,
}

struct Lifecycle {
    docs: Option<mpsc::Receiver<ProfileDocument>>,
    worker: Option<RunningWorker>,
}

#[derive(Default)]
struct Shared {
    running: bool,
    status: HashMap<String, String>,
    pings: Option<mpsc::Sender<Ping>>,
}

/// Query analytics parser: one aggregation worker over one document stream
pub struct Parser {
    config: QanConfig,
    classifier: Arc<dyn Classifier>,
    filters: Vec<Arc<dyn DocsFilter>>,
    now_fn: Clock,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    shared: Mutex<Shared>,
}

impl Parser {
    /// Parser over `docs` using the fingerprint classifier and wall-clock time
    ///
    /// Collections listed in `config.exclude_collections` are filtered out.
    pub fn new(docs: mpsc::Receiver<ProfileDocument>, config: QanConfig) -> Self {
        Self::new_with_clock(docs, config, Arc::new(Utc::now))
    }

    /// Same as `new` with a custom time source for the first window
    pub fn new_with_clock(
        docs: mpsc::Receiver<ProfileDocument>,
        config: QanConfig,
        now_fn: Clock,
    ) -> Self {
        let mut filters: Vec<Arc<dyn DocsFilter>> = Vec::new();
        let excluded = CollectionFilter::new(config.exclude_collections.iter().cloned());
        if !excluded.is_empty() {
            filters.push(Arc::new(excluded));
        }

        Self {
            config,
            classifier: Arc::new(Fingerprinter),
            filters,
            now_fn,
            lifecycle: tokio::sync::Mutex::new(Lifecycle {
                docs: Some(docs),
                worker: None,
            }),
            shared: Mutex::new(Shared::default()),
        }
    }

    /// Replace the classifier used by workers started from now on
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Add a document filter for workers started from now on
    pub fn with_filter(mut self, filter: Arc<dyn DocsFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn name(&self) -> &'static str {
        PARSER_NAME
    }

    /// Start the worker, or return the current report stream if already running
    pub async fn start(&self) -> Result<ReportStream, ParserError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(worker) = &lifecycle.worker {
            return Ok(worker.reports.clone());
        }

        let docs = lifecycle.docs.take().ok_or(ParserError::InputUnavailable)?;

        let (report_tx, report_rx) = mpsc::channel(self.config.report_buffer.max(1));
        let (ping_tx, ping_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);

        let worker = Worker::new(
            self.config.clone(),
            self.classifier.clone(),
            self.filters.clone(),
            (self.now_fn)(),
        );
        let handle = tokio::spawn(worker.run(WorkerChannels {
            docs,
            reports: report_tx,
            pings: ping_rx,
            done: done_rx,
        }));

        let reports = ReportStream::new(report_rx);

        {
            let mut shared = self.shared();
            shared.running = true;
            shared.status = HashMap::new();
            shared.pings = Some(ping_tx);
        }

        lifecycle.worker = Some(RunningWorker {
            reports: reports.clone(),
            done: done_tx,
            handle,
        });

        log::info!("{} started", PARSER_NAME);
        Ok(reports)
    }

    /// Signal shutdown and wait until the worker has exited
    ///
    /// The report channel closes once the worker is gone, so nothing is sent
    /// after this returns.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(worker) = lifecycle.worker.take() else {
            return;
        };

        {
            let mut shared = self.shared();
            shared.running = false;
            shared.pings = None;
        }

        worker.done.send_replace(true);

        match worker.handle.await {
            Ok(docs) => lifecycle.docs = Some(docs),
            Err(e) => log::error!("{} worker did not exit cleanly: {}", PARSER_NAME, e),
        }

        log::info!("{} stopped", PARSER_NAME);
    }

    pub fn running(&self) -> bool {
        self.shared().running
    }

    /// Latest known status, `None` when not running
    ///
    /// Waits at most for the ping and pong timeouts. When the worker does not
    /// answer in time the previously known values are returned.
    pub async fn status(&self) -> Option<HashMap<String, String>> {
        let pings = {
            let shared = self.shared();
            if !shared.running {
                return None;
            }
            shared.pings.clone()
        };

        let update = match pings {
            Some(pings) => request_status(&pings).await,
            None => None,
        };

        let mut shared = self.shared();
        if let Some(status) = update {
            shared.status.extend(status.to_map());
        }
        Some(shared.status.clone())
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
