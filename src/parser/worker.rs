//! Aggregation worker - the single task that owns the current window
//!
//! Main loop:
//! 1. Exit as soon as shutdown is signaled (the open window is discarded)
//! 2. Answer a pending status ping
//! 3. Wait for the next document, a shutdown or a ping
//!
//! Rollover is driven by document timestamps only. A document at or past the
//! window end flushes the window as a report and moves the window to the one
//! containing that document, so windows without traffic are never emitted.

use super::classifier::{Classifier, ProcessError};
use super::filter::DocsFilter;
use super::report::{create_result, make_report, Report};
use super::stats::Stats;
use super::status::{Ping, Status};
use super::window::{TimeWindow, WindowClock};
use crate::config::QanConfig;
use crate::profile::ProfileDocument;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Why the worker loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    InputClosed,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Shutdown => write!(f, "shutdown requested"),
            ExitReason::InputClosed => write!(f, "input channel closed"),
        }
    }
}

/// Channels a worker is bound to for its whole lifetime
pub struct WorkerChannels {
    pub docs: mpsc::Receiver<ProfileDocument>,
    pub reports: mpsc::Sender<Report>,
    pub pings: mpsc::Receiver<Ping>,
    pub done: watch::Receiver<bool>,
}

pub struct Worker {
    config: QanConfig,
    clock: WindowClock,
    window: TimeWindow,
    stats: Stats,
    filters: Vec<Arc<dyn DocsFilter>>,
    classifier: Arc<dyn Classifier>,
    status: Status,
}

impl Worker {
    /// Create a worker whose first window follows the one `now` falls into
    pub fn new(
        config: QanConfig,
        classifier: Arc<dyn Classifier>,
        filters: Vec<Arc<dyn DocsFilter>>,
        now: DateTime<Utc>,
    ) -> Self {
        let clock = WindowClock::new(config.interval);
        let window = clock.initial(now);

        Self {
            config,
            clock,
            window,
            stats: Stats::new(),
            filters,
            classifier,
            status: Status::default(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Run until shutdown or end of input
    ///
    /// Hands the input receiver back so the owner can start a new worker on
    /// the same stream later.
    pub async fn run(mut self, channels: WorkerChannels) -> mpsc::Receiver<ProfileDocument> {
        let WorkerChannels {
            mut docs,
            reports,
            mut pings,
            mut done,
        } = channels;

        log::info!(
            "qan worker started (interval: {}s, first window: {} - {})",
            self.clock.interval_secs(),
            self.window.start_str(),
            self.window.end_str()
        );

        let reason = self.run_loop(&mut docs, &reports, &mut pings, &mut done).await;

        log::info!(
            "qan worker stopped: {} (docs in: {}, reports out: {})",
            reason,
            self.status.in_docs,
            self.status.out_reports
        );

        docs
    }

    async fn run_loop(
        &mut self,
        docs: &mut mpsc::Receiver<ProfileDocument>,
        reports: &mpsc::Sender<Report>,
        pings: &mut mpsc::Receiver<Ping>,
        done: &mut watch::Receiver<bool>,
    ) -> ExitReason {
        loop {
            if *done.borrow() {
                return ExitReason::Shutdown;
            }

            if let Ok(ping) = pings.try_recv() {
                self.pong(ping);
            }

            // Shutdown and ping are repeated here because recv() can block
            // for as long as the input stays idle.
            tokio::select! {
                biased;

                _ = done.changed() => return ExitReason::Shutdown,

                Some(ping) = pings.recv() => self.pong(ping),

                doc = docs.recv() => {
                    let Some(doc) = doc else {
                        return ExitReason::InputClosed;
                    };
                    if let Err(reason) = self.handle_doc(doc, reports, done).await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn handle_doc(
        &mut self,
        doc: ProfileDocument,
        reports: &mpsc::Sender<Report>,
        done: &mut watch::Receiver<bool>,
    ) -> Result<(), ExitReason> {
        let ts = doc.ts;

        if self.window.is_before_start(ts) {
            self.status.late_docs += 1;
            log::trace!("dropping late document at {} (window starts {})", ts, self.window.start);
            return Ok(());
        }

        if self.window.is_closed_by(ts) {
            self.flush(reports, done).await?;
            self.window = self.clock.window_at(ts);
        }

        self.status.in_docs += 1;
        match self.classifier.process(&doc, &self.filters, &mut self.stats) {
            Ok(()) => self.status.ok_docs += 1,
            Err(ProcessError::NoQuery) | Err(ProcessError::QueryFiltered) => {
                self.status.skipped_docs += 1
            }
            Err(ProcessError::Fingerprint(e)) => {
                log::debug!("fingerprint error ({}): {}", doc.ns, e);
                self.status.err_fingerprint += 1;
            }
            Err(ProcessError::Parse(e)) => {
                log::debug!("cannot parse profile document: {}", e);
                self.status.err_parse += 1;
            }
        }

        Ok(())
    }

    /// Send the current window as a report and start an empty accumulator
    ///
    /// Windows that aggregated nothing are not reported. Shutdown wins over a
    /// pending send; the report is lost in that case.
    async fn flush(
        &mut self,
        reports: &mpsc::Sender<Report>,
        done: &mut watch::Receiver<bool>,
    ) -> Result<(), ExitReason> {
        if self.stats.is_empty() {
            log::debug!(
                "window {} - {} closed without data, no report",
                self.window.start_str(),
                self.window.end_str()
            );
            return Ok(());
        }

        let result = create_result(
            &self.stats,
            self.clock.interval_secs(),
            self.config.example_queries,
        );
        let report = make_report(&self.config, &self.window, result);
        let classes = report.class.len();

        tokio::select! {
            biased;

            _ = done.changed() => {
                log::warn!(
                    "dropping report for {} - {}: shutting down",
                    self.window.start_str(),
                    self.window.end_str()
                );
                return Err(ExitReason::Shutdown);
            }

            sent = reports.send(report) => match sent {
                Ok(()) => {
                    self.status.out_reports += 1;
                    log::debug!(
                        "report sent for {} - {} ({} classes)",
                        self.window.start_str(),
                        self.window.end_str(),
                        classes
                    );
                }
                Err(_) => {
                    log::warn!(
                        "report receiver closed, report for {} - {} lost",
                        self.window.start_str(),
                        self.window.end_str()
                    );
                }
            }
        }

        self.stats = Stats::new();
        Ok(())
    }

    fn pong(&mut self, ping: Ping) {
        self.status.set_window(&self.window);
        ping.pong(self.status.clone());
    }
}
