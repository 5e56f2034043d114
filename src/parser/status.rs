//! Status counters and the ping/pong exchange used to read them
//!
//! The worker owns a `Status` draft. A requester sends a `Ping` carrying a
//! reply handle; the worker answers without waiting, and the requester gives
//! up after `PING_TIMEOUT` / `PONG_TIMEOUT`.

use super::window::TimeWindow;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

/// How long a requester waits for the worker to accept a ping
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a requester waits for the pong once the ping was accepted
pub const PONG_TIMEOUT: Duration = Duration::from_secs(1);

/// Cumulative worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub in_docs: u64,
    pub ok_docs: u64,
    pub late_docs: u64,
    pub out_reports: u64,
    pub interval_start: String,
    pub interval_end: String,
    pub err_fingerprint: u64,
    pub err_parse: u64,
    pub skipped_docs: u64,
}

impl Status {
    pub fn set_window(&mut self, window: &TimeWindow) {
        self.interval_start = window.start_str();
        self.interval_end = window.end_str();
    }

    /// Flatten into the string table exposed to operators
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(9);
        map.insert("docs-in".to_string(), self.in_docs.to_string());
        map.insert("docs-ok".to_string(), self.ok_docs.to_string());
        map.insert("docs-late".to_string(), self.late_docs.to_string());
        map.insert("reports-out".to_string(), self.out_reports.to_string());
        map.insert("interval-start".to_string(), self.interval_start.clone());
        map.insert("interval-end".to_string(), self.interval_end.clone());
        map.insert("err-fingerprint".to_string(), self.err_fingerprint.to_string());
        map.insert("err-parse".to_string(), self.err_parse.to_string());
        map.insert("skipped-docs".to_string(), self.skipped_docs.to_string());
        map
    }
}

/// Status request sent to the worker
#[derive(Debug)]
pub struct Ping {
    reply: oneshot::Sender<Status>,
}

impl Ping {
    pub fn channel() -> (Self, oneshot::Receiver<Status>) {
        let (tx, rx) = oneshot::channel();
        (Self { reply: tx }, rx)
    }

    /// Answer the ping; a requester that already gave up is ignored
    pub fn pong(self, status: Status) {
        if self.reply.send(status).is_err() {
            log::trace!("status requester went away before pong");
        }
    }
}

/// Ask the worker for its status, bounded by the ping and pong timeouts
pub async fn request_status(pings: &mpsc::Sender<Ping>) -> Option<Status> {
    let (ping, pong) = Ping::channel();

    match timeout(PING_TIMEOUT, pings.send(ping)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            log::debug!("status ping failed: worker not listening");
            return None;
        }
        Err(_) => {
            log::debug!("status ping timed out");
            return None;
        }
    }

    match timeout(PONG_TIMEOUT, pong).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(_)) => None,
        Err(_) => {
            log::debug!("status pong timed out");
            None
        }
    }
}
