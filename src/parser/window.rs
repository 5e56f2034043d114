//! Interval-aligned time windows
//!
//! Windows are half-open `[start, end)` and aligned to the interval measured
//! from the Unix epoch, so a 60s interval always starts on a whole minute.

use crate::config::{DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS};
use chrono::{DateTime, Duration, Utc};

/// Format used for window bounds in status output
pub const WINDOW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Document arrived after this window already started (late arrival)
    pub fn is_before_start(&self, ts: DateTime<Utc>) -> bool {
        ts < self.start
    }

    /// Document belongs to a later window, so this one must be flushed first
    pub fn is_closed_by(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(WINDOW_TIME_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(WINDOW_TIME_FORMAT).to_string()
    }
}

/// Pure window arithmetic for a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct WindowClock {
    interval_secs: i64,
}

impl WindowClock {
    /// Interval of 0 falls back to `DEFAULT_INTERVAL_SECS`, anything above
    /// `MAX_INTERVAL_SECS` is clamped to it
    pub fn new(interval_secs: u64) -> Self {
        let secs = match interval_secs {
            0 => DEFAULT_INTERVAL_SECS,
            secs => secs.min(MAX_INTERVAL_SECS),
        };

        Self {
            interval_secs: secs as i64,
        }
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs)
    }

    /// Round `ts` down to the interval, e.g. 12:15:35 with 1m becomes 12:15:00
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let rem_secs = ts.timestamp().rem_euclid(self.interval_secs);
        let rem_nanos = i64::from(ts.timestamp_subsec_nanos());
        ts.checked_sub_signed(Duration::seconds(rem_secs) + Duration::nanoseconds(rem_nanos))
            .unwrap_or(ts)
    }

    /// Window containing `ts`
    pub fn window_at(&self, ts: DateTime<Utc>) -> TimeWindow {
        let start = self.truncate(ts);
        TimeWindow {
            start,
            end: self.advance(start),
        }
    }

    /// First window for a worker started at `now`
    ///
    /// The window `now` falls into is partial, so it is skipped entirely.
    pub fn initial(&self, now: DateTime<Utc>) -> TimeWindow {
        let start = self.advance(self.truncate(now));
        TimeWindow {
            start,
            end: self.advance(start),
        }
    }

    /// `ts` plus one interval, saturating at the last representable instant
    fn advance(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.checked_add_signed(self.interval())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
