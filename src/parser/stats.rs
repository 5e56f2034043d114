//! Per-window statistics keyed by query identity
//!
//! `Stats` is the accumulator the worker owns for the current window.
//! `calc_query_stats` reduces it into per-query summaries once the window
//! closes.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Query times are kept in picoseconds; multiply by this to get seconds
pub const PICOS_TO_SECS: f64 = 1e-12;

const PICOS_PER_MILLI: u64 = 1_000_000_000;

/// Identity of "the same query"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub operation: String,
    pub namespace: String,
    pub fingerprint: String,
}

impl GroupKey {
    /// Stable identifier: first 16 hex digits of SHA-256 over the key
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.fingerprint.as_bytes());
        let digest = hasher.finalize();
        hex::encode_upper(&digest[..8])
    }
}

/// Running min/max/sum of one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Aggregate {
    pub fn add(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Accumulator for one query group in the current window
#[derive(Debug, Clone)]
pub struct Stat {
    pub id: String,
    pub key: GroupKey,
    /// Slowest literal query seen in the window
    pub example: String,
    pub example_time_ps: u64,
    /// Picoseconds
    pub query_time: Aggregate,
    pub returned: Aggregate,
    pub examined: Aggregate,
    pub response_length: Aggregate,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Stat {
    pub fn new(key: GroupKey, seen: DateTime<Utc>) -> Self {
        Self {
            id: key.id(),
            key,
            example: String::new(),
            example_time_ps: 0,
            query_time: Aggregate::default(),
            returned: Aggregate::default(),
            examined: Aggregate::default(),
            response_length: Aggregate::default(),
            first_seen: seen,
            last_seen: seen,
        }
    }

    pub fn count(&self) -> u64 {
        self.query_time.count
    }

    /// Record one execution
    pub fn record(&mut self, sample: &Sample) {
        let time_ps = sample.millis.saturating_mul(PICOS_PER_MILLI);

        if self.example.is_empty() || time_ps > self.example_time_ps {
            self.example = sample.query.clone();
            self.example_time_ps = time_ps;
        }

        self.query_time.add(time_ps);
        self.returned.add(sample.returned);
        self.examined.add(sample.examined);
        self.response_length.add(sample.response_length);

        self.first_seen = self.first_seen.min(sample.ts);
        self.last_seen = self.last_seen.max(sample.ts);
    }
}

/// Measurements extracted from one document
#[derive(Debug, Clone)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub millis: u64,
    pub query: String,
    pub returned: u64,
    pub examined: u64,
    pub response_length: u64,
}

/// Per-window accumulator
pub type Stats = HashMap<GroupKey, Stat>;

/// Seconds-based summary of a time metric
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeSummary {
    pub total: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl TimeSummary {
    fn from_picos(agg: &Aggregate) -> Self {
        Self {
            total: agg.sum as f64 * PICOS_TO_SECS,
            min: agg.min as f64 * PICOS_TO_SECS,
            avg: agg.avg() * PICOS_TO_SECS,
            max: agg.max as f64 * PICOS_TO_SECS,
        }
    }
}

/// Summary of a counted metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountSummary {
    pub total: u64,
    pub min: u64,
    pub avg: u64,
    pub max: u64,
}

impl From<&Aggregate> for CountSummary {
    fn from(agg: &Aggregate) -> Self {
        Self {
            total: agg.sum,
            min: agg.min,
            avg: agg.avg().round() as u64,
            max: agg.max,
        }
    }
}

/// Reduced statistics for one query group
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub id: String,
    pub operation: String,
    pub namespace: String,
    pub fingerprint: String,
    pub query: String,
    /// Duration of `query`, seconds
    pub query_example_time: f64,
    pub count: u64,
    pub qps: f64,
    pub query_time: TimeSummary,
    pub returned: CountSummary,
    pub examined: CountSummary,
    pub response_length: CountSummary,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Reduce a window's accumulator into per-query summaries
///
/// Ordered by total query time (slowest first), ties broken by id.
pub fn calc_query_stats(stats: &Stats, interval_secs: i64) -> Vec<QueryInfo> {
    let interval = interval_secs.max(1) as f64;

    let mut queries: Vec<QueryInfo> = stats
        .values()
        .filter(|stat| stat.count() > 0)
        .map(|stat| QueryInfo {
            id: stat.id.clone(),
            operation: stat.key.operation.clone(),
            namespace: stat.key.namespace.clone(),
            fingerprint: stat.key.fingerprint.clone(),
            query: stat.example.clone(),
            query_example_time: stat.example_time_ps as f64 * PICOS_TO_SECS,
            count: stat.count(),
            qps: stat.count() as f64 / interval,
            query_time: TimeSummary::from_picos(&stat.query_time),
            returned: CountSummary::from(&stat.returned),
            examined: CountSummary::from(&stat.examined),
            response_length: CountSummary::from(&stat.response_length),
            first_seen: stat.first_seen,
            last_seen: stat.last_seen,
        })
        .collect();

    queries.sort_by(|a, b| {
        b.query_time
            .total
            .total_cmp(&a.query_time.total)
            .then_with(|| a.id.cmp(&b.id))
    });

    queries
}
