//! Report building for completed windows
//!
//! `create_result` turns a window's accumulator into classes (one per query
//! group plus a global class), `make_report` wraps them in the envelope that
//! is sent downstream.

use super::stats::{calc_query_stats, CountSummary, Stats, TimeSummary};
use super::window::TimeWindow;
use crate::config::QanConfig;
use crate::profile::split_namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const QUERY_TIME: &str = "Query_time";
pub const DOCS_RETURNED: &str = "Docs_returned";
pub const DOCS_EXAMINED: &str = "Docs_examined";
pub const RESPONSE_LENGTH: &str = "Response_length";

/// Id and fingerprint of the class holding everything beyond the report limit
pub const LRQ_ID: &str = "0";
pub const LRQ_FINGERPRINT: &str = "LRQ";

/// Time metric, seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeStats {
    pub sum: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl From<TimeSummary> for TimeStats {
    fn from(s: TimeSummary) -> Self {
        Self {
            sum: s.total,
            min: s.min,
            avg: s.avg,
            max: s.max,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberStats {
    pub sum: u64,
    pub min: u64,
    pub avg: u64,
    pub max: u64,
}

impl From<CountSummary> for NumberStats {
    fn from(s: CountSummary) -> Self {
        Self {
            sum: s.total,
            min: s.min,
            avg: s.avg,
            max: s.max,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub time_metrics: BTreeMap<String, TimeStats>,
    pub number_metrics: BTreeMap<String, NumberStats>,
}

/// One literal execution of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Seconds
    pub query_time: f64,
    pub query: String,
}

/// Origin and rate of a single query class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSource {
    pub db: String,
    pub collection: String,
    pub operation: String,
    /// Executions per second over the whole window
    pub qps: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Aggregate for one query group, or for the whole window (global)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: String,
    pub fingerprint: String,
    pub metrics: Metrics,
    pub total_queries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Example>,
    /// Set for per-query classes; global and LRQ span many sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ClassSource>,
    #[serde(skip)]
    sample: bool,
}

impl Class {
    /// `sample` controls whether folded classes may contribute an example
    pub fn new(id: &str, fingerprint: &str, sample: bool) -> Self {
        Self {
            id: id.to_string(),
            fingerprint: fingerprint.to_string(),
            metrics: Metrics::default(),
            total_queries: 0,
            example: None,
            source: None,
            sample,
        }
    }

    /// Fold another class into this one
    ///
    /// Sums add up, min/max widen and averages are recomputed over the
    /// combined query count.
    pub fn add_class(&mut self, other: &Class) {
        self.total_queries += other.total_queries;
        let total = self.total_queries.max(1);

        for (name, stats) in &other.metrics.time_metrics {
            let merged = self
                .metrics
                .time_metrics
                .entry(name.clone())
                .and_modify(|m| {
                    m.sum += stats.sum;
                    m.min = m.min.min(stats.min);
                    m.max = m.max.max(stats.max);
                })
                .or_insert(*stats);
            merged.avg = merged.sum / total as f64;
        }

        for (name, stats) in &other.metrics.number_metrics {
            let merged = self
                .metrics
                .number_metrics
                .entry(name.clone())
                .and_modify(|m| {
                    m.sum += stats.sum;
                    m.min = m.min.min(stats.min);
                    m.max = m.max.max(stats.max);
                })
                .or_insert(*stats);
            merged.avg = merged.sum / total;
        }

        if self.sample {
            if let Some(example) = &other.example {
                let slower = self
                    .example
                    .as_ref()
                    .map_or(true, |current| example.query_time > current.query_time);
                if slower {
                    self.example = Some(example.clone());
                }
            }
        }
    }

    pub fn query_time_sum(&self) -> f64 {
        self.metrics
            .time_metrics
            .get(QUERY_TIME)
            .map_or(0.0, |t| t.sum)
    }
}

/// Classes produced for one window
#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult {
    pub global: Class,
    pub class: Vec<Class>,
}

/// Report for one completed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub instance_uuid: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Window length, seconds
    pub run_time: f64,
    pub global: Class,
    pub class: Vec<Class>,
}

/// Build classes from a completed window's accumulator
pub fn create_result(stats: &Stats, interval_secs: i64, example_queries: bool) -> ReportResult {
    let mut global = Class::new("", "", false);
    let mut classes = Vec::new();

    for info in calc_query_stats(stats, interval_secs) {
        let mut class = Class::new(&info.id, &info.fingerprint, example_queries);
        if example_queries {
            class.example = Some(Example {
                query_time: info.query_example_time,
                query: info.query.clone(),
            });
        }

        let mut metrics = Metrics::default();
        metrics
            .time_metrics
            .insert(QUERY_TIME.to_string(), info.query_time.into());
        metrics
            .number_metrics
            .insert(DOCS_RETURNED.to_string(), info.returned.into());
        metrics
            .number_metrics
            .insert(DOCS_EXAMINED.to_string(), info.examined.into());
        metrics
            .number_metrics
            .insert(RESPONSE_LENGTH.to_string(), info.response_length.into());

        let (db, collection) = split_namespace(&info.namespace);
        class.source = Some(ClassSource {
            db: db.to_string(),
            collection: collection.to_string(),
            operation: info.operation.clone(),
            qps: info.qps,
            first_seen: info.first_seen,
            last_seen: info.last_seen,
        });

        class.metrics = metrics;
        class.total_queries = info.count;

        global.add_class(&class);
        classes.push(class);
    }

    ReportResult {
        global,
        class: classes,
    }
}

/// Wrap a result into the downstream envelope
///
/// Keeps at most `report_limit` classes, slowest first; the remainder is
/// folded into a single LRQ class. The global class always covers everything.
pub fn make_report(config: &QanConfig, window: &TimeWindow, result: ReportResult) -> Report {
    let ReportResult { global, mut class } = result;

    class.sort_by(|a, b| {
        b.query_time_sum()
            .total_cmp(&a.query_time_sum())
            .then_with(|| a.id.cmp(&b.id))
    });

    if config.report_limit > 0 && class.len() > config.report_limit {
        let mut lrq = Class::new(LRQ_ID, LRQ_FINGERPRINT, false);
        for rest in class.drain(config.report_limit..) {
            lrq.add_class(&rest);
        }
        class.push(lrq);
    }

    Report {
        instance_uuid: config.instance_uuid.clone(),
        start_ts: window.start,
        end_ts: window.end,
        run_time: (window.end - window.start).num_milliseconds() as f64 / 1000.0,
        global,
        class,
    }
}
