//! # Query analytics parser
//!
//! Turns a stream of profiler documents into one report per time window.
//!
//! ## Architecture
//!
//! ```text
//! ProfileDocument (mpsc)
//!     ↓
//! Worker (single task, owns window + Stats)
//!     ↓ classifier + filters
//! Stats (per GroupKey, reset every window)
//!     ↓ rollover on first document past the window end
//! create_result → make_report
//!     ↓
//! Report (mpsc) → downstream consumer
//! ```
//!
//! `Parser` supervises the worker: `start()` / `stop()` / `running()` and a
//! timeout-bounded `status()` served by ping/pong.
//!
//! ## Module Organization
//!
//! - `window` - interval-aligned window arithmetic
//! - `fingerprint` - query normalization
//! - `filter` - document filters
//! - `stats` - per-window accumulator and its reduction
//! - `classifier` - document → GroupKey, accumulator update
//! - `report` - classes and the report envelope
//! - `status` - counters and ping/pong
//! - `worker` - the aggregation loop
//! - `controller` - lifecycle

pub mod classifier;
pub mod controller;
pub mod filter;
pub mod fingerprint;
pub mod report;
pub mod stats;
pub mod status;
pub mod window;
pub mod worker;

pub use classifier::{Classifier, Fingerprinter, ProcessError};
pub use controller::{Clock, Parser, ParserError, ReportStream, PARSER_NAME};
pub use filter::{CollectionFilter, DocsFilter};
pub use report::{create_result, make_report, Class, ClassSource, Report, ReportResult};
pub use stats::{calc_query_stats, GroupKey, QueryInfo, Stat, Stats};
pub use status::Status;
pub use window::{TimeWindow, WindowClock};
pub use worker::{ExitReason, Worker, WorkerChannels};
