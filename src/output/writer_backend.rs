//! Report sink abstraction
//!
//! The runtime hands every completed window to one `ReportWriter`. Errors
//! carry enough context (destination path, window start) to tell which
//! report was affected without re-reading the input.

use crate::parser::Report;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug)]
pub enum WriterError {
    /// Report destination could not be created or opened
    Open { path: PathBuf, source: std::io::Error },
    /// Writing or flushing an already open destination failed
    Write(std::io::Error),
    /// Report for the window starting at `window_start` could not be encoded
    Encode {
        window_start: DateTime<Utc>,
        source: serde_json::Error,
    },
}

impl From<std::io::Error> for WriterError {
    fn from(err: std::io::Error) -> Self {
        WriterError::Write(err)
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Open { path, source } => {
                write!(f, "cannot open report output {}: {}", path.display(), source)
            }
            WriterError::Write(e) => write!(f, "report output failed: {}", e),
            WriterError::Encode {
                window_start,
                source,
            } => write!(f, "cannot encode report for window {}: {}", window_start, source),
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::Open { source, .. } => Some(source),
            WriterError::Write(e) => Some(e),
            WriterError::Encode { source, .. } => Some(source),
        }
    }
}

/// Destination for completed window reports
#[async_trait]
pub trait ReportWriter: Send {
    /// Write one window report
    async fn write_report(&mut self, report: &Report) -> Result<(), WriterError>;

    async fn flush(&mut self) -> Result<(), WriterError>;

    /// Reports successfully written so far
    fn reports_written(&self) -> u64;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
