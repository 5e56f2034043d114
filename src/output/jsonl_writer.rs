//! JSONL report writer - one serialized report per line

use super::writer_backend::{ReportWriter, WriterError};
use crate::parser::Report;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct JsonlReportWriter {
    out: BufWriter<Box<dyn Write + Send>>,
    written: u64,
}

impl JsonlReportWriter {
    /// Append to `path`, creating parent directories as needed
    pub fn to_file(path: impl AsRef<Path>) -> Result<Self, WriterError> {
        let path = path.as_ref();

        let open_error = |source: std::io::Error| WriterError::Open {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(open_error)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_error)?;
        log::info!("writing reports to: {}", path.display());

        Ok(Self::new(Box::new(file)))
    }

    pub fn to_stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(out),
            written: 0,
        }
    }

    pub fn write_line(&mut self, report: &Report) -> Result<(), WriterError> {
        let json = serde_json::to_string(report).map_err(|source| WriterError::Encode {
            window_start: report.start_ts,
            source,
        })?;
        writeln!(self.out, "{}", json)?;
        // Reports arrive once per window, so every one is flushed right away.
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl Drop for JsonlReportWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

#[async_trait]
impl ReportWriter for JsonlReportWriter {
    async fn write_report(&mut self, report: &Report) -> Result<(), WriterError> {
        self.write_line(report)
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        self.out.flush()?;
        Ok(())
    }

    fn reports_written(&self) -> u64 {
        self.written
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}
