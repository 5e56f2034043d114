//! Report writers used by the runtime binary

pub mod jsonl_writer;
pub mod writer_backend;

pub use jsonl_writer::JsonlReportWriter;
pub use writer_backend::{ReportWriter, WriterError};
