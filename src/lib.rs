pub mod config;
pub mod output;
pub mod parser;
pub mod profile;

pub use config::QanConfig;
pub use parser::{Parser, Report, ReportStream};
pub use profile::ProfileDocument;
