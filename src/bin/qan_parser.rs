//! QAN Parser Runtime
//!
//! Reads MongoDB profiler documents (one JSON object per line) and writes one
//! JSON report per completed window.
//!
//! Usage:
//!   qan_parser [PATH]      (reads stdin when PATH is omitted)
//!
//! Environment variables:
//!   QAN_INTERVAL_SECS - Window length (default: 60)
//!   QAN_EXAMPLE_QUERIES - Attach example queries (default: false)
//!   QAN_REPORT_LIMIT - Classes per report before LRQ folding (default: 200)
//!   QAN_OUTPUT_PATH - JSONL report file (default: stdout)
//!   QAN_STATUS_LOG_SECS - Status log cadence (default: 30)

use dotenv::dotenv;
use log::{error, info, warn};
use qanflow::output::{JsonlReportWriter, ReportWriter};
use qanflow::{Parser, ProfileDocument, QanConfig};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = QanConfig::from_env();
    config.validate()?;

    let input_path = env::args().nth(1);

    info!("Starting QAN parser");
    info!("   ├─ Interval: {}s", config.interval_secs());
    info!("   ├─ Example queries: {}", config.example_queries);
    info!("   ├─ Report limit: {}", config.report_limit);
    info!("   ├─ Excluded collections: {:?}", config.exclude_collections);
    info!("   └─ Input: {}", input_path.as_deref().unwrap_or("stdin"));

    let mut writer: Box<dyn ReportWriter> = match &config.output_path {
        Some(path) => Box::new(JsonlReportWriter::to_file(path)?),
        None => Box::new(JsonlReportWriter::to_stdout()),
    };
    info!("Report backend: {}", writer.backend_type());

    let (tx, rx) = mpsc::channel::<ProfileDocument>(config.input_buffer);

    let reader_task = match input_path {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            tokio::spawn(read_documents(BufReader::new(file), tx))
        }
        None => tokio::spawn(read_documents(BufReader::new(tokio::io::stdin()), tx)),
    };

    let parser = Arc::new(Parser::new(rx, config.clone()));
    let reports = parser.start().await?;

    let writer_task = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            if let Err(e) = writer.write_report(&report).await {
                error!("Failed to write report: {}", e);
            }
        }
        if let Err(e) = writer.flush().await {
            error!("Failed to flush reports: {}", e);
        }
        info!("Wrote {} reports ({})", writer.reports_written(), writer.backend_type());
    });

    let status_parser = parser.clone();
    let status_every = Duration::from_secs(config.status_log_secs.max(1));
    let status_task = tokio::spawn(async move {
        let mut timer = interval(status_every);
        timer.tick().await;
        loop {
            timer.tick().await;
            match status_parser.status().await {
                Some(status) => info!("{} status: {}", status_parser.name(), format_status(&status)),
                None => break,
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received CTRL+C, shutting down..."),
                Err(err) => error!("Failed to listen for CTRL+C: {}", err),
            }
        }
        _ = reader_task => {
            info!("Input exhausted, shutting down...");
        }
    }

    match parser.status().await.as_ref().and_then(format_final_status) {
        Some(line) => info!("Final status: {}", line),
        None => info!("Final status unavailable: worker already exited"),
    }

    parser.stop().await;
    status_task.abort();

    if let Err(e) = writer_task.await {
        warn!("Report writer task ended abnormally: {}", e);
    }

    info!("QAN parser stopped");
    Ok(())
}

/// Feed the parser from a line-delimited JSON source
///
/// Malformed lines are logged and skipped.
async fn read_documents<R>(reader: R, tx: mpsc::Sender<ProfileDocument>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut skipped = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ProfileDocument>(&line) {
            Ok(doc) => {
                if tx.send(doc).await.is_err() {
                    warn!("Parser input closed, stopping reader");
                    break;
                }
            }
            Err(e) => {
                skipped += 1;
                warn!("Skipping malformed document on line {}: {}", line_no, e);
            }
        }
    }

    info!("Reader finished: {} lines, {} malformed", line_no, skipped);
}

/// Status line for shutdown, `None` when the worker never answered a ping
fn format_final_status(status: &HashMap<String, String>) -> Option<String> {
    if status.is_empty() {
        None
    } else {
        Some(format_status(status))
    }
}

fn format_status(status: &HashMap<String, String>) -> String {
    let mut entries: Vec<_> = status.iter().collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
