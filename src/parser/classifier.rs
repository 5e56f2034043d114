//! Document classification into query groups

use super::filter::DocsFilter;
use super::fingerprint::fingerprint;
use super::stats::{GroupKey, Sample, Stat, Stats};
use crate::profile::ProfileDocument;
use serde_json::Value;
use std::sync::Arc;

/// Why a document did not make it into the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// No query could be identified in the document
    NoQuery,
    /// A filter excluded the document
    QueryFiltered,
    /// The query could not be fingerprinted
    Fingerprint(String),
    /// Any other malformed document
    Parse(String),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::NoQuery => write!(f, "no query in document"),
            ProcessError::QueryFiltered => write!(f, "document filtered out"),
            ProcessError::Fingerprint(e) => write!(f, "fingerprint error: {}", e),
            ProcessError::Parse(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Assigns documents to query groups and updates the accumulator in place
pub trait Classifier: Send + Sync {
    fn process(
        &self,
        doc: &ProfileDocument,
        filters: &[Arc<dyn DocsFilter>],
        stats: &mut Stats,
    ) -> Result<(), ProcessError>;
}

/// Default classifier keyed by operation, namespace and query fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Classifier for Fingerprinter {
    fn process(
        &self,
        doc: &ProfileDocument,
        filters: &[Arc<dyn DocsFilter>],
        stats: &mut Stats,
    ) -> Result<(), ProcessError> {
        if doc.op.is_empty() {
            return Err(ProcessError::Parse("missing op".to_string()));
        }
        if doc.ns.is_empty() {
            return Err(ProcessError::Parse("missing ns".to_string()));
        }

        if filters.iter().any(|f| !f.accept(doc)) {
            return Err(ProcessError::QueryFiltered);
        }

        let query = resolve_query(doc).ok_or(ProcessError::NoQuery)?;
        let fp = fingerprint(&doc.op, doc.collection(), query).map_err(ProcessError::Fingerprint)?;

        let key = GroupKey {
            operation: doc.op.clone(),
            namespace: doc.ns.clone(),
            fingerprint: fp,
        };

        let sample = Sample {
            ts: doc.ts,
            millis: doc.millis,
            query: query.to_string(),
            returned: doc.nreturned,
            examined: doc.docs_examined,
            response_length: doc.response_length,
        };

        stats
            .entry(key)
            .or_insert_with_key(|key| Stat::new(key.clone(), doc.ts))
            .record(&sample);

        Ok(())
    }
}

/// Query carried by the document, depending on the operation type
fn resolve_query(doc: &ProfileDocument) -> Option<&Value> {
    let query = match doc.op.as_str() {
        "insert" => None,
        "command" | "getmore" | "aggregate" => doc.command.as_ref().or(doc.query.as_ref()),
        _ => doc.query.as_ref().or(doc.command.as_ref()),
    };

    query.filter(|q| !q.is_null())
}
