//! Profiling documents consumed by the parser
//!
//! Mirrors the subset of a MongoDB `system.profile` entry the classifier
//! understands. Only `ts` is required; every other field defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single profiler entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    /// When the operation completed (UTC)
    pub ts: DateTime<Utc>,

    /// Operation type (query, find, update, remove, command, getmore, insert)
    #[serde(default)]
    pub op: String,

    /// Namespace as `database.collection`
    #[serde(default)]
    pub ns: String,

    /// Operation duration in milliseconds
    #[serde(default)]
    pub millis: u64,

    #[serde(default)]
    pub query: Option<Value>,

    #[serde(default)]
    pub command: Option<Value>,

    #[serde(default)]
    pub nreturned: u64,

    #[serde(default)]
    pub docs_examined: u64,

    #[serde(default)]
    pub keys_examined: u64,

    #[serde(default)]
    pub response_length: u64,
}

impl ProfileDocument {
    /// Minimal document, handy for tests and synthetic feeds
    pub fn new(ts: DateTime<Utc>, op: &str, ns: &str, millis: u64) -> Self {
        Self {
            ts,
            op: op.to_string(),
            ns: ns.to_string(),
            millis,
            query: None,
            command: None,
            nreturned: 0,
            docs_examined: 0,
            keys_examined: 0,
            response_length: 0,
        }
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_command(mut self, command: Value) -> Self {
        self.command = Some(command);
        self
    }

    /// Collection part of the namespace (everything after the first dot)
    pub fn collection(&self) -> &str {
        split_namespace(&self.ns).1
    }
}

/// Split `db.collection`; a namespace without a dot is a bare database
pub fn split_namespace(ns: &str) -> (&str, &str) {
    ns.split_once('.').unwrap_or((ns, ""))
}
