//! Document filters applied before classification

use crate::profile::ProfileDocument;
use std::collections::HashSet;

/// Predicate that may exclude whole documents from aggregation
pub trait DocsFilter: Send + Sync {
    /// Returns true if the document should be aggregated
    fn accept(&self, doc: &ProfileDocument) -> bool;
}

/// Rejects documents whose collection is on a deny list
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    excluded: HashSet<String>,
}

impl CollectionFilter {
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: collections.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl DocsFilter for CollectionFilter {
    fn accept(&self, doc: &ProfileDocument) -> bool {
        !self.excluded.contains(doc.collection())
    }
}

impl<F> DocsFilter for F
where
    F: Fn(&ProfileDocument) -> bool + Send + Sync,
{
    fn accept(&self, doc: &ProfileDocument) -> bool {
        self(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_collection_filter() {
        let filter = CollectionFilter::new(["system.profile", "sessions"]);

        let profile = ProfileDocument::new(Utc::now(), "query", "app.system.profile", 1);
        let sessions = ProfileDocument::new(Utc::now(), "query", "app.sessions", 1);
        let orders = ProfileDocument::new(Utc::now(), "query", "app.orders", 1);

        assert!(!filter.accept(&profile));
        assert!(!filter.accept(&sessions));
        assert!(filter.accept(&orders));
    }

    #[test]
    fn test_closure_filter() {
        let slow_only = |doc: &ProfileDocument| doc.millis >= 100;

        assert!(slow_only.accept(&ProfileDocument::new(Utc::now(), "query", "app.a", 150)));
        assert!(!slow_only.accept(&ProfileDocument::new(Utc::now(), "query", "app.a", 5)));
    }
}
