//! Integration tests for the parser lifecycle and window reporting
//!
//! Every parser here uses a fixed clock so the first window is
//! [T, T + 60s) with T = 2024-03-01 12:00:00 UTC.

#[cfg(test)]
mod parser_lifecycle_tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use qanflow::parser::{Classifier, DocsFilter, ProcessError, Stats};
    use qanflow::{Parser, ProfileDocument, QanConfig, Report, ReportStream};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: std::time::Duration = std::time::Duration::from_secs(5);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn doc(offset_secs: i64, millis: u64) -> ProfileDocument {
        ProfileDocument::new(t0() + Duration::seconds(offset_secs), "query", "shop.orders", millis)
            .with_query(json!({"status": "open"}))
    }

    fn make_parser(config: QanConfig) -> (mpsc::Sender<ProfileDocument>, Parser) {
        let (tx, rx) = mpsc::channel(100);
        let now = t0() - Duration::seconds(30);
        let parser = Parser::new_with_clock(rx, config, Arc::new(move || now));
        (tx, parser)
    }

    async fn next_report(reports: &ReportStream) -> Report {
        timeout(WAIT, reports.recv())
            .await
            .expect("timed out waiting for report")
            .expect("report stream closed")
    }

    /// Poll status until `key` reaches `expected`
    async fn wait_for_status(parser: &Parser, key: &str, expected: &str) -> HashMap<String, String> {
        for _ in 0..100 {
            let status = parser.status().await.expect("parser not running");
            if status.get(key).map(String::as_str) == Some(expected) {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("status {} never reached {}", key, expected);
    }

    #[tokio::test]
    async fn test_status_is_none_before_start() {
        let (_tx, parser) = make_parser(QanConfig::default());

        assert!(!parser.running());
        assert!(parser.status().await.is_none());
        assert_eq!(parser.name(), "qan-parser");

        // Stop before start is a no-op.
        parser.stop().await;
        assert!(!parser.running());
    }

    #[tokio::test]
    async fn test_single_report_for_completed_window() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();
        assert!(parser.running());

        tx.send(doc(5, 10)).await.unwrap();
        tx.send(doc(30, 20)).await.unwrap();
        tx.send(doc(65, 30)).await.unwrap();

        let report = next_report(&reports).await;
        assert_eq!(report.start_ts, t0());
        assert_eq!(report.end_ts, t0() + Duration::seconds(60));
        assert_eq!(report.run_time, 60.0);
        assert_eq!(report.class.len(), 1);
        assert_eq!(report.class[0].total_queries, 2);
        assert_eq!(report.global.total_queries, 2);

        let query_time = report.global.metrics.time_metrics["Query_time"];
        assert!((query_time.sum - 0.030).abs() < 1e-9);

        // The T+65 document went into the next window.
        let status = wait_for_status(&parser, "docs-in", "3").await;
        assert_eq!(status["reports-out"], "1");
        assert_eq!(status["interval-start"], "2024-03-01 12:01:00");

        parser.stop().await;
        assert!(!parser.running());
        assert!(timeout(WAIT, reports.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_report_per_non_empty_window() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();

        // [T, T+60) and [T+60, T+120) stay empty.
        tx.send(doc(125, 10)).await.unwrap();
        tx.send(doc(130, 10)).await.unwrap();
        tx.send(doc(190, 10)).await.unwrap();

        let report = next_report(&reports).await;
        assert_eq!(report.start_ts, t0() + Duration::seconds(120));
        assert_eq!(report.global.total_queries, 2);
        assert_eq!(report.class.len(), 1);

        let status = wait_for_status(&parser, "docs-in", "3").await;
        assert_eq!(status["reports-out"], "1");

        parser.stop().await;
        assert!(timeout(WAIT, reports.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_start_shares_one_worker() {
        let (tx, parser) = make_parser(QanConfig::default());

        let (a, b, c) = tokio::join!(parser.start(), parser.start(), parser.start());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(a.same_channel(&b));
        assert!(a.same_channel(&c));

        let again = parser.start().await.unwrap();
        assert!(a.same_channel(&again));

        tx.send(doc(5, 10)).await.unwrap();
        tx.send(doc(65, 10)).await.unwrap();
        wait_for_status(&parser, "docs-in", "2").await;

        let report = next_report(&a).await;
        assert_eq!(report.start_ts, t0());

        parser.stop().await;
        assert!(timeout(WAIT, b.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fingerprint_error_is_counted_not_reported() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();

        let bad = ProfileDocument::new(t0() + Duration::seconds(10), "query", "shop.orders", 500)
            .with_query(json!("not a document"));
        tx.send(bad).await.unwrap();
        tx.send(doc(20, 10)).await.unwrap();

        let status = wait_for_status(&parser, "docs-in", "2").await;
        assert_eq!(status["docs-ok"], "1");
        assert_eq!(status["err-fingerprint"], "1");
        assert_eq!(status["err-parse"], "0");

        tx.send(doc(61, 10)).await.unwrap();
        let report = next_report(&reports).await;
        assert_eq!(report.class.len(), 1);
        assert_eq!(report.global.total_queries, 1);
        let query_time = report.global.metrics.time_metrics["Query_time"];
        assert!((query_time.max - 0.010).abs() < 1e-9);

        parser.stop().await;
    }

    #[tokio::test]
    async fn test_trailing_window_is_never_reported() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();

        tx.send(doc(5, 10)).await.unwrap();
        tx.send(doc(30, 10)).await.unwrap();
        drop(tx);

        // Worker exits on end of input; the stream closes without a report.
        assert!(timeout(WAIT, reports.recv()).await.unwrap().is_none());

        parser.stop().await;
    }

    #[tokio::test]
    async fn test_late_documents_never_reported() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();

        let late = ProfileDocument::new(t0() - Duration::seconds(1), "query", "shop.late", 10)
            .with_query(json!({"x": 1}));
        tx.send(late).await.unwrap();
        tx.send(doc(5, 10)).await.unwrap();
        tx.send(doc(60, 10)).await.unwrap();

        let report = next_report(&reports).await;
        assert_eq!(report.global.total_queries, 1);
        assert!(report.class.iter().all(|c| !c.fingerprint.contains("late")));

        let status = wait_for_status(&parser, "docs-in", "2").await;
        assert_eq!(status["docs-late"], "1");

        parser.stop().await;
    }

    #[tokio::test]
    async fn test_counters_never_decrease() {
        let (tx, parser) = make_parser(QanConfig::default());
        let _reports = parser.start().await.unwrap();

        let mut last: HashMap<String, u64> = HashMap::new();
        for i in 0..20 {
            tx.send(doc(i, 5)).await.unwrap();

            let status = parser.status().await.unwrap();
            for key in ["docs-in", "docs-ok", "reports-out", "skipped-docs"] {
                let value: u64 = status.get(key).map_or(0, |v| v.parse().unwrap());
                let previous = last.get(key).copied().unwrap_or(0);
                assert!(value >= previous, "{} went from {} to {}", key, previous, value);
                last.insert(key.to_string(), value);
            }
        }

        parser.stop().await;
        assert!(parser.status().await.is_none());
    }

    #[tokio::test]
    async fn test_restart_resets_status_and_reuses_input() {
        let (tx, parser) = make_parser(QanConfig::default());

        let first = parser.start().await.unwrap();
        tx.send(doc(5, 10)).await.unwrap();
        wait_for_status(&parser, "docs-in", "1").await;
        parser.stop().await;

        let second = parser.start().await.unwrap();
        assert!(!first.same_channel(&second));

        let status = parser.status().await.unwrap();
        assert_eq!(status["docs-in"], "0");

        // Same input stream feeds the new worker.
        tx.send(doc(10, 10)).await.unwrap();
        wait_for_status(&parser, "docs-in", "1").await;

        parser.stop().await;
        assert!(timeout(WAIT, first.recv()).await.unwrap().is_none());
        assert!(timeout(WAIT, second.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_excluded_collections_are_skipped() {
        let config = QanConfig {
            exclude_collections: vec!["system.profile".to_string()],
            ..QanConfig::default()
        };
        let (tx, parser) = make_parser(config);
        let _reports = parser.start().await.unwrap();

        let profile = ProfileDocument::new(t0() + Duration::seconds(1), "query", "shop.system.profile", 1)
            .with_query(json!({"ts": 1}));
        tx.send(profile).await.unwrap();
        tx.send(doc(2, 1)).await.unwrap();

        let status = wait_for_status(&parser, "docs-in", "2").await;
        assert_eq!(status["skipped-docs"], "1");
        assert_eq!(status["docs-ok"], "1");

        parser.stop().await;
    }

    /// Classifier that maps the op name straight to an outcome
    struct ScriptedClassifier;

    impl Classifier for ScriptedClassifier {
        fn process(
            &self,
            doc: &ProfileDocument,
            _filters: &[Arc<dyn DocsFilter>],
            _stats: &mut Stats,
        ) -> Result<(), ProcessError> {
            match doc.op.as_str() {
                "noquery" => Err(ProcessError::NoQuery),
                "filtered" => Err(ProcessError::QueryFiltered),
                "fingerprint" => Err(ProcessError::Fingerprint("scripted".to_string())),
                "parse" => Err(ProcessError::Parse("scripted".to_string())),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_each_outcome_counts_once() {
        let (tx, parser) = make_parser(QanConfig::default());
        let parser = parser.with_classifier(Arc::new(ScriptedClassifier));
        let _reports = parser.start().await.unwrap();

        for op in ["ok", "noquery", "filtered", "fingerprint", "parse", "parse"] {
            tx.send(ProfileDocument::new(t0() + Duration::seconds(1), op, "shop.orders", 1))
                .await
                .unwrap();
        }

        let status = wait_for_status(&parser, "docs-in", "6").await;
        assert_eq!(status["docs-ok"], "1");
        assert_eq!(status["skipped-docs"], "2");
        assert_eq!(status["err-fingerprint"], "1");
        assert_eq!(status["err-parse"], "2");

        parser.stop().await;
    }

    #[tokio::test]
    async fn test_stop_with_unread_report_discards_pending_window() {
        let (tx, parser) = make_parser(QanConfig::default());
        let reports = parser.start().await.unwrap();

        // Window 1 is buffered, window 2's flush blocks until shutdown.
        tx.send(doc(5, 10)).await.unwrap();
        tx.send(doc(65, 10)).await.unwrap();
        wait_for_status(&parser, "reports-out", "1").await;
        tx.send(doc(125, 10)).await.unwrap();

        timeout(WAIT, parser.stop()).await.expect("stop blocked on a pending report");

        let buffered = next_report(&reports).await;
        assert_eq!(buffered.start_ts, t0());
        assert!(timeout(WAIT, reports.recv()).await.unwrap().is_none());
    }
}
