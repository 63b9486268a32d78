//! End-to-end batch runs over a temporary results directory.

use std::path::Path;

use compat_matrix_core::{
    run_batch, write_all, CombinationKey, CompatibilityReport, EvidenceAgreement, MatrixConfig,
    MatrixError, TransportMode, Verdict,
};

fn legs(op: &str, group: &str, c2p: u64, p2s: u64, s2p: u64, p2c: u64) -> String {
    let labels = format!(
        r#"api_key="{}",api_version="9",node_id="0",virtual_cluster="{}""#,
        op, group
    );
    format!(
        "kroxylicious_client_to_proxy_request_total{{{l}}} {}\n\
         kroxylicious_proxy_to_server_request_total{{{l}}} {}\n\
         kroxylicious_server_to_proxy_response_total{{{l}}} {}\n\
         kroxylicious_proxy_to_client_response_total{{{l}}} {}\n",
        c2p,
        p2s,
        s2p,
        p2c,
        l = labels
    )
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write fixture");
}

fn key(c: &str, s: &str) -> CombinationKey {
    CombinationKey::new(c, s)
}

#[tokio::test]
async fn balanced_snapshot_is_compatible() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::from("# HELP kroxylicious_client_to_proxy_request_total x\n");
    text.push_str(&legs("produce", "plain", 100, 100, 100, 100));
    text.push_str(&legs("fetch", "plain", 40, 40, 40, 40));
    write(dir.path(), "client3.6_server3.8_metrics.txt", &text);

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).expect("combination");
    assert_eq!(combo.verdict, Verdict::Compatible);
    assert_eq!(combo.total_requests, 140.0);
    assert_eq!(outcome.matrix.summary.compatibility_percentage, Some(100.0));
    assert!(outcome.skipped.is_empty());
}

#[tokio::test]
async fn error_counters_are_reported_without_changing_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = legs("produce", "plain", 100, 100, 100, 100);
    text.push_str("kroxylicious_client_to_proxy_errors_total{virtual_cluster=\"plain\"} 3\n");
    text.push_str("kroxylicious_upstream_connection_failures_total{virtual_cluster=\"plain\"} 0\n");
    write(dir.path(), "client3.6_server3.8_metrics.txt", &text);

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::Compatible);
    assert_eq!(combo.client_errors, 3.0);
    assert_eq!(combo.upstream_errors, 0.0);
    assert_eq!(combo.total_requests, 100.0);
    assert_eq!(outcome.matrix.summary.compatibility_percentage, Some(100.0));

    let report = CompatibilityReport::from_outcome(&outcome).unwrap();
    assert_eq!(report.details.len(), 1);
    let paths = write_all(&dir.path().join("reports"), &report).unwrap();
    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    assert!(csv.lines().next().unwrap().ends_with("client_errors,upstream_errors"));
    assert!(csv.contains("100,100,100,100,COMPATIBLE,0,COMPATIBLE,3,0"));
}

#[tokio::test]
async fn trailing_exemplar_does_not_replace_sample_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::new();
    for family in [
        "client_to_proxy_request_total",
        "proxy_to_server_request_total",
        "server_to_proxy_response_total",
        "proxy_to_client_response_total",
    ] {
        text.push_str(&format!(
            "kroxylicious_{family}{{api_key=\"produce\",api_version=\"9\",node_id=\"0\",virtual_cluster=\"plain\"}} 100 # {{trace_id=\"abc\"}} 1.0\n"
        ));
    }
    write(dir.path(), "client3.6_server3.8_metrics.txt", &text);

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.total_requests, 100.0);
    assert_eq!(combo.verdict, Verdict::Compatible);
}

#[tokio::test]
async fn short_forward_is_incompatible_with_magnitude() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 100, 80, 80, 80),
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::Incompatible);
    assert_eq!(combo.max_magnitude, 20.0);
    assert_eq!(combo.groups[0].incompatible_operations, vec!["produce(0)"]);
    assert_eq!(outcome.matrix.summary.compatibility_percentage, Some(0.0));
}

#[tokio::test]
async fn empty_snapshot_is_indeterminate_with_no_details() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        "# HELP jvm_threads_live threads\njvm_threads_live 12\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::Indeterminate);
    assert!(combo.groups.is_empty());

    let report = CompatibilityReport::from_outcome(&outcome).unwrap();
    assert!(report.details.is_empty());
    assert_eq!(report.summary.indeterminate, 1);
    assert_eq!(report.summary.compatibility_percentage, None);
}

#[tokio::test]
async fn setup_timeout_without_snapshot_is_setup_failed_and_unscored() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    write(
        dir.path(),
        "client3.7_server3.8_status.txt",
        "SETUP_FAILED: broker did not start\nFAILURE_TYPE: TIMEOUT\nTIMESTAMP: 2024-03-01T10:00:00Z\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let failed = outcome.matrix.get(&key("3.7", "3.8")).unwrap();
    assert_eq!(failed.verdict, Verdict::SetupFailed);
    assert_eq!(
        failed.setup.as_ref().and_then(|s| s.failure_kind()),
        Some("TIMEOUT")
    );

    let summary = &outcome.matrix.summary;
    assert_eq!(summary.tested_combinations, 2);
    assert_eq!(summary.setup_failed, 1);
    assert_eq!(summary.compatibility_percentage, Some(100.0));
}

#[tokio::test]
async fn setup_failure_overrides_balanced_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    write(
        dir.path(),
        "client3.6_server3.8_status.txt",
        "SETUP_FAILED: topic creation failed\nFAILURE_TYPE: TOPIC_CREATION\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::SetupFailed);
    assert_eq!(combo.telemetry_verdict, Verdict::Compatible);
}

#[tokio::test]
async fn successful_setup_status_does_not_change_verdict() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    write(
        dir.path(),
        "client3.6_server3.8_status.txt",
        "SETUP_SUCCESS: all services up\nFAILURE_TYPE: NONE\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::Compatible);
    assert!(combo.setup.as_ref().is_some_and(|s| !s.is_failure()));
}

#[tokio::test]
async fn allowlisted_imbalance_is_acceptable_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = legs("produce", "plain", 10, 10, 10, 10);
    text.push_str(&legs("metadata", "plain", 10, 9, 9, 9));
    write(dir.path(), "client3.6_server3.8_metrics.txt", &text);

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::CompatibleWithAcceptableFailure);
    assert_eq!(combo.groups[0].acceptable_failures, vec!["metadata(3)"]);
    assert_eq!(outcome.matrix.summary.compatibility_percentage, Some(100.0));

    let strict = MatrixConfig::default().with_acceptable_failures(Vec::<String>::new());
    let outcome = run_batch(&strict, dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.verdict, Verdict::Incompatible);
}

#[tokio::test]
async fn unparseable_provenance_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    write(
        dir.path(),
        "nightly_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    write(dir.path(), "client3.9_server3.8_status.txt", "STATUS: ???\n");

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    assert_eq!(outcome.matrix.combinations.len(), 1);
    let sources: Vec<&str> = outcome.skipped.iter().map(|s| s.source.as_str()).collect();
    assert!(sources.contains(&"nightly_metrics.txt"));
    assert!(sources.contains(&"client3.9_server3.8_status.txt"));
}

#[tokio::test]
async fn empty_directory_reports_no_usable_input() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "nothing to see");

    let err = run_batch(&MatrixConfig::default(), dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, MatrixError::NoUsableInput { .. }));
}

#[tokio::test]
async fn execution_evidence_is_joined_per_transport() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    let plain = dir.path().join("test-results/client3.6_server3.8/plain");
    let sasl = dir.path().join("test-results/client3.6_server3.8/sasl_plain");
    std::fs::create_dir_all(&plain).unwrap();
    std::fs::create_dir_all(&sasl).unwrap();
    write(
        &plain,
        "TEST-ProducerTest.txt",
        "Tests run: 4, Failures: 0, Errors: 0, Skipped: 0\n",
    );
    write(
        &sasl,
        "TEST-ProducerTest.txt",
        "Tests run: 3, Failures: 0, Errors: 0, Skipped: 1\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let combo = outcome.matrix.get(&key("3.6", "3.8")).unwrap();
    assert_eq!(combo.executions[&TransportMode::Plaintext].executed, 4);
    assert_eq!(combo.executions[&TransportMode::Sasl].skipped, 1);
    assert_eq!(combo.agreement, EvidenceAgreement::Corroborates);
    assert_eq!(combo.verdict, Verdict::Compatible);
}

#[tokio::test]
async fn evidence_only_directory_is_usable_input() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_status.txt",
        "SETUP_FAILED: kafka unreachable\nFAILURE_TYPE: CONNECTION\n",
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    assert_eq!(outcome.matrix.combinations.len(), 1);
    assert_eq!(
        outcome.matrix.combinations[0].verdict,
        Verdict::SetupFailed
    );
    assert_eq!(outcome.matrix.summary.compatibility_percentage, None);
}

#[tokio::test]
async fn expected_grid_reports_missing_combinations() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 10, 10, 10, 10),
    );
    let config = MatrixConfig::default().with_versions(
        vec!["3.6".to_string(), "3.7".to_string()],
        vec!["3.8".to_string()],
    );

    let outcome = run_batch(&config, dir.path()).await.unwrap();
    let summary = &outcome.matrix.summary;
    assert_eq!(summary.expected_combinations, 2);
    assert_eq!(summary.tested_combinations, 1);
    assert_eq!(summary.missing, vec![key("3.7", "3.8")]);
}

#[tokio::test]
async fn rerun_over_same_inputs_has_identical_digest() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 100, 80, 80, 80),
    );
    write(
        dir.path(),
        "java3.7_server3.8_metrics.txt",
        &legs("fetch", "ssl", 5, 5, 5, 5),
    );

    let first = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let second = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let a = CompatibilityReport::from_outcome(&first).unwrap();
    let b = CompatibilityReport::from_outcome(&second).unwrap();
    assert_eq!(a.matrix_digest, b.matrix_digest);
    assert_eq!(a.details, b.details);
}

#[tokio::test]
async fn report_files_are_written() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "client3.6_server3.8_metrics.txt",
        &legs("produce", "plain", 100, 80, 80, 80),
    );

    let outcome = run_batch(&MatrixConfig::default(), dir.path()).await.unwrap();
    let report = CompatibilityReport::from_outcome(&outcome).unwrap();
    let out = dir.path().join("reports");
    let paths = write_all(&out, &report).unwrap();

    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("3.6,3.8,produce,0,9,plain,PLAINTEXT,100,80,80,80,INCOMPATIBLE,20"));

    let reference = std::fs::read_to_string(&paths.api_key_reference).unwrap();
    assert!(reference.contains("produce"));
    assert!(!reference.contains("fetch"));

    let json = std::fs::read_to_string(&paths.json).unwrap();
    let back: CompatibilityReport = serde_json::from_str(&json).unwrap();
    assert!(back.verify_digest().unwrap());
}
