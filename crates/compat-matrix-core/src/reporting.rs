//! Report file writers.
//!
//! Each artifact has a pure `render_*` function and a `write_*` wrapper;
//! [`write_all`] produces the full set in one output directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{CombinationKey, Verdict};
use crate::evidence::EvidenceAgreement;
use crate::obs;
use crate::report::CompatibilityReport;

pub const REPORT_JSON: &str = "compatibility_report.json";
pub const DETAIL_CSV: &str = "detailed_flow_usage.csv";
pub const SUMMARY_TXT: &str = "compatibility_summary.txt";
pub const API_KEY_REFERENCE_TXT: &str = "api_key_reference.txt";

const CSV_HEADER: &[&str] = &[
    "client_version",
    "server_version",
    "operation",
    "api_key",
    "operation_version",
    "group",
    "transport",
    "client_to_proxy",
    "proxy_to_server",
    "server_to_proxy",
    "proxy_to_client",
    "verdict",
    "magnitude",
    "combination_verdict",
    "client_errors",
    "upstream_errors",
];

/// Paths of the files written by [`write_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub summary: PathBuf,
    pub api_key_reference: PathBuf,
}

/// Write compatibility_report.json in pretty JSON format.
pub fn write_report_json(path: &Path, report: &CompatibilityReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize compatibility report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Render one CSV row per flow tuple, with a header line.
pub fn render_detail_csv(report: &CompatibilityReport) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for row in &report.details {
        let fields = [
            csv_field(&row.client_version),
            csv_field(&row.server_version),
            csv_field(&row.operation),
            csv_field(&row.api_key.to_string()),
            csv_field(&row.operation_version),
            csv_field(&row.group),
            row.transport.to_string(),
            row.client_to_proxy.to_string(),
            row.proxy_to_server.to_string(),
            row.server_to_proxy.to_string(),
            row.proxy_to_client.to_string(),
            row.verdict.to_string(),
            row.magnitude.to_string(),
            row.combination_verdict.to_string(),
            row.client_errors.to_string(),
            row.upstream_errors.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Write detailed_flow_usage.csv.
pub fn write_detail_csv(path: &Path, report: &CompatibilityReport) -> Result<()> {
    std::fs::write(path, render_detail_csv(report)).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn cell(verdict: Option<Verdict>) -> &'static str {
    match verdict {
        None => "-",
        Some(Verdict::Compatible) => "OK",
        Some(Verdict::CompatibleWithAcceptableFailure) => "OK*",
        Some(Verdict::Incompatible) => "FAIL",
        Some(Verdict::Indeterminate) => "?",
        Some(Verdict::SetupFailed) => "SETUP",
    }
}

fn evidence_cell(agreement: EvidenceAgreement) -> &'static str {
    match agreement {
        EvidenceAgreement::NoEvidence => "none",
        EvidenceAgreement::Corroborates => "corroborates",
        EvidenceAgreement::Disagrees => "disagrees",
        EvidenceAgreement::Inconclusive => "inconclusive",
    }
}

/// Render the human-readable summary: counts, a client x server grid and
/// the per-combination breakdown.
pub fn render_summary_text(report: &CompatibilityReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str("Compatibility Matrix Summary\n");
    out.push_str("============================\n\n");
    out.push_str(&format!("generated at:        {}\n", report.generated_at.to_rfc3339()));
    out.push_str(&format!("matrix digest:       {}\n\n", report.matrix_digest));
    out.push_str(&format!("expected:            {}\n", s.expected_combinations));
    out.push_str(&format!("tested:              {}\n", s.tested_combinations));
    out.push_str(&format!("missing:             {}\n", s.missing_combinations));
    out.push_str(&format!("compatible:          {}\n", s.compatible));
    out.push_str(&format!(
        "acceptable failures: {}\n",
        s.compatible_with_acceptable_failure
    ));
    out.push_str(&format!("incompatible:        {}\n", s.incompatible));
    out.push_str(&format!("indeterminate:       {}\n", s.indeterminate));
    out.push_str(&format!("setup failed:        {}\n", s.setup_failed));
    match s.compatibility_percentage {
        Some(pct) => out.push_str(&format!("compatibility:       {:.1}%\n\n", pct)),
        None => out.push_str("compatibility:       n/a\n\n"),
    }

    if !s.client_versions.is_empty() && !s.server_versions.is_empty() {
        let width = s
            .client_versions
            .iter()
            .chain(s.server_versions.iter())
            .map(|v| v.len())
            .max()
            .unwrap_or(0)
            .max("client\\server".len())
            .max(5)
            + 2;
        out.push_str(&format!("{:<width$}", "client\\server", width = width));
        for server in &s.server_versions {
            out.push_str(&format!("{:<width$}", server, width = width));
        }
        out.push('\n');
        for client in &s.client_versions {
            out.push_str(&format!("{:<width$}", client, width = width));
            for server in &s.server_versions {
                let key = CombinationKey::new(client.as_str(), server.as_str());
                let verdict = report
                    .combinations
                    .iter()
                    .find(|c| c.key == key)
                    .map(|c| c.verdict);
                out.push_str(&format!("{:<width$}", cell(verdict), width = width));
            }
            out.push('\n');
        }
        out.push_str("\nOK compatible, OK* acceptable failure, FAIL incompatible, ");
        out.push_str("? indeterminate, SETUP setup failed, - not tested\n\n");
    }

    out.push_str(&format!(
        "{:<10} {:<10} {:<36} {:>6} {:>10} {:>13} {:>8}  {:<16} {}\n",
        "client",
        "server",
        "verdict",
        "groups",
        "requests",
        "max imbalance",
        "errors",
        "setup",
        "evidence"
    ));
    for combo in &report.combinations {
        let setup = combo
            .setup
            .as_ref()
            .and_then(|s| s.failure_kind())
            .unwrap_or("-");
        out.push_str(&format!(
            "{:<10} {:<10} {:<36} {:>6} {:>10} {:>13} {:>8}  {:<16} {}\n",
            combo.key.client_version,
            combo.key.server_version,
            combo.verdict.as_str(),
            combo.groups.len(),
            combo.total_requests,
            combo.max_magnitude,
            combo.client_errors + combo.upstream_errors,
            setup,
            evidence_cell(combo.agreement),
        ));
    }
    out.push('\n');

    for combo in &report.combinations {
        out.push_str(&format!("{}: {}\n", combo.key, combo.verdict));
        if combo.verdict != combo.telemetry_verdict {
            out.push_str(&format!("  telemetry verdict: {}\n", combo.telemetry_verdict));
        }
        if let Some(kind) = combo.setup.as_ref().and_then(|s| s.failure_kind()) {
            out.push_str(&format!("  setup failure: {}\n", kind));
        }
        for group in &combo.groups {
            out.push_str(&format!(
                "  [{}] {} ({})\n",
                group.group, group.verdict, group.transport
            ));
            if !group.incompatible_operations.is_empty() {
                out.push_str(&format!(
                    "    incompatible: {}\n",
                    group.incompatible_operations.join(", ")
                ));
            }
            if !group.acceptable_failures.is_empty() {
                out.push_str(&format!(
                    "    acceptable: {}\n",
                    group.acceptable_failures.join(", ")
                ));
            }
        }
    }

    if !s.missing.is_empty() {
        out.push_str("\nNot tested:\n");
        for key in &s.missing {
            out.push_str(&format!("  {}\n", key));
        }
    }

    if !report.skipped.is_empty() {
        out.push_str("\nSkipped inputs:\n");
        for skipped in &report.skipped {
            out.push_str(&format!("  {}: {}\n", skipped.source, skipped.reason));
        }
    }
    out
}

/// Write compatibility_summary.txt.
pub fn write_summary_text(path: &Path, report: &CompatibilityReport) -> Result<()> {
    std::fs::write(path, render_summary_text(report))
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the name/id table for operations observed in this batch.
pub fn render_api_key_reference(report: &CompatibilityReport) -> String {
    let mut out = String::from("api_key  operation\n");
    for (name, key) in report.observed_operations() {
        let id = key.id().map(|id| id.to_string()).unwrap_or_else(|| "?".to_string());
        out.push_str(&format!("{:>7}  {}\n", id, name));
    }
    out
}

/// Write api_key_reference.txt.
pub fn write_api_key_reference(path: &Path, report: &CompatibilityReport) -> Result<()> {
    std::fs::write(path, render_api_key_reference(report))
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write every report artifact into `output_dir`, creating it if needed.
pub fn write_all(output_dir: &Path, report: &CompatibilityReport) -> Result<ReportPaths> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {:?}", output_dir))?;

    let paths = ReportPaths {
        json: output_dir.join(REPORT_JSON),
        csv: output_dir.join(DETAIL_CSV),
        summary: output_dir.join(SUMMARY_TXT),
        api_key_reference: output_dir.join(API_KEY_REFERENCE_TXT),
    };

    write_report_json(&paths.json, report)?;
    obs::emit_report_written("json", &paths.json);
    write_detail_csv(&paths.csv, report)?;
    obs::emit_report_written("csv", &paths.csv);
    write_summary_text(&paths.summary, report)?;
    obs::emit_report_written("summary", &paths.summary);
    write_api_key_reference(&paths.api_key_reference, report)?;
    obs::emit_report_written("api_key_reference", &paths.api_key_reference);

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::config::MatrixConfig;
    use crate::decoder::DecodedSnapshot;
    use crate::domain::{ErrorTotals, FlowTuple, LegTotals};
    use crate::evidence::EvidenceSet;
    use crate::pipeline::SkippedSource;

    fn balanced(n: f64) -> LegTotals {
        LegTotals {
            client_to_proxy: n,
            proxy_to_server: n,
            server_to_proxy: n,
            proxy_to_client: n,
        }
    }

    fn report() -> CompatibilityReport {
        let snaps = vec![
            DecodedSnapshot {
                key: CombinationKey::new("3.6", "3.8"),
                source: "a".to_string(),
                observation_count: 4,
                errors: ErrorTotals::default(),
                flows: [(FlowTuple::new("produce", "9", "plain"), balanced(10.0))]
                    .into_iter()
                    .collect(),
            },
            DecodedSnapshot {
                key: CombinationKey::new("3.7", "3.8"),
                source: "b".to_string(),
                observation_count: 4,
                errors: ErrorTotals {
                    client: 2.0,
                    upstream: 1.0,
                },
                flows: [(
                    FlowTuple::new("fetch", "12", "a,b"),
                    LegTotals {
                        client_to_proxy: 100.0,
                        proxy_to_server: 80.0,
                        server_to_proxy: 80.0,
                        proxy_to_client: 80.0,
                    },
                )]
                .into_iter()
                .collect(),
            },
        ];
        let config = MatrixConfig::default().with_versions(
            vec!["3.6".to_string(), "3.7".to_string()],
            vec!["3.8".to_string(), "3.9".to_string()],
        );
        let matrix = aggregate(&snaps, &EvidenceSet::new(), &config);
        CompatibilityReport::build(
            matrix.summary,
            matrix.combinations,
            vec![SkippedSource {
                source: "junk.txt".to_string(),
                reason: "unparseable provenance".to_string(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_csv_has_header_and_quotes_fields() {
        let csv = render_detail_csv(&report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("client_version,server_version,operation,api_key"));
        assert_eq!(
            lines[1],
            "3.6,3.8,produce,0,9,plain,PLAINTEXT,10,10,10,10,COMPATIBLE,0,COMPATIBLE,0,0"
        );
        assert!(lines[2].contains("\"a,b\""));
        assert!(lines[2].ends_with("INCOMPATIBLE,20,INCOMPATIBLE,2,1"));
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_summary_text_grid_and_sections() {
        let text = render_summary_text(&report());
        assert!(text.contains("expected:            4"));
        assert!(text.contains("tested:              2"));
        assert!(text.contains("compatibility:       50.0%"));
        let grid_row = text
            .lines()
            .find(|l| l.starts_with("3.7 "))
            .expect("grid row for 3.7");
        assert!(grid_row.contains("FAIL"));
        assert!(grid_row.contains('-'));
        let table_row = text
            .lines()
            .find(|l| l.starts_with("3.7") && l.contains("INCOMPATIBLE"))
            .expect("table row for 3.7");
        assert!(table_row.contains("100"));
        assert!(table_row.contains("20"));
        assert!(table_row.contains("       3  "));
        assert!(table_row.ends_with("none"));
        assert!(text.contains("Not tested:"));
        assert!(text.contains("Skipped inputs:\n  junk.txt: unparseable provenance"));
    }

    #[test]
    fn test_api_key_reference_lists_observed_only() {
        let text = render_api_key_reference(&report());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("produce"));
        assert!(lines[1].trim_start().starts_with('0'));
        assert!(lines[2].ends_with("fetch"));
        assert!(lines[2].trim_start().starts_with('1'));
    }

    #[test]
    fn test_write_all_creates_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let paths = write_all(&out, &report()).unwrap();
        for path in [
            &paths.json,
            &paths.csv,
            &paths.summary,
            &paths.api_key_reference,
        ] {
            assert!(path.exists(), "{:?} not written", path);
        }
        let raw = std::fs::read_to_string(&paths.json).unwrap();
        let back: CompatibilityReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.summary.tested_combinations, 2);
    }
}
