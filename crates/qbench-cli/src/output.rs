//! Terminal rendering for run summaries, catalogs and comparisons.

use std::fmt::Write as _;

use qbench_core::{
    BenchMode, BenchmarkReport, QueryCatalog, QueryResult, ReportPaths, RunStatistics, speedup,
};

const DESCRIPTION_WIDTH: usize = 40;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('\u{2026}');
        cut
    }
}

fn ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn query_line(q: &QueryResult) -> String {
    let head = format!(
        "  Q{:<3} {:<width$}",
        q.query_number,
        truncate(&q.description, DESCRIPTION_WIDTH),
        width = DESCRIPTION_WIDTH
    );
    if let Some(err) = &q.error {
        return format!("{head}  FAILED during {}: {}", err.phase, err.message);
    }
    if let Some(m) = &q.statistics {
        let s = &m.statistics;
        return format!(
            "{head}  mean {} ms  p50 {} ms  p95 {} ms  p99 {} ms  failed {}/{}",
            ms(s.mean),
            ms(s.p50),
            ms(s.p95),
            ms(s.p99),
            m.failed,
            m.runs
        );
    }
    if let Some(t) = &q.throughput {
        return format!(
            "{head}  {:.2} qps  completed {}  failed {}  p95 {} ms  window {:.2}s",
            t.qps,
            t.completed,
            t.failed,
            ms(t.latency.p95),
            t.actual_duration_s
        );
    }
    head
}

/// Per-query summary followed by totals and output paths.
#[must_use]
pub fn render_report(report: &BenchmarkReport, paths: &ReportPaths) -> String {
    let meta = &report.metadata;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} benchmarks ({} configuration, {} dataset) on {} {}",
        meta.mode, meta.index_configuration, meta.scale, meta.store.engine, meta.store.database
    );
    for q in &report.queries {
        let _ = writeln!(out, "{}", query_line(q));
    }
    let _ = writeln!(
        out,
        "  {} of {} queries succeeded in {:.1}s",
        meta.succeeded_queries, meta.total_queries, meta.total_duration_seconds
    );
    if let Some(total_qps) = meta.total_qps {
        let _ = writeln!(out, "  overall throughput: {total_qps:.2} qps");
    }
    let _ = writeln!(out, "  results: {}", paths.json.display());
    let _ = writeln!(out, "  summary: {}", paths.csv.display());
    out
}

#[must_use]
pub fn render_catalog(catalog: &QueryCatalog) -> String {
    let mut out = String::new();
    for q in catalog.iter() {
        let _ = writeln!(out, "Q{:<3} {}", q.number, q.description);
        let _ = writeln!(out, "     {}", q.text);
    }
    let _ = writeln!(out, "{} queries", catalog.len());
    out
}

/// Speedup per query present in both reports.
///
/// Latency leads with the p50 ratio (baseline / candidate) and follows with
/// p95 and mean, so one slow outlier cannot hide a median improvement.
/// Throughput compares qps (candidate / baseline). Either way values above 1
/// favour the candidate.
#[must_use]
pub fn render_comparison(baseline: &BenchmarkReport, candidate: &BenchmarkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} speedup: {} vs {} ({} dataset)",
        baseline.metadata.mode,
        candidate.metadata.index_configuration,
        baseline.metadata.index_configuration,
        baseline.metadata.scale
    );
    for base in &baseline.queries {
        let Some(cand) = candidate
            .queries
            .iter()
            .find(|c| c.query_number == base.query_number)
        else {
            continue;
        };
        let ratios = match baseline.metadata.mode {
            BenchMode::Latency => {
                let by = |pick: fn(&RunStatistics) -> Option<f64>| {
                    ratio(speedup(stat(base, pick), stat(cand, pick)))
                };
                format!(
                    "p50 {}  p95 {}  mean {}",
                    by(|s| s.p50),
                    by(|s| s.p95),
                    by(|s| s.mean)
                )
            }
            BenchMode::Throughput => format!("qps {}", ratio(speedup(qps_of(cand), qps_of(base)))),
        };
        let _ = writeln!(
            out,
            "  Q{:<3} {:<width$}  {ratios}",
            base.query_number,
            truncate(&base.description, DESCRIPTION_WIDTH),
            width = DESCRIPTION_WIDTH
        );
    }
    out
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}x"))
}

fn stat(q: &QueryResult, pick: fn(&RunStatistics) -> Option<f64>) -> Option<f64> {
    q.statistics.as_ref().and_then(|m| pick(&m.statistics))
}

fn qps_of(q: &QueryResult) -> Option<f64> {
    q.throughput.as_ref().map(|t| t.qps)
}
