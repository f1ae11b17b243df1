//! Benchmark report assembly and persistence.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Query;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::models::{BenchMode, LatencyMeasurement, Phase, StoreIdentity, ThroughputMeasurement};
use crate::stats::RunStatistics;

/// Query-level failure recorded in place of measurements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFailure {
    pub phase: Phase,
    pub message: String,
}

/// Outcome of benchmarking one catalog entry.
///
/// Exactly one of `statistics`, `throughput` and `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub query_number: u32,
    pub description: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<LatencyMeasurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<ThroughputMeasurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
}

impl QueryResult {
    fn base(query: &Query) -> Self {
        Self {
            query_number: query.number,
            description: query.description.clone(),
            query: query.text.clone(),
            statistics: None,
            throughput: None,
            error: None,
        }
    }

    #[must_use]
    pub fn latency(query: &Query, measurement: LatencyMeasurement) -> Self {
        Self {
            statistics: Some(measurement),
            ..Self::base(query)
        }
    }

    #[must_use]
    pub fn throughput(query: &Query, measurement: ThroughputMeasurement) -> Self {
        Self {
            throughput: Some(measurement),
            ..Self::base(query)
        }
    }

    #[must_use]
    pub fn failed(query: &Query, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            error: Some(QueryFailure {
                phase,
                message: message.into(),
            }),
            ..Self::base(query)
        }
    }

    /// Record a runner error. Errors without a phase are attributed to `fallback`.
    #[must_use]
    pub fn from_error(query: &Query, fallback: Phase, err: &Error) -> Self {
        match err {
            Error::Query { phase, message, .. } => Self::failed(query, *phase, message.clone()),
            other => Self::failed(query, fallback, other.to_string()),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn latency_stats(&self) -> Option<&RunStatistics> {
        self.statistics
            .as_ref()
            .map(|m| &m.statistics)
            .or_else(|| self.throughput.as_ref().map(|t| &t.latency))
    }
}

/// Run-level metadata. Throughput-only fields are omitted from latency reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportMetadata {
    pub mode: BenchMode,
    pub scale: String,
    pub index_configuration: String,
    pub store: StoreIdentity,
    pub warmup_runs: u32,
    pub measurement_runs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_seconds: Option<f64>,
    pub total_queries: usize,
    pub succeeded_queries: usize,
    pub failed_queries: usize,
    pub total_duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_failed: Option<u64>,
    /// Completed requests over the summed measurement windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_qps: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

/// The persisted output of one catalog pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub metadata: ReportMetadata,
    pub queries: Vec<QueryResult>,
}

/// Files written by [`BenchmarkReport::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl BenchmarkReport {
    /// Assemble the report for a finished pass. `captured_at` is taken now.
    #[must_use]
    pub fn assemble(
        mode: BenchMode,
        config: &RunConfig,
        store: StoreIdentity,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        queries: Vec<QueryResult>,
    ) -> Self {
        let succeeded = queries.iter().filter(|q| q.is_success()).count();
        let throughput = mode == BenchMode::Throughput;

        let (total_completed, total_failed, total_qps) = if throughput {
            let measurements = queries.iter().filter_map(|q| q.throughput.as_ref());
            let (completed, failed, window) = measurements.fold(
                (0_u64, 0_u64, 0.0_f64),
                |(c, f, w), m| (c + m.completed, f + m.failed, w + m.actual_duration_s),
            );
            (
                Some(completed),
                Some(failed),
                Some(crate::models::qps(completed, window)),
            )
        } else {
            (None, None, None)
        };

        let metadata = ReportMetadata {
            mode,
            scale: config.scale.clone(),
            index_configuration: config.index_config.clone(),
            store,
            warmup_runs: config.warmup_runs,
            measurement_runs: config.measurement_runs,
            concurrency: throughput.then_some(config.concurrency),
            duration_seconds: throughput.then_some(config.duration_seconds),
            grace_seconds: throughput.then_some(config.grace_seconds),
            total_queries: queries.len(),
            succeeded_queries: succeeded,
            failed_queries: queries.len() - succeeded,
            total_duration_seconds: elapsed.as_secs_f64(),
            total_completed,
            total_failed,
            total_qps,
            started_at,
            captured_at: Utc::now(),
        };
        Self { metadata, queries }
    }

    /// `<mode>_<index_config>_<scale>`
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.metadata.mode, self.metadata.index_configuration, self.metadata.scale
        )
    }

    /// Write the JSON report and its CSV projection under `dir`.
    ///
    /// Each file goes through a temp file in `dir` and an atomic rename, so a
    /// reader never observes a partial report.
    pub fn persist(&self, dir: &Path) -> Result<ReportPaths> {
        std::fs::create_dir_all(dir)?;
        let stem = self.file_stem();
        let json = dir.join(format!("{stem}.json"));
        let csv = dir.join(format!("{stem}.csv"));

        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_data()?;
        tmp.persist(&json).map_err(|e| Error::Io(e.error))?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        let tmp = self.write_csv(tmp)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&csv).map_err(|e| Error::Io(e.error))?;

        tracing::info!(json = %json.display(), csv = %csv.display(), "report written");
        Ok(ReportPaths { json, csv })
    }

    /// Read a previously persisted JSON report.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Column names of the CSV projection for this report's mode.
    #[must_use]
    pub const fn csv_header(&self) -> &'static [&'static str] {
        match self.metadata.mode {
            BenchMode::Latency => LATENCY_COLUMNS,
            BenchMode::Throughput => THROUGHPUT_COLUMNS,
        }
    }

    /// One flattened row per query, in report order.
    #[must_use]
    pub fn csv_rows(&self) -> Vec<Vec<String>> {
        self.queries
            .iter()
            .map(|q| match self.metadata.mode {
                BenchMode::Latency => latency_row(q),
                BenchMode::Throughput => throughput_row(q),
            })
            .collect()
    }

    fn write_csv<W: std::io::Write>(&self, out: W) -> Result<W> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(self.csv_header())?;
        for row in self.csv_rows() {
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        wtr.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CSV projection
// ────────────────────────────────────────────────────────────────────────────

const LATENCY_COLUMNS: &[&str] = &[
    "query_number",
    "description",
    "runs",
    "failed",
    "min_ms",
    "max_ms",
    "mean_ms",
    "median_ms",
    "p50_ms",
    "p95_ms",
    "p99_ms",
    "stddev_ms",
    "error",
];

const THROUGHPUT_COLUMNS: &[&str] = &[
    "query_number",
    "description",
    "concurrency",
    "duration_seconds",
    "completed",
    "failed",
    "abandoned",
    "actual_duration_s",
    "qps",
    "mean_ms",
    "p50_ms",
    "p95_ms",
    "p99_ms",
    "error",
];

fn fmt2(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn error_cell(q: &QueryResult) -> String {
    q.error
        .as_ref()
        .map(|e| format!("{}: {}", e.phase, e.message))
        .unwrap_or_default()
}

fn latency_row(q: &QueryResult) -> Vec<String> {
    let stats = q.latency_stats().copied().unwrap_or_default();
    let m = q.statistics.as_ref();
    vec![
        q.query_number.to_string(),
        q.description.clone(),
        fmt_opt(m.map(|m| m.runs)),
        fmt_opt(m.map(|m| m.failed)),
        fmt2(stats.min),
        fmt2(stats.max),
        fmt2(stats.mean),
        fmt2(stats.median),
        fmt2(stats.p50),
        fmt2(stats.p95),
        fmt2(stats.p99),
        fmt2(stats.stddev),
        error_cell(q),
    ]
}

fn throughput_row(q: &QueryResult) -> Vec<String> {
    let stats = q.latency_stats().copied().unwrap_or_default();
    let t = q.throughput.as_ref();
    vec![
        q.query_number.to_string(),
        q.description.clone(),
        fmt_opt(t.map(|t| t.concurrency)),
        fmt_opt(t.map(|t| t.duration_seconds)),
        fmt_opt(t.map(|t| t.completed)),
        fmt_opt(t.map(|t| t.failed)),
        fmt_opt(t.map(|t| t.abandoned)),
        fmt2(t.map(|t| t.actual_duration_s)),
        fmt2(t.map(|t| t.qps)),
        fmt2(stats.mean),
        fmt2(stats.p50),
        fmt2(stats.p95),
        fmt2(stats.p99),
        error_cell(q),
    ]
}
