//! Measurement models shared by the runners and the report.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::RunStatistics;

/// Benchmark regime selected for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BenchMode {
    Latency,
    Throughput,
}

impl BenchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::Throughput => "throughput",
        }
    }
}

impl std::fmt::Display for BenchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a query's benchmark pass, used to locate query-level failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Warmup,
    Measurement,
    Throughput,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Warmup => write!(f, "warmup"),
            Self::Measurement => write!(f, "measurement"),
            Self::Throughput => write!(f, "throughput"),
        }
    }
}

/// One probe execution.
///
/// A failed sample always carries a zero duration; runners decide whether it
/// contributes to statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub duration_ms: f64,
    pub success: bool,
}

impl Sample {
    #[must_use]
    pub fn succeeded(elapsed: Duration) -> Self {
        Self {
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            success: true,
        }
    }

    #[must_use]
    pub const fn failed() -> Self {
        Self {
            duration_ms: 0.0,
            success: false,
        }
    }
}

/// Identity of the backing store, embedded in report metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreIdentity {
    pub engine: String,
    pub database: String,
}

/// Result of a latency-mode pass over one query.
///
/// Failed measured calls count toward `runs` and `failed` but are excluded
/// from `raw_timings` and the statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyMeasurement {
    pub runs: u32,
    pub warmup_runs: u32,
    pub failed: u32,
    pub raw_timings: Vec<f64>,
    #[serde(flatten)]
    pub statistics: RunStatistics,
}

/// Result of a throughput-mode window over one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThroughputMeasurement {
    pub concurrency: u32,
    pub duration_seconds: u32,
    pub completed: u64,
    pub failed: u64,
    /// In-flight probes still running at the grace cutoff (included in `failed`).
    pub abandoned: u64,
    pub workers_connected: u32,
    pub workers_failed_to_connect: u32,
    pub actual_duration_s: f64,
    pub qps: f64,
    pub latency: RunStatistics,
}

/// Completed-request rate over an elapsed window; zero for an empty window.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn qps(completed: u64, actual_duration_s: f64) -> f64 {
    if actual_duration_s > 0.0 {
        completed as f64 / actual_duration_s
    } else {
        0.0
    }
}
