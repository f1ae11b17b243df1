//! Latency mode: sequential warmups, then measured calls on one connection.

use qbench_core::{Error, LatencyMeasurement, Phase, Query, Result, RunConfig, RunStatistics};

use crate::probe;
use crate::store::{ConnectionLease, ConnectionProvider};

/// Runs one query at a time with `warmup_runs` discarded calls followed by
/// `measurement_runs` timed calls.
pub struct LatencyRunner<'a, P: ConnectionProvider> {
    provider: &'a P,
    warmup_runs: u32,
    measurement_runs: u32,
}

impl<P: ConnectionProvider> std::fmt::Debug for LatencyRunner<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyRunner")
            .field("store", &self.provider.identity())
            .field("warmup_runs", &self.warmup_runs)
            .field("measurement_runs", &self.measurement_runs)
            .finish_non_exhaustive()
    }
}

impl<'a, P: ConnectionProvider> LatencyRunner<'a, P> {
    pub fn new(provider: &'a P, warmup_runs: u32, measurement_runs: u32) -> Result<Self> {
        if measurement_runs == 0 {
            return Err(Error::config("measurement_runs", "must be at least 1"));
        }
        Ok(Self {
            provider,
            warmup_runs,
            measurement_runs,
        })
    }

    pub fn from_config(provider: &'a P, config: &RunConfig) -> Result<Self> {
        Self::new(provider, config.warmup_runs, config.measurement_runs)
    }

    /// Benchmark `query`.
    ///
    /// A connection failure aborts this query with a `connect` phase error.
    /// Failed calls are counted in `failed` and left out of the statistics.
    pub fn run(&self, query: &Query) -> Result<LatencyMeasurement> {
        let mut lease = ConnectionLease::acquire(self.provider).map_err(|e| {
            tracing::warn!(query = query.number, error = %e, "connection failed");
            Error::query(query.number, Phase::Connect, e.to_string())
        })?;

        let mut warmup_failures = 0_u32;
        for _ in 0..self.warmup_runs {
            if !probe::execute(lease.conn(), query).success {
                warmup_failures += 1;
            }
        }
        if warmup_failures > 0 {
            tracing::debug!(
                query = query.number,
                failures = warmup_failures,
                "warmup calls failed"
            );
        }

        let mut raw_timings = Vec::with_capacity(self.measurement_runs as usize);
        let mut failed = 0_u32;
        for _ in 0..self.measurement_runs {
            let sample = probe::execute(lease.conn(), query);
            if sample.success {
                raw_timings.push(sample.duration_ms);
            } else {
                failed += 1;
            }
        }
        drop(lease);

        let statistics = RunStatistics::from_durations(&raw_timings)?;
        if statistics.is_empty() {
            tracing::warn!(query = query.number, "every measured call failed");
        }
        Ok(LatencyMeasurement {
            runs: self.measurement_runs,
            warmup_runs: self.warmup_runs,
            failed,
            raw_timings,
            statistics,
        })
    }
}
