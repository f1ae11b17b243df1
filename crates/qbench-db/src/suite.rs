//! Catalog passes: run every selected query in order and assemble the report.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use qbench_core::{
    BenchMode, BenchmarkReport, Phase, QueryCatalog, QueryResult, Result, RunConfig,
};

use crate::latency::LatencyRunner;
use crate::store::ConnectionProvider;
use crate::throughput::ThroughputRunner;

/// Latency pass over `catalog`.
///
/// Configuration errors abort the pass; query-level errors are recorded in
/// the report and the pass continues with the next query.
pub fn run_latency_suite<P: ConnectionProvider>(
    provider: &P,
    catalog: &QueryCatalog,
    config: &RunConfig,
) -> Result<BenchmarkReport> {
    let runner = LatencyRunner::from_config(provider, config)?;
    let started_at = Utc::now();
    let clock = Instant::now();
    let total = catalog.len();

    let mut results = Vec::with_capacity(total);
    for (i, query) in catalog.iter().enumerate() {
        tracing::info!(
            query = query.number,
            position = i + 1,
            total,
            description = %query.description,
            "latency benchmark"
        );
        let result = match runner.run(query) {
            Ok(measurement) => QueryResult::latency(query, measurement),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                tracing::warn!(query = query.number, error = %e, "query failed");
                QueryResult::from_error(query, Phase::Measurement, &e)
            }
        };
        results.push(result);
    }

    Ok(BenchmarkReport::assemble(
        BenchMode::Latency,
        config,
        provider.identity(),
        started_at,
        clock.elapsed(),
        results,
    ))
}

/// Throughput pass over `catalog`, one measurement window per query.
pub fn run_throughput_suite<P: ConnectionProvider>(
    provider: Arc<P>,
    catalog: &QueryCatalog,
    config: &RunConfig,
) -> Result<BenchmarkReport> {
    let identity = provider.identity();
    let runner = ThroughputRunner::from_config(provider, config)?;
    let started_at = Utc::now();
    let clock = Instant::now();
    let total = catalog.len();

    let mut results = Vec::with_capacity(total);
    for (i, query) in catalog.iter().enumerate() {
        tracing::info!(
            query = query.number,
            position = i + 1,
            total,
            concurrency = config.concurrency,
            duration_seconds = config.duration_seconds,
            "throughput benchmark"
        );
        let result = match runner.run(query) {
            Ok(measurement) => QueryResult::throughput(query, measurement),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                tracing::warn!(query = query.number, error = %e, "query failed");
                QueryResult::from_error(query, Phase::Throughput, &e)
            }
        };
        results.push(result);
    }

    Ok(BenchmarkReport::assemble(
        BenchMode::Throughput,
        config,
        identity,
        started_at,
        clock.elapsed(),
        results,
    ))
}
