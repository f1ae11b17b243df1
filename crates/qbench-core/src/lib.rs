//! Core types for qbench: the query catalog, run configuration, measurement
//! models, statistics and the persisted benchmark report.
//!
//! Nothing in this crate talks to a data store; runners live in `qbench-db`.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod stats;

pub use catalog::{Query, QueryCatalog};
pub use config::{
    BootstrapLine, BootstrapSummary, ConfigLayer, ConfigSource, RunConfig, StoreConfig,
};
pub use error::{Error, Result};
pub use models::{
    BenchMode, LatencyMeasurement, Phase, Sample, StoreIdentity, ThroughputMeasurement, qps,
};
pub use report::{BenchmarkReport, QueryFailure, QueryResult, ReportMetadata, ReportPaths};
pub use stats::{RunStatistics, speedup, summarize};
