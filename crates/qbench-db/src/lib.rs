//! Data-store access and benchmark runners for qbench.
//!
//! - [`store`]: the connection provider seam
//! - [`sqlite`]: the `SQLite` provider
//! - [`probe`]: time one execution
//! - [`latency`] / [`throughput`]: the two measurement regimes
//! - [`suite`]: catalog passes producing a [`qbench_core::BenchmarkReport`]

#![forbid(unsafe_code)]

pub mod error;
pub mod latency;
pub mod probe;
pub mod sqlite;
pub mod store;
pub mod suite;
pub mod throughput;

pub use error::{StoreError, StoreResult};
pub use latency::LatencyRunner;
pub use sqlite::{SqliteConnection, SqliteProvider};
pub use store::{Connection, ConnectionLease, ConnectionProvider};
pub use suite::{run_latency_suite, run_throughput_suite};
pub use throughput::ThroughputRunner;
