//! Scripted in-memory store shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use qbench_core::StoreIdentity;
use qbench_db::{Connection, ConnectionProvider, StoreError, StoreResult};

/// Counts every probe call; fails calls and connects on a script.
#[derive(Debug)]
pub struct ScriptedProvider {
    pub calls: Arc<AtomicU64>,
    pub connects: AtomicU32,
    pub releases: AtomicU32,
    pub delay: Duration,
    pub fail_connects: u32,
    pub fail_calls: Vec<u64>,
}

impl ScriptedProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicU64::new(0)),
            connects: AtomicU32::new(0),
            releases: AtomicU32::new(0),
            delay,
            fail_connects: 0,
            fail_calls: Vec::new(),
        }
    }

    pub fn refusing_connections() -> Self {
        Self {
            fail_connects: u32::MAX,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Fail the given 1-based call numbers.
    pub fn failing_calls(calls: &[u64]) -> Self {
        Self {
            fail_calls: calls.to_vec(),
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedConn {
    calls: Arc<AtomicU64>,
    delay: Duration,
    fail_calls: Vec<u64>,
}

impl Connection for ScriptedConn {
    fn execute(&mut self, text: &str) -> StoreResult<u64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_calls.contains(&n) || text.contains("FAIL") {
            return Err(StoreError::execute(format!("scripted failure on call {n}")));
        }
        Ok(1)
    }
}

impl ConnectionProvider for ScriptedProvider {
    type Conn = ScriptedConn;

    fn acquire(&self) -> StoreResult<ScriptedConn> {
        if self.connects.fetch_add(1, Ordering::SeqCst) < self.fail_connects {
            return Err(StoreError::connect("connection refused"));
        }
        Ok(ScriptedConn {
            calls: Arc::clone(&self.calls),
            delay: self.delay,
            fail_calls: self.fail_calls.clone(),
        })
    }

    fn release(&self, conn: ScriptedConn) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        drop(conn);
    }

    fn identity(&self) -> StoreIdentity {
        StoreIdentity {
            engine: "scripted".into(),
            database: "memory".into(),
        }
    }
}
