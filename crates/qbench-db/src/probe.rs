//! Execution probe: time one query once on an established connection.

use std::time::Instant;

use qbench_core::{Query, Sample};

use crate::store::Connection;

/// Execute `query` once and time it.
///
/// The clock brackets statement submission and full result consumption.
/// Execution errors are logged and turned into a failed sample; they never
/// propagate to the caller.
pub fn execute<C: Connection + ?Sized>(conn: &mut C, query: &Query) -> Sample {
    let start = Instant::now();
    match conn.execute(&query.text) {
        Ok(_rows) => Sample::succeeded(start.elapsed()),
        Err(err) => {
            tracing::warn!(
                query = query.number,
                busy = err.is_busy(),
                error = %err,
                "query execution failed"
            );
            Sample::failed()
        }
    }
}
