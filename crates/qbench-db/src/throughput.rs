//! Throughput mode: a fixed pool of workers drives one query for a bounded
//! wall-clock window.
//!
//! Each worker owns its own connection. Workers report connect outcomes,
//! admissions and completions over one bounded channel; the calling thread is
//! the only collector and owns every counter and the latency buffer.
//!
//! The window opens once every worker has reported its connect outcome. That
//! instant is both the first admission and the origin of the shared deadline.
//! A worker admits a new probe only while its clock reads before the
//! deadline, so each connected worker's last completion lands at or after it.
//! Probes still in flight at `deadline + grace` are abandoned: their threads
//! are detached and each one is counted as failed.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use qbench_core::config::{validate_concurrency, validate_duration, validate_grace};
use qbench_core::{Query, Result, RunConfig, RunStatistics, Sample, ThroughputMeasurement, qps};

use crate::probe;
use crate::store::{ConnectionLease, ConnectionProvider};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;
/// Upper bound on waiting for workers to report their connect outcome.
const CONNECT_PHASE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum WorkerEvent {
    Connected { worker: usize },
    ConnectFailed { worker: usize, message: String },
    Admitted { worker: usize, at: Instant },
    Finished { worker: usize, at: Instant, sample: Sample },
    Exited { worker: usize },
}

/// Drives one query from `concurrency` workers for `duration_seconds`.
pub struct ThroughputRunner<P: ConnectionProvider> {
    provider: Arc<P>,
    concurrency: u32,
    duration_seconds: u32,
    grace: Duration,
}

impl<P: ConnectionProvider> std::fmt::Debug for ThroughputRunner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputRunner")
            .field("store", &self.provider.identity())
            .field("concurrency", &self.concurrency)
            .field("duration_seconds", &self.duration_seconds)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl<P: ConnectionProvider> ThroughputRunner<P> {
    /// Validate the window parameters. Nothing is connected or executed here.
    pub fn new(
        provider: Arc<P>,
        concurrency: u32,
        duration_seconds: u32,
        grace: Duration,
    ) -> Result<Self> {
        validate_concurrency(concurrency)?;
        validate_duration(duration_seconds)?;
        validate_grace(grace.as_secs_f64())?;
        Ok(Self {
            provider,
            concurrency,
            duration_seconds,
            grace,
        })
    }

    pub fn from_config(provider: Arc<P>, config: &RunConfig) -> Result<Self> {
        validate_grace(config.grace_seconds)?;
        Self::new(
            provider,
            config.concurrency,
            config.duration_seconds,
            config.grace(),
        )
    }

    /// Run the full measurement window for `query`.
    pub fn run(&self, query: &Arc<Query>) -> Result<ThroughputMeasurement> {
        self.run_window(
            query,
            Duration::from_secs(u64::from(self.duration_seconds)),
        )
    }

    fn run_window(&self, query: &Arc<Query>, window: Duration) -> Result<ThroughputMeasurement> {
        let pool = self.concurrency as usize;
        let (tx, rx) = std::sync::mpsc::sync_channel(EVENT_CHANNEL_CAPACITY);

        let mut go_senders: Vec<Option<SyncSender<Instant>>> = Vec::with_capacity(pool);
        let mut handles = Vec::with_capacity(pool);
        let mut spawn_failures = 0_u32;
        for worker in 0..pool {
            let (go_tx, go_rx) = std::sync::mpsc::sync_channel(1);
            let provider = Arc::clone(&self.provider);
            let query = Arc::clone(query);
            let events = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("qbench-worker-{worker}"))
                .spawn(move || worker_loop(worker, &*provider, &query, window, &events, &go_rx));
            match spawned {
                Ok(handle) => {
                    handles.push(handle);
                    go_senders.push(Some(go_tx));
                }
                Err(e) => {
                    tracing::warn!(worker, error = %e, "failed to spawn worker thread");
                    spawn_failures += 1;
                    go_senders.push(None);
                }
            }
        }
        // Only workers hold senders now, so a closed channel means every
        // worker is gone.
        drop(tx);

        let mut collector = Collector::new(pool);
        collector.connect_failures = spawn_failures;
        collector.await_connections(&rx, handles.len());

        let start = Instant::now();
        // Dropping the unsent signals releases workers that never reported.
        for (worker, go) in go_senders.into_iter().enumerate() {
            match go {
                Some(go) if collector.connected[worker] => {
                    let _ = go.send(start);
                }
                _ => {}
            }
        }
        let hard_stop = start + window + self.grace;
        collector.drain_until(&rx, hard_stop);
        drop(rx);

        let abandoned = collector.in_flight_count();
        if abandoned == 0 && collector.unreported == 0 {
            for handle in handles {
                if handle.join().is_err() {
                    tracing::warn!(query = query.number, "worker thread panicked");
                }
            }
        } else {
            tracing::warn!(
                query = query.number,
                abandoned,
                "abandoning probes still running after the grace period"
            );
        }

        collector.finish(query.number, start, hard_stop, self.concurrency, self.duration_seconds)
    }
}

fn worker_loop<P: ConnectionProvider + ?Sized>(
    worker: usize,
    provider: &P,
    query: &Query,
    window: Duration,
    events: &SyncSender<WorkerEvent>,
    go: &Receiver<Instant>,
) {
    let mut lease = match ConnectionLease::acquire(provider) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::warn!(worker, query = query.number, error = %e, "worker connection failed");
            let _ = events.send(WorkerEvent::ConnectFailed {
                worker,
                message: e.to_string(),
            });
            return;
        }
    };
    if events.send(WorkerEvent::Connected { worker }).is_err() {
        return;
    }
    tracing::debug!(worker, "worker connected");

    let Ok(start) = go.recv() else {
        return;
    };
    let deadline = start + window;
    let mut now = start;
    while now < deadline {
        if events.send(WorkerEvent::Admitted { worker, at: now }).is_err() {
            return;
        }
        let sample = probe::execute(lease.conn(), query);
        now = Instant::now();
        if events
            .send(WorkerEvent::Finished {
                worker,
                at: now,
                sample,
            })
            .is_err()
        {
            return;
        }
    }
    let _ = events.send(WorkerEvent::Exited { worker });
    tracing::debug!(worker, "worker exited");
}

/// State owned by the collecting thread.
struct Collector {
    connected: Vec<bool>,
    in_flight: Vec<bool>,
    admissions: Vec<u64>,
    connect_failures: u32,
    unreported: usize,
    exited: usize,
    completed: u64,
    failed: u64,
    durations_ms: Vec<f64>,
    first_admission: Option<Instant>,
    last_completion: Option<Instant>,
}

impl Collector {
    fn new(pool: usize) -> Self {
        Self {
            connected: vec![false; pool],
            in_flight: vec![false; pool],
            admissions: vec![0; pool],
            connect_failures: 0,
            unreported: 0,
            exited: 0,
            completed: 0,
            failed: 0,
            durations_ms: Vec::new(),
            first_admission: None,
            last_completion: None,
        }
    }

    fn connected_count(&self) -> usize {
        self.connected.iter().filter(|c| **c).count()
    }

    fn in_flight_count(&self) -> u64 {
        self.in_flight.iter().filter(|f| **f).count() as u64
    }

    /// Wait until each of `spawned` workers has reported its connect outcome.
    fn await_connections(&mut self, rx: &Receiver<WorkerEvent>, spawned: usize) {
        let give_up = Instant::now() + CONNECT_PHASE_TIMEOUT;
        let mut reported = 0;
        while reported < spawned {
            let wait = give_up.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(WorkerEvent::Connected { worker }) => {
                    self.connected[worker] = true;
                    reported += 1;
                }
                Ok(WorkerEvent::ConnectFailed { worker, message }) => {
                    tracing::debug!(worker, %message, "worker reported connect failure");
                    self.connect_failures += 1;
                    reported += 1;
                }
                Ok(other) => self.handle(other),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        // Workers that never reported are treated like failed connects.
        self.unreported = spawned.saturating_sub(reported);
        self.connect_failures += u32::try_from(self.unreported).unwrap_or(u32::MAX);
    }

    /// Collect events until every connected worker exits or `hard_stop` passes.
    ///
    /// Events already buffered at the cutoff are still taken in, except
    /// completions stamped after `hard_stop`: those probes stay abandoned.
    fn drain_until(&mut self, rx: &Receiver<WorkerEvent>, hard_stop: Instant) {
        let expected = self.connected_count();
        while self.exited < expected {
            let now = Instant::now();
            if now >= hard_stop {
                break;
            }
            match rx.recv_timeout(hard_stop - now) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        while let Ok(event) = rx.try_recv() {
            match event {
                WorkerEvent::Admitted { at, .. } | WorkerEvent::Finished { at, .. }
                    if at > hard_stop => {}
                event => self.handle(event),
            }
        }
    }

    fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Admitted { worker, at } => {
                self.in_flight[worker] = true;
                self.admissions[worker] += 1;
                if self.first_admission.is_none_or(|first| at < first) {
                    self.first_admission = Some(at);
                }
            }
            WorkerEvent::Finished { worker, at, sample } => {
                self.in_flight[worker] = false;
                if sample.success {
                    self.completed += 1;
                    self.durations_ms.push(sample.duration_ms);
                } else {
                    self.failed += 1;
                }
                if self.last_completion.is_none_or(|last| at > last) {
                    self.last_completion = Some(at);
                }
            }
            WorkerEvent::Exited { worker } => {
                self.in_flight[worker] = false;
                self.exited += 1;
            }
            // Late reports: the worker is already charged as a failed connect.
            WorkerEvent::Connected { worker } | WorkerEvent::ConnectFailed { worker, .. } => {
                tracing::debug!(worker, "ignoring connect report after the window opened");
            }
        }
    }

    /// Failures charged to each worker that never connected: the admissions
    /// it would have made, estimated from the connected workers.
    fn missed_admissions_per_worker(&self) -> u64 {
        let connected: Vec<u64> = self
            .connected
            .iter()
            .zip(&self.admissions)
            .filter(|(c, _)| **c)
            .map(|(_, a)| *a)
            .collect();
        if connected.is_empty() {
            return 1;
        }
        let n = connected.len() as u64;
        let total: u64 = connected.iter().sum();
        ((total + n / 2) / n).max(1)
    }

    fn finish(
        self,
        query_number: u32,
        start: Instant,
        hard_stop: Instant,
        concurrency: u32,
        duration_seconds: u32,
    ) -> Result<ThroughputMeasurement> {
        let abandoned = self.in_flight_count();
        let charged = u64::from(self.connect_failures) * self.missed_admissions_per_worker();
        let failed = self.failed + abandoned + charged;

        let end = if abandoned > 0 {
            Some(hard_stop)
        } else {
            self.last_completion
        };
        let actual_duration_s = match (self.first_admission, end) {
            (Some(first), Some(end)) => end.saturating_duration_since(first.min(start)).as_secs_f64(),
            _ => 0.0,
        };
        let latency = RunStatistics::from_durations(&self.durations_ms)?;
        let workers_connected = u32::try_from(self.connected_count()).unwrap_or(u32::MAX);

        tracing::info!(
            query = query_number,
            completed = self.completed,
            failed,
            abandoned,
            workers_connected,
            actual_duration_s,
            "throughput window closed"
        );

        Ok(ThroughputMeasurement {
            concurrency,
            duration_seconds,
            completed: self.completed,
            failed,
            abandoned,
            workers_connected,
            workers_failed_to_connect: self.connect_failures,
            actual_duration_s,
            qps: qps(self.completed, actual_duration_s),
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::Connection;
    use qbench_core::{Error, StoreIdentity};
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    struct FakeProvider {
        calls: Arc<AtomicU64>,
        delay: Duration,
        fail_connects: u32,
        connects: AtomicU32,
        fail_every: Option<u64>,
    }

    impl FakeProvider {
        fn new(delay: Duration) -> Self {
            Self {
                calls: Arc::new(AtomicU64::new(0)),
                delay,
                fail_connects: 0,
                connects: AtomicU32::new(0),
                fail_every: None,
            }
        }
    }

    struct FakeConn {
        calls: Arc<AtomicU64>,
        delay: Duration,
        fail_every: Option<u64>,
    }

    impl Connection for FakeConn {
        fn execute(&mut self, _text: &str) -> StoreResult<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::thread::sleep(self.delay);
            if self.fail_every.is_some_and(|k| n % k == 0) {
                return Err(StoreError::execute("scripted failure"));
            }
            Ok(1)
        }
    }

    impl ConnectionProvider for FakeProvider {
        type Conn = FakeConn;

        fn acquire(&self) -> StoreResult<FakeConn> {
            if self.connects.fetch_add(1, Ordering::SeqCst) < self.fail_connects {
                return Err(StoreError::connect("scripted refusal"));
            }
            Ok(FakeConn {
                calls: Arc::clone(&self.calls),
                delay: self.delay,
                fail_every: self.fail_every,
            })
        }

        fn identity(&self) -> StoreIdentity {
            StoreIdentity {
                engine: "fake".into(),
                database: "memory".into(),
            }
        }
    }

    fn query() -> Arc<Query> {
        Arc::new(Query::new(1, "q", "SELECT 1"))
    }

    fn runner(provider: FakeProvider, concurrency: u32) -> ThroughputRunner<FakeProvider> {
        ThroughputRunner::new(Arc::new(provider), concurrency, 20, Duration::from_secs(1))
            .expect("runner")
    }

    #[test]
    fn short_window_counts_are_consistent() {
        let provider = FakeProvider::new(Duration::from_millis(5));
        let calls = Arc::clone(&provider.calls);
        let runner = runner(provider, 4);
        let window = Duration::from_millis(300);
        let m = runner.run_window(&query(), window).expect("measurement");

        assert_eq!(m.workers_connected, 4);
        assert_eq!(m.failed, 0);
        assert_eq!(m.abandoned, 0);
        assert_eq!(m.completed, calls.load(Ordering::SeqCst));
        assert_eq!(m.latency.count as u64, m.completed);
        assert!(m.actual_duration_s >= window.as_secs_f64());
        assert!(m.actual_duration_s <= window.as_secs_f64() + 1.0);
        assert!((m.qps - m.completed as f64 / m.actual_duration_s).abs() < 1e-9);
    }

    #[test]
    fn per_call_failures_are_counted_not_fatal() {
        let mut provider = FakeProvider::new(Duration::from_millis(2));
        provider.fail_every = Some(3);
        let calls = Arc::clone(&provider.calls);
        let m = runner(provider, 2)
            .run_window(&query(), Duration::from_millis(200))
            .expect("measurement");
        assert!(m.failed > 0);
        assert_eq!(m.completed + m.failed, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_connections_are_charged_missed_admissions() {
        let mut provider = FakeProvider::new(Duration::from_millis(5));
        provider.fail_connects = 1;
        let m = runner(provider, 4)
            .run_window(&query(), Duration::from_millis(200))
            .expect("measurement");
        assert_eq!(m.workers_connected, 3);
        assert_eq!(m.workers_failed_to_connect, 1);
        assert!(m.completed > 0);
        assert!(m.failed >= 1);
    }

    #[test]
    fn no_connections_still_yields_a_measurement() {
        let mut provider = FakeProvider::new(Duration::from_millis(1));
        provider.fail_connects = u32::MAX;
        let m = runner(provider, 3)
            .run_window(&query(), Duration::from_millis(100))
            .expect("measurement");
        assert_eq!(m.workers_connected, 0);
        assert_eq!(m.completed, 0);
        assert_eq!(m.failed, 3);
        assert!(m.actual_duration_s.abs() < f64::EPSILON);
        assert!(m.qps.abs() < f64::EPSILON);
        assert!(m.latency.is_empty());
    }

    #[test]
    fn stragglers_are_abandoned_at_the_grace_cutoff() {
        let provider = FakeProvider::new(Duration::from_millis(2_500));
        let m = runner(provider, 2)
            .run_window(&query(), Duration::from_millis(100))
            .expect("measurement");
        // first probe of each worker outlives window + 1s grace
        assert_eq!(m.abandoned, 2);
        assert_eq!(m.failed, 2);
        assert_eq!(m.completed, 0);
        assert!((m.actual_duration_s - 1.1).abs() < 0.05);
    }

    #[test]
    fn out_of_range_parameters_are_rejected_before_any_call() {
        for (concurrency, duration) in [(0, 30), (17, 30), (4, 10), (4, 61)] {
            let provider = Arc::new(FakeProvider::new(Duration::ZERO));
            let err = ThroughputRunner::new(
                Arc::clone(&provider),
                concurrency,
                duration,
                Duration::from_secs(5),
            )
            .expect_err("range check");
            assert!(matches!(err, Error::Config { .. }));
            assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
            assert_eq!(provider.connects.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn buffered_completions_at_the_cutoff_are_counted() {
        let (tx, rx) = std::sync::mpsc::sync_channel(8);
        let mut c = Collector::new(2);
        c.connected = vec![true, true];
        let admitted = Instant::now();
        let hard_stop = admitted + Duration::from_millis(10);

        let sample = Sample {
            duration_ms: 4.0,
            success: true,
        };
        for worker in 0..2 {
            tx.send(WorkerEvent::Admitted { worker, at: admitted })
                .expect("send");
        }
        tx.send(WorkerEvent::Finished {
            worker: 0,
            at: hard_stop,
            sample,
        })
        .expect("send");
        tx.send(WorkerEvent::Finished {
            worker: 1,
            at: hard_stop + Duration::from_millis(1),
            sample,
        })
        .expect("send");

        // the cutoff has already passed when the collector looks
        std::thread::sleep(Duration::from_millis(20));
        c.drain_until(&rx, hard_stop);

        assert_eq!(c.completed, 1);
        assert_eq!(c.in_flight_count(), 1);
        assert!(c.in_flight[1]);
        assert_eq!(c.admissions, vec![1, 1]);
    }

    #[test]
    fn runner_debug_does_not_need_a_debug_store() {
        let runner = runner(FakeProvider::new(Duration::ZERO), 3);
        let text = format!("{runner:?}");
        assert!(text.starts_with("ThroughputRunner"));
        assert!(text.contains("concurrency: 3"));
        assert!(text.contains("fake"));
    }

    #[test]
    fn charge_rounds_mean_and_is_at_least_one() {
        let mut c = Collector::new(3);
        c.connected = vec![true, true, false];
        c.admissions = vec![10, 5, 0];
        assert_eq!(c.missed_admissions_per_worker(), 8);
        c.admissions = vec![0, 0, 0];
        assert_eq!(c.missed_admissions_per_worker(), 1);
    }
}
