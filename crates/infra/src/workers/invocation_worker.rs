//! The per-runtime worker loop.
//!
//! ```text
//! IDLE -> dequeue -> RECEIVED -> parse -+-> ok -> EXECUTING -> publish -> IDLE
//!                                       +-> malformed -> DROPPED -> IDLE
//! ```
//!
//! Jobs are handled strictly one at a time. Throughput comes from running
//! more workers against the same queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use lambdabox_core::{ExecutionResult, ExecutionStatus, InvocationId, Job, Outcome, RuntimeName};
use lambdabox_sandbox::Executor;

use crate::config::{POLL_TIMEOUT, TRANSPORT_BACKOFF};
use crate::queue::JobQueue;
use crate::results::{ResultPublisher, ResultStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    pub poll_timeout: Duration,
    pub transport_backoff: Duration,
    /// Park unparseable payloads on the dead-letter list instead of
    /// discarding them. No result is published either way.
    pub dead_letter: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: POLL_TIMEOUT,
            transport_backoff: TRANSPORT_BACKOFF,
            dead_letter: false,
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The poll window passed with no job.
    Idle,
    /// The payload did not parse; nothing was published.
    Dropped,
    Processed {
        invocation_id: InvocationId,
        status: ExecutionStatus,
    },
    /// The queue transport failed; the caller should back off.
    QueueUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker: String,
    pub runtime: String,
    pub started_at: DateTime<Utc>,
    pub iterations: u64,
    pub received: u64,
    pub succeeded: u64,
    pub errored: u64,
    pub timed_out: u64,
    pub dropped: u64,
    pub dead_lettered: u64,
    pub queue_failures: u64,
    pub publish_failures: u64,
}

impl WorkerStats {
    fn new(worker: &str, runtime: &RuntimeName) -> Self {
        Self {
            worker: worker.to_string(),
            runtime: runtime.to_string(),
            started_at: Utc::now(),
            iterations: 0,
            received: 0,
            succeeded: 0,
            errored: 0,
            timed_out: 0,
            dropped: 0,
            dead_lettered: 0,
            queue_failures: 0,
            publish_failures: 0,
        }
    }

    /// Jobs that reached an executor.
    pub fn processed(&self) -> u64 {
        self.succeeded + self.errored + self.timed_out
    }
}

pub struct InvocationWorker<Q, S> {
    name: String,
    runtime: RuntimeName,
    executor: Arc<dyn Executor>,
    queue: Q,
    publisher: ResultPublisher<S>,
    options: WorkerOptions,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<Q, S> InvocationWorker<Q, S>
where
    Q: JobQueue + 'static,
    S: ResultStore + 'static,
{
    pub fn new(
        name: impl Into<String>,
        runtime: RuntimeName,
        executor: Arc<dyn Executor>,
        queue: Q,
        publisher: ResultPublisher<S>,
    ) -> Self {
        let name = name.into();
        let stats = Arc::new(Mutex::new(WorkerStats::new(&name, &runtime)));
        Self {
            name,
            runtime,
            executor,
            queue,
            publisher,
            options: WorkerOptions::default(),
            stats,
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime(&self) -> &RuntimeName {
        &self.runtime
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, update: impl FnOnce(&mut WorkerStats)) {
        update(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// Run one iteration: wait for a job, execute it, publish the result.
    pub fn tick(&self) -> Tick {
        self.record(|s| s.iterations += 1);

        match self.queue.blocking_pop(&self.runtime, self.options.poll_timeout) {
            Ok(Some(payload)) => self.handle(&payload),
            Ok(None) => Tick::Idle,
            Err(e) => {
                error!(worker = %self.name, runtime = %self.runtime, error = %e, "dequeue failed");
                self.record(|s| s.queue_failures += 1);
                Tick::QueueUnavailable
            }
        }
    }

    fn handle(&self, payload: &str) -> Tick {
        self.record(|s| s.received += 1);

        let job = match Job::parse(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    worker = %self.name,
                    runtime = %self.runtime,
                    invocation_id = ?Job::peek_invocation_id(payload).map(|id| id.get()),
                    error = %e,
                    "dropping malformed job"
                );
                self.record(|s| s.dropped += 1);
                self.dead_letter(payload);
                return Tick::Dropped;
            }
        };

        let invocation_id = job.invocation_id;
        info!(worker = %self.name, runtime = %self.runtime, invocation_id = %invocation_id, "job received");

        let started = Instant::now();
        let outcome = self.execute(&job);
        let result = ExecutionResult::from_outcome(invocation_id, outcome, started.elapsed());
        let status = result.status;

        self.record(|s| match status {
            ExecutionStatus::Success => s.succeeded += 1,
            ExecutionStatus::Error => s.errored += 1,
            ExecutionStatus::Timeout => s.timed_out += 1,
        });

        match self.publisher.publish(&result) {
            Ok(()) => info!(
                worker = %self.name,
                runtime = %self.runtime,
                invocation_id = %invocation_id,
                status = %status,
                duration_ms = result.duration_ms,
                "result published"
            ),
            Err(e) => {
                error!(worker = %self.name, invocation_id = %invocation_id, error = %e, "result lost");
                self.record(|s| s.publish_failures += 1);
            }
        }

        Tick::Processed { invocation_id, status }
    }

    fn execute(&self, job: &Job) -> Outcome {
        // User failures arrive as outcomes; only an executor bug panics.
        panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(&job.code, &job.input))).unwrap_or_else(|_| {
            error!(worker = %self.name, invocation_id = %job.invocation_id, "executor panicked");
            Outcome::error("internal executor failure", "")
        })
    }

    fn dead_letter(&self, payload: &str) {
        if !self.options.dead_letter {
            return;
        }
        match self.queue.push_dead_letter(&self.runtime, payload) {
            Ok(()) => self.record(|s| s.dead_lettered += 1),
            Err(e) => error!(worker = %self.name, runtime = %self.runtime, error = %e, "dead-letter push failed"),
        }
    }

    /// Loop until a shutdown is requested (checked between iterations, and
    /// during transport backoff).
    fn run(self, shutdown: mpsc::Receiver<()>) {
        info!(worker = %self.name, runtime = %self.runtime, "worker started");

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match self.tick() {
                Tick::QueueUnavailable => match shutdown.recv_timeout(self.options.transport_backoff) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                },
                Tick::Idle => debug!(worker = %self.name, "poll window elapsed"),
                Tick::Dropped | Tick::Processed { .. } => {}
            }
        }

        let stats = self.stats();
        info!(
            worker = %self.name,
            runtime = %self.runtime,
            iterations = stats.iterations,
            processed = stats.processed(),
            dropped = stats.dropped,
            "worker stopped"
        );
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = self.stats.clone();
        let name = self.name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run(shutdown_rx))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ask the worker to stop after its current iteration, without waiting.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Wait for the worker thread to finish and return its final stats.
    pub fn join(mut self) -> WorkerStats {
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                error!(worker = %self.name, "worker thread panicked");
            }
        }
        self.stats()
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(self) -> WorkerStats {
        self.request_shutdown();
        self.join()
    }
}
