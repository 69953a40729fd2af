//! Background worker loops.

pub mod invocation_worker;

pub use invocation_worker::{InvocationWorker, Tick, WorkerHandle, WorkerOptions, WorkerStats};
