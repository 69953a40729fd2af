//! `lambdabox-core`: the invocation data model.
//!
//! This crate contains **pure data** (no IO): the queued [`Job`], the
//! published [`ExecutionResult`], the executor [`Outcome`] and the key names
//! both sides of the queue agree on.

pub mod error;
pub mod id;
pub mod job;
pub mod keys;
pub mod result;

pub use error::JobParseError;
pub use id::{InvocationId, RuntimeName};
pub use job::Job;
pub use result::{ExecutionResult, ExecutionStatus, Outcome};
