//! `lambdabox-sandbox`: runs untrusted handler code under time limits.
//!
//! ## Variants
//!
//! - [`InterpretedExecutor`]: evaluates a Rhai script in a fresh, restricted
//!   engine inside the worker process. Timeouts use the engine's progress
//!   callback (cooperative interrupt).
//! - [`CompiledExecutor`]: wraps the code in a generated entry point, builds
//!   it in a scratch [`Workspace`], then runs the artifact as a subprocess.
//!   Timeouts kill the whole process group.
//!
//! Which variant serves a runtime is data, not code: see [`RuntimeRegistry`].

pub mod compiled;
pub mod error;
pub mod executor;
pub mod interpreted;
pub mod process;
pub mod registry;
pub mod workspace;

mod wrappers;

pub use compiled::{CompiledExecutor, CompiledProfile, InputMode, SourceTemplate};
pub use error::SandboxError;
pub use executor::{Executor, ExecutorKind};
pub use interpreted::{InterpretedExecutor, InterpretedProfile};
pub use registry::{RuntimeProfile, RuntimeRegistry, SandboxSettings};
pub use workspace::Workspace;
