//! The executor contract.

use serde_json::Value as JsonValue;

use lambdabox_core::Outcome;

/// Which sandboxing strategy an executor implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Interpreted,
    Compiled,
}

/// Runs one piece of user code against one event.
///
/// `execute` is total: whatever the code does (fails to parse, throws,
/// loops forever, exits nonzero), the call returns an [`Outcome`]. Each call
/// is independent; no state survives from one call to the next.
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    fn execute(&self, code: &str, input: &JsonValue) -> Outcome;
}

impl<E> Executor for std::sync::Arc<E>
where
    E: Executor + ?Sized,
{
    fn kind(&self) -> ExecutorKind {
        (**self).kind()
    }

    fn execute(&self, code: &str, input: &JsonValue) -> Outcome {
        (**self).execute(code, input)
    }
}

impl<E> Executor for Box<E>
where
    E: Executor + ?Sized,
{
    fn kind(&self) -> ExecutorKind {
        (**self).kind()
    }

    fn execute(&self, code: &str, input: &JsonValue) -> Outcome {
        (**self).execute(code, input)
    }
}
