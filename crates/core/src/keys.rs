//! Key names shared by producers, workers and result readers.

use crate::id::{InvocationId, RuntimeName};

/// Prefix of per-runtime job queues.
pub const QUEUE_KEY_PREFIX: &str = "execution_queue:";

/// Prefix of result entries.
pub const RESULT_KEY_PREFIX: &str = "result:";

/// Suffix of the opt-in dead-letter list next to each queue.
pub const DEAD_LETTER_SUFFIX: &str = ":dead";

/// `execution_queue:<runtime>`
pub fn queue_key(runtime: &RuntimeName) -> String {
    format!("{QUEUE_KEY_PREFIX}{runtime}")
}

/// `execution_queue:<runtime>:dead`
pub fn dead_letter_key(runtime: &RuntimeName) -> String {
    format!("{QUEUE_KEY_PREFIX}{runtime}{DEAD_LETTER_SUFFIX}")
}

/// `result:<invocationId>`
pub fn result_key(invocation_id: InvocationId) -> String {
    format!("{RESULT_KEY_PREFIX}{invocation_id}")
}
