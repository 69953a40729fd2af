//! Execution outcomes and the published result record.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::InvocationId;

/// Terminal status of an invocation. There is no pending/running state on
/// the wire: a result key is either absent or holds one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Error => "ERROR",
            ExecutionStatus::Timeout => "TIMEOUT",
        }
    }
}

impl core::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an executor hands back for one call.
///
/// Executors are total: every failure of user code (or of the sandbox
/// around it) is expressed as an `Outcome`, never as an `Err` or a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: ExecutionStatus,
    /// Raw string form of the handler's return value. Only set on success.
    pub output: String,
    /// Human-readable failure summary. Empty on success.
    pub message: String,
    /// Captured log lines, newline-joined.
    pub logs: String,
}

impl Outcome {
    pub fn success(output: impl Into<String>, logs: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            output: output.into(),
            message: String::new(),
            logs: logs.into(),
        }
    }

    pub fn error(message: impl Into<String>, logs: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: String::new(),
            message: message.into(),
            logs: logs.into(),
        }
    }

    pub fn timeout(message: impl Into<String>, logs: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            output: String::new(),
            message: message.into(),
            logs: logs.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// The record stored under `result:<invocationId>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub invocation_id: InvocationId,
    pub status: ExecutionStatus,
    /// Parsed handler output, or `null`.
    pub output: Option<JsonValue>,
    pub output_raw: String,
    pub error_message: String,
    pub logs: String,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Build the published record from an executor outcome.
    ///
    /// On success the raw output is parsed as JSON; output that is not JSON
    /// is wrapped as `{"result": "<raw>"}` and empty output becomes `null`.
    /// Failures never carry output.
    pub fn from_outcome(invocation_id: InvocationId, outcome: Outcome, elapsed: Duration) -> Self {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match outcome.status {
            ExecutionStatus::Success => {
                let output = parse_output(&outcome.output);
                Self {
                    invocation_id,
                    status: ExecutionStatus::Success,
                    output,
                    output_raw: outcome.output,
                    error_message: String::new(),
                    logs: outcome.logs,
                    duration_ms,
                }
            }
            status => Self {
                invocation_id,
                status,
                output: None,
                output_raw: String::new(),
                error_message: outcome.message,
                logs: outcome.logs,
                duration_ms,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

fn parse_output(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(_) => Some(serde_json::json!({ "result": trimmed })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn success_parses_json_output() {
        let outcome = Outcome::success(r#"{"score":10}"#, "");
        let result = ExecutionResult::from_outcome(InvocationId::new(1), outcome, Duration::from_millis(12));

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, Some(json!({"score": 10})));
        assert_eq!(result.output_raw, r#"{"score":10}"#);
        assert!(result.error_message.is_empty());
        assert_eq!(result.duration_ms, 12);
    }

    #[test]
    fn success_with_plain_text_is_wrapped() {
        let outcome = Outcome::success("hello there", "");
        let result = ExecutionResult::from_outcome(InvocationId::new(1), outcome, Duration::ZERO);
        assert_eq!(result.output, Some(json!({"result": "hello there"})));
    }

    #[test]
    fn success_with_empty_output_is_null() {
        let result = ExecutionResult::from_outcome(InvocationId::new(1), Outcome::success("", ""), Duration::ZERO);
        assert_eq!(result.output, None);
    }

    #[test]
    fn failures_carry_message_but_no_output() {
        let outcome = Outcome::timeout("Execution timed out after 30s", "partial log");
        let result = ExecutionResult::from_outcome(InvocationId::new(3), outcome, Duration::from_secs(30));

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.output, None);
        assert!(result.output_raw.is_empty());
        assert_eq!(result.error_message, "Execution timed out after 30s");
        assert_eq!(result.logs, "partial log");
    }

    #[test]
    fn wire_shape_uses_camel_case_and_upper_status() {
        let result = ExecutionResult::from_outcome(
            InvocationId::new(7),
            Outcome::error("boom", "trace"),
            Duration::from_millis(5),
        );
        let value: JsonValue = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "invocationId": 7,
                "status": "ERROR",
                "output": null,
                "outputRaw": "",
                "errorMessage": "boom",
                "logs": "trace",
                "durationMs": 5
            })
        );
    }

    proptest! {
        /// Property: whatever the handler printed, a success result always
        /// has a JSON object/value output unless the raw text was blank.
        #[test]
        fn success_output_is_present_iff_raw_is_not_blank(raw in ".{0,64}") {
            let result = ExecutionResult::from_outcome(
                InvocationId::new(1),
                Outcome::success(raw.clone(), ""),
                Duration::ZERO,
            );
            prop_assert_eq!(result.output.is_some(), !raw.trim().is_empty());
            prop_assert_eq!(result.output_raw, raw);
        }

        /// Property: non-success outcomes never leak output.
        #[test]
        fn failures_never_publish_output(msg in ".{0,64}", timeout in any::<bool>()) {
            let outcome = if timeout { Outcome::timeout(msg.clone(), "") } else { Outcome::error(msg.clone(), "") };
            let result = ExecutionResult::from_outcome(InvocationId::new(1), outcome, Duration::ZERO);
            prop_assert!(result.output.is_none());
            prop_assert!(result.output_raw.is_empty());
            prop_assert_eq!(result.error_message, msg);
        }
    }
}
