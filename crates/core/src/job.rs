//! Queued invocation requests.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::JobParseError;
use crate::id::InvocationId;

/// A request to run `code` against `input`.
///
/// The runtime is implicit: it is the queue the job was read from.
///
/// Wire shape:
///
/// ```json
/// { "invocationId": 7, "code": "fn handler(event) { event }", "input": { "a": 1 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub invocation_id: InvocationId,
    pub code: String,
    /// Event handed to the handler. Absent on the wire means `{}`.
    #[serde(default = "empty_event")]
    pub input: JsonValue,
}

fn empty_event() -> JsonValue {
    JsonValue::Object(Default::default())
}

impl Job {
    pub fn new(invocation_id: i64, code: impl Into<String>, input: JsonValue) -> Self {
        Self {
            invocation_id: InvocationId::new(invocation_id),
            code: code.into(),
            input,
        }
    }

    /// Parse a raw queue payload.
    pub fn parse(raw: &str) -> Result<Self, JobParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to the queue wire format.
    pub fn to_payload(&self) -> String {
        // A Job is plain data (string keys, JSON values); serialization
        // cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Best-effort extraction of the invocation id from a payload that
    /// failed to parse, for logging.
    pub fn peek_invocation_id(raw: &str) -> Option<InvocationId> {
        let value: JsonValue = serde_json::from_str(raw).ok()?;
        value.get("invocationId")?.as_i64().map(InvocationId::new)
    }
}
