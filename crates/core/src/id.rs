//! Strongly-typed identifiers used across the worker.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::JobParseError;

/// Identifier of a single invocation, assigned by the producer.
///
/// This is the join key between a queued [`Job`](crate::Job) and its
/// published [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(i64);

impl InvocationId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for InvocationId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<InvocationId> for i64 {
    fn from(value: InvocationId) -> Self {
        value.0
    }
}

/// Name of a language runtime (`python`, `rhai`, `go`, ...).
///
/// Runtime names end up inside Redis keys, so they are restricted to
/// lowercase ASCII letters, digits and `_`, `-`, `.`, `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuntimeName(String);

impl RuntimeName {
    pub fn new(name: impl Into<String>) -> Result<Self, JobParseError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.' | '+')
            });
        if !valid {
            return Err(JobParseError::InvalidRuntime(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RuntimeName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RuntimeName {
    type Err = JobParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RuntimeName {
    type Error = JobParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RuntimeName> for String {
    fn from(value: RuntimeName) -> Self {
        value.0
    }
}

impl AsRef<str> for RuntimeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
