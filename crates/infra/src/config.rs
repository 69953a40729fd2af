//! Worker configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use lambdabox_core::RuntimeName;
use lambdabox_sandbox::{RuntimeRegistry, SandboxSettings};

/// How long one blocking pop waits before the loop checks for shutdown.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a queue transport failure before trying again.
pub const TRANSPORT_BACKOFF: Duration = Duration::from_secs(1);

/// Lifetime of a published result.
pub const RESULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("unknown runtime in WORKER_RUNTIMES: {0}")]
    UnknownRuntime(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerConfig {
    pub redis_host: String,
    pub redis_port: u16,
    /// Runtimes this process serves, each with its own queue.
    pub runtimes: Vec<RuntimeName>,
    /// Worker loops per runtime.
    pub replicas: usize,
    pub sandbox: SandboxSettings,
    /// Push unparseable payloads to `execution_queue:<runtime>:dead`.
    pub dead_letter: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let redis_host = var("REDIS_HOST").unwrap_or_else(|| "localhost".to_string());
        let redis_port = parse_or("REDIS_PORT", var("REDIS_PORT"), 6379_u16)?;
        let replicas = parse_or("WORKER_REPLICAS", var("WORKER_REPLICAS"), 1_usize)?;
        if replicas == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_REPLICAS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let defaults = SandboxSettings::default();
        let sandbox = SandboxSettings {
            sandbox_root: var("SANDBOX_ROOT").map(PathBuf::from).unwrap_or(defaults.sandbox_root),
            compile_timeout: secs_or("COMPILE_TIMEOUT_SECS", var("COMPILE_TIMEOUT_SECS"), defaults.compile_timeout)?,
            execution_timeout: secs_or(
                "EXECUTION_TIMEOUT_SECS",
                var("EXECUTION_TIMEOUT_SECS"),
                defaults.execution_timeout,
            )?,
        };

        let dead_letter = match var("DEAD_LETTER_QUEUE") {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "DEAD_LETTER_QUEUE",
                value: raw.clone(),
                reason: "expected true or false".to_string(),
            })?,
        };

        let registry = RuntimeRegistry::builtin(&sandbox);
        let runtimes = match var("WORKER_RUNTIMES") {
            None => registry.names().cloned().collect(),
            Some(raw) => parse_runtimes(&raw, &registry)?,
        };

        Ok(Self {
            redis_host,
            redis_port,
            runtimes,
            replicas,
            sandbox,
            dead_letter,
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    /// The built-in registry, configured with this worker's sandbox settings.
    pub fn registry(&self) -> RuntimeRegistry {
        RuntimeRegistry::builtin(&self.sandbox)
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn secs_or(var: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_or(var, raw, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
            reason: "timeout must be positive".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_runtimes(raw: &str, registry: &RuntimeRegistry) -> Result<Vec<RuntimeName>, ConfigError> {
    let mut runtimes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let name: RuntimeName = part.parse().map_err(|_| ConfigError::UnknownRuntime(part.to_string()))?;
        if !registry.contains(&name) {
            return Err(ConfigError::UnknownRuntime(part.to_string()));
        }
        if !runtimes.contains(&name) {
            runtimes.push(name);
        }
    }
    Ok(runtimes)
}
