//! Runtime name → executor configuration.
//!
//! Adding a language is adding a row: a [`RuntimeProfile`] registered under
//! its [`RuntimeName`]. The worker never branches on language names.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use lambdabox_core::RuntimeName;

use crate::compiled::{CompiledExecutor, CompiledProfile};
use crate::executor::{Executor, ExecutorKind};
use crate::interpreted::{InterpretedExecutor, InterpretedProfile};
use crate::wrappers;

/// Host-level knobs shared by every built-in runtime.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SandboxSettings {
    /// Parent directory for per-invocation workspaces.
    pub sandbox_root: PathBuf,
    pub compile_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("/tmp/sandbox"),
            compile_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeProfile {
    Interpreted(InterpretedProfile),
    Compiled(CompiledProfile),
}

impl RuntimeProfile {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            RuntimeProfile::Interpreted(_) => ExecutorKind::Interpreted,
            RuntimeProfile::Compiled(_) => ExecutorKind::Compiled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    sandbox_root: PathBuf,
    profiles: BTreeMap<RuntimeName, RuntimeProfile>,
}

impl RuntimeRegistry {
    /// A registry with no runtimes.
    pub fn empty(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            profiles: BTreeMap::new(),
        }
    }

    /// The built-in runtimes: `rhai` in process, everything else through a
    /// toolchain on the host.
    pub fn builtin(settings: &SandboxSettings) -> Self {
        let compiled = |profile: CompiledProfile| {
            RuntimeProfile::Compiled(
                profile
                    .compile_timeout(settings.compile_timeout)
                    .execution_timeout(settings.execution_timeout),
            )
        };

        let mut registry = Self::empty(settings.sandbox_root.clone());
        registry.add_builtin(
            "rhai",
            RuntimeProfile::Interpreted(InterpretedProfile::default().with_timeout(settings.execution_timeout)),
        );
        registry.add_builtin(
            "sh",
            compiled(
                CompiledProfile::new(&["sh", "main.sh"])
                    .source("main.sh", wrappers::SH_MAIN)
                    .build(&["sh", "-n", "main.sh"]),
            ),
        );
        registry.add_builtin(
            "python",
            compiled(
                CompiledProfile::new(&["python3", "main.py"])
                    .source("main.py", wrappers::PYTHON_MAIN)
                    .build(&["python3", "-m", "py_compile", "main.py"])
                    .env("PYTHONDONTWRITEBYTECODE", "1"),
            ),
        );
        registry.add_builtin(
            "javascript",
            compiled(
                CompiledProfile::new(&["node", "main.js"])
                    .source("main.js", wrappers::JAVASCRIPT_MAIN)
                    .build(&["node", "--check", "main.js"]),
            ),
        );
        registry.add_builtin(
            "ruby",
            compiled(
                CompiledProfile::new(&["ruby", "main.rb"])
                    .source("main.rb", wrappers::RUBY_MAIN)
                    .build(&["ruby", "-c", "main.rb"]),
            ),
        );
        registry.add_builtin(
            "go",
            compiled(
                CompiledProfile::new(&["./handler"])
                    .source("main.go", wrappers::GO_MAIN)
                    .build(&["go", "build", "-o", "handler", "main.go"])
                    .env("GOCACHE", "/tmp/gocache")
                    .env("GOPATH", "/tmp/gopath"),
            ),
        );
        registry.add_builtin(
            "rust",
            compiled(
                CompiledProfile::new(&["./target/release/handler"])
                    .source("Cargo.toml", wrappers::RUST_CARGO_TOML)
                    .source("src/main.rs", wrappers::RUST_MAIN)
                    .build(&["cargo", "build", "--release", "--quiet"]),
            ),
        );
        registry.add_builtin(
            "c99",
            compiled(
                CompiledProfile::new(&["./handler"])
                    .source("main.c", wrappers::C99_MAIN)
                    .build(&["gcc", "-std=c99", "-O2", "-o", "handler", "main.c", "-lcjson"]),
            ),
        );
        registry.add_builtin(
            "cpp17",
            compiled(
                CompiledProfile::new(&["./handler"])
                    .source("main.cpp", wrappers::CPP17_MAIN)
                    .build(&["clang++", "-std=c++17", "-O2", "-o", "handler", "main.cpp"]),
            ),
        );
        registry
    }

    fn add_builtin(&mut self, raw: &str, profile: RuntimeProfile) {
        match RuntimeName::new(raw) {
            Ok(runtime) => {
                self.insert(runtime, profile);
            }
            Err(e) => warn!(runtime = raw, error = %e, "skipping invalid built-in runtime"),
        }
    }

    /// Register (or replace) a runtime.
    pub fn insert(&mut self, runtime: RuntimeName, profile: RuntimeProfile) -> Option<RuntimeProfile> {
        self.profiles.insert(runtime, profile)
    }

    pub fn contains(&self, runtime: &RuntimeName) -> bool {
        self.profiles.contains_key(runtime)
    }

    pub fn names(&self) -> impl Iterator<Item = &RuntimeName> {
        self.profiles.keys()
    }

    pub fn profile(&self, runtime: &RuntimeName) -> Option<&RuntimeProfile> {
        self.profiles.get(runtime)
    }

    /// Build the executor for `runtime`, or `None` if it is not registered.
    pub fn executor(&self, runtime: &RuntimeName) -> Option<Arc<dyn Executor>> {
        let executor: Arc<dyn Executor> = match self.profiles.get(runtime)? {
            RuntimeProfile::Interpreted(p) => Arc::new(InterpretedExecutor::new(p.clone())),
            RuntimeProfile::Compiled(p) => Arc::new(CompiledExecutor::new(p.clone(), self.sandbox_root.clone())),
        };
        Some(executor)
    }
}
