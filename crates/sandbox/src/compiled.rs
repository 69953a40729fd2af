//! Build-then-run execution in a scratch workspace.
//!
//! One call goes through four phases:
//!
//! 1. **materialize**: render the profile's source templates with the user
//!    code into a fresh [`Workspace`];
//! 2. **compile**: run the build command (if any) under the compile timeout;
//!    a failure or timeout ends the call with `ERROR` and the compiler
//!    output in the logs, and nothing is executed;
//! 3. **execute**: run the artifact with the serialized event on stdin (or
//!    as the last argument) under the execution timeout;
//! 4. **cleanup**: the workspace is dropped, whichever way the call ended.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use lambdabox_core::Outcome;

use crate::error::SandboxError;
use crate::executor::{Executor, ExecutorKind};
use crate::process::{self, ProcessSpec};
use crate::workspace::Workspace;

/// Marker replaced by the user's code inside a source template.
pub const USER_CODE_PLACEHOLDER: &str = "__USER_CODE__";

const NONZERO_EXIT_MESSAGE: &str = "Execution failed with non-zero exit code";

/// A file written into the workspace before the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTemplate {
    /// Path relative to the workspace root.
    pub path: String,
    /// File contents; the first [`USER_CODE_PLACEHOLDER`] is replaced with
    /// the user's code. Templates without it are written verbatim.
    pub template: String,
}

impl SourceTemplate {
    pub fn new(path: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            template: template.into(),
        }
    }

    pub fn render(&self, code: &str) -> String {
        self.template.replacen(USER_CODE_PLACEHOLDER, code, 1)
    }
}

/// How the serialized event reaches the program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Stdin,
    /// Appended as the last command-line argument.
    Argument,
}

/// Configuration row for one compiled runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProfile {
    pub sources: Vec<SourceTemplate>,
    /// Build command line, run inside the workspace. `None` skips phase 2.
    pub build: Option<Vec<String>>,
    /// Run command line. A leading `./` is resolved against the workspace.
    pub run: Vec<String>,
    pub input_mode: InputMode,
    /// Extra environment for both build and run.
    pub env: Vec<(String, String)>,
    pub compile_timeout: Duration,
    pub execution_timeout: Duration,
}

impl CompiledProfile {
    pub fn new<S: AsRef<str>>(run: &[S]) -> Self {
        Self {
            sources: Vec::new(),
            build: None,
            run: argv(run),
            input_mode: InputMode::Stdin,
            env: Vec::new(),
            compile_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
        }
    }

    pub fn source(mut self, path: impl Into<String>, template: impl Into<String>) -> Self {
        self.sources.push(SourceTemplate::new(path, template));
        self
    }

    pub fn build<S: AsRef<str>>(mut self, command: &[S]) -> Self {
        self.build = Some(argv(command));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

fn argv<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    parts.iter().map(|p| p.as_ref().to_string()).collect()
}

/// Executor for compiled (and build-checked) runtimes.
#[derive(Debug, Clone)]
pub struct CompiledExecutor {
    profile: CompiledProfile,
    root: PathBuf,
}

impl CompiledExecutor {
    /// Workspaces are created under `root`, one per call.
    pub fn new(profile: CompiledProfile, root: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            root: root.into(),
        }
    }

    pub fn profile(&self) -> &CompiledProfile {
        &self.profile
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn materialize(&self, workspace: &Workspace, code: &str) -> Result<(), SandboxError> {
        for source in &self.profile.sources {
            workspace.write_file(&source.path, &source.render(code))?;
        }
        Ok(())
    }

    fn command(&self, argv: &[String], workspace: &Workspace, timeout: Duration) -> Result<ProcessSpec, SandboxError> {
        let mut argv = argv.to_vec();
        if let Some(first) = argv.first_mut() {
            if let Some(relative) = first.strip_prefix("./") {
                *first = workspace.path().join(relative).to_string_lossy().into_owned();
            }
        }
        Ok(ProcessSpec::new(&argv, workspace.path(), timeout)?.with_env(&self.profile.env))
    }

    fn try_execute(&self, code: &str, input: &JsonValue) -> Result<Outcome, SandboxError> {
        let workspace = Workspace::create(&self.root)?;
        self.materialize(&workspace, code)?;

        let mut logs = String::new();

        if let Some(build) = &self.profile.build {
            let spec = self.command(build, &workspace, self.profile.compile_timeout)?;
            let out = process::run(&spec)?;
            let diagnostics = join_streams(&out.stdout, &out.stderr);
            append(&mut logs, &diagnostics);

            if out.timed_out {
                debug!(run_id = %workspace.run_id(), "build timed out");
                return Ok(Outcome::error(
                    format!("Compilation timed out after {}", secs(self.profile.compile_timeout)),
                    logs,
                ));
            }
            if !out.success {
                debug!(run_id = %workspace.run_id(), exit_code = ?out.exit_code, "build failed");
                return Ok(Outcome::error(format!("Compilation error:\n{diagnostics}"), logs));
            }
        }

        let event = serde_json::to_string(input)?;
        let spec = self.command(&self.profile.run, &workspace, self.profile.execution_timeout)?;
        let spec = match self.profile.input_mode {
            InputMode::Stdin => spec.with_stdin(event),
            InputMode::Argument => spec.with_arg(event),
        };

        let out = process::run(&spec)?;
        append(&mut logs, &out.stderr);

        if out.timed_out {
            return Ok(Outcome::timeout(
                format!("Execution timed out after {}", secs(self.profile.execution_timeout)),
                logs,
            ));
        }
        if !out.success {
            let stderr = out.stderr.trim();
            let message = if stderr.is_empty() { NONZERO_EXIT_MESSAGE } else { stderr };
            return Ok(Outcome::error(message, logs));
        }

        Ok(Outcome::success(out.stdout.trim(), logs))
    }
}

impl Executor for CompiledExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Compiled
    }

    fn execute(&self, code: &str, input: &JsonValue) -> Outcome {
        // The workspace inside try_execute is already gone by the time we
        // get here, on the error path too.
        match self.try_execute(code, input) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "sandbox failure");
                Outcome::error(e.to_string(), String::new())
            }
        }
    }
}

fn secs(d: Duration) -> String {
    format!("{}s", d.as_secs_f64())
}

fn join_streams(stdout: &str, stderr: &str) -> String {
    let mut combined = String::new();
    append(&mut combined, stdout);
    append(&mut combined, stderr);
    combined
}

fn append(buf: &mut String, text: &str) {
    let text = text.trim_end();
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(text);
}
