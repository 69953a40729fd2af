//! Subprocess execution with a wall-clock limit.
//!
//! Children are started in their own process group. When the limit passes,
//! the whole group gets SIGKILL (user code cannot be trusted to honour a
//! polite signal) and the child is reaped. A drop guard does the same on
//! every other way out of [`run`], so no build tool or user process outlives
//! its invocation.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::SandboxError;

/// Cap on captured bytes per stream.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// How long to wait for pipe readers after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One command line plus its execution envelope.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    pub output_limit: usize,
}

impl ProcessSpec {
    /// `argv[0]` is the program, the rest are arguments.
    pub fn new(argv: &[String], cwd: &Path, timeout: Duration) -> Result<Self, SandboxError> {
        let (program, args) = argv.split_first().ok_or(SandboxError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
            stdin: None,
            timeout,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        })
    }

    pub fn with_env(mut self, env: &[(String, String)]) -> Self {
        self.env.extend_from_slice(env);
        self
    }

    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// What a finished (or killed) process left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when killed by a signal (including our own timeout kill).
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `spec` to completion or until its timeout passes.
///
/// A timeout is not an `Err`: it comes back as `timed_out = true` with
/// whatever output was captured before the kill.
pub fn run(spec: &ProcessSpec) -> Result<ProcessOutput, SandboxError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let started = Instant::now();
    let child = command.spawn().map_err(|source| SandboxError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let mut guard = ChildGuard::new(child);
    debug!(program = %spec.program, pid = guard.pid(), "process started");

    if let (Some(mut pipe), Some(data)) = (guard.child.stdin.take(), spec.stdin.clone()) {
        // A child that never reads stdin must not block us.
        thread::spawn(move || {
            let _ = pipe.write_all(&data);
        });
    }
    let stdout = guard.child.stdout.take().map(|s| Capture::spawn(s, spec.output_limit));
    let stderr = guard.child.stderr.take().map(|s| Capture::spawn(s, spec.output_limit));

    let deadline = started + spec.timeout;
    let status = wait_until(&mut guard, deadline)?;
    let elapsed = started.elapsed();
    // Leftover background processes would otherwise keep the pipes open.
    guard.kill();

    let stdout = stdout.map(Capture::collect).unwrap_or_default();
    let stderr = stderr.map(Capture::collect).unwrap_or_default();

    Ok(match status {
        Some(status) => ProcessOutput {
            exit_code: status.code(),
            success: status.success(),
            timed_out: false,
            stdout,
            stderr,
            elapsed,
        },
        None => {
            debug!(program = %spec.program, timeout = ?spec.timeout, "process killed after timeout");
            ProcessOutput {
                exit_code: None,
                success: false,
                timed_out: true,
                stdout,
                stderr,
                elapsed,
            }
        }
    })
}

/// `Some(status)` on exit, `None` if the deadline passed and the group was killed.
fn wait_until(guard: &mut ChildGuard, deadline: Instant) -> Result<Option<ExitStatus>, SandboxError> {
    let mut interval = Duration::from_millis(1);
    loop {
        match guard.child.try_wait() {
            Ok(Some(status)) => {
                guard.reaped = true;
                return Ok(Some(status));
            }
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    guard.kill();
                    return Ok(None);
                }
                thread::sleep(interval.min(deadline - now));
                interval = (interval * 2).min(MAX_POLL_INTERVAL);
            }
            Err(e) => {
                guard.kill();
                return Err(SandboxError::Wait(e));
            }
        }
    }
}

/// Owns a running child; kills its process group when dropped.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child, reaped: false }
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn kill_group(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let Ok(pgid) = i32::try_from(self.pid()) else {
                return;
            };
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
            }
        }
    }

    fn kill(&mut self) {
        self.kill_group();
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
            self.reaped = true;
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Also sweeps up background processes the child left in its group.
        self.kill();
    }
}

/// Background reader for one output pipe.
struct Capture {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Capture {
    fn spawn<R: Read + Send + 'static>(mut pipe: R, limit: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.by_ref().take(limit as u64).read_to_end(&mut buf);
            // Keep draining so the writer never blocks on a full pipe.
            let _ = std::io::copy(&mut pipe, &mut std::io::sink());
            let _ = tx.send(buf);
        });
        Self { rx }
    }

    /// A grandchild that escaped the process group can hold the pipe open
    /// indefinitely; give up after a short grace period.
    fn collect(self) -> String {
        match self.rx.recv_timeout(DRAIN_GRACE) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ProcessSpec {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        ProcessSpec::new(&argv, Path::new("."), timeout).unwrap()
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let out = run(&sh("echo out; echo err >&2; exit 3", Duration::from_secs(10))).unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success);
        assert!(!out.timed_out);
    }

    #[test]
    fn feeds_stdin() {
        let spec = sh("cat", Duration::from_secs(10)).with_stdin(b"{\"a\":1}".to_vec());
        let out = run(&spec).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "{\"a\":1}");
    }

    #[test]
    fn kills_on_timeout_and_keeps_partial_output() {
        let started = Instant::now();
        let out = run(&sh("echo before; sleep 60", Duration::from_millis(300))).unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert_eq!(out.stdout.trim(), "before");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn timeout_also_kills_background_children() {
        // The backgrounded sleep inherits stdout; if it survived, collect()
        // would wait for the full drain grace period.
        let started = Instant::now();
        let out = run(&sh("sleep 60 & sleep 60", Duration::from_millis(200))).unwrap();
        assert!(out.timed_out);
        assert!(started.elapsed() < DRAIN_GRACE);
    }

    #[test]
    fn exited_child_does_not_wait_on_background_leftovers() {
        let started = Instant::now();
        let out = run(&sh("sleep 60 & echo done", Duration::from_secs(10))).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "done");
        assert!(started.elapsed() < DRAIN_GRACE);
    }

    #[test]
    fn output_is_capped() {
        let mut spec = sh("yes x | head -c 100000", Duration::from_secs(10));
        spec.output_limit = 1000;
        let out = run(&spec).unwrap();
        assert_eq!(out.stdout.len(), 1000);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let argv = vec!["definitely-not-a-real-binary-4242".to_string()];
        let spec = ProcessSpec::new(&argv, Path::new("."), Duration::from_secs(1)).unwrap();
        assert!(matches!(run(&spec), Err(SandboxError::Spawn { .. })));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(matches!(
            ProcessSpec::new(&[], Path::new("."), Duration::from_secs(1)),
            Err(SandboxError::EmptyCommand)
        ));
    }
}
