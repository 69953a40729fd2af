//! In-process execution of Rhai scripts.
//!
//! Every call gets a brand-new [`rhai::Engine`] and [`rhai::Scope`]:
//!
//! - nothing but the Rhai standard packages is registered (no filesystem,
//!   network or process access exists in the language), `import` resolves
//!   nothing and `eval` is disabled;
//! - `print`/`debug` and the extra `warn`/`error` functions append to a
//!   capture buffer instead of touching the worker's stdout;
//! - the wall-clock limit is enforced from the engine's progress callback,
//!   which aborts evaluation cooperatively once the deadline has passed.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value as JsonValue;
use tracing::debug;

use lambdabox_core::Outcome;

use crate::executor::{Executor, ExecutorKind};
use crate::process::DEFAULT_OUTPUT_LIMIT;

/// Entry point every script must define, taking the event.
pub const HANDLER_FN: &str = "handler";

pub const NO_HANDLER_MESSAGE: &str = "no handler function defined.";

/// How often (in engine operations) the deadline is checked.
const DEADLINE_CHECK_EVERY: u64 = 256;

/// Limits applied to each interpreted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretedProfile {
    /// Bound on load + handler call together.
    pub timeout: Duration,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for InterpretedProfile {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_call_levels: 64,
            max_expr_depth: 128,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

impl InterpretedProfile {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Executor for interpreted runtimes.
#[derive(Debug, Clone, Default)]
pub struct InterpretedExecutor {
    profile: InterpretedProfile,
}

impl InterpretedExecutor {
    pub fn new(profile: InterpretedProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &InterpretedProfile {
        &self.profile
    }

    fn build_engine(&self, logs: &LogBuffer, deadline: Instant) -> Engine {
        let p = &self.profile;
        let mut engine = Engine::new();

        engine
            .set_max_call_levels(p.max_call_levels)
            .set_max_expr_depths(p.max_expr_depth, p.max_expr_depth)
            .set_max_string_size(p.max_string_size)
            .set_max_array_size(p.max_array_size)
            .set_max_map_size(p.max_map_size)
            .set_max_modules(0)
            .set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        engine.on_progress(move |ops| {
            if ops % DEADLINE_CHECK_EVERY == 0 && Instant::now() >= deadline {
                Some(Dynamic::from("timeout"))
            } else {
                None
            }
        });

        let sink = logs.clone();
        engine.on_print(move |line| sink.push(line.to_string()));
        let sink = logs.clone();
        engine.on_debug(move |line, _source, _pos| sink.push(format!("[DEBUG] {line}")));
        let sink = logs.clone();
        engine.register_fn("warn", move |msg: Dynamic| sink.push(format!("[WARN] {msg}")));
        let sink = logs.clone();
        engine.register_fn("error", move |msg: Dynamic| sink.push(format!("[ERROR] {msg}")));

        engine
    }

    fn run(&self, engine: &Engine, code: &str, input: &JsonValue, logs: &LogBuffer) -> Outcome {
        let ast = match engine.compile(code) {
            Ok(ast) => ast,
            Err(e) => {
                let message = format!("syntax error: {e}");
                logs.push(message.clone());
                return Outcome::error(message, logs.joined());
            }
        };

        let mut scope = Scope::new();
        if let Err(err) = engine.run_ast_with_scope(&mut scope, &ast) {
            return self.failure(&err, logs);
        }

        let has_handler = ast
            .iter_functions()
            .any(|f| f.name == HANDLER_FN && f.params.len() == 1);
        if !has_handler {
            return Outcome::error(NO_HANDLER_MESSAGE, logs.joined());
        }

        let event = match rhai::serde::to_dynamic(input) {
            Ok(event) => event,
            Err(e) => return Outcome::error(format!("failed to convert event: {e}"), logs.joined()),
        };

        let options = CallFnOptions::new().eval_ast(false);
        match engine.call_fn_with_options::<Dynamic>(options, &mut scope, &ast, HANDLER_FN, (event,)) {
            Ok(value) => Outcome::success(render(&value), logs.joined()),
            Err(err) => self.failure(&err, logs),
        }
    }

    fn failure(&self, err: &EvalAltResult, logs: &LogBuffer) -> Outcome {
        let root = err.unwrap_inner();

        if matches!(root, EvalAltResult::ErrorTerminated(..)) {
            return Outcome::timeout(
                format!("Execution timed out after {}s", self.profile.timeout.as_secs_f64()),
                logs.joined(),
            );
        }

        let message = match root {
            EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
            other => other.to_string(),
        };
        logs.push(format!("[ERROR] {err}"));
        Outcome::error(message, logs.joined())
    }
}

impl Executor for InterpretedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Interpreted
    }

    fn execute(&self, code: &str, input: &JsonValue) -> Outcome {
        let logs = LogBuffer::default();
        let deadline = Instant::now() + self.profile.timeout;
        let engine = self.build_engine(&logs, deadline);

        let outcome = self.run(&engine, code, input, &logs);
        debug!(status = %outcome.status, "interpreted call finished");
        outcome
    }
}

/// Serialize the handler's return value; values JSON cannot express fall
/// back to `{"result": "<display form>"}`.
fn render(value: &Dynamic) -> String {
    let json = rhai::serde::from_dynamic::<JsonValue>(value)
        .unwrap_or_else(|_| serde_json::json!({ "result": value.to_string() }));
    json.to_string()
}

const TRUNCATED_MARKER: &str = "[truncated]";

/// Log lines captured during one call, capped at `limit` bytes of joined
/// output. Once the cap is hit a single marker line is appended and later
/// lines are discarded.
#[derive(Debug, Clone)]
struct LogBuffer(Arc<Mutex<LogLines>>);

#[derive(Debug)]
struct LogLines {
    lines: Vec<String>,
    bytes: usize,
    limit: usize,
    truncated: bool,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_OUTPUT_LIMIT)
    }
}

impl LogBuffer {
    fn with_limit(limit: usize) -> Self {
        Self(Arc::new(Mutex::new(LogLines {
            lines: Vec::new(),
            bytes: 0,
            limit,
            truncated: false,
        })))
    }

    fn push(&self, line: String) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if buf.truncated {
            return;
        }

        // Joined size counts one newline per line after the first.
        let separator = usize::from(!buf.lines.is_empty());
        let reserve = TRUNCATED_MARKER.len() + 1;
        let needed = buf.bytes + separator + line.len();
        if needed + reserve <= buf.limit {
            buf.bytes = needed;
            buf.lines.push(line);
            return;
        }

        buf.truncated = true;
        let room = buf.limit.saturating_sub(buf.bytes + separator + reserve);
        if room > 0 {
            let mut cut = room.min(line.len());
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut > 0 {
                buf.bytes += separator + cut;
                buf.lines.push(line[..cut].to_string());
            }
        }
        let separator = usize::from(!buf.lines.is_empty());
        if buf.bytes + separator + TRUNCATED_MARKER.len() <= buf.limit {
            buf.bytes += separator + TRUNCATED_MARKER.len();
            buf.lines.push(TRUNCATED_MARKER.to_string());
        }
    }

    fn joined(&self) -> String {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambdabox_core::ExecutionStatus;
    use serde_json::json;

    fn executor() -> InterpretedExecutor {
        InterpretedExecutor::default()
    }

    fn fast_timeout() -> InterpretedExecutor {
        InterpretedExecutor::new(InterpretedProfile::default().with_timeout(Duration::from_millis(200)))
    }

    fn output_json(outcome: &Outcome) -> JsonValue {
        serde_json::from_str(&outcome.output).unwrap()
    }

    #[test]
    fn doubles_score() {
        let code = r#"fn handler(event) { #{ score: event.score * 2 } }"#;
        let outcome = executor().execute(code, &json!({"score": 5}));

        assert_eq!(outcome.status, ExecutionStatus::Success, "{outcome:?}");
        assert_eq!(output_json(&outcome), json!({"score": 10}));
        assert!(outcome.message.is_empty());
    }

    #[test]
    fn missing_handler_is_an_error() {
        let outcome = executor().execute("let x = 1;", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(outcome.message.contains("handler"));
    }

    #[test]
    fn handler_with_wrong_arity_does_not_count() {
        let outcome = executor().execute("fn handler() { 1 }", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.message, NO_HANDLER_MESSAGE);
    }

    #[test]
    fn print_and_log_functions_are_captured() {
        let code = r#"
            print("loading");
            fn handler(event) {
                print("hello " + event.name);
                debug("dbg");
                warn("careful");
                error("bad");
                event.name
            }
        "#;
        let outcome = executor().execute(code, &json!({"name": "ada"}));

        assert_eq!(outcome.status, ExecutionStatus::Success, "{outcome:?}");
        assert_eq!(outcome.output, "\"ada\"");
        let lines: Vec<&str> = outcome.logs.lines().collect();
        assert_eq!(lines[0], "loading");
        assert_eq!(lines[1], "hello ada");
        assert!(lines[2].starts_with("[DEBUG]"));
        assert_eq!(lines[3], "[WARN] careful");
        assert_eq!(lines[4], "[ERROR] bad");
    }

    #[test]
    fn thrown_error_becomes_error_outcome_with_logs() {
        let code = r#"
            fn handler(event) {
                print("about to fail");
                throw "bad input";
            }
        "#;
        let outcome = executor().execute(code, &json!({}));

        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.message, "bad input");
        assert!(outcome.logs.contains("about to fail"));
        assert!(outcome.logs.contains("bad input"));
        assert!(outcome.output.is_empty());
    }

    #[test]
    fn runtime_type_error_is_reported() {
        let outcome = executor().execute(r#"fn handler(event) { event.missing + 1 }"#, &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(!outcome.message.is_empty());
    }

    #[test]
    fn syntax_error_is_reported() {
        let outcome = executor().execute("fn handler(event) { ", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(outcome.message.starts_with("syntax error"));
    }

    #[test]
    fn infinite_loop_in_handler_times_out_with_logs() {
        let code = r#"
            fn handler(event) {
                print("spinning");
                loop { }
            }
        "#;
        let started = Instant::now();
        let outcome = fast_timeout().execute(code, &json!({}));

        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert!(outcome.output.is_empty());
        assert!(outcome.logs.contains("spinning"));
        assert!(outcome.message.contains("0.2s"), "{}", outcome.message);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn print_flood_is_capped_and_marked_truncated() {
        let code = r#"
            fn handler(event) {
                let s = "x";
                s.pad(100000, 'x');
                loop { print(s); }
            }
        "#;
        let outcome = fast_timeout().execute(code, &json!({}));

        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert!(outcome.logs.len() <= DEFAULT_OUTPUT_LIMIT, "{} bytes", outcome.logs.len());
        assert!(outcome.logs.ends_with(TRUNCATED_MARKER));
        assert_eq!(outcome.logs.matches(TRUNCATED_MARKER).count(), 1);
    }

    #[test]
    fn log_buffer_cuts_the_overflowing_line_and_stops() {
        let logs = LogBuffer::with_limit(32);
        logs.push("hello".to_string());
        logs.push("é".repeat(40));
        logs.push("after".to_string());

        let joined = logs.joined();
        assert!(joined.len() <= 32, "{joined:?}");
        assert!(joined.starts_with("hello\n"));
        assert!(joined.ends_with(TRUNCATED_MARKER));
        assert!(!joined.contains("after"));
    }

    #[test]
    fn log_buffer_under_the_limit_keeps_every_line() {
        let logs = LogBuffer::with_limit(64);
        logs.push("one".to_string());
        logs.push("two".to_string());
        assert_eq!(logs.joined(), "one\ntwo");
    }

    #[test]
    fn infinite_loop_while_loading_times_out() {
        let outcome = fast_timeout().execute("while true { }", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
    }

    #[test]
    fn timeout_inside_nested_call_is_still_a_timeout() {
        let code = r#"
            fn spin() { loop { } }
            fn handler(event) { spin() }
        "#;
        let outcome = fast_timeout().execute(code, &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
    }

    #[test]
    fn unit_return_serializes_as_null() {
        let outcome = executor().execute("fn handler(event) { }", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.output, "null");
    }

    #[test]
    fn function_pointer_return_still_yields_json() {
        let outcome = executor().execute("fn handler(event) { Fn(\"handler\") }", &json!({}));
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert!(serde_json::from_str::<JsonValue>(&outcome.output).is_ok(), "{outcome:?}");
    }

    #[test]
    fn render_wraps_values_json_cannot_express() {
        #[derive(Clone)]
        struct Opaque;

        let value = serde_json::from_str::<JsonValue>(&render(&Dynamic::from(Opaque))).unwrap();
        assert!(value.get("result").and_then(JsonValue::as_str).is_some(), "{value}");
    }

    #[test]
    fn eval_and_import_are_unavailable() {
        let eval = executor().execute(r#"fn handler(event) { eval("1 + 1") }"#, &json!({}));
        assert_eq!(eval.status, ExecutionStatus::Error);

        let import = executor().execute(r#"import "/etc/passwd" as p; fn handler(event) { 1 }"#, &json!({}));
        assert_eq!(import.status, ExecutionStatus::Error);
    }

    #[test]
    fn no_state_leaks_between_calls() {
        let exec = executor();
        let first = exec.execute("let counter = 41; fn handler(event) { 1 }", &json!({}));
        assert_eq!(first.status, ExecutionStatus::Success);

        // `counter` from the previous call must not exist.
        let second = exec.execute("print(counter); fn handler(event) { 1 }", &json!({}));
        assert_eq!(second.status, ExecutionStatus::Error);
    }
}
