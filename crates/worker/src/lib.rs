//! Process wiring for the worker binary: one loop per (runtime, replica).

use anyhow::Context;
use tracing::{info, warn};

use lambdabox_core::RuntimeName;
use lambdabox_infra::queue::JobQueue;
use lambdabox_infra::results::{ResultPublisher, ResultStore};
use lambdabox_infra::{InvocationWorker, WorkerConfig, WorkerHandle, WorkerOptions};
use lambdabox_sandbox::RuntimeRegistry;

/// Spawn every configured worker loop.
///
/// `connect` is called once per loop so each one owns its connections.
/// If any loop fails to start, the ones already running are stopped.
pub fn spawn_workers<Q, S, F>(
    config: &WorkerConfig,
    registry: &RuntimeRegistry,
    mut connect: F,
) -> anyhow::Result<Vec<WorkerHandle>>
where
    Q: JobQueue + 'static,
    S: ResultStore + 'static,
    F: FnMut(&RuntimeName, usize) -> anyhow::Result<(Q, S)>,
{
    let options = WorkerOptions {
        dead_letter: config.dead_letter,
        ..WorkerOptions::default()
    };

    let mut handles = Vec::with_capacity(config.runtimes.len() * config.replicas);
    for runtime in &config.runtimes {
        for replica in 0..config.replicas {
            match spawn_one(runtime, replica, registry, &options, &mut connect) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shutdown_all(handles);
                    return Err(e);
                }
            }
        }
    }

    info!(workers = handles.len(), "all workers started");
    Ok(handles)
}

fn spawn_one<Q, S, F>(
    runtime: &RuntimeName,
    replica: usize,
    registry: &RuntimeRegistry,
    options: &WorkerOptions,
    connect: &mut F,
) -> anyhow::Result<WorkerHandle>
where
    Q: JobQueue + 'static,
    S: ResultStore + 'static,
    F: FnMut(&RuntimeName, usize) -> anyhow::Result<(Q, S)>,
{
    let executor = registry
        .executor(runtime)
        .with_context(|| format!("no executor registered for runtime {runtime}"))?;
    let (queue, store) = connect(runtime, replica).with_context(|| format!("failed to connect worker {runtime}-{replica}"))?;

    InvocationWorker::new(format!("{runtime}-{replica}"), runtime.clone(), executor, queue, ResultPublisher::new(store))
        .with_options(options.clone())
        .spawn()
        .with_context(|| format!("failed to spawn worker thread {runtime}-{replica}"))
}

/// Signal every worker, then wait for all of them.
///
/// Workers stop between jobs, so this returns once each in-flight job has
/// finished or timed out.
pub fn shutdown_all(handles: Vec<WorkerHandle>) {
    for handle in &handles {
        handle.request_shutdown();
    }
    for handle in handles {
        let stats = handle.join();
        match serde_json::to_string(&stats) {
            Ok(json) => info!(worker = %stats.worker, stats = %json, "worker joined"),
            Err(e) => warn!(worker = %stats.worker, error = %e, "failed to encode worker stats"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use lambdabox_core::{InvocationId, Job};
    use lambdabox_infra::{InMemoryJobQueue, InMemoryResultStore};
    use serde_json::json;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn one_loop_per_runtime_and_replica() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(&[
            ("WORKER_RUNTIMES", "rhai,sh"),
            ("WORKER_REPLICAS", "2"),
            ("SANDBOX_ROOT", root.path().to_str().unwrap()),
        ]);
        let queue = Arc::new(InMemoryJobQueue::new());
        let store = Arc::new(InMemoryResultStore::new());
        let mut connections = Vec::new();

        let handles = spawn_workers(&cfg, &cfg.registry(), |runtime, replica| {
            connections.push(format!("{runtime}-{replica}"));
            Ok((queue.clone(), store.clone()))
        })
        .unwrap();

        let names: Vec<&str> = handles.iter().map(WorkerHandle::name).collect();
        assert_eq!(names, ["rhai-0", "rhai-1", "sh-0", "sh-1"]);
        assert_eq!(connections, ["rhai-0", "rhai-1", "sh-0", "sh-1"]);

        queue
            .push_job(&"rhai".parse().unwrap(), &Job::new(11, "fn handler(e) { e.x }", json!({"x": 3})))
            .unwrap();
        let publisher = ResultPublisher::new(store.clone());
        let deadline = Instant::now() + Duration::from_secs(15);
        while publisher.fetch(InvocationId::new(11)).unwrap().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        shutdown_all(handles);
        assert_eq!(publisher.fetch(InvocationId::new(11)).unwrap().unwrap().output, Some(json!(3)));
    }

    #[test]
    fn connect_failure_stops_started_workers() {
        let cfg = config(&[("WORKER_RUNTIMES", "rhai"), ("WORKER_REPLICAS", "3")]);
        let mut calls = 0;

        let err = spawn_workers(&cfg, &cfg.registry(), |_, replica| {
            calls += 1;
            if replica == 2 {
                anyhow::bail!("redis down");
            }
            Ok((Arc::new(InMemoryJobQueue::new()), Arc::new(InMemoryResultStore::new())))
        })
        .unwrap_err();

        assert_eq!(calls, 3);
        assert!(format!("{err:#}").contains("redis down"));
    }
}
