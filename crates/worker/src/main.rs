use anyhow::Context;
use tracing::info;

use lambdabox_infra::WorkerConfig;
use lambdabox_infra::queue::RedisJobQueue;
use lambdabox_infra::results::RedisResultStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lambdabox_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    std::fs::create_dir_all(&config.sandbox.sandbox_root)
        .with_context(|| format!("failed to create sandbox root {}", config.sandbox.sandbox_root.display()))?;

    let registry = config.registry();
    let redis_url = config.redis_url();
    info!(
        redis = %redis_url,
        runtimes = ?config.runtimes.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        replicas = config.replicas,
        dead_letter = config.dead_letter,
        "starting lambdabox worker"
    );

    let handles = lambdabox_worker::spawn_workers(&config, &registry, |_, _| {
        Ok((RedisJobQueue::new(&redis_url)?, RedisResultStore::new(&redis_url)?))
    })?;

    wait_for_signal().await?;
    info!("shutdown requested; waiting for in-flight jobs");

    tokio::task::spawn_blocking(move || lambdabox_worker::shutdown_all(handles))
        .await
        .context("shutdown task failed")?;

    info!("worker stopped");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;

    Ok(())
}
