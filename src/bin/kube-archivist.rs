//! Daemon entrypoint: wires the components together and runs until
//! signalled to stop.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use kube_archivist::cancel::CancelToken;
use kube_archivist::config::Cli;
use kube_archivist::dispatcher::Dispatcher;
use kube_archivist::gc::GarbageCollector;
use kube_archivist::store::{FilesystemStore, Store};
use kube_archivist::worker::WorkerPool;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let retain_period = cli.gc_retain_duration()?;

    let store: Arc<dyn Store> = Arc::new(FilesystemStore::new(&cli.backup_root));
    let pool = Arc::new(WorkerPool::start(
        Arc::clone(&store),
        cli.workers,
        cli.queue_capacity,
        cli.max_retries,
    ));
    let _dispatcher = Arc::new(Dispatcher::new(Arc::clone(&pool)));

    // The cluster watch/discovery/probe transport is an external
    // collaborator with no concrete implementation shipped in this crate;
    // a real deployment supplies its own `ResourceWatcher`,
    // `ResourceDefinitionRegistry`, and `ClusterProbe` here. What follows
    // is the lifecycle this binary owns regardless of that choice: the
    // garbage collector and a clean, signal-driven shutdown.
    info!(
        "kube-archivist starting: backup_root={} workers={} queue_capacity={} max_retries={} gc_retain={:?}",
        cli.backup_root, cli.workers, cli.queue_capacity, cli.max_retries, retain_period
    );

    let cancel = CancelToken::new();

    // A probe-less deployment still runs the GC loop; with no cluster
    // collaborator wired up it will simply find nothing to reconcile.
    struct NoProbe;
    impl kube_archivist::external::ClusterProbe for NoProbe {
        fn get(
            &self,
            _gvr: &kube_archivist::types::Gvr,
            _namespace: &str,
            _name: &str,
        ) -> kube_archivist::external::ProbeOutcome {
            kube_archivist::external::ProbeOutcome::Found
        }
    }

    let gc = GarbageCollector::new(Arc::clone(&store), Arc::new(NoProbe), retain_period);
    let gc_cancel = cancel.clone();
    let gc_task = tokio::spawn(async move { gc.run(gc_cancel).await });

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, stopping");

    cancel.cancel();
    let _ = gc_task.await;

    info!("kube-archivist stopped cleanly");
    Ok(())
}

/// Waits for Ctrl-C or, on Unix, `SIGTERM` as well — the two signals a
/// container orchestrator or an interactive shell actually send.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("failed to listen for Ctrl-C"),
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")
}
