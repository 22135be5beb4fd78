use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use driftsync::cli::DaemonOpts;
use driftsync::logger::{NoopLogger, SyncLogger, TextLogger};
use driftsync::server;
use driftsync::store::FileStore;
use driftsync::tracker::AccessTracker;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    let store = Arc::new(FileStore::open(&opts.root)?);
    let canonical_root = std::fs::canonicalize(store.root())
        .with_context(|| format!("Failed to canonicalize root path: {}", opts.root.display()))?;

    println!("Starting driftsync daemon:");
    println!("  Root: {}", canonical_root.display());
    println!("  Bind: {}", opts.bind);

    let identity = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "driftsyncd".to_string());
    let tracker = Arc::new(AccessTracker::new());
    let logger: Arc<dyn SyncLogger> = match &opts.log_file {
        Some(path) => Arc::new(TextLogger::new(path)?),
        None => Arc::new(NoopLogger),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(server::serve(&opts.bind, &identity, store, tracker, logger))
}
