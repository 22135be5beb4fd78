//! driftsync client binary: console front-end around a `Session`.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

use driftsync::cli::ClientOpts;
use driftsync::client::{Session, Ui};
use driftsync::logger::{NoopLogger, SyncLogger, TextLogger};
use driftsync::protocol::FileDescriptor;
use driftsync::store::FileStore;

struct ConsoleUi;

impl Ui for ConsoleUi {
    fn notify(&self, message: &str) {
        println!("{}", message);
    }

    fn show_inventory(&self, entries: &[FileDescriptor]) {
        if entries.is_empty() {
            println!("(no files on server)");
            return;
        }
        for entry in entries {
            println!("========= {} =========", entry.name);
            println!("size: {}", entry.size);
            println!("last changed: {}", entry.modified.to_rfc2822());
            println!();
        }
    }
}

fn main() -> Result<()> {
    let opts = ClientOpts::parse();

    let store = Arc::new(FileStore::open(&opts.root)?);
    let ui: Arc<dyn Ui> = Arc::new(ConsoleUi);
    let logger: Arc<dyn SyncLogger> = match &opts.log_file {
        Some(path) => Arc::new(TextLogger::new(path)?),
        None => Arc::new(NoopLogger),
    };

    // stdin feeder: each typed line goes to the command loop as-is
    let (cmd_tx, cmd_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    if cmd_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    ui.notify(&format!(
        "driftsync client, syncing {} with {}:{}",
        opts.root.display(),
        opts.host,
        opts.port
    ));
    ui.notify(
        "commands: sync, list, store <file>, delete <file>; a sync also runs every 60 seconds",
    );

    let session = Session::new(store, ui, logger);
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(session.run(&opts.host, opts.port, cmd_rx))
}
