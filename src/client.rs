//! Client session: one connection to the daemon, driven by three tasks.
//!
//! The command loop turns typed commands (or the 60-second timer) into
//! outbound envelopes; the receive loop dispatches whatever the server
//! sends. Both enqueue onto one ordered queue drained by a single writer
//! task, so the two producers never interleave partial writes on the
//! shared stream.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelReader, ChannelWriter};
use crate::logger::SyncLogger;
use crate::protocol::{Envelope, FileDescriptor, Kind, SYNC_INTERVAL};
use crate::reconcile::{reconcile_counter_sync, Action};
use crate::store::FileStore;

/// Collaborator seam for whatever renders the session to a human.
pub trait Ui: Send + Sync {
    fn notify(&self, message: &str);
    fn show_inventory(&self, entries: &[FileDescriptor]);
}

pub struct Session {
    store: Arc<FileStore>,
    ui: Arc<dyn Ui>,
    logger: Arc<dyn SyncLogger>,
    identity: String,
}

impl Session {
    pub fn new(store: Arc<FileStore>, ui: Arc<dyn Ui>, logger: Arc<dyn SyncLogger>) -> Self {
        let identity = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "driftsync-client".to_string());
        Session {
            store,
            ui,
            logger,
            identity,
        }
    }

    /// Connect and run until the server goes away. `commands` feeds raw
    /// command lines exactly as typed.
    pub async fn run(
        self,
        host: &str,
        port: u16,
        commands: mpsc::Receiver<String>,
    ) -> Result<()> {
        let channel = Channel::connect(host, port).await?;
        let (rx, tx) = channel.split();
        let (out_tx, out_rx) = mpsc::channel::<Envelope>(64);

        let writer = tokio::spawn(write_loop(tx, out_rx, self.logger.clone()));
        let command = tokio::spawn(command_loop(
            commands,
            out_tx.clone(),
            self.store.clone(),
            self.ui.clone(),
            self.identity.clone(),
        ));

        let result = self.receive_loop(rx, out_tx).await;
        command.abort();
        writer.abort();
        result
    }

    async fn receive_loop(
        &self,
        mut rx: ChannelReader,
        out: mpsc::Sender<Envelope>,
    ) -> Result<()> {
        // Epoch start mirrors a fresh peer relationship: the first
        // counter-sync fetches everything the server has.
        let mut last_sync: DateTime<Utc> = DateTime::UNIX_EPOCH;
        loop {
            let envelope = match rx.recv().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    self.ui.notify("server closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    self.logger.error("decode", &e.to_string());
                    self.ui.notify("lost connection to server");
                    return Err(e);
                }
            };
            if let Err(e) = self.handle_envelope(&envelope, &out, &mut last_sync).await {
                self.logger.error("handle", &e.to_string());
                self.ui
                    .notify(&format!("error handling {}: {}", envelope.kind, e));
            }
        }
    }

    async fn handle_envelope(
        &self,
        envelope: &Envelope,
        out: &mpsc::Sender<Envelope>,
        last_sync: &mut DateTime<Utc>,
    ) -> Result<()> {
        match envelope.kind {
            // counter-sync: the server already reconciled our inventory,
            // only server files missing here are left to decide
            Kind::Sync => {
                for entry in &envelope.inventory {
                    let present = self.store.exists(&entry.name);
                    match reconcile_counter_sync(present, entry, *last_sync) {
                        Action::Fetch(name) => {
                            self.ui.notify(&format!("fetching {} from server", name));
                            out.send(
                                Envelope::new(Kind::Getfile, self.identity.as_str())
                                    .with_target(FileDescriptor::named(name)),
                            )
                            .await?;
                        }
                        Action::Delete(name) => {
                            self.ui
                                .notify(&format!("removing {} from server", name));
                            out.send(
                                Envelope::new(Kind::Delete, self.identity.as_str())
                                    .with_target(FileDescriptor::named(name)),
                            )
                            .await?;
                        }
                        Action::Push(_) | Action::NoOp => {}
                    }
                }
                *last_sync = Utc::now();
                Ok(())
            }
            Kind::List => {
                self.ui.show_inventory(&envelope.inventory);
                Ok(())
            }
            Kind::Getfile => {
                let target = envelope.target.as_ref().context("GETFILE without target")?;
                self.ui
                    .notify(&format!("server requested {}", target.name));
                let full = self.store.read(&target.name)?;
                out.send(Envelope::new(Kind::Store, self.identity.as_str()).with_target(full))
                    .await?;
                Ok(())
            }
            Kind::Store => {
                let target = envelope.target.as_ref().context("STORE without target")?;
                self.ui.notify(&format!("storing {}", target.name));
                self.store.write(target)?;
                self.logger.stored(&target.name, target.size);
                Ok(())
            }
            Kind::Delete => {
                let target = envelope.target.as_ref().context("DELETE without target")?;
                self.ui.notify(&format!("deleting {}", target.name));
                self.store.remove(&target.name)?;
                self.logger.deleted(&target.name);
                Ok(())
            }
        }
    }
}

/// Sole owner of the socket write half.
async fn write_loop(
    mut tx: ChannelWriter,
    mut queue: mpsc::Receiver<Envelope>,
    logger: Arc<dyn SyncLogger>,
) {
    while let Some(envelope) = queue.recv().await {
        if let Err(e) = tx.send(&envelope).await {
            logger.error("send", &e.to_string());
            break;
        }
    }
}

/// Waits on whichever comes first: a typed command, or the sync timer.
async fn command_loop(
    mut commands: mpsc::Receiver<String>,
    out: mpsc::Sender<Envelope>,
    store: Arc<FileStore>,
    ui: Arc<dyn Ui>,
    identity: String,
) {
    loop {
        let line = tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(line) => line,
                None => break,
            },
            _ = tokio::time::sleep(SYNC_INTERVAL) => "SYNC".to_string(),
        };
        if let Some(envelope) = build_command(&line, &store, ui.as_ref(), &identity) {
            if out.send(envelope).await.is_err() {
                break;
            }
        }
    }
}

/// Parse one command line into an outbound envelope. SYNC, DELETE and STORE
/// attach the full local inventory; the first token is case-insensitive.
fn build_command(
    line: &str,
    store: &FileStore,
    ui: &dyn Ui,
    identity: &str,
) -> Option<Envelope> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_ascii_uppercase();
    match verb.as_str() {
        "SYNC" => match store.list() {
            Ok(inventory) => Some(Envelope::new(Kind::Sync, identity).with_inventory(inventory)),
            Err(e) => {
                ui.notify(&format!("sync failed: {}", e));
                None
            }
        },
        "LIST" => Some(Envelope::new(Kind::List, identity)),
        "DELETE" => {
            let name = match parts.next() {
                Some(name) => name,
                None => {
                    ui.notify("usage: delete <file>");
                    return None;
                }
            };
            let inventory = store.list().unwrap_or_default();
            Some(
                Envelope::new(Kind::Delete, identity)
                    .with_inventory(inventory)
                    .with_target(FileDescriptor::named(name)),
            )
        }
        "STORE" => {
            let name = match parts.next() {
                Some(name) => name,
                None => {
                    ui.notify("usage: store <file>");
                    return None;
                }
            };
            match store.read(name) {
                Ok(full) => {
                    let inventory = store.list().unwrap_or_default();
                    Some(
                        Envelope::new(Kind::Store, identity)
                            .with_inventory(inventory)
                            .with_target(full),
                    )
                }
                Err(e) => {
                    ui.notify(&format!("store failed: {}", e));
                    None
                }
            }
        }
        other => {
            ui.notify(&format!(
                "unknown command {:?} (try sync, list, delete <file>, store <file>)",
                other
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUi {
        notes: Mutex<Vec<String>>,
    }

    impl Ui for RecordingUi {
        fn notify(&self, message: &str) {
            self.notes.lock().unwrap().push(message.to_string());
        }
        fn show_inventory(&self, _entries: &[FileDescriptor]) {}
    }

    fn store_with_file(name: &str) -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .write(&FileDescriptor {
                name: name.to_string(),
                size: 2,
                modified: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                content: Some(b"hi".to_vec()),
            })
            .unwrap();
        (dir, store)
    }

    #[test]
    fn sync_command_attaches_inventory() {
        let (_dir, store) = store_with_file("a.txt");
        let ui = RecordingUi::default();
        let env = build_command("sync", &store, &ui, "me").unwrap();
        assert_eq!(env.kind, Kind::Sync);
        assert_eq!(env.inventory.len(), 1);
        assert!(env.target.is_none());
    }

    #[test]
    fn store_command_reads_content_and_inventory() {
        let (_dir, store) = store_with_file("a.txt");
        let ui = RecordingUi::default();
        let env = build_command("Store a.txt", &store, &ui, "me").unwrap();
        assert_eq!(env.kind, Kind::Store);
        let target = env.target.unwrap();
        assert_eq!(target.content.as_deref(), Some(&b"hi"[..]));
        assert_eq!(env.inventory.len(), 1);
    }

    #[test]
    fn delete_command_requires_a_name() {
        let (_dir, store) = store_with_file("a.txt");
        let ui = RecordingUi::default();
        assert!(build_command("delete", &store, &ui, "me").is_none());
        assert!(!ui.notes.lock().unwrap().is_empty());

        let env = build_command("DELETE a.txt", &store, &ui, "me").unwrap();
        assert_eq!(env.kind, Kind::Delete);
        assert_eq!(env.target.unwrap().name, "a.txt");
    }

    #[test]
    fn unknown_command_is_surfaced_not_sent() {
        let (_dir, store) = store_with_file("a.txt");
        let ui = RecordingUi::default();
        assert!(build_command("frobnicate now", &store, &ui, "me").is_none());
        let notes = ui.notes.lock().unwrap();
        assert!(notes[0].contains("unknown command"));
    }
}
