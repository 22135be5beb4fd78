//! Daemon side: accept loop and per-connection dispatch.
//!
//! Every accepted connection gets its own task owning a private decode
//! loop. A decode failure or a clean peer close ends that lifecycle only;
//! the next connection from the same peer starts fresh with nothing carried
//! over but the access tracker's watermark.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::channel::{Channel, ChannelWriter};
use crate::logger::SyncLogger;
use crate::protocol::{Envelope, FileDescriptor, Kind};
use crate::reconcile::{reconcile_advertised, Action};
use crate::store::FileStore;
use crate::tracker::AccessTracker;

pub async fn serve(
    bind: &str,
    identity: &str,
    store: Arc<FileStore>,
    tracker: Arc<AccessTracker>,
    logger: Arc<dyn SyncLogger>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    eprintln!(
        "driftsyncd listening on {} root={}",
        bind,
        store.root().display()
    );
    loop {
        let (stream, peer) = listener.accept().await?;
        eprintln!("connection from {}", peer);
        let identity = identity.to_string();
        let store = store.clone();
        let tracker = tracker.clone();
        let logger = logger.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, identity, store, tracker, logger).await;
        });
    }
}

/// One connection lifecycle: decode envelopes in arrival order until the
/// peer goes away. Per-message failures are logged and skipped; only a
/// channel-level failure ends the loop.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    identity: String,
    store: Arc<FileStore>,
    tracker: Arc<AccessTracker>,
    logger: Arc<dyn SyncLogger>,
) {
    logger.connected(&peer.to_string());
    let (mut rx, mut tx) = Channel::new(stream).split();
    loop {
        let envelope = match rx.recv().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => break,
            Err(e) => {
                // decode failure counts as a disconnect, never a crash
                logger.error("decode", &e.to_string());
                break;
            }
        };
        logger.request(&envelope.sender, envelope.kind);
        if let Err(e) = dispatch(&envelope, &mut tx, &identity, &store, &tracker, &logger).await {
            logger.error("dispatch", &e.to_string());
        }
    }
    logger.disconnected(&peer.to_string());
    eprintln!("connection {} closed", peer);
}

async fn dispatch(
    envelope: &Envelope,
    tx: &mut ChannelWriter,
    identity: &str,
    store: &FileStore,
    tracker: &AccessTracker,
    logger: &Arc<dyn SyncLogger>,
) -> Result<()> {
    match envelope.kind {
        Kind::Sync => handle_sync(envelope, tx, identity, store, tracker).await,
        Kind::List => {
            let inventory = store.list()?;
            tx.send(&Envelope::new(Kind::List, identity).with_inventory(inventory))
                .await
        }
        Kind::Getfile => {
            let target = envelope.target.as_ref().context("GETFILE without target")?;
            let full = store.read(&target.name)?;
            tx.send(&Envelope::new(Kind::Store, identity).with_target(full))
                .await
        }
        Kind::Store => {
            let target = envelope.target.as_ref().context("STORE without target")?;
            store.write(target)?;
            logger.stored(&target.name, target.size);
            Ok(())
        }
        Kind::Delete => {
            let target = envelope.target.as_ref().context("DELETE without target")?;
            store.remove(&target.name)?;
            logger.deleted(&target.name);
            Ok(())
        }
    }
}

/// Reconcile a client-advertised inventory entry by entry, move the peer's
/// watermark to the request's send time, then answer with a counter-sync of
/// our own inventory so the client reconciles the other direction.
async fn handle_sync(
    envelope: &Envelope,
    tx: &mut ChannelWriter,
    identity: &str,
    store: &FileStore,
    tracker: &AccessTracker,
) -> Result<()> {
    let inventory = store.list()?;
    let local: HashMap<&str, &FileDescriptor> =
        inventory.iter().map(|d| (d.name.as_str(), d)).collect();
    let watermark = tracker.watermark_for(&envelope.sender);

    for entry in &envelope.inventory {
        let action = reconcile_advertised(local.get(entry.name.as_str()).copied(), entry, watermark);
        match action {
            Action::Fetch(name) => {
                tx.send(
                    &Envelope::new(Kind::Getfile, identity).with_target(FileDescriptor::named(name)),
                )
                .await?;
            }
            Action::Push(descriptor) => {
                let full = store.read(&descriptor.name)?;
                tx.send(&Envelope::new(Kind::Store, identity).with_target(full))
                    .await?;
            }
            Action::Delete(name) => {
                tx.send(
                    &Envelope::new(Kind::Delete, identity).with_target(FileDescriptor::named(name)),
                )
                .await?;
            }
            Action::NoOp => {}
        }
    }

    tracker.record_sync(&envelope.sender, envelope.sent_at);
    tx.send(&Envelope::new(Kind::Sync, identity).with_inventory(store.list()?))
        .await?;
    Ok(())
}
