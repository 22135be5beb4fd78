//! Message channel: newline-delimited JSON envelopes over a TCP stream.
//!
//! One serialized `Envelope` per line lets a receiver decode back-to-back
//! messages off one long-lived connection with no extra framing state.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::{Envelope, MAX_ENVELOPE_BYTES};

pub struct Channel {
    stream: TcpStream,
}

impl Channel {
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Channel { stream }
    }

    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect {}", addr))?;
        Ok(Channel::new(stream))
    }

    /// Split into independently owned read and write halves so the receive
    /// loop and the writer task can live on different tasks.
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        let (read, write) = self.stream.into_split();
        (
            ChannelReader {
                inner: BufReader::new(read),
                line: Vec::new(),
            },
            ChannelWriter { inner: write },
        )
    }
}

pub struct ChannelReader {
    inner: BufReader<OwnedReadHalf>,
    line: Vec<u8>,
}

impl ChannelReader {
    /// Decode the next envelope. `Ok(None)` means the peer closed the
    /// connection cleanly between envelopes; an EOF mid-envelope or a line
    /// over the size cap is an error.
    pub async fn recv(&mut self) -> Result<Option<Envelope>> {
        self.line.clear();
        loop {
            let chunk = self.inner.fill_buf().await.context("read envelope")?;
            if chunk.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                anyhow::bail!("connection closed mid-envelope");
            }
            if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                self.line.extend_from_slice(&chunk[..pos]);
                self.inner.consume(pos + 1);
                break;
            }
            self.line.extend_from_slice(chunk);
            let taken = chunk.len();
            self.inner.consume(taken);
            if self.line.len() > MAX_ENVELOPE_BYTES {
                anyhow::bail!(
                    "envelope exceeds {} bytes (max {})",
                    self.line.len(),
                    MAX_ENVELOPE_BYTES
                );
            }
        }
        let envelope = serde_json::from_slice(&self.line).context("malformed envelope")?;
        Ok(Some(envelope))
    }
}

pub struct ChannelWriter {
    inner: OwnedWriteHalf,
}

impl ChannelWriter {
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let mut line = serde_json::to_vec(envelope).context("encode envelope")?;
        line.push(b'\n');
        self.inner.write_all(&line).await.context("write envelope")?;
        self.inner.flush().await.context("flush envelope")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FileDescriptor, Kind};
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connecting = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        (accepted, connecting.await.unwrap())
    }

    #[tokio::test]
    async fn decodes_back_to_back_envelopes() {
        let (a, b) = socket_pair().await;
        let (_, mut tx) = Channel::new(a).split();
        let (mut rx, _keep) = Channel::new(b).split();

        tx.send(&Envelope::new(Kind::List, "one")).await.unwrap();
        tx.send(
            &Envelope::new(Kind::Getfile, "two").with_target(FileDescriptor::named("a.txt")),
        )
        .await
        .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.kind, Kind::List);
        assert_eq!(first.sender, "one");
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.kind, Kind::Getfile);
        assert_eq!(second.target.unwrap().name, "a.txt");
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let (a, b) = socket_pair().await;
        let (_, mut tx) = Channel::new(a).split();
        let (mut rx, _keep) = Channel::new(b).split();

        tx.send(&Envelope::new(Kind::Sync, "peer")).await.unwrap();
        drop(tx);

        assert!(rx.recv().await.unwrap().is_some());
        assert!(rx.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_line_is_an_error() {
        let (mut a, b) = socket_pair().await;
        let (mut rx, _keep) = Channel::new(b).split();

        a.write_all(b"not json at all\n").await.unwrap();
        assert!(rx.recv().await.is_err());
    }
}
