use anyhow::{anyhow, Result};
use log::error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::packet::Packet;

/// Handle for sending packets to one peer. The socket itself is owned by a
/// writer task; this side only enqueues. Once the writer is gone, sending
/// returns an error instead of panicking, so handlers that fire after a
/// teardown degrade to a logged no-op.
#[derive(Clone)]
pub struct Endpoint {
    label: &'static str,
    tx: mpsc::UnboundedSender<Packet>,
}

impl Endpoint {
    pub fn new(label: &'static str) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { label, tx }, rx)
    }

    pub fn send(&self, packet: Packet) -> Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| anyhow!("endpoint '{}' is closed", self.label))
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Drains queued packets onto the socket. Exits when the queue closes or the
/// peer stops accepting writes.
pub async fn writer_task<W>(mut rx: mpsc::UnboundedReceiver<Packet>, mut writer: W, tag: &'static str)
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        if let Err(e) = writer.write_all(&packet.encode()).await {
            error!("{} - write error: {}", tag, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn send_after_writer_drop_is_an_error() {
        let (endpoint, rx) = Endpoint::new("client");
        drop(rx);
        let result = endpoint.send(Packet::new("PrivateChatNotify", Bytes::new(), Bytes::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn writer_drains_queue_in_order() {
        let (endpoint, rx) = Endpoint::new("client");
        let first = Packet::new("A", Bytes::new(), Bytes::from_static(b"1"));
        let second = Packet::new("B", Bytes::new(), Bytes::from_static(b"2"));
        endpoint.send(first.clone()).unwrap();
        endpoint.send(second.clone()).unwrap();
        drop(endpoint);

        let mut out = Vec::new();
        writer_task(rx, &mut out, "test").await;

        let mut expected = first.encode().to_vec();
        expected.extend_from_slice(&second.encode());
        assert_eq!(out, expected);
    }
}
