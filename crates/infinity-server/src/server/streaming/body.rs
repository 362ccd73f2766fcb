use bytes::{Bytes, BytesMut};
use infinity::Sink;
use std::io;
use tokio::sync::mpsc;

/// Frames travelling from the encoder task to the response body.
pub type Frame = io::Result<Bytes>;

/// A [`Sink`] backed by a streaming HTTP response body.
///
/// Appends accumulate in a local buffer. A flush turns the buffer into one
/// body frame and sends it over a bounded channel, waiting while the channel
/// is full, so a slow client stalls the encoder instead of growing memory.
/// Closing (or dropping) the sink drops the sender, which ends the body.
#[derive(Debug)]
pub struct BodySink {
    pending: BytesMut,
    tx: Option<mpsc::Sender<Frame>>,
}

impl BodySink {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self {
            pending: BytesMut::new(),
            tx: Some(tx),
        }
    }
}

impl Sink for BodySink {
    async fn append(&mut self, bytes: Bytes) -> io::Result<()> {
        sender(self.tx.as_ref())?;
        self.pending.extend_from_slice(&bytes);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        let tx = sender(self.tx.as_ref())?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let frame = self.pending.split().freeze();
        tx.send(Ok(frame)).await.map_err(|_| disconnected())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.tx = None;
        Ok(())
    }
}

impl Drop for BodySink {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!("Body sink dropped before close");
        }
    }
}

fn sender(tx: Option<&mpsc::Sender<Frame>>) -> io::Result<&mpsc::Sender<Frame>> {
    match tx {
        Some(tx) if tx.is_closed() => Err(disconnected()),
        Some(tx) => Ok(tx),
        None => Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "response body is closed",
        )),
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}
