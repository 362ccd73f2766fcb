use bytes::Bytes;
use std::io;
use tokio_util::sync::CancellationToken;

/// A byte destination for encoded output, such as a response body.
///
/// The encoder drives a sink strictly sequentially: it never issues an
/// `append` or `flush` while a previous call is still outstanding, and it calls
/// `close` exactly once when it is done, on success and on failure alike.
///
/// - `append` hands bytes to the sink. Implementations may buffer them.
/// - `flush` forces everything appended so far to the transport and resolves
///   once delivery completes. This is where backpressure is felt.
/// - `close` finalizes the sink. It does not flush.
///
/// Implementations must also release their transport on `Drop`, since the
/// future driving the encoder may be dropped before `close` runs.
pub trait Sink: Send {
    /// Appends bytes to the sink's pending buffer.
    fn append(&mut self, bytes: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Delivers pending bytes to the transport.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Finalizes the sink.
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// An in-memory [`Sink`] that records how it was driven.
///
/// Bytes move from a pending buffer to the delivered buffer on `flush`, so the
/// delivered output is exactly what a client on the other end of a real
/// transport would have seen. The sink also tracks call counts and the largest
/// pending buffer observed between flushes.
///
/// `MemorySink::counting()` keeps the counters but discards delivered bytes,
/// which keeps memory flat when encoding very long sequences.
#[derive(Debug, Default)]
pub struct MemorySink {
    pending: Vec<u8>,
    delivered: Vec<u8>,
    discard_delivered: bool,
    bytes_delivered: u64,
    appends: u64,
    flushes: u64,
    closes: u64,
    peak_pending: usize,
    disconnect_after: Option<u64>,
    hang_up: Option<CancellationToken>,
    disconnected: bool,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that only counts delivered bytes instead of keeping them.
    pub fn counting() -> Self {
        Self {
            discard_delivered: true,
            ..Self::default()
        }
    }

    /// Simulates a client that disconnects once `appends` appends have been
    /// delivered. The flush carrying them succeeds; every later call fails
    /// with [`io::ErrorKind::BrokenPipe`].
    #[must_use]
    pub fn disconnect_after(mut self, appends: u64) -> Self {
        self.disconnect_after = Some(appends);
        self
    }

    /// Cancels `token` when the simulated disconnect happens, the way a real
    /// transport reports a hang-up to the task driving the encoder.
    #[must_use]
    pub fn with_hang_up(mut self, token: CancellationToken) -> Self {
        self.hang_up = Some(token);
        self
    }

    /// Bytes that reached the transport through `flush`.
    pub fn delivered(&self) -> &[u8] {
        &self.delivered
    }

    /// Consumes the sink, returning the delivered bytes.
    pub fn into_delivered(self) -> Vec<u8> {
        self.delivered
    }

    /// Bytes appended but not yet flushed.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub const fn bytes_delivered(&self) -> u64 {
        self.bytes_delivered
    }

    pub const fn appends(&self) -> u64 {
        self.appends
    }

    pub const fn flushes(&self) -> u64 {
        self.flushes
    }

    pub const fn closes(&self) -> u64 {
        self.closes
    }

    /// Largest pending buffer observed before a flush.
    pub const fn peak_pending(&self) -> usize {
        self.peak_pending
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    const fn reached_disconnect(&self) -> bool {
        match self.disconnect_after {
            Some(limit) => self.appends >= limit,
            None => false,
        }
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
        if let Some(token) = &self.hang_up {
            token.cancel();
        }
    }

    fn check_connected(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sink is closed"));
        }
        if self.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"));
        }
        Ok(())
    }
}

impl Sink for MemorySink {
    async fn append(&mut self, bytes: Bytes) -> io::Result<()> {
        if self.reached_disconnect() {
            self.disconnect();
        }
        self.check_connected()?;
        self.appends += 1;
        self.pending.extend_from_slice(&bytes);
        self.peak_pending = self.peak_pending.max(self.pending.len());
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.check_connected()?;
        self.flushes += 1;
        self.bytes_delivered += self.pending.len() as u64;
        if self.discard_delivered {
            self.pending.clear();
        } else {
            self.delivered.append(&mut self.pending);
        }
        if self.reached_disconnect() {
            self.disconnect();
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closes += 1;
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}
