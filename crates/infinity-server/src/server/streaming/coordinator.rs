use super::body::{BodySink, Frame};
use crate::server::service::state::InflightGuard;
use core::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use futures::Stream;
use infinity::{FlushPolicy, PayloadGenerator, RecordSource, StreamingEncoder};
use std::io;
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

/// Per-stream settings taken from the server configuration.
#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    /// Body frames queued before the encoder waits on the client.
    pub buffer: usize,
    /// Cancels the stream once it has run this long.
    pub timeout: Option<Duration>,
}

/// Starts encoding `source` in a background task and returns the response
/// body it feeds.
///
/// The encoder writes into a [`BodySink`] whose frames arrive on the returned
/// stream. Three things stop it early, all through `cancel`: the body being
/// dropped (client disconnect), the stream timeout, and service shutdown.
/// If the encoder fails after the response head went out, an error frame is
/// queued so the connection is aborted rather than ending in a truncated but
/// well-formed body. The task never waits on the client once the encoder has
/// stopped, so its in-flight guard is released even if nobody reads the body.
pub fn spawn_stream<G>(
    source: RecordSource<G>,
    policy: FlushPolicy,
    cancel: CancellationToken,
    options: StreamOptions,
    inflight: InflightGuard,
) -> BodyStream
where
    G: PayloadGenerator + Send + 'static,
{
    // One extra slot is held back for the error frame so reporting a failure
    // never waits on a client that has stopped reading.
    let (tx, rx) = mpsc::channel::<Frame>(options.buffer.saturating_add(1));
    let abort = tx.clone().try_reserve_owned().ok();
    let sink = BodySink::new(tx);
    let encoder = StreamingEncoder::new(policy).with_cancellation(cancel.clone());

    if let Some(limit) = options.timeout {
        tokio::spawn(watchdog(cancel.clone(), limit));
    }

    let span = tracing::info_span!("stream", count = source.count(), %policy);
    tokio::spawn(feed_body(encoder, source, sink, abort, inflight).instrument(span));

    BodyStream {
        frames: ReceiverStream::new(rx),
        _cancel: cancel.drop_guard(),
    }
}

async fn feed_body<G>(
    encoder: StreamingEncoder,
    source: RecordSource<G>,
    mut sink: BodySink,
    abort: Option<OwnedPermit<Frame>>,
    _inflight: InflightGuard,
) where
    G: PayloadGenerator + Send,
{
    match encoder.encode(source, &mut sink).await {
        Ok(summary) => {
            tracing::debug!(
                records = summary.records,
                flushes = summary.flushes,
                bytes = summary.bytes,
                "Stream complete"
            );
        }
        Err(e) => {
            tracing::warn!("Stream aborted: {e}");
            match abort {
                // Hands back a sender, which is dropped right away.
                Some(permit) => drop(permit.send(Err(io::Error::other(e)))),
                None => tracing::debug!("No slot reserved to forward stream error"),
            }
        }
    }
}

/// Cancels `cancel` after `limit` unless it is cancelled first.
async fn watchdog(cancel: CancellationToken, limit: Duration) {
    if cancel
        .run_until_cancelled(tokio::time::sleep(limit))
        .await
        .is_some()
    {
        tracing::warn!(?limit, "Stream timed out");
        cancel.cancel();
    }
}

/// A streaming response body that cancels its encoder when dropped.
#[derive(Debug)]
pub struct BodyStream {
    frames: ReceiverStream<Frame>,
    _cancel: DropGuard,
}

impl Stream for BodyStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}
