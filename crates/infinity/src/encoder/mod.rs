//! Incremental JSON array encoding.
//!
//! [`StreamingEncoder`] pulls records from a source one at a time and writes
//! each as a JSON object inside an enclosing array, token by token, instead of
//! serializing the whole collection at once. A [`FlushPolicy`] decides after
//! every record whether to force buffered bytes to the transport.
//!
//! ## Suspension points
//!
//! The encoder awaits in exactly two places: pulling the next record and
//! flushing the sink. Both observe the encoder's [`CancellationToken`], so a
//! timeout or client disconnect stops the stream at the next suspension point.
//! Writes and flushes are strictly sequential; a new one never starts while a
//! previous one is outstanding.
//!
//! ## Cleanup
//!
//! The sink is closed exactly once on every exit path: normal completion,
//! source faults, transport faults and cancellation.

mod materialize;
mod session;
#[cfg(test)]
mod tests;

pub use materialize::{materialize, to_json_array};

use crate::{FlushPolicy, Record, Result, Sink};
use futures::{Stream, StreamExt};
use session::Session;
use tokio_util::sync::CancellationToken;

/// What an encode did, returned on success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Records written.
    pub records: u64,
    /// Flushes issued to the sink, including the final one.
    pub flushes: u64,
    /// Bytes appended to the sink.
    pub bytes: u64,
    /// The most memory the encoder itself held for records and output at any
    /// point. Constant for streaming policies, linear in N for
    /// [`FlushPolicy::Unbounded`].
    pub peak_working_bytes: usize,
}

/// Encodes a record stream into a JSON array on a sink.
///
/// Every record becomes `{"index":"..","a":"..","b":"..","c":".."}` with all
/// four values written as JSON strings.
///
/// # Example
/// ```
/// use infinity::{FlushPolicy, MemorySink, Payload, RecordSource, StreamingEncoder};
///
/// # futures::executor::block_on(async {
/// let source = RecordSource::new(2, |i: u64| Payload::new(i as i32, 0.5, "x"));
/// let mut sink = MemorySink::new();
/// let summary = StreamingEncoder::new(FlushPolicy::EveryRecord)
///     .encode(source, &mut sink)
///     .await
///     .unwrap();
///
/// assert_eq!(summary.records, 2);
/// assert_eq!(
///     sink.delivered(),
///     br#"[{"index":"0","a":"0","b":"0.5","c":"x"},{"index":"1","a":"1","b":"0.5","c":"x"}]"#
/// );
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct StreamingEncoder {
    policy: FlushPolicy,
    cancel: CancellationToken,
}

impl StreamingEncoder {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the encoder at its next suspension point once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub const fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Consumes `source` and writes it to `sink`, then closes `sink`.
    ///
    /// With a streaming policy the flush requested for the final record is
    /// folded into the closing flush whenever the source's `size_hint` reports
    /// it is exhausted, so the stream never pays for two back-to-back flushes.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the sink fails. The array is left
    ///   unterminated.
    /// - [`Error::Cancelled`] if the token fires at a suspension point.
    /// - [`Error::ResourceLimit`] if an unbounded policy hits its ceiling.
    /// - Any error yielded by `source`.
    ///
    /// [`Error::Transport`]: crate::Error::Transport
    /// [`Error::Cancelled`]: crate::Error::Cancelled
    /// [`Error::ResourceLimit`]: crate::Error::ResourceLimit
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(policy = %self.policy)))]
    pub async fn encode<St, Sk>(&self, source: St, sink: &mut Sk) -> Result<EncodeSummary>
    where
        St: Stream<Item = Result<Record>>,
        Sk: Sink,
    {
        let result = match self.policy {
            FlushPolicy::Unbounded { max_records } => {
                materialize::encode_materialized(source, sink, max_records, &self.cancel).await
            }
            FlushPolicy::EveryRecord | FlushPolicy::EveryN(_) => {
                self.encode_streaming(source, sink).await
            }
        };

        #[cfg(feature = "tracing")]
        match &result {
            Ok(summary) => tracing::debug!(
                records = summary.records,
                flushes = summary.flushes,
                bytes = summary.bytes,
                "Encode complete"
            ),
            Err(e) => tracing::debug!("Encode aborted: {e}"),
        }

        result
    }

    async fn encode_streaming<St, Sk>(&self, source: St, sink: &mut Sk) -> Result<EncodeSummary>
    where
        St: Stream<Item = Result<Record>>,
        Sk: Sink,
    {
        let mut session = Session::begin(sink);
        let outcome = self.pump(source, &mut session).await;
        session.finish(outcome, &self.cancel).await
    }

    async fn pump<St, Sk>(&self, source: St, session: &mut Session<'_, Sk>) -> Result<()>
    where
        St: Stream<Item = Result<Record>>,
        Sk: Sink,
    {
        let mut source = core::pin::pin!(source);

        while let Some(record) = self
            .cancel
            .run_until_cancelled(source.next())
            .await
            .ok_or(crate::Error::Cancelled)?
        {
            session.write_record(&record?).await?;

            if self.policy.should_flush(session.records()) {
                if source.size_hint().1 == Some(0) {
                    // Last record: the closing flush delivers it.
                    continue;
                }
                session.flush(&self.cancel).await?;
            }
        }

        Ok(())
    }
}

/// Encodes `source` into `sink` under `policy` without cancellation.
///
/// Shorthand for `StreamingEncoder::new(policy).encode(source, sink)`.
///
/// # Errors
///
/// See [`StreamingEncoder::encode`].
pub async fn encode<St, Sk>(source: St, sink: &mut Sk, policy: FlushPolicy) -> Result<EncodeSummary>
where
    St: Stream<Item = Result<Record>>,
    Sk: Sink,
{
    StreamingEncoder::new(policy).encode(source, sink).await
}
