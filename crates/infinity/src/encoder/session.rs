use super::EncodeSummary;
use crate::{
    Error, FlushState, Record, Result, Sink,
    record::Text,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter};
use std::io;
use tokio_util::sync::CancellationToken;

/// Initial scratch capacity; comfortably fits one encoded record.
const SCRATCH_CAPACITY: usize = 256;

/// One pass of a JSON array over a sink.
///
/// The session writes tokens into a reusable scratch buffer and hands each
/// completed record to the sink as a single chunk. The array-start token rides
/// along with the first chunk (or with the array-end token for an empty
/// sequence). Only the current record is ever held in memory.
pub(crate) struct Session<'a, S: Sink> {
    sink: &'a mut S,
    scratch: Vec<u8>,
    formatter: CompactFormatter,
    state: FlushState,
    records: u64,
    since_flush: u64,
    flushes: u64,
    bytes: u64,
    peak_scratch: usize,
}

impl<'a, S: Sink> Session<'a, S> {
    pub(crate) fn begin(sink: &'a mut S) -> Self {
        Self {
            sink,
            scratch: Vec::with_capacity(SCRATCH_CAPACITY),
            formatter: CompactFormatter,
            state: FlushState::Idle,
            records: 0,
            since_flush: 0,
            flushes: 0,
            bytes: 0,
            peak_scratch: 0,
        }
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> FlushState {
        self.state
    }

    pub(crate) const fn records(&self) -> u64 {
        self.records
    }

    /// Records written since the last completed flush.
    pub(crate) const fn since_flush(&self) -> u64 {
        self.since_flush
    }

    /// Writes one record as a JSON object and appends it to the sink.
    pub(crate) async fn write_record(&mut self, record: &Record) -> Result<()> {
        if self.records == 0 {
            token(self.formatter.begin_array(&mut self.scratch))?;
        }
        token(
            self.formatter
                .begin_array_value(&mut self.scratch, self.records == 0),
        )?;
        token(self.formatter.begin_object(&mut self.scratch))?;
        self.write_field("index", &Text(&record.index), true)?;
        self.write_field("a", &Text(&record.a), false)?;
        self.write_field("b", &Text(&record.b), false)?;
        self.write_field("c", record.c.as_str(), false)?;
        token(self.formatter.end_object(&mut self.scratch))?;
        token(self.formatter.end_array_value(&mut self.scratch))?;

        self.records += 1;
        self.since_flush += 1;
        self.append().await
    }

    /// Forces pending bytes to the transport, suspending until delivery
    /// completes or `cancel` fires.
    pub(crate) async fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.state == FlushState::Idle {
            return Ok(());
        }
        debug_assert_ne!(self.state, FlushState::Flushing, "overlapping flush");
        self.state = FlushState::Flushing;
        cancel
            .run_until_cancelled(self.sink.flush())
            .await
            .ok_or(Error::Cancelled)??;
        self.flushes += 1;
        self.since_flush = 0;
        self.state = FlushState::Idle;

        #[cfg(feature = "tracing")]
        tracing::trace!(records = self.records, "flushed");
        Ok(())
    }

    /// Ends the session and closes the sink exactly once.
    ///
    /// On success the array is terminated and given a final flush before the
    /// sink is closed. On failure the sink is closed as-is and the array stays
    /// unterminated; a close error is logged and the original error returned.
    pub(crate) async fn finish(
        mut self,
        outcome: Result<()>,
        cancel: &CancellationToken,
    ) -> Result<EncodeSummary> {
        let outcome = match outcome {
            Ok(()) => self.end_array(cancel).await,
            Err(e) => Err(e),
        };
        let closed = self.sink.close().await;
        self.state = FlushState::Closed;

        match (outcome, closed) {
            (Ok(()), Ok(())) => Ok(self.summary()),
            (Ok(()), Err(e)) => Err(Error::Transport(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(_close_err)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to close sink after error: {_close_err}");
                Err(e)
            }
        }
    }

    async fn end_array(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.records == 0 {
            token(self.formatter.begin_array(&mut self.scratch))?;
        }
        token(self.formatter.end_array(&mut self.scratch))?;
        self.append().await?;
        self.flush(cancel).await
    }

    fn write_field<V>(&mut self, key: &str, value: &V, first: bool) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        token(self.formatter.begin_object_key(&mut self.scratch, first))?;
        serde_json::to_writer(&mut self.scratch, key)?;
        token(self.formatter.end_object_key(&mut self.scratch))?;
        token(self.formatter.begin_object_value(&mut self.scratch))?;
        serde_json::to_writer(&mut self.scratch, value)?;
        token(self.formatter.end_object_value(&mut self.scratch))?;
        Ok(())
    }

    async fn append(&mut self) -> Result<()> {
        self.peak_scratch = self.peak_scratch.max(self.scratch.capacity());
        let chunk = Bytes::copy_from_slice(&self.scratch);
        self.scratch.clear();
        self.bytes += chunk.len() as u64;
        self.sink.append(chunk).await?;
        self.state = FlushState::Accumulating;
        Ok(())
    }

    fn summary(&self) -> EncodeSummary {
        EncodeSummary {
            records: self.records,
            flushes: self.flushes,
            bytes: self.bytes,
            peak_working_bytes: self.peak_scratch,
        }
    }
}

/// Writing a structural token into a `Vec` only fails if the formatter does.
fn token(result: io::Result<()>) -> Result<()> {
    result.map_err(|e| Error::Serialization(serde_json::Error::io(e)))
}
