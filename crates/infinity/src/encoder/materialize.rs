//! The unbounded-buffer baseline.
//!
//! Collects the entire sequence into memory before serializing any of it. This
//! is the negative control for the streaming encoder: its working memory is
//! O(N), and for large or unbounded sequences it either exhausts memory or
//! trips the configured ceiling. It must not be used for production traffic.
//!
//! A ceiling can only be enforced before the first byte is written. Once a
//! materialized body is on the wire there is nothing left to abort.

use super::EncodeSummary;
use crate::{Error, Record, Result, Sink};
use bytes::Bytes;
use core::mem::size_of;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Collects `source` into a `Vec`.
///
/// # Errors
///
/// - [`Error::ResourceLimit`] once more than `max_records` records arrive.
/// - [`Error::Cancelled`] if `cancel` fires while waiting on the source.
/// - Any error the source yields.
pub async fn materialize<St>(
    source: St,
    max_records: Option<usize>,
    cancel: &CancellationToken,
) -> Result<Vec<Record>>
where
    St: Stream<Item = Result<Record>>,
{
    let mut source = core::pin::pin!(source);
    let mut records = Vec::new();

    while let Some(record) = cancel
        .run_until_cancelled(source.next())
        .await
        .ok_or(Error::Cancelled)?
    {
        if let Some(limit) = max_records {
            if records.len() >= limit {
                #[cfg(feature = "tracing")]
                tracing::warn!(limit, "Materialization reached the buffer limit");
                return Err(Error::ResourceLimit { limit });
            }
        }
        records.push(record?);
    }

    Ok(records)
}

/// Serializes a materialized collection as one JSON array in a single pass.
///
/// The bytes are identical to what the streaming encoder produces for the
/// same records.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if serialization fails.
pub fn to_json_array(records: &[Record]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(records)?)
}

/// Approximate heap held by a materialized collection and its encoded body.
pub(crate) fn working_bytes(records: &Vec<Record>, body: &[u8]) -> usize {
    records.capacity() * size_of::<Record>()
        + records.iter().map(Record::heap_bytes).sum::<usize>()
        + body.len()
}

/// Materializes `source`, then writes it to `sink` with one append, one flush
/// and one close. The sink is closed on every path, including when
/// materialization fails before any byte was written.
pub(crate) async fn encode_materialized<St, Sk>(
    source: St,
    sink: &mut Sk,
    max_records: Option<usize>,
    cancel: &CancellationToken,
) -> Result<EncodeSummary>
where
    St: Stream<Item = Result<Record>>,
    Sk: Sink,
{
    let outcome = write_materialized(source, sink, max_records, cancel).await;
    let closed = sink.close().await;

    match (outcome, closed) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(e)) => Err(Error::Transport(e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(_close_err)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to close sink after error: {_close_err}");
            Err(e)
        }
    }
}

async fn write_materialized<St, Sk>(
    source: St,
    sink: &mut Sk,
    max_records: Option<usize>,
    cancel: &CancellationToken,
) -> Result<EncodeSummary>
where
    St: Stream<Item = Result<Record>>,
    Sk: Sink,
{
    let records = materialize(source, max_records, cancel).await?;
    let body = to_json_array(&records)?;
    let summary = EncodeSummary {
        records: records.len() as u64,
        flushes: 1,
        bytes: body.len() as u64,
        peak_working_bytes: working_bytes(&records, &body),
    };
    drop(records);

    sink.append(Bytes::from(body)).await?;
    cancel
        .run_until_cancelled(sink.flush())
        .await
        .ok_or(Error::Cancelled)??;
    Ok(summary)
}
