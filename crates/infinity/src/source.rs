use crate::{Error, PayloadGenerator, Record, Result};
use core::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};
use futures::stream::{FusedStream, Stream};

/// A lazy, finite sequence of exactly `count` [`Record`]s.
///
/// Records are produced on demand with `index` values `0..count` in order.
/// Before each record the stream yields to the scheduler once, so a consumer
/// must never assume generation is instantaneous. The source is consumed
/// exactly once; build a new one for every request.
///
/// The stream's `size_hint` is exact, which lets the encoder tell when the
/// record it just wrote was the last one without pulling again.
///
/// # Example
/// ```
/// use futures::StreamExt;
/// use infinity::{Payload, RecordSource};
///
/// # futures::executor::block_on(async {
/// let source = RecordSource::new(3, |i: u64| Payload::new(i as i32, 0.0, "x"));
/// let indices: Vec<u64> = source.map(|r| r.unwrap().index).collect().await;
/// assert_eq!(indices, [0, 1, 2]);
/// # });
/// ```
pub struct RecordSource<G> {
    generator: G,
    next: u64,
    count: u64,
    yielded: bool,
}

impl<G> RecordSource<G> {
    pub const fn new(count: u64, generator: G) -> Self {
        Self {
            generator,
            next: 0,
            count,
            yielded: false,
        }
    }

    /// Builds a source from a caller-supplied count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `count` is negative.
    pub fn try_new(count: i64, generator: G) -> Result<Self> {
        let count = u64::try_from(count).map_err(|_| {
            Error::configuration(format!("Count must be non-negative, got {count}"))
        })?;
        Ok(Self::new(count, generator))
    }

    /// Total number of records this source was created for.
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Number of records not yet produced.
    pub const fn remaining(&self) -> u64 {
        self.count - self.next
    }
}

// Generators are often fn items or closures, which have no `Debug`.
impl<G> fmt::Debug for RecordSource<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSource")
            .field("next", &self.next)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

// No field is structurally pinned.
impl<G> Unpin for RecordSource<G> {}

impl<G: PayloadGenerator> Stream for RecordSource<G> {
    type Item = Result<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.next >= this.count {
            return Poll::Ready(None);
        }

        // Suspension point: hand control back to the scheduler once per record.
        if !this.yielded {
            this.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        this.yielded = false;

        let index = this.next;
        this.next += 1;
        let payload = this.generator.generate(index);
        Poll::Ready(Some(Ok(Record::from_payload(index, payload))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl<G: PayloadGenerator> FusedStream for RecordSource<G> {
    fn is_terminated(&self) -> bool {
        self.next >= self.count
    }
}
