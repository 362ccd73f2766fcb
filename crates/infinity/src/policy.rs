//! Flush policies and the encoding session's flush state.
//!
//! A [`FlushPolicy`] decides, after each record has been written, whether the
//! bytes buffered in the sink should be forced to the transport now or left to
//! accumulate. The decision is a pure function of the number of records
//! written and the policy's parameters.

use crate::{Error, Result};
use core::{fmt, num::NonZeroU64};

/// Default flush interval for [`FlushPolicy::EveryN`].
pub const DEFAULT_FLUSH_INTERVAL: u64 = 10_000;

const DEFAULT_INTERVAL: NonZeroU64 = match NonZeroU64::new(DEFAULT_FLUSH_INTERVAL) {
    Some(k) => k,
    None => panic!("DEFAULT_FLUSH_INTERVAL must be non-zero"),
};

/// Controls when an encoder forces buffered bytes to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Materialize the whole sequence before writing anything, then write it
    /// in one pass followed by a single flush.
    ///
    /// Working memory is O(N). `max_records` is the ceiling past which
    /// materialization aborts with [`Error::ResourceLimit`]; `None` means the
    /// buffer may grow without bound.
    Unbounded { max_records: Option<usize> },

    /// Flush after every record. Maximal responsiveness, one flush per record.
    EveryRecord,

    /// Flush after every `K` records, amortizing the flush cost.
    EveryN(NonZeroU64),
}

impl FlushPolicy {
    /// Builds an [`FlushPolicy::EveryN`] from a caller-supplied interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `k <= 0`.
    pub fn every(k: i64) -> Result<Self> {
        u64::try_from(k)
            .ok()
            .and_then(NonZeroU64::new)
            .map(Self::EveryN)
            .ok_or_else(|| {
                Error::configuration(format!("Flush interval must be greater than 0, got {k}"))
            })
    }

    /// An unbounded policy with a ceiling on materialized records.
    pub const fn unbounded(max_records: usize) -> Self {
        Self::Unbounded {
            max_records: Some(max_records),
        }
    }

    /// Whether the encoder should flush after the `n`-th record (1-based).
    pub const fn should_flush(&self, n: u64) -> bool {
        match self {
            Self::Unbounded { .. } => false,
            Self::EveryRecord => n >= 1,
            Self::EveryN(k) => n % k.get() == 0,
        }
    }

    /// `true` for the policies that write records as they are produced.
    pub const fn is_streaming(&self) -> bool {
        !matches!(self, Self::Unbounded { .. })
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::EveryN(DEFAULT_INTERVAL)
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded {
                max_records: Some(max),
            } => write!(f, "unbounded(max={max})"),
            Self::Unbounded { max_records: None } => write!(f, "unbounded"),
            Self::EveryRecord => write!(f, "every-record"),
            Self::EveryN(k) => write!(f, "every-{k}"),
        }
    }
}

/// Where an encoding session stands relative to its sink.
///
/// `Idle` means nothing is pending. A session starts there and returns there
/// after every completed flush, so `Flushing` always resolves to `Idle` and
/// the next append moves it back to `Accumulating`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing appended since the last completed flush, or nothing at all.
    Idle,
    /// Bytes have been appended but not yet flushed.
    Accumulating,
    /// A flush is outstanding; the encoder is suspended until it completes.
    Flushing,
    /// The array and the sink are closed. Terminal.
    Closed,
}
