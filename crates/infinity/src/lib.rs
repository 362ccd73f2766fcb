//! # `infinity`: incremental JSON arrays for unbounded record streams
//!
//! `infinity` turns a lazily produced, possibly enormous sequence of records
//! into a JSON array written to a byte sink as the records arrive, and
//! contrasts that with the naive approach of collecting everything first.
//!
//! ## Highlights
//!
//! - **Token-by-token output**: array-start, one object per record,
//!   array-end. The encoder holds one record at a time.
//! - **Flush policies**: flush after every record, after every `K` records, or
//!   materialize everything and flush once ([`FlushPolicy::Unbounded`], the
//!   unsafe baseline).
//! - **Backpressure**: flushes are awaited, so a slow consumer slows the
//!   producer instead of growing a buffer.
//! - **Cancellation**: a [`CancellationToken`] is observed at every
//!   suspension point, and the sink is closed on every exit path.
//! - **Observable memory**: [`EncodeSummary::peak_working_bytes`] stays flat
//!   for streaming policies and grows linearly for the unbounded one.
//!
//! ## Wire format
//!
//! ```text
//! [{"index":"0","a":"1","b":"1.5","c":"x"},{"index":"1","a":"2","b":"2.5","c":"y"}]
//! ```
//!
//! All four values are JSON strings, including the numeric ones.
//!
//! ## Features
//!
//! - `random` (default): [`RandomPayload`] and [`SeededPayload`] generators.
//! - `tracing`: emit `tracing` events and spans from the encoder.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod encoder;
mod error;
mod generator;
mod policy;
mod record;
mod sink;
mod source;

pub use crate::encoder::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::policy::*;
pub use crate::record::{Payload, Record};
pub use crate::sink::*;
pub use crate::source::*;
