//! Error types for streaming and materialized JSON encoding.
//!
//! This module defines the central `Error` enum, which captures every failure
//! an encode can surface to its caller. None of these are retried by the
//! encoder; the only guarantee on failure is that the sink has been closed.
//!
//! ## Error Cases
//! - `Configuration`: A count or flush interval was invalid. Raised before any
//!   byte reaches a sink.
//! - `ResourceLimit`: Materialization exceeded its record ceiling.
//! - `Transport`: The sink rejected an append, flush or close.
//! - `Source`: The record producer failed partway through.
//! - `Cancelled`: The stream was cancelled (timeout, shutdown, disconnect).
//! - `Serialization`: A JSON token could not be written.
//! - `ServiceShutdown`: A stream was requested while the service is draining.

use std::io;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the encoding pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A count or flush interval was rejected before streaming began.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// The unbounded buffer reached its configured ceiling.
    ///
    /// Only detectable before the first flush: once bytes are on the wire they
    /// cannot be retracted.
    #[error(
        "Buffer limit reached: more than {limit} records were materialized. \
         Stream the sequence instead of collecting it, or raise the limit"
    )]
    ResourceLimit { limit: usize },

    /// The sink failed. The array is left unterminated on the wire.
    #[error("Transport fault: {0}")]
    Transport(#[from] io::Error),

    /// The record producer failed partway through the sequence.
    #[error("Record source failed: {reason}")]
    Source { reason: String },

    /// The stream was cancelled at a suspension point.
    #[error("Stream cancelled")]
    Cancelled,

    /// A JSON token could not be written to the scratch buffer.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error was raised before any sink interaction.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
