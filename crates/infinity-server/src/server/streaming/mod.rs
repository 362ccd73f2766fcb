//! Response-body streaming.
//!
//! - [`body`] - [`BodySink`](body::BodySink), the `infinity::Sink` that turns
//!   flushes into HTTP body frames.
//! - [`coordinator`] - spawns the encoder task behind each streaming response
//!   and wires up disconnect, timeout and shutdown cancellation.

pub mod body;
pub mod coordinator;
