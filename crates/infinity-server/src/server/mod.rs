//! HTTP server internals.
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`telemetry`] - log subscriber setup.
//! - [`service`] - routes, shared state and error responses.
//! - [`streaming`] - the response-body sink and the task that drives the
//!   encoder into it.

pub mod config;
pub mod service;
pub mod streaming;
pub mod telemetry;
