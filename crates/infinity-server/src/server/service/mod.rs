//! HTTP routes and the state they share.
//!
//! ## Structure
//!
//! - [`handler`] - the router and the three streaming modes.
//! - [`state`] - shared configuration, in-flight tracking and shutdown.
//! - [`error`] - mapping encoder errors to HTTP responses.

pub mod error;
pub mod handler;
pub mod state;
