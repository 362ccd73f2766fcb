//! Shared service state and graceful shutdown.
//!
//! Every stream holds an [`InflightGuard`] for as long as its encoder task
//! runs and derives its cancellation token from the service-wide shutdown
//! token. Shutdown then proceeds in three phases: refuse new streams, wait
//! for in-flight streams to drain, cancel whatever is left.

use crate::server::config::ServerConfig;
use core::time::Duration;
use infinity::Error;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub lifecycle: Arc<Lifecycle>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    shutting_down: AtomicBool,
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl Lifecycle {
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Registers a new stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin_stream(self: &Arc<Self>) -> Result<InflightGuard, Error> {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }
        self.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(InflightGuard {
            lifecycle: Arc::clone(self),
        })
    }

    /// A token for one stream, cancelled when the service shuts down.
    pub fn stream_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Gracefully shuts down all streams.
    ///
    /// - Refuses new streams.
    /// - Waits up to `drain_timeout` for in-flight streams to finish.
    /// - Cancels the shutdown token, stopping every remaining encoder at its
    ///   next suspension point.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        // === Phase 0: Stop accepting new streams ===
        tracing::info!("Refusing new streams");
        self.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        tracing::info!("Draining in-flight streams ({} active)", self.inflight());
        let drained = timeout(drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight streams drained successfully"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} streams still active)",
                self.inflight()
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.shutdown_token.cancel();
    }
}

/// Counts a stream as in flight until dropped.
#[derive(Debug)]
pub struct InflightGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
