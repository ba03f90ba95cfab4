//! Pull trigger: a full reconcile pass on a fixed interval.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::engine::Engine;

/// Tick once immediately, then every `interval` until `stop` fires or
/// its sender is dropped.
pub fn run_poller(engine: Arc<Engine>, stop: Receiver<()>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "Poller started");
    loop {
        engine.tick(Utc::now());
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("Poller stopped");
}
