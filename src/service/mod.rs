//! Background reconciliation: a filesystem watch worker and an interval
//! poller driving the same [`Engine`].
//!
//! Either trigger may fire for the same file at the same time; the engine's
//! per-record critical sections make that harmless.

pub mod poller;
pub mod watcher;

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use notify::RecommendedWatcher;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, TriageError};

use self::watcher::WatchMsg;

/// Running background threads. Stop with [`Daemon::shutdown`].
pub struct Daemon {
    poll_stop: Sender<()>,
    watch_ctl: Option<Sender<WatchMsg>>,
    watcher: Option<RecommendedWatcher>,
    threads: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Spawn the poller and, when `config.watch.enabled`, the watch worker.
    pub fn start(engine: Arc<Engine>, config: &Config) -> Result<Self> {
        let mut threads = Vec::new();

        let (watch_ctl, watcher) = if config.watch.enabled {
            let (tx, rx) = mpsc::channel();
            let watcher = watcher::watch(engine.store().layout().root(), tx.clone())?;
            let worker_engine = Arc::clone(&engine);
            let debounce = config.watch.debounce();
            threads.push(spawn("mailtriage-watch", move || {
                watcher::run_worker(worker_engine, rx, debounce)
            })?);
            (Some(tx), Some(watcher))
        } else {
            info!("Filesystem watch disabled; relying on the poller");
            (None, None)
        };

        let (poll_stop, stop_rx) = mpsc::channel();
        let interval = config.reconcile.poll_interval();
        threads.push(spawn("mailtriage-poll", move || {
            poller::run_poller(engine, stop_rx, interval)
        })?);

        Ok(Self {
            poll_stop,
            watch_ctl,
            watcher,
            threads,
        })
    }

    /// Signal both loops and wait for them to finish their current record.
    pub fn shutdown(mut self) {
        // Dropping the watcher stops new signals before the worker is told to quit.
        self.watcher.take();
        if let Some(ctl) = self.watch_ctl.take() {
            let _ = ctl.send(WatchMsg::Stop);
        }
        let _ = self.poll_stop.send(());
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Background thread panicked");
            }
        }
        info!("Daemon stopped");
    }
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| TriageError::io(name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryCache;
    use crate::engine::Policy;
    use crate::store::MailStore;
    use chrono::FixedOffset;

    #[test]
    fn test_start_and_shutdown_without_watch() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let store =
            MailStore::open(tmp.path(), FixedOffset::east_opt(0).expect("offset")).expect("open");
        std::fs::write(
            tmp.path().join("DungHan/mustRep/m1.json"),
            r#"{"id": "m1", "From": "x@foo.com", "Date": ["2020-01-01", "00:00"]}"#,
        )
        .expect("write");
        let cache = DirectoryCache::load(store.layout().clone());
        let engine = Arc::new(Engine::new(store, cache, Policy::default()));

        let mut config = Config::default();
        config.watch.enabled = false;
        let daemon = Daemon::start(Arc::clone(&engine), &config).expect("start");
        daemon.shutdown();

        // The first tick runs before the poller waits, so the file moved.
        assert!(tmp.path().join("QuaHan/chuaRep/m1.json").exists());
    }
}
