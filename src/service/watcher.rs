//! Push trigger: filesystem events under the mail root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::Result;
use crate::store::layout::is_hidden;

/// Message for the watch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMsg {
    /// `path` changed; `created` is true for a new file.
    Changed { path: PathBuf, created: bool },
    Stop,
}

/// Start a recursive watcher on `root` forwarding into `tx`.
///
/// Hidden files are dropped here, which also hides the store's own temp files.
pub fn watch(root: &Path, tx: Sender<WatchMsg>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let created = match event.kind {
                    EventKind::Create(_) => true,
                    EventKind::Modify(_) | EventKind::Remove(_) => false,
                    _ => return,
                };
                for path in event.paths.into_iter().filter(|p| !is_hidden(p)) {
                    // Receiver gone means the worker is shutting down.
                    let _ = tx.send(WatchMsg::Changed { path, created });
                }
            }
            Err(e) => warn!(error = %e, "Filesystem watch error"),
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "Watching mail tree");
    Ok(watcher)
}

/// Worker loop: debounce bursts of signals, then hand each distinct path to
/// the engine once. Returns on [`WatchMsg::Stop`] or when every sender is gone.
pub fn run_worker(engine: Arc<Engine>, rx: Receiver<WatchMsg>, debounce: Duration) {
    'outer: loop {
        let mut pending: HashMap<PathBuf, bool> = HashMap::new();

        match rx.recv() {
            Ok(WatchMsg::Changed { path, created }) => {
                pending.insert(path, created);
            }
            Ok(WatchMsg::Stop) | Err(_) => break,
        }

        // Drain everything that arrives within the window.
        loop {
            match rx.recv_timeout(debounce) {
                Ok(WatchMsg::Changed { path, created }) => {
                    *pending.entry(path).or_insert(false) |= created;
                }
                Ok(WatchMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break 'outer,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        debug!(paths = pending.len(), "Processing filesystem changes");
        let now = Utc::now();
        let mut paths: Vec<_> = pending.into_iter().collect();
        paths.sort();
        for (path, created) in paths {
            engine.handle_path(&path, created, now);
        }
    }
    info!("Watch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, DirectoryCache};
    use crate::engine::Policy;
    use crate::events::ChannelSubscriber;
    use crate::store::MailStore;
    use chrono::FixedOffset;
    use std::sync::mpsc;

    #[test]
    fn test_worker_coalesces_and_stops() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let store =
            MailStore::open(tmp.path(), FixedOffset::east_opt(0).expect("offset")).expect("open");
        let cache = DirectoryCache::with_directory(store.layout().clone(), Directory::default());
        let engine = Arc::new(Engine::new(store, cache, Policy::default()));
        let (events_tx, events_rx) = mpsc::channel();
        engine
            .notifier()
            .subscribe(Arc::new(ChannelSubscriber::new(events_tx)));

        let path = tmp.path().join("DungHan/mustRep/m1.json");
        std::fs::write(
            &path,
            r#"{"id": "m1", "From": "x@foo.com", "Date": ["2099-01-01", "00:00"]}"#,
        )
        .expect("write");

        let (tx, rx) = mpsc::channel();
        for created in [true, false, false] {
            tx.send(WatchMsg::Changed {
                path: path.clone(),
                created,
            })
            .expect("send");
        }
        tx.send(WatchMsg::Stop).expect("send");

        // Stop arrives inside the debounce window, so the burst is dropped.
        run_worker(Arc::clone(&engine), rx, Duration::from_millis(50));
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn test_worker_processes_burst_once() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let store =
            MailStore::open(tmp.path(), FixedOffset::east_opt(0).expect("offset")).expect("open");
        let cache = DirectoryCache::with_directory(store.layout().clone(), Directory::default());
        let engine = Arc::new(Engine::new(store, cache, Policy::default()));
        let (events_tx, events_rx) = mpsc::channel();
        engine
            .notifier()
            .subscribe(Arc::new(ChannelSubscriber::new(events_tx)));

        let path = tmp.path().join("DungHan/mustRep/m1.json");
        std::fs::write(
            &path,
            r#"{"id": "m1", "From": "x@foo.com", "Date": ["2099-01-01", "00:00"]}"#,
        )
        .expect("write");

        let (tx, rx) = mpsc::channel();
        let worker = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || run_worker(engine, rx, Duration::from_millis(50)))
        };
        for created in [true, false] {
            tx.send(WatchMsg::Changed {
                path: path.clone(),
                created,
            })
            .expect("send");
        }
        let event = events_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("event");
        assert_eq!(event.kind, crate::events::EventKind::RecordAdded);

        drop(tx);
        worker.join().expect("join");
        assert!(events_rx.try_recv().is_err());
    }
}
