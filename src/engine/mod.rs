//! Reconciliation engine: auto-assignment, time-based reclassification and
//! manual actions over the mail store.
//!
//! Every mutation runs inside the record's critical section
//! ([`locks::RecordLocks`]) and re-reads the file before writing, so the
//! watch worker, the poller and manual actions can race on the same file
//! without double-writing.

pub mod actions;
pub mod assign;
pub mod locks;
pub mod reclassify;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::directory::DirectoryCache;
use crate::error::{Result, TriageError};
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::mail::MailRecord;
use crate::store::{MailStore, Scope};

use self::actions::Actions;
use self::assign::{AssignReport, AutoAssigner};
use self::locks::RecordLocks;
use self::reclassify::{ReconcileReport, Reclassifier};

/// Tunables shared by the engine components.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Mail older than this is Expired.
    pub response_window: chrono::Duration,
    /// Pause before the single retry of a failed write or move.
    pub retry_delay: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            response_window: chrono::Duration::hours(24),
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl Policy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            response_window: config.reconcile.response_window(),
            retry_delay: config.reconcile.retry_delay(),
        }
    }
}

/// Run `op`; on a disk failure wait `delay` and run it once more.
pub(crate) fn with_retry<T>(delay: Duration, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(e) if e.is_retryable() => {
            debug!(error = %e, "Retrying after I/O failure");
            std::thread::sleep(delay);
            op()
        }
        other => other,
    }
}

/// Result of one full reconcile pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub scanned: usize,
    pub reconcile: ReconcileReport,
    pub assign: AssignReport,
}

/// Owns the store, directory cache, notifier and record locks.
#[derive(Debug)]
pub struct Engine {
    store: MailStore,
    directory: DirectoryCache,
    notifier: ChangeNotifier,
    locks: RecordLocks,
    policy: Policy,
}

impl Engine {
    pub fn new(store: MailStore, directory: DirectoryCache, policy: Policy) -> Self {
        Self {
            store,
            directory,
            notifier: ChangeNotifier::new(),
            locks: RecordLocks::new(),
            policy,
        }
    }

    /// Open the tree at `config.general.root` and load the directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = MailStore::open(&config.general.root, config.general.date_offset())?;
        let directory = DirectoryCache::load(store.layout().clone());
        Ok(Self::new(store, directory, Policy::from_config(config)))
    }

    pub fn store(&self) -> &MailStore {
        &self.store
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn assigner(&self) -> AutoAssigner<'_> {
        AutoAssigner::new(&self.store, &self.locks, &self.notifier, self.policy)
    }

    pub fn reclassifier(&self) -> Reclassifier<'_> {
        Reclassifier::new(&self.store, &self.locks, &self.notifier, self.policy)
    }

    pub fn actions(&self) -> Actions<'_> {
        Actions::new(self)
    }

    pub(crate) fn locks(&self) -> &RecordLocks {
        &self.locks
    }

    /// Full pass: refresh the directory, reclassify every record, then
    /// auto-assign whatever is still unassigned.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.directory.refresh();
        let directory = self.directory.snapshot();

        let mut records = self.store.list_valid(Scope::All);
        let reconcile = self.reclassifier().reconcile(&mut records, now);

        let assigner = self.assigner();
        let mut assign = AssignReport::default();
        for record in records.iter().filter(|r| !r.is_assigned()) {
            assign.record(&assigner.try_auto_assign(record, &directory, now));
        }

        self.locks.prune();

        let report = TickReport {
            scanned: records.len(),
            reconcile,
            assign,
        };
        info!(
            scanned = report.scanned,
            moved = report.reconcile.moved,
            annotated = report.reconcile.annotated,
            assigned = report.assign.assigned,
            no_match = report.assign.no_group_match,
            failed = report.reconcile.failed + report.assign.failed,
            "Reconcile pass complete"
        );
        report
    }

    /// React to a single filesystem signal for `path`.
    ///
    /// `created` distinguishes a new file from a modification for the
    /// published event; both then go through reclassify and auto-assign.
    pub fn handle_path(&self, path: &Path, created: bool, now: DateTime<Utc>) {
        let layout = self.store.layout();
        if layout.is_directory_file(path) {
            debug!(path = %path.display(), "Directory record changed");
            self.directory.refresh();
            return;
        }
        if !layout.is_mail_file(path) {
            return;
        }

        let record = match self.store.read(path) {
            Ok(record) => record,
            Err(TriageError::NotFound(_)) => {
                let file_name = path
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                // A move already published `mailMoved`; only a file gone
                // from every state folder is a removal.
                match self.store.locate(&file_name) {
                    Some(current) => {
                        debug!(from = %path.display(), to = %current.display(), "Mail file moved");
                    }
                    None => self.notifier.emit(ChangeEvent::removed(&file_name)),
                }
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable mail file");
                return;
            }
        };

        if created {
            info!(id = %record.id, folder = %record.folder, "New mail detected");
            self.notifier.emit(ChangeEvent::added(&record));
        } else {
            self.notifier.emit(ChangeEvent::changed(&record));
        }

        let mut batch = [record];
        self.reclassifier().reconcile(&mut batch, now);
        let [record] = batch;

        if !record.is_assigned() {
            let directory = self.directory.snapshot();
            if let Err(e) = self.assigner().try_auto_assign(&record, &directory, now) {
                warn!(id = %record.id, error = %e, "Auto-assign failed");
            }
        }
    }
}

/// Current on-disk state of `record`, following it if it moved folders.
pub(crate) fn reread(store: &MailStore, record: &MailRecord) -> Result<MailRecord> {
    match store.read(&record.file_path) {
        Err(e) if e.is_not_found() => {
            let path = store
                .locate(&record.file_name())
                .ok_or_else(|| TriageError::NotFound(record.file_path.clone()))?;
            store.read(&path)
        }
        other => other,
    }
}
