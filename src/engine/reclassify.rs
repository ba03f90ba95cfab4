//! Time-based reclassification between the Valid and Expired buckets.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::locks::RecordLocks;
use super::{reread, with_retry, Policy};
use crate::error::Result;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::mail::{Category, Folder, MailRecord, OriginalCategory};
use crate::store::MailStore;

/// Counts from one [`Reclassifier::reconcile`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Files relocated between state folders.
    pub moved: usize,
    /// Review mail whose `originalCategory`/`originalStatus` was rewritten.
    pub annotated: usize,
    pub unchanged: usize,
    pub vanished: usize,
    pub failed: usize,
}

/// What a record needs to match the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Keep,
    Move(Folder),
    Annotate(OriginalCategory, Folder),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Moved,
    Annotated,
    Unchanged,
    Vanished,
}

pub struct Reclassifier<'a> {
    store: &'a MailStore,
    locks: &'a RecordLocks,
    notifier: &'a ChangeNotifier,
    policy: Policy,
}

impl<'a> Reclassifier<'a> {
    pub fn new(
        store: &'a MailStore,
        locks: &'a RecordLocks,
        notifier: &'a ChangeNotifier,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            locks,
            notifier,
            policy,
        }
    }

    /// Bring every record in line with `now`.
    ///
    /// Valid/Expired mail is moved to the folder its age and reply state
    /// imply. Pending review mail only gets its original timeliness
    /// rewritten in place. Processed review mail is never touched.
    ///
    /// Records are updated in place to their post-pass state. A failing
    /// record is logged and counted; the rest of the batch still runs.
    pub fn reconcile(&self, records: &mut [MailRecord], now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for record in records.iter_mut() {
            match self.reconcile_one(record, now) {
                Ok(Step::Moved) => report.moved += 1,
                Ok(Step::Annotated) => report.annotated += 1,
                Ok(Step::Unchanged) => report.unchanged += 1,
                Ok(Step::Vanished) => report.vanished += 1,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Reclassification failed; leaving record as is");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn target(&self, record: &MailRecord, now: DateTime<Utc>) -> Target {
        let expired = record.is_expired_at(now, self.policy.response_window);
        match record.category() {
            Category::Valid | Category::Expired => {
                let folder = Folder::for_age(expired, record.is_replied());
                if folder == record.folder {
                    Target::Keep
                } else {
                    Target::Move(folder)
                }
            }
            Category::UnderReview if record.folder == Folder::ReviewPending => {
                let category = OriginalCategory::from_expired(expired);
                let status = Folder::for_age(expired, false);
                if record.original_category == Some(category)
                    && record.original_status == Some(status)
                {
                    Target::Keep
                } else {
                    Target::Annotate(category, status)
                }
            }
            Category::UnderReview => Target::Keep,
        }
    }

    fn reconcile_one(&self, record: &mut MailRecord, now: DateTime<Utc>) -> Result<Step> {
        if self.target(record, now) == Target::Keep {
            return Ok(Step::Unchanged);
        }

        let _guard = self.locks.lock(&record.file_name());

        let mut current = match reread(self.store, record) {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                debug!(id = %record.id, "Mail vanished before reclassification");
                return Ok(Step::Vanished);
            }
            Err(e) => return Err(e),
        };

        let step = match self.target(&current, now) {
            Target::Keep => Step::Unchanged,
            Target::Move(folder) => {
                let from = current.folder;
                // A failed relocate leaves `current` at the source, so the
                // retry starts over.
                with_retry(self.policy.retry_delay, || {
                    self.store.relocate(&mut current, folder)
                })?;
                debug!(id = %current.id, from = %from, to = %folder, "Reclassified mail");
                self.notifier.emit(ChangeEvent::moved(&current, from));
                Step::Moved
            }
            Target::Annotate(category, status) => {
                current.original_category = Some(category);
                current.original_status = Some(status);
                with_retry(self.policy.retry_delay, || self.store.write(&current))?;
                debug!(id = %current.id, original = ?category, "Updated review timeliness");
                self.notifier.emit(ChangeEvent::changed(&current));
                Step::Annotated
            }
        };

        *record = current;
        Ok(step)
    }
}
