//! Actions a human takes from the dashboard.
//!
//! These share the record critical sections with the automatic engine, so a
//! manual move never interleaves with a reclassification of the same file.

use chrono::{DateTime, Utc};
use tracing::info;

use super::assign::AssignOutcome;
use super::{reread, with_retry, Engine};
use crate::error::{Result, TriageError};
use crate::events::ChangeEvent;
use crate::model::mail::{
    AssignedBy, Assignee, Assignment, Category, Folder, GroupAssignee, MailRecord,
    OriginalCategory, PicAssignee,
};

pub struct Actions<'a> {
    engine: &'a Engine,
}

impl<'a> Actions<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Build an assignee from directory ids.
    ///
    /// Without `pic_id` the mail is assigned to the group alone.
    pub fn manual_assignee(&self, group_id: &str, pic_id: Option<&str>) -> Result<Assignee> {
        let directory = self.engine.directory().snapshot();
        let group = directory
            .group(group_id)
            .ok_or_else(|| TriageError::UnknownAssignee(format!("group '{group_id}'")))?;
        match pic_id {
            None => Ok(Assignee::Group(GroupAssignee {
                group_id: group.id.clone(),
                group_name: group.name.clone(),
            })),
            Some(pic_id) => {
                let pic = directory
                    .pic(pic_id)
                    .ok_or_else(|| TriageError::UnknownAssignee(format!("PIC '{pic_id}'")))?;
                Ok(Assignee::Pic(PicAssignee {
                    pic_id: Some(pic.id.clone()),
                    pic_name: pic.name.clone(),
                    pic_email: pic.email.clone(),
                    group_id: group.id.clone(),
                    group_name: group.name.clone(),
                }))
            }
        }
    }

    /// Overwrite the assignment of `id`, marking it as made by a human.
    ///
    /// Allowed from every folder. The automatic engine never touches the
    /// record afterwards.
    pub fn assign_manually(
        &self,
        id: &str,
        assignee: Assignee,
        now: DateTime<Utc>,
    ) -> Result<MailRecord> {
        self.locked(id, |current| {
            current.assignment = Some(Assignment {
                assignee,
                assigned_at: now,
                assigned_by: AssignedBy::Human,
            });
            self.write(current)?;
            info!(id = %current.id, "Mail assigned manually");
            self.engine.notifier().emit(ChangeEvent::assigned(current));
            Ok(())
        })
    }

    /// Mark a Valid or Expired mail as replied, keeping its timeliness.
    pub fn mark_replied(&self, id: &str) -> Result<MailRecord> {
        self.locked(id, |current| {
            let target = match current.folder {
                Folder::ValidMustReply => Folder::ValidReplied,
                Folder::ExpiredNotReplied => Folder::ExpiredReplied,
                other if other.is_replied() => {
                    return Err(invalid(current, "already replied"));
                }
                _ => return Err(invalid(current, "mail is under review")),
            };
            self.relocate(current, target)
        })
    }

    /// Pull a Valid or Expired mail out of the time-based flow into
    /// `ReviewMail/processed`.
    ///
    /// Records whether it was on time and where it came from.
    pub fn move_to_review(&self, id: &str, now: DateTime<Utc>) -> Result<MailRecord> {
        let window = self.engine.policy().response_window;
        self.locked(id, |current| {
            if current.category() == Category::UnderReview {
                return Err(invalid(current, "already under review"));
            }
            current.original_category = Some(OriginalCategory::from_expired(
                current.is_expired_at(now, window),
            ));
            current.original_status = Some(current.folder);
            current.processed_at = Some(now);
            self.relocate(current, Folder::ReviewProcessed)
        })
    }

    /// Finish a pending review.
    pub fn mark_processed(&self, id: &str, now: DateTime<Utc>) -> Result<MailRecord> {
        self.locked(id, |current| {
            if current.folder != Folder::ReviewPending {
                return Err(invalid(current, "only pending review mail can be processed"));
            }
            current.processed_at = Some(now);
            self.relocate(current, Folder::ReviewProcessed)
        })
    }

    /// Store a newly arrived mail, announce it, and try to auto-assign it.
    pub fn ingest(&self, record: MailRecord, now: DateTime<Utc>) -> Result<MailRecord> {
        let engine = self.engine;
        let mut stored = engine
            .store()
            .ingest(record, now, engine.policy().response_window)?;
        engine.notifier().emit(ChangeEvent::added(&stored));

        let directory = engine.directory().snapshot();
        if let AssignOutcome::Assigned(assignment) =
            engine.assigner().try_auto_assign(&stored, &directory, now)?
        {
            stored.assignment = Some(assignment);
        }
        Ok(stored)
    }

    /// Run `op` on the freshest copy of `id` inside its critical section.
    fn locked(
        &self,
        id: &str,
        op: impl FnOnce(&mut MailRecord) -> Result<()>,
    ) -> Result<MailRecord> {
        let store = self.engine.store();
        let found = store.find_by_id(id)?;
        let _guard = self.engine.locks().lock(&found.file_name());
        let mut current = reread(store, &found)?;
        op(&mut current)?;
        Ok(current)
    }

    fn write(&self, record: &MailRecord) -> Result<()> {
        let store = self.engine.store();
        with_retry(self.engine.policy().retry_delay, || store.write(record))
    }

    fn relocate(&self, record: &mut MailRecord, folder: Folder) -> Result<()> {
        let store = self.engine.store();
        let from = record.folder;
        with_retry(self.engine.policy().retry_delay, || {
            store.relocate(record, folder)
        })?;
        info!(id = %record.id, from = %from, to = %folder, "Mail moved by user action");
        self.engine.notifier().emit(ChangeEvent::moved(record, from));
        Ok(())
    }
}

fn invalid(record: &MailRecord, reason: &str) -> TriageError {
    TriageError::InvalidTransition {
        id: record.id.clone(),
        reason: format!("{reason} (in {})", record.folder),
    }
}
