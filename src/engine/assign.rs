//! Automatic assignment of senders to groups and PICs.
//!
//! Per record: `Unassigned → AssignedToPIC`, or `Unassigned → AssignedToGroup`
//! when the matching group has nobody in charge. An assigned record is never
//! touched again by this module; a human may still reassign it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::locks::RecordLocks;
use super::{reread, with_retry, Policy};
use crate::directory::{Directory, Resolution};
use crate::error::Result;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::mail::{AssignedBy, Assignee, Assignment, MailRecord};
use crate::store::MailStore;

/// Non-error outcomes of [`AutoAssigner::try_auto_assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// This call wrote the assignment.
    Assigned(Assignment),
    /// The record already had an assignment; nothing written.
    AlreadyAssigned,
    /// The sender belongs to no group; the record stays unassigned.
    NoGroupMatch,
    /// The file disappeared before it could be written.
    Vanished,
}

/// Tally of assignment outcomes over a pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AssignReport {
    /// Assigned to a PIC.
    pub assigned: usize,
    /// Assigned to a group without a PIC.
    pub group_only: usize,
    pub already_assigned: usize,
    pub no_group_match: usize,
    pub vanished: usize,
    pub failed: usize,
}

impl AssignReport {
    pub(crate) fn record(&mut self, outcome: &Result<AssignOutcome>) {
        match outcome {
            Ok(AssignOutcome::Assigned(a)) => match a.assignee {
                Assignee::Pic(_) => self.assigned += 1,
                Assignee::Group(_) => self.group_only += 1,
            },
            Ok(AssignOutcome::AlreadyAssigned) => self.already_assigned += 1,
            Ok(AssignOutcome::NoGroupMatch) => self.no_group_match += 1,
            Ok(AssignOutcome::Vanished) => self.vanished += 1,
            Err(e) => {
                warn!(error = %e, "Auto-assign failed");
                self.failed += 1;
            }
        }
    }
}

/// Writes system assignments, at most once per record.
pub struct AutoAssigner<'a> {
    store: &'a MailStore,
    locks: &'a RecordLocks,
    notifier: &'a ChangeNotifier,
    policy: Policy,
}

impl<'a> AutoAssigner<'a> {
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

    /// Resolve and persist an assignment for an unassigned record.
    ///
    /// Idempotent: the assignment field is re-read inside the record's
    /// critical section right before writing, and a record found already
    /// assigned is left alone. Two concurrent calls on the same record
    /// therefore produce exactly one write and one `RecordAssigned` event.
    ///
    /// Errors are disk failures that persisted through one retry; the record
    /// is left as it was.
    pub fn try_auto_assign(
        &self,
        record: &MailRecord,
        directory: &Directory,
        now: DateTime<Utc>,
    ) -> Result<AssignOutcome> {
        if record.is_assigned() {
            return Ok(AssignOutcome::AlreadyAssigned);
        }

        let assignee = match directory.resolve(&record.sender) {
            Resolution::NoGroupMatch => {
                debug!(id = %record.id, sender = %record.sender, "No group for sender");
                return Ok(AssignOutcome::NoGroupMatch);
            }
            Resolution::GroupOnly(group) => {
                info!(
                    id = %record.id,
                    group = %group.group_name,
                    "Group has no PIC; assigning to group"
                );
                Assignee::Group(group)
            }
            Resolution::Pic(pic) => Assignee::Pic(pic),
        };

        let _guard = self.locks.lock(&record.file_name());

        let mut current = match reread(self.store, record) {
            Ok(current) => current,
            Err(e) if e.is_not_found() => return Ok(AssignOutcome::Vanished),
            Err(e) => return Err(e),
        };
        if current.is_assigned() {
            debug!(id = %current.id, "Assigned concurrently; skipping");
            return Ok(AssignOutcome::AlreadyAssigned);
        }

        let assignment = Assignment {
            assignee,
            assigned_at: now,
            assigned_by: AssignedBy::System,
        };
        current.assignment = Some(assignment.clone());

        match with_retry(self.policy.retry_delay, || self.store.write(&current)) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(AssignOutcome::Vanished),
            Err(e) => return Err(e),
        }

        info!(
            id = %current.id,
            sender = %current.sender,
            assignee = %assignment.assignee.label(),
            "Auto-assigned mail"
        );
        self.notifier.emit(ChangeEvent::assigned(&current));
        Ok(AssignOutcome::Assigned(assignment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::normalize;
    use crate::model::directory::{Group, Pic};
    use chrono::FixedOffset;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, MailStore, Directory) {
        let tmp = TempDir::new().expect("tmp");
        let store =
            MailStore::open(tmp.path(), FixedOffset::east_opt(0).expect("offset")).expect("open");
        let directory = Directory::new(
            vec![Group {
                id: "g1".into(),
                name: "Marketing".into(),
                members: [normalize("a@gmail.com")].into_iter().collect(),
                pic: None,
                pic_email: None,
            }],
            vec![Pic {
                id: "p1".into(),
                name: "John Doe".into(),
                email: "john@corp.com".into(),
                group_leaderships: ["g1".to_string()].into_iter().collect(),
            }],
        );
        (tmp, store, directory)
    }

    fn put(store: &MailStore, from: &str) -> MailRecord {
        let path = store.layout().root().join("DungHan/mustRep/m1.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"id": "m1", "Subject": "S", "From": "{from}", "Date": ["2025-10-09", "10:00"], "Status": "New"}}"#
            ),
        )
        .expect("write");
        store.read(&path).expect("read")
    }

    #[test]
    fn test_already_assigned_in_memory_is_noop() {
        let (_tmp, store, directory) = fixture();
        let locks = RecordLocks::new();
        let notifier = ChangeNotifier::new();
        let assigner = AutoAssigner::new(&store, &locks, &notifier, Policy::default());

        let mut rec = put(&store, "a@gmail.com");
        rec.assignment = Some(Assignment {
            assignee: Assignee::Group(crate::model::mail::GroupAssignee {
                group_id: "g9".into(),
                group_name: "Manual".into(),
            }),
            assigned_at: Utc::now(),
            assigned_by: AssignedBy::Human,
        });
        let outcome = assigner
            .try_auto_assign(&rec, &directory, Utc::now())
            .expect("ok");
        assert_eq!(outcome, AssignOutcome::AlreadyAssigned);
    }

    #[test]
    fn test_stale_copy_sees_disk_assignment() {
        let (_tmp, store, directory) = fixture();
        let locks = RecordLocks::new();
        let notifier = ChangeNotifier::new();
        let assigner = AutoAssigner::new(&store, &locks, &notifier, Policy::default());

        let stale = put(&store, "a@gmail.com");
        let first = assigner
            .try_auto_assign(&stale, &directory, Utc::now())
            .expect("ok");
        assert!(matches!(first, AssignOutcome::Assigned(_)));

        // `stale` still says unassigned; the re-read must catch it.
        let second = assigner
            .try_auto_assign(&stale, &directory, Utc::now())
            .expect("ok");
        assert_eq!(second, AssignOutcome::AlreadyAssigned);
    }

    #[test]
    fn test_vanished_file() {
        let (_tmp, store, directory) = fixture();
        let locks = RecordLocks::new();
        let notifier = ChangeNotifier::new();
        let assigner = AutoAssigner::new(&store, &locks, &notifier, Policy::default());

        let rec = put(&store, "a@gmail.com");
        std::fs::remove_file(&rec.file_path).expect("rm");
        let outcome = assigner
            .try_auto_assign(&rec, &directory, Utc::now())
            .expect("ok");
        assert_eq!(outcome, AssignOutcome::Vanished);
    }
}
