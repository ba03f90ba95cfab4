//! Folder counts for the dashboard badges.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::mail::{Folder, MailRecord};
use crate::store::{MailStore, Scope};

/// Per-folder record counts plus assignment totals.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
    pub must_reply: usize,
    pub replied: usize,
    pub not_replied: usize,
    pub late_replied: usize,
    pub pending: usize,
    pub processed: usize,
    pub unassigned: usize,
    /// Record count per assignee label (PIC name or group name).
    pub by_assignee: BTreeMap<String, usize>,
}

impl FolderStats {
    /// Count every readable record under the store root.
    pub fn collect(store: &MailStore) -> Self {
        Self::from_records(&store.list_valid(Scope::All))
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MailRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            *stats.slot(record.folder) += 1;
            match &record.assignment {
                Some(a) => *stats.by_assignee.entry(a.assignee.label().to_string()).or_default() += 1,
                None => stats.unassigned += 1,
            }
        }
        stats
    }

    pub fn count(&self, folder: Folder) -> usize {
        match folder {
            Folder::ValidMustReply => self.must_reply,
            Folder::ValidReplied => self.replied,
            Folder::ExpiredNotReplied => self.not_replied,
            Folder::ExpiredReplied => self.late_replied,
            Folder::ReviewPending => self.pending,
            Folder::ReviewProcessed => self.processed,
        }
    }

    pub fn total(&self) -> usize {
        Folder::ALL.into_iter().map(|f| self.count(f)).sum()
    }

    /// Mail still needing attention: `mustRep + chuaRep + pending`.
    pub fn warning_total(&self) -> usize {
        self.must_reply + self.not_replied + self.pending
    }

    fn slot(&mut self, folder: Folder) -> &mut usize {
        match folder {
            Folder::ValidMustReply => &mut self.must_reply,
            Folder::ValidReplied => &mut self.replied,
            Folder::ExpiredNotReplied => &mut self.not_replied,
            Folder::ExpiredReplied => &mut self.late_replied,
            Folder::ReviewPending => &mut self.pending,
            Folder::ReviewProcessed => &mut self.processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::path::PathBuf;

    fn record(folder: Folder) -> MailRecord {
        MailRecord {
            id: "m".into(),
            folder,
            file_path: PathBuf::from("m.json"),
            subject: String::new(),
            sender: "a@gmail.com".into(),
            recipient: None,
            sent_at: Utc::now(),
            summary: None,
            read_state: None,
            assignment: None,
            original_category: None,
            original_status: None,
            processed_at: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_warning_total() {
        let records = [
            record(Folder::ValidMustReply),
            record(Folder::ValidMustReply),
            record(Folder::ValidReplied),
            record(Folder::ExpiredNotReplied),
            record(Folder::ReviewPending),
            record(Folder::ReviewProcessed),
        ];
        let stats = FolderStats::from_records(&records);
        assert_eq!(stats.total(), 6);
        assert_eq!(stats.warning_total(), 4);
        assert_eq!(stats.count(Folder::ValidMustReply), 2);
        assert_eq!(stats.unassigned, 6);
    }

    #[test]
    fn test_collect_from_store() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let store =
            MailStore::open(tmp.path(), FixedOffset::east_opt(0).expect("offset")).expect("open");
        std::fs::write(
            tmp.path().join("QuaHan/daRep/m1.json"),
            r#"{"id": "m1", "From": "a@gmail.com", "Date": ["2025-10-09", "10:00"]}"#,
        )
        .expect("write");
        let stats = FolderStats::collect(&store);
        assert_eq!(stats.late_replied, 1);
        assert_eq!(stats.warning_total(), 0);
    }
}
