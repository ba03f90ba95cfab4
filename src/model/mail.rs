//! Mail record, folder state and assignment types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;

/// Time-based or manual bucket a mail lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Valid,
    Expired,
    UnderReview,
}

/// Sub-state within a [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Valid and awaiting a reply.
    MustReply,
    /// Expired and never replied.
    NotReplied,
    /// Replied (Valid or Expired).
    Replied,
    /// Under review, not yet handled.
    Pending,
    /// Under review, handled.
    Processed,
}

/// One of the six physical state folders.
///
/// The folder a file sits in is the authoritative encoding of its
/// category and status; a [`MailRecord`] carries exactly one `Folder`
/// so the two logical fields cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Folder {
    ValidMustReply,
    ValidReplied,
    ExpiredNotReplied,
    ExpiredReplied,
    ReviewPending,
    ReviewProcessed,
}

impl Folder {
    pub const ALL: [Folder; 6] = [
        Folder::ValidMustReply,
        Folder::ValidReplied,
        Folder::ExpiredNotReplied,
        Folder::ExpiredReplied,
        Folder::ReviewPending,
        Folder::ReviewProcessed,
    ];

    pub fn category(self) -> Category {
        match self {
            Self::ValidMustReply | Self::ValidReplied => Category::Valid,
            Self::ExpiredNotReplied | Self::ExpiredReplied => Category::Expired,
            Self::ReviewPending | Self::ReviewProcessed => Category::UnderReview,
        }
    }

    pub fn status(self) -> Status {
        match self {
            Self::ValidMustReply => Status::MustReply,
            Self::ExpiredNotReplied => Status::NotReplied,
            Self::ValidReplied | Self::ExpiredReplied => Status::Replied,
            Self::ReviewPending => Status::Pending,
            Self::ReviewProcessed => Status::Processed,
        }
    }

    /// Reply state as implied by the folder alone.
    pub fn is_replied(self) -> bool {
        matches!(
            self,
            Self::ValidReplied | Self::ExpiredReplied | Self::ReviewProcessed
        )
    }

    /// Top-level directory name.
    pub fn category_dir(self) -> &'static str {
        match self.category() {
            Category::Valid => "DungHan",
            Category::Expired => "QuaHan",
            Category::UnderReview => "ReviewMail",
        }
    }

    /// Second-level directory name. Unique across all six folders.
    pub fn status_dir(self) -> &'static str {
        match self {
            Self::ValidMustReply => "mustRep",
            Self::ValidReplied => "rep",
            Self::ExpiredNotReplied => "chuaRep",
            Self::ExpiredReplied => "daRep",
            Self::ReviewPending => "pending",
            Self::ReviewProcessed => "processed",
        }
    }

    /// Inverse of ([`category_dir`](Self::category_dir), [`status_dir`](Self::status_dir)).
    pub fn from_dirs(category: &str, status: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.category_dir() == category && f.status_dir() == status)
    }

    /// Look a folder up by its status directory name alone.
    pub fn from_status_dir(status: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.status_dir() == status)
    }

    /// Time-based folder for a mail of the given age and reply state.
    pub fn for_age(expired: bool, replied: bool) -> Self {
        match (expired, replied) {
            (false, false) => Self::ValidMustReply,
            (false, true) => Self::ValidReplied,
            (true, false) => Self::ExpiredNotReplied,
            (true, true) => Self::ExpiredReplied,
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category_dir(), self.status_dir())
    }
}

/// Timeliness of a mail that was pulled into review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginalCategory {
    #[serde(rename = "Valid", alias = "DungHan", alias = "On-time")]
    OnTime,
    #[serde(rename = "Expired", alias = "QuaHan", alias = "Overdue")]
    Overdue,
}

impl OriginalCategory {
    pub fn from_expired(expired: bool) -> Self {
        if expired {
            Self::Overdue
        } else {
            Self::OnTime
        }
    }
}

/// Who made an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignedBy {
    #[serde(rename = "system_auto")]
    System,
    #[serde(rename = "manual")]
    Human,
}

/// A resolved person-in-charge as stored on a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PicAssignee {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "super::opt_id_from_string_or_number"
    )]
    pub pic_id: Option<String>,
    pub pic_name: String,
    pub pic_email: String,
    #[serde(deserialize_with = "super::id_from_string_or_number")]
    pub group_id: String,
    pub group_name: String,
}

/// A group-level assignment (group known, no PIC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAssignee {
    #[serde(deserialize_with = "super::id_from_string_or_number")]
    pub group_id: String,
    pub group_name: String,
}

/// Target of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Assignee {
    Pic(PicAssignee),
    Group(GroupAssignee),
}

impl Assignee {
    /// Short human label: PIC name, or group name for group assignments.
    pub fn label(&self) -> &str {
        match self {
            Self::Pic(p) => &p.pic_name,
            Self::Group(g) => &g.group_name,
        }
    }

    pub fn group_id(&self) -> &str {
        match self {
            Self::Pic(p) => &p.group_id,
            Self::Group(g) => &g.group_id,
        }
    }
}

/// The `assignedTo` object of a mail file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(flatten)]
    pub assignee: Assignee,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: AssignedBy,
}

/// One email's tracked state.
///
/// `folder` and `file_path` are always derived from where the file was
/// read from (or is about to be written to), never from stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MailRecord {
    /// Unique, immutable id.
    pub id: String,
    /// Physical state folder.
    pub folder: Folder,
    /// Current location of the backing file.
    pub file_path: PathBuf,
    pub subject: String,
    /// Raw `From` value.
    pub sender: String,
    pub recipient: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub summary: Option<String>,
    /// Upstream read flag (`Status`: "New", "Read", ...). Unrelated to the folder.
    pub read_state: Option<String>,
    pub assignment: Option<Assignment>,
    /// Timeliness when pulled into review.
    pub original_category: Option<OriginalCategory>,
    /// Time-based folder the mail would occupy had it not been pulled into review.
    pub original_status: Option<Folder>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Keys this crate does not interpret, preserved verbatim on write.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MailRecord {
    pub fn category(&self) -> Category {
        self.folder.category()
    }

    pub fn status(&self) -> Status {
        self.folder.status()
    }

    /// Reply state, derived exclusively from the folder.
    pub fn is_replied(&self) -> bool {
        self.folder.is_replied()
    }

    pub fn sender_address(&self) -> EmailAddress {
        EmailAddress::parse(&self.sender)
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// File name shared by every location this record can move between.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.json", self.id))
    }

    /// Whether `sent_at` lies at least `window` before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.sent_at) >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_dirs_roundtrip() {
        for folder in Folder::ALL {
            assert_eq!(
                Folder::from_dirs(folder.category_dir(), folder.status_dir()),
                Some(folder)
            );
            assert_eq!(Folder::from_status_dir(folder.status_dir()), Some(folder));
        }
        assert_eq!(Folder::from_dirs("DungHan", "daRep"), None);
    }

    #[test]
    fn test_folder_encoding_is_exact() {
        assert_eq!(Folder::ValidMustReply.to_string(), "DungHan/mustRep");
        assert_eq!(Folder::ValidReplied.to_string(), "DungHan/rep");
        assert_eq!(Folder::ExpiredNotReplied.to_string(), "QuaHan/chuaRep");
        assert_eq!(Folder::ExpiredReplied.to_string(), "QuaHan/daRep");
        assert_eq!(Folder::ReviewPending.to_string(), "ReviewMail/pending");
        assert_eq!(Folder::ReviewProcessed.to_string(), "ReviewMail/processed");
    }

    #[test]
    fn test_for_age() {
        assert_eq!(Folder::for_age(false, false), Folder::ValidMustReply);
        assert_eq!(Folder::for_age(true, false), Folder::ExpiredNotReplied);
        assert_eq!(Folder::for_age(true, true), Folder::ExpiredReplied);
        assert_eq!(Folder::for_age(false, true).status(), Status::Replied);
    }

    #[test]
    fn test_assignment_wire_shape() {
        let json = r#"{
            "type": "pic",
            "picId": 1759336936889,
            "picName": "Dương",
            "picEmail": "duongnguyen@gmail.com",
            "groupId": "1757390072466",
            "groupName": "Galaxy Store",
            "assignedAt": "2025-10-09T21:30:00.000Z",
            "assignedBy": "system_auto"
        }"#;
        let a: Assignment = serde_json::from_str(json).expect("parse");
        assert_eq!(a.assigned_by, AssignedBy::System);
        match &a.assignee {
            Assignee::Pic(p) => {
                assert_eq!(p.pic_id.as_deref(), Some("1759336936889"));
                assert_eq!(p.group_name, "Galaxy Store");
            }
            other => panic!("expected PIC, got {other:?}"),
        }

        let back = serde_json::to_value(&a).expect("serialize");
        assert_eq!(back["type"], "pic");
        assert_eq!(back["picId"], "1759336936889");
    }

    #[test]
    fn test_group_assignment_has_no_pic_fields() {
        let a = Assignment {
            assignee: Assignee::Group(GroupAssignee {
                group_id: "g1".into(),
                group_name: "Marketing".into(),
            }),
            assigned_at: Utc::now(),
            assigned_by: AssignedBy::Human,
        };
        let v = serde_json::to_value(&a).expect("serialize");
        assert_eq!(v["type"], "group");
        assert_eq!(v["assignedBy"], "manual");
        assert!(v.get("picName").is_none());
    }

    #[test]
    fn test_original_category_aliases() {
        let legacy: OriginalCategory = serde_json::from_str("\"QuaHan\"").expect("alias");
        assert_eq!(legacy, OriginalCategory::Overdue);
        let modern: OriginalCategory = serde_json::from_str("\"Valid\"").expect("alias");
        assert_eq!(modern, OriginalCategory::OnTime);
        let display: OriginalCategory = serde_json::from_str("\"Overdue\"").expect("alias");
        assert_eq!(display, OriginalCategory::Overdue);
        assert_eq!(
            serde_json::to_string(&OriginalCategory::OnTime).expect("ser"),
            "\"Valid\""
        );
        assert_eq!(
            serde_json::to_string(&OriginalCategory::Overdue).expect("ser"),
            "\"Expired\""
        );
    }
}
