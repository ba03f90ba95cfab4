//! JSON codec for mail files.
//!
//! Field names follow the upstream classifier (`Subject`, `From`, `Date`, ...).
//! Keys this crate does not interpret are carried through untouched.
//! `category`, `status`, `filePath` and `isReplied` are written as a cache of
//! the folder the file is written into and ignored on read.

use std::path::Path;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::model::mail::{Assignment, Folder, MailRecord, OriginalCategory};

#[derive(Debug, Serialize, Deserialize)]
struct MailFile {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::model::opt_id_from_string_or_number"
    )]
    id: Option<String>,
    #[serde(rename = "Subject", default)]
    subject: String,
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "To", default, skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(rename = "Date")]
    date: Vec<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    read_state: Option<String>,
    #[serde(
        rename = "SummaryContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    summary: Option<String>,
    #[serde(rename = "assignedTo", default, skip_serializing_if = "Option::is_none")]
    assigned_to: Option<Assignment>,
    #[serde(rename = "isReplied", default, skip_serializing_if = "Option::is_none")]
    is_replied: Option<bool>,
    #[serde(
        rename = "originalCategory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    original_category: Option<OriginalCategory>,
    #[serde(
        rename = "originalStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    original_status: Option<String>,
    #[serde(
        rename = "processedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    processed_date: Option<DateTime<Utc>>,
    #[serde(rename = "category", default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(rename = "status", default, skip_serializing_if = "Option::is_none")]
    folder_status: Option<String>,
    #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Decode a mail file that was read from `path`, which sits in `folder`.
pub fn decode(
    path: &Path,
    folder: Folder,
    bytes: &[u8],
    offset: FixedOffset,
) -> Result<MailRecord> {
    let file: MailFile = serde_json::from_slice(bytes).map_err(|e| TriageError::parse(path, e))?;

    let sent_at = parse_date_pair(&file.date, offset).ok_or_else(|| TriageError::InvalidDate {
        path: path.to_path_buf(),
        raw: format!("{:?}", file.date),
    })?;

    let id = match file.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| TriageError::parse(path, "missing id and file stem"))?,
    };

    Ok(MailRecord {
        id,
        folder,
        file_path: path.to_path_buf(),
        subject: file.subject,
        sender: file.from,
        recipient: file.to,
        sent_at,
        summary: file.summary,
        read_state: file.read_state,
        assignment: file.assigned_to,
        original_category: file.original_category,
        original_status: file
            .original_status
            .as_deref()
            .and_then(Folder::from_status_dir),
        processed_at: file.processed_date,
        extra: file.extra,
    })
}

/// Encode a record for writing at `record.file_path`.
pub fn encode(record: &MailRecord, offset: FixedOffset) -> Result<Vec<u8>> {
    let file = MailFile {
        id: Some(record.id.clone()),
        subject: record.subject.clone(),
        from: record.sender.clone(),
        to: record.recipient.clone(),
        date: format_date_pair(record.sent_at, offset),
        read_state: record.read_state.clone(),
        summary: record.summary.clone(),
        assigned_to: record.assignment.clone(),
        is_replied: Some(record.is_replied()),
        original_category: record.original_category,
        original_status: record.original_status.map(|f| f.status_dir().to_string()),
        processed_date: record.processed_at,
        category: Some(record.folder.category_dir().to_string()),
        folder_status: Some(record.folder.status_dir().to_string()),
        file_path: Some(record.file_path.display().to_string()),
        extra: record.extra.clone(),
    };
    serde_json::to_vec_pretty(&file).map_err(|e| TriageError::parse(&record.file_path, e))
}

/// Interpret `["YYYY-MM-DD", "HH:MM"]` as a wall-clock time at `offset`.
pub fn parse_date_pair(pair: &[String], offset: FixedOffset) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(pair.first()?.trim(), "%Y-%m-%d").ok()?;
    let time = match pair.get(1).map(|t| t.trim()) {
        Some(t) if !t.is_empty() => NaiveTime::parse_from_str(t, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
            .ok()?,
        _ => NaiveTime::MIN,
    };
    let local = NaiveDateTime::new(date, time);
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_date_pair(at: DateTime<Utc>, offset: FixedOffset) -> Vec<String> {
    let local = at.with_timezone(&offset);
    let time = if local.second() == 0 {
        local.format("%H:%M")
    } else {
        local.format("%H:%M:%S")
    };
    vec![local.format("%Y-%m-%d").to_string(), time.to_string()]
}
