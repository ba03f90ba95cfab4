//! Mail record store: the filesystem tree as a database.
//!
//! One JSON file per mail. The state folder a file sits in is the
//! record's category and status, so a status transition is a file move.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::layout::Layout;
use super::wire;
use crate::error::{Result, TriageError};
use crate::model::mail::{Category, Folder, MailRecord};

/// Which part of the tree [`MailStore::list`] scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Category(Category),
    Folder(Folder),
}

impl Scope {
    fn folders(self) -> Vec<Folder> {
        Folder::ALL
            .into_iter()
            .filter(|f| match self {
                Scope::All => true,
                Scope::Category(c) => f.category() == c,
                Scope::Folder(only) => *f == only,
            })
            .collect()
    }
}

/// Reads and writes mail records under one root.
#[derive(Debug, Clone)]
pub struct MailStore {
    layout: Layout,
    offset: FixedOffset,
}

impl MailStore {
    /// Open a store, creating the state folders if needed.
    ///
    /// `offset` is the wall-clock offset of the `Date` pairs in mail files.
    pub fn open(root: impl Into<PathBuf>, offset: FixedOffset) -> Result<Self> {
        let root = root.into();
        Layout::new(&root).ensure_dirs()?;
        // Re-resolve now that the root exists and can be canonicalized.
        Ok(Self {
            layout: Layout::new(root),
            offset,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Lazily scan `scope`. Each call re-walks the tree.
    ///
    /// Items are `Err` for files that failed to parse or vanished between
    /// directory listing and read.
    pub fn list(&self, scope: Scope) -> impl Iterator<Item = Result<MailRecord>> + '_ {
        scope
            .folders()
            .into_iter()
            .flat_map(move |folder| {
                WalkDir::new(self.layout.folder_dir(folder))
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
            })
            .filter(move |path| self.layout.is_mail_file(path))
            .map(move |path| self.read(&path))
    }

    /// Scan `scope`, logging and skipping files that cannot be read.
    pub fn list_valid(&self, scope: Scope) -> Vec<MailRecord> {
        self.list(scope)
            .filter_map(|item| match item {
                Ok(record) => Some(record),
                Err(e) if e.is_not_found() => {
                    debug!(error = %e, "Mail vanished during scan");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable mail file");
                    None
                }
            })
            .collect()
    }

    /// Read one mail file.
    pub fn read(&self, path: &Path) -> Result<MailRecord> {
        let folder = self.layout.folder_of(path)?;
        let bytes = std::fs::read(path).map_err(|e| TriageError::io(path, e))?;
        wire::decode(path, folder, &bytes, self.offset)
    }

    /// Atomically overwrite `record.file_path` with `record`.
    ///
    /// The folder cache fields are re-derived from the target path first, so
    /// a record can never be written with a status that disagrees with its folder.
    pub fn write(&self, record: &MailRecord) -> Result<()> {
        let path = &record.file_path;
        let folder = self.layout.folder_of(path)?;
        let mut record = record.clone();
        record.folder = folder;
        self.persist(path, &record)
    }

    /// Encode `record` and atomically replace `path` with it.
    fn persist(&self, path: &Path, record: &MailRecord) -> Result<()> {
        let bytes = wire::encode(record, self.offset)?;
        let dir = path
            .parent()
            .ok_or_else(|| TriageError::InvalidLayout(path.to_path_buf()))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TriageError::io(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| TriageError::io(path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| TriageError::io(path, e))?;
        tmp.persist(path)
            .map_err(|e| TriageError::io(path, e.error))?;

        debug!(id = %record.id, path = %path.display(), "Wrote mail record");
        Ok(())
    }

    /// Relocate a file between state folders.
    ///
    /// Same-volume moves are a single `rename`, so a concurrent reader sees
    /// the file in exactly one place. Refuses to clobber an existing target.
    pub fn move_record(&self, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            return Err(TriageError::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target exists"),
            ));
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TriageError::io(parent, e))?;
        }

        match std::fs::rename(from, to) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                self.copy_then_remove(from, to)?;
            }
            Err(e) => return Err(TriageError::io(from, e)),
        }

        info!(from = %from.display(), to = %to.display(), "Moved mail file");
        Ok(())
    }

    /// Cross-volume fallback: stage a copy beside the target, rename it into
    /// place, then drop the source.
    fn copy_then_remove(&self, from: &Path, to: &Path) -> Result<()> {
        let dir = to
            .parent()
            .ok_or_else(|| TriageError::InvalidLayout(to.to_path_buf()))?;
        let bytes = std::fs::read(from).map_err(|e| TriageError::io(from, e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TriageError::io(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| TriageError::io(to, e))?;
        tmp.persist_noclobber(to)
            .map_err(|e| TriageError::io(to, e.error))?;
        std::fs::remove_file(from).map_err(|e| TriageError::io(from, e))
    }

    /// Move `record` into `folder`.
    ///
    /// The new content is written in place first and the rename commits the
    /// move, so a failure at either step leaves the file in its old folder.
    /// On success the in-memory record reflects the new location.
    pub fn relocate(&self, record: &mut MailRecord, folder: Folder) -> Result<()> {
        let target = self.layout.path_for(folder, &record.file_name());
        if target == record.file_path {
            record.folder = folder;
            return self.write(record);
        }

        let mut moved = record.clone();
        moved.folder = folder;
        moved.file_path = target;
        self.persist(&record.file_path, &moved)?;

        if let Err(e) = self.move_record(&record.file_path, &moved.file_path) {
            if let Err(restore) = self.persist(&record.file_path, record) {
                warn!(
                    path = %record.file_path.display(),
                    error = %restore,
                    "Could not restore cache fields after failed move"
                );
            }
            return Err(e);
        }

        *record = moved;
        Ok(())
    }

    /// Current location of a file name, searching all six folders.
    pub fn locate(&self, file_name: &str) -> Option<PathBuf> {
        Folder::ALL
            .into_iter()
            .map(|f| self.layout.path_for(f, file_name))
            .find(|p| p.is_file())
    }

    /// Find a record by id. Tries `<id>.json` first, then scans.
    pub fn find_by_id(&self, id: &str) -> Result<MailRecord> {
        if let Some(path) = self.locate(&format!("{id}.json")) {
            if let Ok(record) = self.read(&path) {
                if record.id == id {
                    return Ok(record);
                }
            }
        }
        self.list(Scope::All)
            .filter_map(|item| item.ok())
            .find(|r| r.id == id)
            .ok_or_else(|| TriageError::RecordNotFound(id.to_string()))
    }

    /// Store a newly arrived mail in the time-based folder matching its age.
    ///
    /// An empty id is replaced by a fresh UUID; the file is named `<id>.json`.
    pub fn ingest(
        &self,
        mut record: MailRecord,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<MailRecord> {
        if record.id.trim().is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let folder = Folder::for_age(record.is_expired_at(now, window), false);
        let path = self.layout.path_for(folder, &format!("{}.json", record.id));
        if path.exists() || self.locate(&format!("{}.json", record.id)).is_some() {
            return Err(TriageError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "mail id already stored"),
            ));
        }
        record.folder = folder;
        record.file_path = path;
        self.write(&record)?;
        info!(id = %record.id, folder = %folder, "Ingested mail");
        Ok(record)
    }

    /// Decode an external mail JSON file for [`ingest`](Self::ingest).
    ///
    /// Unlike [`read`](Self::read), a missing `id` stays empty so that
    /// ingestion assigns a fresh one.
    pub fn load_external(&self, source: &Path) -> Result<MailRecord> {
        let bytes = std::fs::read(source).map_err(|e| TriageError::io(source, e))?;
        let raw: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| TriageError::parse(source, e))?;
        let mut record = wire::decode(source, Folder::ValidMustReply, &bytes, self.offset)?;
        if raw.get("id").map_or(true, |v| v.is_null()) {
            record.id = String::new();
        }
        record.assignment = None;
        Ok(record)
    }
}
