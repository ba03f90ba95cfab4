//! Folder-as-state encoding of the mail tree.
//!
//! ```text
//! <root>/
//! ├── DungHan/{mustRep,rep}/          Valid mail
//! ├── QuaHan/{chuaRep,daRep}/         Expired mail
//! ├── ReviewMail/{pending,processed}/ Mail pulled into review
//! └── AssignmentData/{Groups,PIC}/    Directory records
//! ```
//!
//! Directory names are a compatibility surface and must not change.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, TriageError};
use crate::model::mail::Folder;

/// Directory holding group and PIC records.
pub const ASSIGNMENT_DIR: &str = "AssignmentData";
pub const GROUPS_DIR: &str = "Groups";
pub const PICS_DIR: &str = "PIC";

/// Resolves paths within one mail tree.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // Watch events report absolute paths; keep the root comparable.
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_dir(&self, folder: Folder) -> PathBuf {
        self.root
            .join(folder.category_dir())
            .join(folder.status_dir())
    }

    pub fn path_for(&self, folder: Folder, file_name: &str) -> PathBuf {
        self.folder_dir(folder).join(file_name)
    }

    pub fn groups_dir(&self) -> PathBuf {
        self.root.join(ASSIGNMENT_DIR).join(GROUPS_DIR)
    }

    pub fn pics_dir(&self) -> PathBuf {
        self.root.join(ASSIGNMENT_DIR).join(PICS_DIR)
    }

    /// Create the six state folders and the directory folders.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = Folder::ALL
            .into_iter()
            .map(|f| self.folder_dir(f))
            .chain([self.groups_dir(), self.pics_dir()]);
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| TriageError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Decode the state folder a mail file sits in.
    ///
    /// Only the two parent directory names matter, so both relative and
    /// canonical paths decode the same way.
    pub fn folder_of(&self, path: &Path) -> Result<Folder> {
        let status = parent_name(path, 1);
        let category = parent_name(path, 2);
        match (category, status) {
            (Some(c), Some(s)) => {
                Folder::from_dirs(&c, &s).ok_or_else(|| TriageError::InvalidLayout(path.into()))
            }
            _ => Err(TriageError::InvalidLayout(path.into())),
        }
    }

    /// Whether `path` names a mail file (a `.json` directly inside a state folder).
    pub fn is_mail_file(&self, path: &Path) -> bool {
        is_json(path) && !is_hidden(path) && self.folder_of(path).is_ok()
    }

    /// Whether `path` lies under `AssignmentData/`.
    pub fn is_directory_file(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(name) => name == ASSIGNMENT_DIR,
            _ => false,
        })
    }
}

/// Name of the `depth`-th ancestor directory (1 = immediate parent).
fn parent_name(path: &Path, depth: usize) -> Option<String> {
    let mut current = path;
    for _ in 0..depth {
        current = current.parent()?;
    }
    current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Hidden files include the temp files our own atomic writes create.
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true)
}
