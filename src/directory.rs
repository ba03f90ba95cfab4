//! Group/PIC directory and sender resolution.
//!
//! Resolution is first-match-wins over records sorted ascending by id.
//! A sender in several groups, or a group led by several PICs, resolves to
//! the lowest id every time; this is a fixed tie-break, not an error.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::address::{normalize, EmailAddress};
use crate::model::directory::{Group, Pic};
use crate::model::mail::{GroupAssignee, PicAssignee};
use crate::store::layout::{is_hidden, is_json, Layout};

/// Outcome of resolving a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The sender belongs to no group.
    NoGroupMatch,
    /// A group matched but nobody is in charge of it.
    GroupOnly(GroupAssignee),
    /// A PIC was found through the matching group.
    Pic(PicAssignee),
}

/// An immutable snapshot of all groups and PICs.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    groups: Vec<Group>,
    pics: Vec<Pic>,
}

impl Directory {
    /// Build a snapshot. Records are sorted by id; equal ids keep input order.
    pub fn new(mut groups: Vec<Group>, mut pics: Vec<Pic>) -> Self {
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        pics.sort_by(|a, b| a.id.cmp(&b.id));
        Self { groups, pics }
    }

    /// Load `AssignmentData/Groups` and `AssignmentData/PIC`.
    ///
    /// Malformed files are logged and skipped.
    pub fn load(layout: &Layout) -> Self {
        let groups: Vec<Group> = load_records(&layout.groups_dir());
        let pics: Vec<Pic> = load_records(&layout.pics_dir());
        info!(
            groups = groups.len(),
            pics = pics.len(),
            "Loaded assignment directory"
        );
        Self::new(groups, pics)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn pics(&self) -> &[Pic] {
        &self.pics
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn pic(&self, id: &str) -> Option<&Pic> {
        self.pics.iter().find(|p| p.id == id)
    }

    /// First group (by id) whose members contain `sender`.
    ///
    /// `sender` may be a bare address or `Name <address>`.
    pub fn resolve_group(&self, sender: &str) -> Option<&Group> {
        let key = EmailAddress::parse(sender).key();
        if key.is_empty() {
            return None;
        }
        self.groups.iter().find(|g| g.contains(&key))
    }

    /// PIC in charge of `group`.
    ///
    /// A direct `pic` on the group wins; its id is borrowed from the PIC
    /// record with the same email when one exists. Otherwise the first PIC
    /// (by id) listing the group in `groupLeaderships`.
    pub fn resolve_pic(&self, group: &Group) -> Option<PicAssignee> {
        if let Some((name, email)) = group.direct_pic() {
            let email_key = normalize(email);
            let pic_id = self
                .pics
                .iter()
                .find(|p| !email_key.is_empty() && normalize(&p.email) == email_key)
                .map(|p| p.id.clone());
            return Some(PicAssignee {
                pic_id,
                pic_name: name.to_string(),
                pic_email: email.to_string(),
                group_id: group.id.clone(),
                group_name: group.name.clone(),
            });
        }

        self.pics
            .iter()
            .find(|p| p.leads(&group.id))
            .map(|p| PicAssignee {
                pic_id: Some(p.id.clone()),
                pic_name: p.name.clone(),
                pic_email: p.email.clone(),
                group_id: group.id.clone(),
                group_name: group.name.clone(),
            })
    }

    /// Group then PIC resolution for one sender.
    pub fn resolve(&self, sender: &str) -> Resolution {
        let Some(group) = self.resolve_group(sender) else {
            return Resolution::NoGroupMatch;
        };
        match self.resolve_pic(group) {
            Some(pic) => Resolution::Pic(pic),
            None => Resolution::GroupOnly(GroupAssignee {
                group_id: group.id.clone(),
                group_name: group.name.clone(),
            }),
        }
    }
}

/// Shared handle to the current [`Directory`] snapshot.
///
/// Readers take a cheap `Arc` clone; [`refresh`](Self::refresh) swaps in a
/// freshly loaded snapshot without blocking in-flight resolutions.
#[derive(Debug)]
pub struct DirectoryCache {
    layout: Layout,
    current: RwLock<Arc<Directory>>,
}

impl DirectoryCache {
    /// Create a cache and load it once.
    pub fn load(layout: Layout) -> Self {
        let initial = Directory::load(&layout);
        Self {
            layout,
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Create a cache around a prepared snapshot. `refresh` still reads `layout`.
    pub fn with_directory(layout: Layout, directory: Directory) -> Self {
        Self {
            layout,
            current: RwLock::new(Arc::new(directory)),
        }
    }

    pub fn snapshot(&self) -> Arc<Directory> {
        Arc::clone(&self.current.read())
    }

    /// Reload from disk.
    pub fn refresh(&self) {
        let fresh = Directory::load(&self.layout);
        *self.current.write() = Arc::new(fresh);
    }
}

fn load_records<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Directory folder missing");
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_json(path) && !is_hidden(path))
        .filter_map(|path| {
            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice::<T>(&bytes).map_err(|e| e.to_string()));
            match parsed {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping directory record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn group(id: &str, name: &str, members: &[&str]) -> Group {
        Group {
            id: id.into(),
            name: name.into(),
            members: members.iter().map(|m| normalize(m)).collect(),
            pic: None,
            pic_email: None,
        }
    }

    fn pic(id: &str, name: &str, leads: &[&str]) -> Pic {
        Pic {
            id: id.into(),
            name: name.into(),
            email: format!("{}@corp.com", name.to_lowercase().replace(' ', ".")),
            group_leaderships: leads.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_resolve_pic_via_leadership() {
        let dir = Directory::new(
            vec![group("g1", "Marketing", &["a@gmail.com"])],
            vec![pic("p1", "John Doe", &["g1"])],
        );
        match dir.resolve("a@gmail.com") {
            Resolution::Pic(p) => {
                assert_eq!(p.pic_name, "John Doe");
                assert_eq!(p.pic_id.as_deref(), Some("p1"));
                assert_eq!(p.group_name, "Marketing");
            }
            other => panic!("expected PIC, got {other:?}"),
        }
    }

    #[test]
    fn test_no_group_match() {
        let dir = Directory::new(vec![group("g1", "Marketing", &["a@gmail.com"])], vec![]);
        assert_eq!(dir.resolve("x@foo.com"), Resolution::NoGroupMatch);
        assert_eq!(dir.resolve(""), Resolution::NoGroupMatch);
    }

    #[test]
    fn test_group_without_pic_falls_back_to_group() {
        let dir = Directory::new(vec![group("g1", "Sales", &["c@gmail.com"])], vec![]);
        assert_eq!(
            dir.resolve("Carol <C@Gmail.com>"),
            Resolution::GroupOnly(GroupAssignee {
                group_id: "g1".into(),
                group_name: "Sales".into()
            })
        );
    }

    #[test]
    fn test_direct_pic_wins_and_borrows_id() {
        let mut g = group("g1", "Galaxy Store", &["duongg@gmail.com"]);
        g.pic = Some("Julie Yang".into());
        g.pic_email = Some("Julie.Yang@corp.com".into());
        let dir = Directory::new(
            vec![g],
            vec![pic("p9", "Julie Yang", &[]), pic("p1", "Other Lead", &["g1"])],
        );
        match dir.resolve("duongg@gmail.com") {
            Resolution::Pic(p) => {
                assert_eq!(p.pic_name, "Julie Yang");
                assert_eq!(p.pic_id.as_deref(), Some("p9"));
            }
            other => panic!("expected PIC, got {other:?}"),
        }
    }

    #[test]
    fn test_ties_break_by_lowest_id() {
        let dir = Directory::new(
            vec![
                group("g2", "Second", &["a@gmail.com"]),
                group("g1", "First", &["a@gmail.com"]),
            ],
            vec![pic("p2", "Later", &["g1"]), pic("p1", "Earlier", &["g1"])],
        );
        assert_eq!(dir.resolve_group("a@gmail.com").map(|g| g.id.as_str()), Some("g1"));
        match dir.resolve("a@gmail.com") {
            Resolution::Pic(p) => assert_eq!(p.pic_name, "Earlier"),
            other => panic!("expected PIC, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_refresh_picks_up_new_files() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let layout = Layout::new(tmp.path());
        layout.ensure_dirs().expect("dirs");
        let cache = DirectoryCache::load(layout.clone());
        assert!(cache.snapshot().groups().is_empty());

        std::fs::write(
            layout.groups_dir().join("g1.json"),
            r#"{"id": "g1", "name": "Marketing", "members": ["a@gmail.com"]}"#,
        )
        .expect("write");
        std::fs::write(layout.groups_dir().join("broken.json"), "{").expect("write");

        let before = cache.snapshot();
        cache.refresh();
        assert!(before.groups().is_empty());
        assert_eq!(cache.snapshot().groups().len(), 1);
    }
}
