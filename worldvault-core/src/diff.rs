use crate::error::Result;
use git2::{Delta, Diff, DiffFindOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
    Rename,
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Rename => "rename",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeType::Create),
            "modify" => Some(ChangeType::Modify),
            "delete" => Some(ChangeType::Delete),
            "rename" => Some(ChangeType::Rename),
            _ => None,
        }
    }

    fn from_delta(delta: Delta) -> Option<Self> {
        match delta {
            Delta::Added | Delta::Copied | Delta::Untracked => Some(ChangeType::Create),
            Delta::Modified | Delta::Typechange => Some(ChangeType::Modify),
            Delta::Deleted => Some(ChangeType::Delete),
            Delta::Renamed => Some(ChangeType::Rename),
            Delta::Unmodified | Delta::Ignored | Delta::Unreadable | Delta::Conflicted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub change_type: ChangeType,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
}

/// Paths that differ between two trees, as staged for a snapshot or between
/// two existing snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
}

impl ChangeSet {
    /// Builds a change set from a libgit2 diff, pairing deletes and adds into renames.
    pub fn from_diff(diff: &mut Diff<'_>) -> Result<Self> {
        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))?;

        let changes = diff
            .deltas()
            .filter_map(|delta| {
                let change_type = ChangeType::from_delta(delta.status())?;
                let new_path = delta.new_file().path().map(PathBuf::from);
                let old_path = delta.old_file().path().map(PathBuf::from);
                let (path, old_path) = match change_type {
                    ChangeType::Delete => (old_path?, None),
                    ChangeType::Rename => (new_path?, old_path),
                    ChangeType::Create | ChangeType::Modify => (new_path?, None),
                };
                Some(FileChange {
                    change_type,
                    path,
                    old_path,
                })
            })
            .collect();

        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }

    /// Top-level directories touched by the change set, i.e. the datasets.
    pub fn datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .changes
            .iter()
            .flat_map(|c| std::iter::once(&c.path).chain(c.old_path.as_ref()))
            .filter_map(|p| p.components().next())
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Repository, Signature};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_change_type_round_trip() {
        for ct in [
            ChangeType::Create,
            ChangeType::Modify,
            ChangeType::Delete,
            ChangeType::Rename,
        ] {
            assert_eq!(ChangeType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ChangeType::parse("copy"), None);
    }

    #[test]
    fn test_change_set_detects_every_category() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        write(dir.path(), "world/level.dat", "level");
        write(
            dir.path(),
            "world/region/r.0.0.mca",
            "a fairly long region payload that stays the same",
        );
        write(dir.path(), "nether/old.txt", "gone soon");
        let first = commit_all(&repo, "first");

        write(dir.path(), "world/level.dat", "level changed");
        fs::rename(
            dir.path().join("world/region/r.0.0.mca"),
            dir.path().join("world/region/r.1.0.mca"),
        )
        .unwrap();
        fs::remove_file(dir.path().join("nether/old.txt")).unwrap();
        write(dir.path(), "world/new.txt", "new");
        let second = commit_all(&repo, "second");

        let old_tree = repo.find_commit(first).unwrap().tree().unwrap();
        let new_tree = repo.find_commit(second).unwrap().tree().unwrap();
        let mut diff = repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)
            .unwrap();
        let set = ChangeSet::from_diff(&mut diff).unwrap();

        assert_eq!(set.count(ChangeType::Create), 1);
        assert_eq!(set.count(ChangeType::Modify), 1);
        assert_eq!(set.count(ChangeType::Delete), 1);
        assert_eq!(set.count(ChangeType::Rename), 1);

        let rename = set
            .changes
            .iter()
            .find(|c| c.change_type == ChangeType::Rename)
            .unwrap();
        assert_eq!(rename.path, PathBuf::from("world/region/r.1.0.mca"));
        assert_eq!(
            rename.old_path,
            Some(PathBuf::from("world/region/r.0.0.mca"))
        );

        assert_eq!(set.datasets(), vec!["nether".to_string(), "world".to_string()]);
    }
}
