use crate::diff::ChangeSet;
use crate::error::{RepoError, Result};
use crate::models::{Author, HistoryPage, PruneReport, SnapshotRecord};
use chrono::{TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    Commit, Cred, CredentialType, ErrorClass, ErrorCode, IndexAddOption, ObjectType, Oid,
    PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, ResetType, Signature, Sort,
    Status, StatusOptions, TreeWalkMode, TreeWalkResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const METADATA_DIR: &str = ".git";
pub const IGNORE_FILE: &str = ".gitignore";
pub const BOOTSTRAP_MESSAGE: &str = "bootstrap";
const REMOTE_NAME: &str = "origin";
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

static OPEN_REPOSITORIES: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// Registration of a repository path in the process-wide open set.
/// Dropping it frees the path for another handle.
struct OpenSlot(PathBuf);

impl OpenSlot {
    fn claim(path: &Path) -> Result<Self> {
        let mut open = OPEN_REPOSITORIES
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !open.insert(path.to_path_buf()) {
            return Err(RepoError::AlreadyOpen(path.to_path_buf()));
        }
        Ok(Self(path.to_path_buf()))
    }
}

impl Drop for OpenSlot {
    fn drop(&mut self) {
        let mut open = OPEN_REPOSITORIES
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        open.remove(&self.0);
    }
}

#[derive(Clone, Default)]
pub struct RemoteCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushAck {
    /// No remote configured; nothing was sent.
    Skipped,
    Pushed { remote: String, branch: String },
}

/// Handle to the git working tree that stores snapshots.
///
/// Only one handle per path may be open in a process. All mutating
/// operations take `&mut self`, so a single owner sequences them.
pub struct SnapshotRepository {
    root: PathBuf,
    repo: Option<Repository>,
    credentials: RemoteCredentials,
    _slot: Option<OpenSlot>,
}

impl SnapshotRepository {
    /// Opens the repository at `path`, creating and seeding it when no
    /// metadata directory exists yet.
    pub fn bootstrap<P: AsRef<Path>>(
        path: P,
        branch: &str,
        excludes: &[String],
        author: &Author,
    ) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| RepoError::io(path, e))?;
        let root = fs::canonicalize(path).map_err(|e| RepoError::io(path, e))?;
        ensure_writable(&root)?;

        if root.join(METADATA_DIR).exists() {
            info!("Found existing snapshot repository at {:?}", root);
            return Self::open_at(root, branch);
        }

        let slot = OpenSlot::claim(&root)?;
        info!("Initializing snapshot repository at {:?}", root);

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        let repo = Repository::init_opts(&root, &opts)?;
        repo.config()?.set_bool("core.autocrlf", false)?;

        let ignore_path = root.join(IGNORE_FILE);
        if !ignore_path.exists() {
            let mut contents = excludes.join("\n");
            if !contents.is_empty() {
                contents.push('\n');
            }
            fs::write(&ignore_path, contents).map_err(|e| RepoError::io(&ignore_path, e))?;
        }

        let mut index = repo.index()?;
        index.add_path(Path::new(IGNORE_FILE))?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = Signature::now(&author.name, &author.email)?;
        let oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            BOOTSTRAP_MESSAGE,
            &tree,
            &[],
        )?;
        drop(tree);
        info!("Created bootstrap snapshot {}", oid);

        Ok(Self {
            root,
            repo: Some(repo),
            credentials: RemoteCredentials::default(),
            _slot: Some(slot),
        })
    }

    /// Opens an existing repository without creating anything.
    pub fn open<P: AsRef<Path>>(path: P, branch: &str) -> Result<Self> {
        let path = path.as_ref();
        let root = fs::canonicalize(path).map_err(|e| RepoError::io(path, e))?;
        Self::open_at(root, branch)
    }

    fn open_at(root: PathBuf, branch: &str) -> Result<Self> {
        let slot = OpenSlot::claim(&root)?;
        let repo = Repository::open(&root).map_err(|e| RepoError::CorruptRepository {
            path: root.clone(),
            reason: e.message().to_string(),
        })?;
        if repo.is_bare() {
            return Err(RepoError::CorruptRepository {
                path: root,
                reason: "repository has no working tree".to_string(),
            });
        }
        if let Err(e) = repo.head() {
            if e.code() != ErrorCode::UnbornBranch && e.code() != ErrorCode::NotFound {
                return Err(RepoError::CorruptRepository {
                    path: root,
                    reason: e.message().to_string(),
                });
            }
        }

        let mut handle = Self {
            root,
            repo: Some(repo),
            credentials: RemoteCredentials::default(),
            _slot: Some(slot),
        };
        handle.recover_detached_head(branch)?;
        Ok(handle)
    }

    pub fn with_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory inside the working tree that holds a tracked dataset.
    pub fn dataset_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn is_open(&self) -> bool {
        self.repo.is_some()
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo.as_ref().ok_or(RepoError::Closed)
    }

    /// Stages every addition, modification and deletion in the working tree.
    pub fn stage_all(&mut self) -> Result<ChangeSet> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let head_tree = match head_commit(repo)? {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };
        let mut diff = repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        let staged = ChangeSet::from_diff(&mut diff)?;
        debug!("Staged {} change(s)", staged.len());
        Ok(staged)
    }

    /// Commits the staged tree unless it is identical to the parent's tree.
    pub fn commit_if_changed(
        &mut self,
        message: &str,
        author: &Author,
    ) -> Result<Option<SnapshotRecord>> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let parent = head_commit(repo)?;

        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                info!("No changes detected, skipping snapshot");
                return Ok(None);
            }
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = Signature::now(&author.name, &author.email)?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        let snapshot = snapshot_from_commit(&repo.find_commit(oid)?);
        info!("Created snapshot {}: {}", snapshot.short_id(), message);
        Ok(Some(snapshot))
    }

    /// Sends the branch to `remote_url`. An empty URL is a successful no-op.
    pub fn push(&mut self, remote_url: &str, branch: &str) -> Result<PushAck> {
        let remote_url = remote_url.trim();
        if remote_url.is_empty() {
            debug!("No remote configured, skipping push");
            return Ok(PushAck::Skipped);
        }
        validate_remote_url(remote_url)?;

        let repo = self.repo()?;
        let mut remote = match repo.find_remote(REMOTE_NAME) {
            Ok(remote) if remote.url() == Some(remote_url) => remote,
            Ok(_) => {
                repo.remote_set_url(REMOTE_NAME, remote_url)
                    .map_err(|e| classify_remote_error(remote_url, e))?;
                repo.find_remote(REMOTE_NAME)?
            }
            Err(e) if e.code() == ErrorCode::NotFound => repo
                .remote(REMOTE_NAME, remote_url)
                .map_err(|e| classify_remote_error(remote_url, e))?,
            Err(e) => return Err(e.into()),
        };

        // History truncation rewrites the branch, so the mirror is force-updated.
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        let mut rejected: Option<String> = None;
        let pushed = {
            let credentials = self.credentials.clone();
            let mut attempts = 0;
            let mut callbacks = RemoteCallbacks::new();
            callbacks.credentials(move |_url, username_from_url, allowed| {
                attempts += 1;
                if attempts > MAX_CREDENTIAL_ATTEMPTS {
                    return Err(git2::Error::new(
                        ErrorCode::Auth,
                        ErrorClass::Net,
                        "credentials rejected",
                    ));
                }
                let username = credentials
                    .username
                    .as_deref()
                    .or(username_from_url)
                    .unwrap_or("git");
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    if let Some(password) = &credentials.password {
                        return Cred::userpass_plaintext(username, password);
                    }
                }
                if allowed.contains(CredentialType::SSH_KEY) {
                    return Cred::ssh_key_from_agent(username);
                }
                if allowed.contains(CredentialType::USERNAME) {
                    return Cred::username(username);
                }
                Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Net,
                    "no usable credentials configured",
                ))
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejected = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut opts))
        };
        pushed.map_err(|e| classify_remote_error(remote_url, e))?;

        if let Some(reason) = rejected {
            return Err(RepoError::TransportFailure {
                url: remote_url.to_string(),
                reason,
            });
        }

        info!("Pushed branch '{}' to {}", branch, remote_url);
        Ok(PushAck::Pushed {
            remote: remote_url.to_string(),
            branch: branch.to_string(),
        })
    }

    /// Snapshots on `branch`, newest first. A branch without commits yields
    /// an empty list. Each call walks the history again from the tip.
    pub fn list_history(&self, branch: &str) -> Result<Vec<SnapshotRecord>> {
        let repo = self.repo()?;
        let tip = match repo.refname_to_id(&branch_ref(branch)) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(tip)?;
        walk.map(|oid| -> Result<SnapshotRecord> {
            let commit = repo.find_commit(oid?)?;
            Ok(snapshot_from_commit(&commit))
        })
        .collect()
    }

    pub fn history_page(&self, branch: &str, page: usize, per_page: usize) -> Result<HistoryPage> {
        let history = self.list_history(branch)?;
        Ok(HistoryPage::paginate(history, page, per_page))
    }

    pub fn find_snapshot(&self, snapshot_id: &str) -> Result<SnapshotRecord> {
        let repo = self.repo()?;
        let commit = resolve_snapshot(repo, snapshot_id)?;
        Ok(snapshot_from_commit(&commit))
    }

    /// Files that differ between two snapshots. Without `to`, compares
    /// `from` against its parent.
    pub fn diff(&self, from: &str, to: Option<&str>) -> Result<ChangeSet> {
        let repo = self.repo()?;
        let from_commit = resolve_snapshot(repo, from)?;
        let (old, new) = match to {
            Some(to) => (Some(from_commit.tree()?), resolve_snapshot(repo, to)?.tree()?),
            None => {
                let parent_tree = match from_commit.parent(0) {
                    Ok(parent) => Some(parent.tree()?),
                    Err(_) => None,
                };
                (parent_tree, from_commit.tree()?)
            }
        };
        let mut diff = repo.diff_tree_to_tree(old.as_ref(), Some(&new), None)?;
        ChangeSet::from_diff(&mut diff)
    }

    /// Number of paths whose working tree or index state differs from HEAD.
    pub fn dirty_count(&self) -> Result<usize> {
        dirty_entries(self.repo()?)
    }

    pub fn head_detached(&self) -> Result<bool> {
        Ok(self.repo()?.head_detached()?)
    }

    pub fn head_snapshot(&self) -> Result<Option<SnapshotRecord>> {
        let repo = self.repo()?;
        Ok(head_commit(repo)?.map(|c| snapshot_from_commit(&c)))
    }

    /// Makes the working tree match `snapshot_id`, leaving HEAD detached on it.
    /// Refuses when uncommitted modifications would be lost.
    pub fn checkout(&mut self, snapshot_id: &str) -> Result<SnapshotRecord> {
        let repo = self.repo()?;
        let commit = resolve_snapshot(repo, snapshot_id)?;

        let dirty = dirty_entries(repo)?;
        if dirty > 0 {
            return Err(RepoError::DirtyWorkingTree(dirty));
        }

        let mut builder = CheckoutBuilder::new();
        builder.force().remove_untracked(true).remove_ignored(true);
        let moved = repo
            .checkout_tree(commit.as_object(), Some(&mut builder))
            .and_then(|()| repo.set_head_detached(commit.id()));
        if let Err(e) = moved {
            warn!("Checkout of {} failed, resetting to HEAD: {}", commit.id(), e);
            if let Err(reset) = reset_to_head(repo) {
                warn!("Could not reset working tree: {}", reset);
            }
            return Err(e.into());
        }

        let snapshot = snapshot_from_commit(&commit);
        info!("Checked out snapshot {}", snapshot.short_id());
        Ok(snapshot)
    }

    /// Re-attaches HEAD to `branch` and resets the working tree to its tip.
    pub fn return_to_branch(&mut self, branch: &str) -> Result<()> {
        let repo = self.repo()?;
        let refname = branch_ref(branch);
        repo.set_head(&refname)?;
        if repo.find_reference(&refname).is_ok() {
            let mut builder = CheckoutBuilder::new();
            builder.force().remove_untracked(true);
            repo.checkout_head(Some(&mut builder))?;
        }
        debug!("Working tree returned to branch '{}'", branch);
        Ok(())
    }

    /// Resets index and working tree to HEAD, dropping untracked files.
    pub fn discard_working_changes(&mut self) -> Result<()> {
        if reset_to_head(self.repo()?)? {
            warn!("Discarded uncommitted working tree changes");
        }
        Ok(())
    }

    /// Rewrites `branch` so only the `keep` newest snapshots remain, then
    /// deletes loose objects that are no longer reachable.
    ///
    /// Retained snapshots keep their trees, authors and messages but get new
    /// ids because their ancestry changes.
    pub fn truncate_history(&mut self, branch: &str, keep: usize) -> Result<PruneReport> {
        let history = self.list_history(branch)?;
        if keep == 0 || history.len() <= keep {
            return Ok(PruneReport::nothing(history.len()));
        }

        let repo = self.repo()?;
        let mut parent: Option<Oid> = None;
        for record in history[..keep].iter().rev() {
            let original = repo.find_commit(Oid::from_str(&record.id)?)?;
            let tree = original.tree()?;
            let parents: Vec<Commit> = match parent {
                Some(oid) => vec![repo.find_commit(oid)?],
                None => Vec::new(),
            };
            let parent_refs: Vec<&Commit> = parents.iter().collect();
            let message = String::from_utf8_lossy(original.message_bytes()).to_string();
            let oid = repo.commit(
                None,
                &original.author(),
                &original.committer(),
                &message,
                &tree,
                &parent_refs,
            )?;
            parent = Some(oid);
        }

        let Some(new_tip) = parent else {
            return Ok(PruneReport::nothing(history.len()));
        };
        let refname = branch_ref(branch);
        repo.reference(&refname, new_tip, true, "worldvault: truncate history")?;
        for log in [refname.as_str(), "HEAD"] {
            if let Err(e) = repo.reflog_delete(log) {
                debug!("Could not clear reflog {}: {}", log, e);
            }
        }

        let objects_deleted = collect_garbage(repo)?;
        // The handle caches objects that are now gone from disk.
        self.repo = Some(Repository::open(&self.root)?);
        let removed = history.len() - keep;
        info!(
            "Truncated history of '{}' to {} snapshot(s), removed {}, deleted {} object(s)",
            branch, keep, removed, objects_deleted
        );

        Ok(PruneReport {
            removed,
            retained: keep,
            new_tip: Some(new_tip.to_string()),
            objects_deleted,
        })
    }

    /// Releases the repository handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.repo.take().is_some() {
            debug!("Closed snapshot repository at {:?}", self.root);
        }
        self._slot = None;
    }

    /// Re-attaches a HEAD left detached by an interrupted restore, provided
    /// the working tree has no uncommitted changes.
    pub fn recover_detached_head(&mut self, branch: &str) -> Result<()> {
        let repo = self.repo()?;
        if !repo.head_detached().unwrap_or(false) {
            return Ok(());
        }
        if repo.find_reference(&branch_ref(branch)).is_err() {
            return Ok(());
        }
        match dirty_entries(repo)? {
            0 => {
                warn!(
                    "HEAD was left detached by an interrupted restore, returning to '{}'",
                    branch
                );
                self.return_to_branch(branch)
            }
            dirty => {
                warn!(
                    "HEAD is detached with {} uncommitted change(s); leaving it for the operator",
                    dirty
                );
                Ok(())
            }
        }
    }
}

impl fmt::Debug for SnapshotRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRepository")
            .field("root", &self.root)
            .field("open", &self.repo.is_some())
            .finish()
    }
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn ensure_writable(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| RepoError::io(root, e))?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(RepoError::io(
            root,
            std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "repository path is not a writable directory",
            ),
        ));
    }
    Ok(())
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Hard reset of index and working tree to HEAD. Returns false when there
/// is no HEAD commit yet.
fn reset_to_head(repo: &Repository) -> Result<bool> {
    let Some(commit) = head_commit(repo)? else {
        return Ok(false);
    };
    let mut builder = CheckoutBuilder::new();
    builder.force().remove_untracked(true);
    repo.reset(commit.as_object(), ResetType::Hard, Some(&mut builder))?;
    Ok(true)
}

fn resolve_snapshot<'r>(repo: &'r Repository, snapshot_id: &str) -> Result<Commit<'r>> {
    let snapshot_id = snapshot_id.trim();
    if snapshot_id.is_empty() {
        return Err(RepoError::UnknownSnapshot(String::new()));
    }
    repo.revparse_single(snapshot_id)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| RepoError::UnknownSnapshot(snapshot_id.to_string()))
}

fn snapshot_from_commit(commit: &Commit<'_>) -> SnapshotRecord {
    let author = commit.author();
    let timestamp = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_default();
    SnapshotRecord {
        id: commit.id().to_string(),
        timestamp,
        author_name: String::from_utf8_lossy(author.name_bytes()).to_string(),
        author_email: String::from_utf8_lossy(author.email_bytes()).to_string(),
        message: String::from_utf8_lossy(commit.message_bytes()).to_string(),
        parent_id: commit.parent_id(0).ok().map(|oid| oid.to_string()),
    }
}

fn dirty_entries(repo: &Repository) -> Result<usize> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses
        .iter()
        .filter(|entry| entry.status() != Status::CURRENT)
        .count())
}

/// Deletes loose objects unreachable from any reference or the index.
/// Packed objects are left in place.
fn collect_garbage(repo: &Repository) -> Result<usize> {
    let reachable = reachable_objects(repo)?;
    let odb = repo.odb()?;
    let mut candidates = Vec::new();
    odb.foreach(|oid| {
        if !reachable.contains(oid) {
            candidates.push(*oid);
        }
        true
    })?;

    let objects_dir = repo.path().join("objects");
    let mut deleted = 0;
    for oid in candidates {
        let hex = oid.to_string();
        let path = objects_dir.join(&hex[..2]).join(&hex[2..]);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| RepoError::io(&path, e))?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

fn reachable_objects(repo: &Repository) -> Result<HashSet<Oid>> {
    let mut reachable = HashSet::new();
    let mut walk = repo.revwalk()?;

    if let Ok(head) = repo.head() {
        if let Some(oid) = head.target() {
            walk.push(oid)?;
        }
    }
    for reference in repo.references()? {
        let reference = reference?;
        let Some(oid) = reference.resolve().ok().and_then(|r| r.target()) else {
            continue;
        };
        reachable.insert(oid);
        let object = repo.find_object(oid, None)?;
        if object.kind() == Some(ObjectType::Tag) {
            if let Ok(commit) = object.peel_to_commit() {
                walk.push(commit.id())?;
            }
        } else if object.kind() == Some(ObjectType::Commit) {
            walk.push(oid)?;
        }
    }

    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        reachable.insert(commit.id());
        if !reachable.insert(commit.tree_id()) {
            continue;
        }
        commit.tree()?.walk(TreeWalkMode::PreOrder, |_, entry| {
            let is_tree = entry.kind() == Some(ObjectType::Tree);
            if !reachable.insert(entry.id()) && is_tree {
                TreeWalkResult::Skip
            } else {
                TreeWalkResult::Ok
            }
        })?;
    }

    for entry in repo.index()?.iter() {
        reachable.insert(entry.id);
    }
    Ok(reachable)
}

fn validate_remote_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| RepoError::InvalidRemote {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    if let Some((scheme, rest)) = url.split_once("://") {
        if rest.is_empty() {
            return Err(invalid("URL has no host or path"));
        }
        return match scheme {
            "file" => {
                if Path::new(rest).exists() {
                    Ok(())
                } else {
                    Err(invalid("no repository at this path"))
                }
            }
            "https" | "http" if !cfg!(feature = "https") => {
                Err(invalid("https transport is not enabled in this build"))
            }
            "ssh" if !cfg!(feature = "ssh") => {
                Err(invalid("ssh transport is not enabled in this build"))
            }
            "https" | "http" | "ssh" | "git" => Ok(()),
            _ => Err(invalid("unsupported URL scheme")),
        };
    }

    // scp-like syntax: user@host:path
    if let Some((host, _)) = url.split_once(':') {
        if host.contains('@') && !host.contains('/') {
            if !cfg!(feature = "ssh") {
                return Err(invalid("ssh transport is not enabled in this build"));
            }
            return Ok(());
        }
    }

    if Path::new(url).exists() {
        Ok(())
    } else {
        Err(invalid("no repository at this path"))
    }
}

fn classify_remote_error(url: &str, err: git2::Error) -> RepoError {
    let reason = err.message().to_string();
    let lowered = reason.to_lowercase();
    let url = url.to_string();

    match err.code() {
        ErrorCode::Auth | ErrorCode::Certificate => RepoError::AuthRejected { url, reason },
        ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Invalid => {
            RepoError::InvalidRemote { url, reason }
        }
        _ if lowered.contains("authentication")
            || lowered.contains("401")
            || lowered.contains("403")
            || lowered.contains("credentials") =>
        {
            RepoError::AuthRejected { url, reason }
        }
        _ if lowered.contains("unsupported url") || lowered.contains("invalid url") => {
            RepoError::InvalidRemote { url, reason }
        }
        _ => match err.class() {
            ErrorClass::Config | ErrorClass::Repository => RepoError::InvalidRemote { url, reason },
            _ => RepoError::TransportFailure { url, reason },
        },
    }
}
