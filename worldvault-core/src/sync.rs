use crate::error::{SyncError, SyncFailure};
use crate::models::{MirroredDataset, SkipReason, SyncReport, TrackedDataset};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const NESTED_METADATA_DIR: &str = ".git";

pub type SyncResult = std::result::Result<SyncReport, SyncFailure>;

/// Copies dataset directories between the live location and the repository
/// working tree. Datasets are processed in order and not rolled back: on
/// failure the datasets already mirrored are reported in the failure.
#[derive(Debug, Default, Clone)]
pub struct DirectorySynchronizer;

impl DirectorySynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// Replaces each tracked destination with a fresh copy of its live source.
    pub fn mirror_in(&self, datasets: &[TrackedDataset]) -> SyncResult {
        let mut report = SyncReport::default();

        for dataset in datasets {
            if !dataset.source.is_dir() {
                warn!(
                    "Dataset '{}' not found at {:?}, skipping",
                    dataset.name, dataset.source
                );
                report.skip(&dataset.name, SkipReason::SourceMissing);
                continue;
            }

            let mirrored = remove_path(&dataset.name, &dataset.destination)
                .and_then(|_| copy_tree(&dataset.name, &dataset.source, &dataset.destination));
            match mirrored {
                Ok(mirrored) => {
                    debug!(
                        "Mirrored dataset '{}' ({} files, {} bytes)",
                        dataset.name, mirrored.files, mirrored.bytes
                    );
                    report.mirrored.push(mirrored);
                }
                Err(error) => {
                    return Err(SyncFailure {
                        completed: report,
                        error,
                    })
                }
            }
        }

        info!(
            "Mirrored {} dataset(s) into the repository, skipped {}",
            report.mirrored.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Copies each tracked destination back over its live source, keeping the
    /// previous live contents in the `<name>.pre-restore` sibling.
    pub fn mirror_out(&self, datasets: &[TrackedDataset]) -> SyncResult {
        let mut report = SyncReport::default();

        for dataset in datasets {
            if !dataset.destination.is_dir() {
                warn!(
                    "Dataset '{}' is not present in the snapshot, skipping",
                    dataset.name
                );
                report.skip(&dataset.name, SkipReason::NotInSnapshot);
                continue;
            }

            match restore_dataset(dataset) {
                Ok(mirrored) => {
                    info!(
                        "Restored dataset '{}' ({} files, {} bytes)",
                        dataset.name, mirrored.files, mirrored.bytes
                    );
                    report.mirrored.push(mirrored);
                }
                Err(error) => {
                    return Err(SyncFailure {
                        completed: report,
                        error,
                    })
                }
            }
        }

        Ok(report)
    }
}

fn restore_dataset(dataset: &TrackedDataset) -> Result<MirroredDataset, SyncError> {
    let name = dataset.name.as_str();
    let live = &restore_target(name, &dataset.source)?;

    let safety_copy = if live.exists() {
        let safety = dataset.safety_path();
        take_safety_copy(name, live, &safety).map_err(|source| SyncError::SafetyCopy {
            dataset: name.to_string(),
            path: safety.clone(),
            source: Box::new(source),
        })?;
        debug!("Saved live '{}' to {:?}", name, safety);
        remove_path(name, live)?;
        Some(safety)
    } else {
        None
    };

    let mut mirrored = copy_tree(name, &dataset.destination, live)?;
    mirrored.safety_copy = safety_copy;
    Ok(mirrored)
}

/// A symlinked dataset root is restored into the directory it points at,
/// so the link itself survives. A dangling link is replaced.
fn restore_target(name: &str, live: &Path) -> Result<PathBuf, SyncError> {
    let is_link = fs::symlink_metadata(live)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return Ok(live.to_path_buf());
    }
    match fs::canonicalize(live) {
        Ok(target) => {
            debug!("Restoring '{}' through link {:?} into {:?}", name, live, target);
            Ok(target)
        }
        Err(e) => {
            warn!("Dataset link {:?} is dangling ({}), replacing it", live, e);
            remove_path(name, live)?;
            Ok(live.to_path_buf())
        }
    }
}

fn take_safety_copy(name: &str, live: &Path, safety: &Path) -> Result<(), SyncError> {
    remove_path(name, safety)?;
    copy_tree(name, live, safety)?;
    Ok(())
}

/// Removes a file or directory tree; a missing path is not an error.
fn remove_path(name: &str, path: &Path) -> Result<(), SyncError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(SyncError::Remove {
                dataset: name.to_string(),
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|source| SyncError::Remove {
        dataset: name.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

/// Recursively copies regular files and directories from `from` into `to`.
/// Symlinks, special files and nested repository metadata are left out and
/// listed in `skipped_entries`. A symlinked `from` root is followed.
fn copy_tree(name: &str, from: &Path, to: &Path) -> Result<MirroredDataset, SyncError> {
    let copy_err = |path: &Path, source: std::io::Error| SyncError::Copy {
        dataset: name.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let mut mirrored = MirroredDataset {
        name: name.to_string(),
        ..Default::default()
    };
    fs::create_dir_all(to).map_err(|e| copy_err(to, e))?;

    let mut walker = WalkDir::new(from)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|source| SyncError::Walk {
            dataset: name.to_string(),
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| from.to_path_buf()),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let relative: PathBuf = relative.to_path_buf();
        let target = to.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if entry.file_name() == NESTED_METADATA_DIR {
                warn!(
                    "Skipping nested repository metadata {:?} in dataset '{}'",
                    entry.path(),
                    name
                );
                walker.skip_current_dir();
                mirrored.skipped_entries.push(relative);
                continue;
            }
            fs::create_dir_all(&target).map_err(|e| copy_err(&target, e))?;
        } else if file_type.is_file() {
            let bytes = fs::copy(entry.path(), &target).map_err(|e| copy_err(entry.path(), e))?;
            mirrored.files += 1;
            mirrored.bytes += bytes;
        } else {
            warn!(
                "Skipping {:?} in dataset '{}': not a regular file or directory",
                entry.path(),
                name
            );
            mirrored.skipped_entries.push(relative);
        }
    }

    Ok(mirrored)
}
