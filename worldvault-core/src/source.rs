use crate::error::FlushError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SAFETY_SUFFIX: &str = ".pre-restore";

/// The live system whose datasets are snapshotted.
pub trait DataSource: Send + Sync {
    /// Persists in-memory state to disk. Best effort; callers proceed on error.
    fn flush_all(&self, timeout: Duration) -> Result<(), FlushError>;

    /// Live directory of a dataset, or `None` when the source does not know it.
    fn resolve_dataset(&self, name: &str) -> Option<PathBuf>;

    fn list_live_datasets(&self) -> std::io::Result<Vec<String>>;
}

/// Datasets are the subdirectories of a root directory. Flushing runs an
/// optional external command, such as one that tells a game server to save.
#[derive(Debug, Clone)]
pub struct DirectoryDataSource {
    root: PathBuf,
    flush_command: Option<Vec<String>>,
}

impl DirectoryDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            flush_command: None,
        }
    }

    pub fn with_flush_command(mut self, argv: Vec<String>) -> Self {
        self.flush_command = if argv.is_empty() { None } else { Some(argv) };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataSource for DirectoryDataSource {
    fn flush_all(&self, timeout: Duration) -> Result<(), FlushError> {
        let Some((program, args)) = self.flush_command.as_deref().and_then(|argv| argv.split_first())
        else {
            return Ok(());
        };

        debug!("Running flush command {:?}", program);
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return if status.success() {
                    Ok(())
                } else {
                    Err(FlushError::Failed(format!("{program} exited with {status}")))
                };
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill flush command {:?}: {}", program, e);
                }
                let _ = child.wait();
                return Err(FlushError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn resolve_dataset(&self, name: &str) -> Option<PathBuf> {
        if !is_dataset_name(name) {
            return None;
        }
        let path = self.root.join(name);
        path.is_dir().then_some(path)
    }

    fn list_live_datasets(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(SAFETY_SUFFIX) {
                continue;
            }
            if entry.path().is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A dataset name must be one plain path component that cannot collide with
/// repository metadata.
pub fn is_dataset_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.starts_with(".git")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dataset_names() {
        assert!(is_dataset_name("world"));
        assert!(is_dataset_name("world_nether"));
        assert!(!is_dataset_name(""));
        assert!(!is_dataset_name("../world"));
        assert!(!is_dataset_name("a/b"));
        assert!(!is_dataset_name("/abs"));
        assert!(!is_dataset_name(".git"));
        assert!(!is_dataset_name(".gitignore"));
    }

    #[test]
    fn test_resolve_and_list() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("world")).unwrap();
        fs::create_dir_all(dir.path().join("world_nether")).unwrap();
        fs::create_dir_all(dir.path().join("world.pre-restore")).unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join("server.properties"), "").unwrap();

        let source = DirectoryDataSource::new(dir.path());
        assert_eq!(
            source.list_live_datasets().unwrap(),
            vec!["world".to_string(), "world_nether".to_string()]
        );
        assert_eq!(source.resolve_dataset("world"), Some(dir.path().join("world")));
        assert_eq!(source.resolve_dataset("world_the_end"), None);
        assert_eq!(source.resolve_dataset("server.properties"), None);
    }

    #[test]
    fn test_flush_without_command_is_noop() {
        let source = DirectoryDataSource::new(".");
        assert!(source.flush_all(Duration::from_millis(1)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_flush_command_outcomes() {
        let dir = TempDir::new().unwrap();
        let argv = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

        let ok = DirectoryDataSource::new(dir.path()).with_flush_command(argv(&["true"]));
        assert!(ok.flush_all(Duration::from_secs(5)).is_ok());

        let failing = DirectoryDataSource::new(dir.path()).with_flush_command(argv(&["false"]));
        assert!(matches!(
            failing.flush_all(Duration::from_secs(5)),
            Err(FlushError::Failed(_))
        ));

        let slow = DirectoryDataSource::new(dir.path()).with_flush_command(argv(&["sleep", "5"]));
        let started = Instant::now();
        assert!(matches!(
            slow.flush_all(Duration::from_millis(200)),
            Err(FlushError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
