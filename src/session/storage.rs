//! Session-scoped storage: the staging and results directories.
//!
//! This is the only component that creates or clears directory *structure*.
//! File contents inside the directories are written by the dataset resolver
//! (staging) and the export dispatcher (results).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::session::config::SessionConfig;

/// The two directories owned by a session. Always distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub staging_dir: PathBuf,
    pub results_dir: PathBuf,
}

/// Creates the session directories on first use and clears staging on teardown.
#[derive(Debug)]
pub struct SessionStorage {
    config: SessionConfig,
    paths: OnceLock<SessionPaths>,
}

impl SessionStorage {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            paths: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ensure both directories exist and return their paths.
    ///
    /// Idempotent: later calls return the same paths without touching the
    /// filesystem again. Failing to create either directory is fatal for the
    /// session.
    pub fn initialize(&self) -> Result<SessionPaths, PipelineError> {
        if let Some(paths) = self.paths.get() {
            return Ok(paths.clone());
        }

        let staging_dir = self.config.staging_dir.clone();
        let results_dir = self.config.results_dir.clone();

        // Teardown empties staging recursively, so neither directory may hold
        // the other. Checked again after creation, when symlinks resolve.
        ensure_disjoint(&staging_dir, &results_dir)?;
        for dir in [&staging_dir, &results_dir] {
            fs::create_dir_all(dir).map_err(|source| PipelineError::StorageInit {
                path: dir.clone(),
                source,
            })?;
        }
        ensure_disjoint(&staging_dir, &results_dir)?;

        info!(
            staging = %staging_dir.display(),
            results = %results_dir.display(),
            "session storage ready"
        );

        let paths = SessionPaths {
            staging_dir,
            results_dir,
        };
        Ok(self.paths.get_or_init(|| paths).clone())
    }

    /// Remove every entry inside the staging directory.
    ///
    /// Never fails: entries that cannot be removed (or that vanished in the
    /// meantime) are skipped. Returns the number of entries removed.
    pub fn teardown(&self) -> usize {
        let staging = &self.config.staging_dir;
        let Ok(entries) = fs::read_dir(staging) else {
            debug!(dir = %staging.display(), "staging directory absent; nothing to clear");
            return 0;
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), "failed to remove staging entry: {e}"),
            }
        }

        info!(removed, dir = %staging.display(), "staging directory cleared");
        removed
    }
}

/// Clears the staging directory when dropped.
///
/// Held for the lifetime of `app::run` so that a normal exit always cleans up,
/// the same way the terminal guard restores the terminal.
pub struct SessionGuard<'a> {
    storage: &'a SessionStorage,
}

impl<'a> SessionGuard<'a> {
    pub fn new(storage: &'a SessionStorage) -> Self {
        Self { storage }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.storage.teardown();
    }
}

fn ensure_disjoint(staging: &Path, results: &Path) -> Result<(), PipelineError> {
    let (s, r) = (resolved(staging), resolved(results));
    let reason = if s == r {
        "staging and results directories must be distinct"
    } else if r.starts_with(&s) {
        "results directory must not be inside the staging directory"
    } else if s.starts_with(&r) {
        "staging directory must not be inside the results directory"
    } else {
        return Ok(());
    };
    Err(PipelineError::StorageInit {
        path: staging.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, reason),
    })
}

/// Canonical form when the path exists, absolute lexical form otherwise.
fn resolved(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn storage_in(root: &Path) -> SessionStorage {
        SessionStorage::new(SessionConfig::local(root))
    }

    #[test]
    fn initialize_creates_directories_and_is_idempotent() {
        let tmp = tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let first = storage.initialize().unwrap();
        assert!(first.staging_dir.is_dir());
        assert!(first.results_dir.is_dir());

        fs::write(first.staging_dir.join("keep.csv"), "1,2\n").unwrap();
        let second = storage.initialize().unwrap();
        assert_eq!(first, second);
        assert!(second.staging_dir.join("keep.csv").exists());
    }

    #[test]
    fn identical_directories_are_rejected() {
        let tmp = tempdir().unwrap();
        let mut config = SessionConfig::local(tmp.path());
        config.results_dir = config.staging_dir.clone();

        let err = SessionStorage::new(config).initialize().unwrap_err();
        assert!(matches!(err, PipelineError::StorageInit { .. }));
    }

    #[test]
    fn nested_directories_are_rejected_both_ways() {
        let tmp = tempdir().unwrap();
        let sess = tmp.path().join("sess");

        let inside_staging = SessionConfig {
            session_id: None,
            sample_dir: tmp.path().to_path_buf(),
            staging_dir: sess.clone(),
            results_dir: sess.join("results"),
        };
        let err = SessionStorage::new(inside_staging).initialize().unwrap_err();
        assert!(matches!(err, PipelineError::StorageInit { .. }));
        assert!(!sess.exists());

        let inside_results = SessionConfig {
            session_id: None,
            sample_dir: tmp.path().to_path_buf(),
            staging_dir: sess.join("uploads"),
            results_dir: sess.clone(),
        };
        let err = SessionStorage::new(inside_results).initialize().unwrap_err();
        assert!(matches!(err, PipelineError::StorageInit { .. }));
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_nested() {
        let tmp = tempdir().unwrap();
        let config = SessionConfig {
            session_id: None,
            sample_dir: tmp.path().to_path_buf(),
            staging_dir: tmp.path().join("sess"),
            results_dir: tmp.path().join("sess-results"),
        };
        let storage = SessionStorage::new(config);
        let paths = storage.initialize().unwrap();
        fs::write(paths.results_dir.join("out.csv"), "x\n").unwrap();

        storage.teardown();
        assert!(paths.results_dir.join("out.csv").exists());
    }

    #[test]
    fn uncreatable_directory_is_a_storage_error() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let mut config = SessionConfig::local(tmp.path());
        config.staging_dir = blocker.join("temp");

        let err = SessionStorage::new(config).initialize().unwrap_err();
        assert!(matches!(err, PipelineError::StorageInit { .. }));
    }

    #[test]
    fn teardown_clears_staging_only() {
        let tmp = tempdir().unwrap();
        let storage = storage_in(tmp.path());
        let paths = storage.initialize().unwrap();

        fs::write(paths.staging_dir.join("a.csv"), "1,2\n").unwrap();
        fs::create_dir(paths.staging_dir.join("nested")).unwrap();
        fs::write(paths.staging_dir.join("nested").join("b.p"), [0u8; 4]).unwrap();
        fs::write(paths.results_dir.join("out.csv"), "x\n").unwrap();

        assert_eq!(storage.teardown(), 2);
        assert_eq!(fs::read_dir(&paths.staging_dir).unwrap().count(), 0);
        assert!(paths.results_dir.join("out.csv").exists());
    }

    #[test]
    fn teardown_tolerates_missing_staging_directory() {
        let tmp = tempdir().unwrap();
        let storage = storage_in(tmp.path());
        let paths = storage.initialize().unwrap();
        fs::remove_dir_all(&paths.staging_dir).unwrap();

        assert_eq!(storage.teardown(), 0);
    }

    #[test]
    fn guard_clears_staging_on_drop() {
        let tmp = tempdir().unwrap();
        let storage = storage_in(tmp.path());
        let paths = storage.initialize().unwrap();
        fs::write(paths.staging_dir.join("a.csv"), "1,2\n").unwrap();

        {
            let _guard = SessionGuard::new(&storage);
        }
        assert_eq!(fs::read_dir(&paths.staging_dir).unwrap().count(), 0);
    }
}
