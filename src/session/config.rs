//! Session directory configuration.
//!
//! The hosting environment may hand us two directories per session (a staging
//! area and a results area). When it doesn't, we fall back to directories
//! under a local, project-relative data root. The configuration is resolved
//! once at startup and then passed explicitly to every component.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable naming the session (informational only).
pub const ENV_SESSION: &str = "SESSION";
/// Environment variable for the staging (uploads) directory.
pub const ENV_STAGING_DIR: &str = "SESSIONDIR";
/// Environment variable for the results (exports) directory.
pub const ENV_RESULTS_DIR: &str = "RESULTSDIR";

/// Default project-relative data root (sample datasets live directly under it).
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Fallback staging directory name under the data root.
const FALLBACK_STAGING: &str = "temp";
/// Fallback results directory name under the data root.
const FALLBACK_RESULTS: &str = "out";

/// Resolved locations for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session identifier supplied by the host, if any.
    pub session_id: Option<String>,
    /// Directory holding the packaged, read-only sample datasets.
    pub sample_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl SessionConfig {
    /// Resolve from the process environment (plus an optional `.env` file).
    pub fn resolve(data_root: &Path) -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(data_root, |key| std::env::var(key).ok())
    }

    /// Resolve using an arbitrary variable lookup.
    ///
    /// Both directory variables must be present for the host configuration to
    /// be used; otherwise the local fallback is selected deterministically.
    pub fn from_lookup(data_root: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let session_id = lookup(ENV_SESSION).filter(|s| !s.trim().is_empty());
        let staging = lookup(ENV_STAGING_DIR).filter(|s| !s.trim().is_empty());
        let results = lookup(ENV_RESULTS_DIR).filter(|s| !s.trim().is_empty());

        match (staging, results) {
            (Some(staging), Some(results)) => {
                debug!(%staging, %results, "using host-provided session directories");
                Self {
                    session_id,
                    sample_dir: data_root.to_path_buf(),
                    staging_dir: PathBuf::from(staging),
                    results_dir: PathBuf::from(results),
                }
            }
            _ => Self::local(data_root),
        }
    }

    /// Local fallback layout: `<root>/temp` and `<root>/out`.
    pub fn local(data_root: &Path) -> Self {
        Self {
            session_id: None,
            sample_dir: data_root.to_path_buf(),
            staging_dir: data_root.join(FALLBACK_STAGING),
            results_dir: data_root.join(FALLBACK_RESULTS),
        }
    }
}
