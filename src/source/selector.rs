//! Data source selector.
//!
//! ```text
//! NoSource -> CatalogShown(kind) -> FileChosen -> DataLoaded
//! ```
//!
//! - a catalog is the flat list of supported files in the sample directory
//!   (read-only) or the session staging directory (personal uploads)
//! - confirm loads the chosen file through the resolver; a failed load keeps
//!   the selection so another file can be picked
//! - a successful load is announced to every subscriber, synchronously, in
//!   registration order
//! - uploads are stored one by one; a bad file never aborts the batch

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{CatalogKind, DatasetHandle};
use crate::error::PipelineError;
use crate::io::{DatasetResolver, SavePayload};

/// Callback fired when a new dataset becomes available.
pub type DatasetObserver = Box<dyn FnMut(&Arc<DatasetHandle>)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorState {
    NoSource,
    CatalogShown(CatalogKind),
    FileChosen { kind: CatalogKind, path: PathBuf },
    DataLoaded { kind: CatalogKind, path: PathBuf },
}

/// Outcome of one upload batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Paths written into staging, in upload order.
    pub stored: Vec<PathBuf>,
    /// Uploads that were skipped, with the reason.
    pub rejected: Vec<(String, PipelineError)>,
}

pub struct DataSourceSelector {
    resolver: DatasetResolver,
    sample_dir: PathBuf,
    staging_dir: PathBuf,
    state: SelectorState,
    catalog: Vec<PathBuf>,
    dataset: Option<Arc<DatasetHandle>>,
    observers: Vec<DatasetObserver>,
}

impl DataSourceSelector {
    pub fn new(resolver: DatasetResolver, sample_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            sample_dir: sample_dir.into(),
            staging_dir: staging_dir.into(),
            state: SelectorState::NoSource,
            catalog: Vec::new(),
            dataset: None,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    /// Entries of the catalog currently shown (empty in `NoSource`).
    pub fn catalog(&self) -> &[PathBuf] {
        &self.catalog
    }

    pub fn catalog_kind(&self) -> Option<CatalogKind> {
        match &self.state {
            SelectorState::NoSource => None,
            SelectorState::CatalogShown(kind)
            | SelectorState::FileChosen { kind, .. }
            | SelectorState::DataLoaded { kind, .. } => Some(*kind),
        }
    }

    /// Path of the chosen catalog entry, if any.
    pub fn chosen(&self) -> Option<&Path> {
        match &self.state {
            SelectorState::FileChosen { path, .. } | SelectorState::DataLoaded { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Most recently loaded dataset.
    pub fn dataset(&self) -> Option<&Arc<DatasetHandle>> {
        self.dataset.as_ref()
    }

    pub fn resolver(&self) -> &DatasetResolver {
        &self.resolver
    }

    /// Register a dataset-changed handler.
    pub fn subscribe(&mut self, observer: impl FnMut(&Arc<DatasetHandle>) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Enumerate and show a catalog. Clears any chosen entry.
    pub fn show_catalog(&mut self, kind: CatalogKind) -> &[PathBuf] {
        self.catalog = self.enumerate(kind);
        self.state = SelectorState::CatalogShown(kind);
        debug!(catalog = kind.display_name(), entries = self.catalog.len(), "catalog shown");
        &self.catalog
    }

    /// Choose a catalog entry by index; `None` (or an out-of-range index)
    /// clears the choice.
    ///
    /// Returns whether an entry is now chosen.
    pub fn select(&mut self, index: Option<usize>) -> bool {
        let Some(kind) = self.catalog_kind() else {
            return false;
        };
        match index.and_then(|i| self.catalog.get(i)) {
            Some(path) => {
                self.state = SelectorState::FileChosen {
                    kind,
                    path: path.clone(),
                };
                true
            }
            None => {
                self.state = SelectorState::CatalogShown(kind);
                false
            }
        }
    }

    /// Choose a catalog entry by path.
    pub fn select_path(&mut self, path: &Path) -> bool {
        let index = self.catalog.iter().position(|p| p == path);
        self.select(index)
    }

    /// Whether the confirm action is available.
    pub fn confirm_enabled(&self) -> bool {
        self.chosen().is_some()
    }

    /// Load the chosen entry and notify subscribers.
    ///
    /// On failure the state goes back to `FileChosen` and the previously loaded
    /// dataset (if any) is kept.
    pub fn confirm(&mut self) -> Result<Arc<DatasetHandle>, PipelineError> {
        let (kind, path) = match &self.state {
            SelectorState::FileChosen { kind, path } | SelectorState::DataLoaded { kind, path } => {
                (*kind, path.clone())
            }
            _ => return Err(PipelineError::NoSelection),
        };

        match self.resolver.load(&path) {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.dataset = Some(Arc::clone(&handle));
                self.state = SelectorState::DataLoaded { kind, path };
                for observer in &mut self.observers {
                    observer(&handle);
                }
                Ok(handle)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e.report(), "dataset load failed");
                self.state = SelectorState::FileChosen { kind, path };
                Err(e)
            }
        }
    }

    /// Store uploaded files into staging, then refresh the personal catalog.
    pub fn upload_batch<I, N>(&mut self, files: I) -> UploadReport
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        let mut report = UploadReport::default();
        for (name, bytes) in files {
            let name = name.into();
            match self.store_upload(&name, &bytes) {
                Ok(path) => report.stored.push(path),
                Err(e) => {
                    warn!(file = %name, error = %e.report(), "upload rejected");
                    report.rejected.push((name, e));
                }
            }
        }

        info!(
            stored = report.stored.len(),
            rejected = report.rejected.len(),
            "upload batch processed"
        );
        self.refresh_personal();
        report
    }

    /// Read files from disk and upload them as one batch.
    ///
    /// Unreadable files are rejected like any other bad upload.
    pub fn upload_paths(&mut self, paths: &[PathBuf]) -> UploadReport {
        let mut unreadable = Vec::new();
        let mut batch = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            // Extension check first, so unsupported files are never read.
            if let Err(e) = self.resolver.format_for(path) {
                unreadable.push((name, e));
                continue;
            }
            match fs::read(path) {
                Ok(bytes) => batch.push((name, bytes)),
                Err(e) => unreadable.push((
                    name,
                    PipelineError::io(format!("Failed to read upload '{}'", path.display()), e),
                )),
            }
        }

        let mut report = self.upload_batch(batch);
        report.rejected.extend(unreadable);
        report
    }

    fn store_upload(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let Some(file_name) = Path::new(name).file_name() else {
            return Err(PipelineError::io(
                format!("Invalid upload name '{name}'"),
                io::Error::new(io::ErrorKind::InvalidInput, "not a file name"),
            ));
        };
        let path = self.staging_dir.join(file_name);
        self.resolver.save(&path, SavePayload::Raw(bytes))?;
        Ok(path)
    }

    /// Re-enumerate the personal catalog if it is the one shown, keeping the
    /// chosen entry when it still exists.
    fn refresh_personal(&mut self) {
        if self.catalog_kind() != Some(CatalogKind::Personal) {
            return;
        }
        let chosen = self.chosen().map(Path::to_path_buf);
        let loaded = matches!(self.state, SelectorState::DataLoaded { .. });

        self.catalog = self.enumerate(CatalogKind::Personal);
        self.state = match chosen {
            Some(path) if self.catalog.contains(&path) => {
                if loaded {
                    SelectorState::DataLoaded {
                        kind: CatalogKind::Personal,
                        path,
                    }
                } else {
                    SelectorState::FileChosen {
                        kind: CatalogKind::Personal,
                        path,
                    }
                }
            }
            _ => SelectorState::CatalogShown(CatalogKind::Personal),
        };
    }

    fn enumerate(&self, kind: CatalogKind) -> Vec<PathBuf> {
        let dir = match kind {
            CatalogKind::Sample => &self.sample_dir,
            CatalogKind::Personal => &self.staging_dir,
        };
        discover_supported_files(dir, &self.resolver)
    }
}

/// Supported files directly inside `dir`, sorted by file name.
///
/// A missing or unreadable directory is an empty catalog.
pub fn discover_supported_files(dir: &Path, resolver: &DatasetResolver) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "catalog directory not readable");
        return Vec::new();
    };

    let mut out: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|entry| entry.path())
        .filter(|path| resolver.supports(path))
        .collect();
    out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NumericArray;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn selector_with(sample: &[(&str, &str)]) -> (tempfile::TempDir, DataSourceSelector) {
        let tmp = tempdir().unwrap();
        let sample_dir = tmp.path().join("sample");
        let staging_dir = tmp.path().join("temp");
        fs::create_dir_all(&sample_dir).unwrap();
        fs::create_dir_all(&staging_dir).unwrap();
        for (name, body) in sample {
            fs::write(sample_dir.join(name), body).unwrap();
        }
        let selector = DataSourceSelector::new(DatasetResolver::default(), sample_dir, staging_dir);
        (tmp, selector)
    }

    #[test]
    fn catalog_lists_only_supported_files() {
        let (_tmp, mut selector) = selector_with(&[
            ("b.csv", "x,y\n1,2\n"),
            ("a.txt", "1,2\n"),
            ("notes.md", "hi"),
        ]);
        let names: Vec<String> = selector
            .show_catalog(CatalogKind::Sample)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.csv"]);
        assert_eq!(selector.state(), &SelectorState::CatalogShown(CatalogKind::Sample));
    }

    #[test]
    fn clearing_selection_disables_confirm() {
        let (_tmp, mut selector) = selector_with(&[("a.csv", "1,2\n")]);
        assert!(!selector.select(Some(0)));
        selector.show_catalog(CatalogKind::Sample);
        assert!(selector.select(Some(0)));
        assert!(selector.confirm_enabled());
        assert!(!selector.select(None));
        assert!(!selector.confirm_enabled());
        assert!(!selector.select(Some(7)));
        assert!(matches!(selector.confirm(), Err(PipelineError::NoSelection)));
    }

    #[test]
    fn confirm_notifies_observers_in_order() {
        let (_tmp, mut selector) = selector_with(&[("a.csv", "x,y\n1,2\n3,4\n")]);
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            selector.subscribe(move |d: &Arc<DatasetHandle>| {
                log.borrow_mut().push(format!("{tag}:{}", d.payload.n_rows()));
            });
        }

        selector.show_catalog(CatalogKind::Sample);
        selector.select(Some(0));
        let handle = selector.confirm().unwrap();

        assert_eq!(handle.payload.n_rows(), 2);
        assert_eq!(*log.borrow(), vec!["first:2", "second:2"]);
        assert!(matches!(selector.state(), SelectorState::DataLoaded { .. }));
    }

    #[test]
    fn corrupt_file_reverts_to_file_chosen() {
        let (_tmp, mut selector) = selector_with(&[("bad.csv", "x,y\n1,oops\n"), ("good.csv", "1,2\n")]);
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        selector.subscribe(move |_: &Arc<DatasetHandle>| *counter.borrow_mut() += 1);

        selector.show_catalog(CatalogKind::Sample);
        selector.select(Some(1));
        selector.confirm().unwrap();

        selector.select(Some(0));
        let err = selector.confirm().unwrap_err();
        assert!(matches!(err, PipelineError::CorruptData { .. }));
        assert!(matches!(selector.state(), SelectorState::FileChosen { .. }));
        // Previous dataset survives the failed load.
        assert!(selector.dataset().unwrap().source_path.ends_with("good.csv"));
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn upload_batch_skips_bad_files() {
        let (_tmp, mut selector) = selector_with(&[]);
        selector.show_catalog(CatalogKind::Personal);
        assert!(selector.catalog().is_empty());

        let report = selector.upload_batch(vec![
            ("one.csv", b"x,y\n1,2\n".to_vec()),
            ("two.xlsx", b"PK".to_vec()),
            ("three.txt", b"3,4\n".to_vec()),
        ]);

        assert_eq!(report.stored.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "two.xlsx");
        assert!(matches!(report.rejected[0].1, PipelineError::UnsupportedFormat { .. }));
        assert_eq!(selector.catalog().len(), 2);
    }

    #[test]
    fn corrupt_upload_content_does_not_stop_the_batch() {
        let (tmp, mut selector) = selector_with(&[]);
        selector.show_catalog(CatalogKind::Personal);

        let huge = 1usize << 33;
        let evil = bincode::serialize(&(vec![huge, huge], Vec::<f64>::new())).unwrap();
        let good = bincode::serialize(&NumericArray::new(vec![2], vec![1.0, 2.0]).unwrap()).unwrap();
        let report = selector.upload_batch(vec![
            ("evil.p", evil),
            ("bad.csv", b"x,y\n1,oops\n".to_vec()),
            ("good.p", good),
            ("last.csv", b"x,y\n1,2\n".to_vec()),
        ]);

        let rejected: Vec<&str> = report.rejected.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(rejected, vec!["evil.p", "bad.csv"]);
        assert!(report
            .rejected
            .iter()
            .all(|(_, e)| matches!(e, PipelineError::CorruptData { .. })));
        assert_eq!(report.stored.len(), 2);
        assert!(!tmp.path().join("temp").join("evil.p").exists());
        assert_eq!(selector.catalog().len(), 2);
    }

    #[test]
    fn upload_names_cannot_escape_staging() {
        let (tmp, mut selector) = selector_with(&[]);
        let report = selector.upload_batch(vec![("../escape.csv", b"1,2\n".to_vec())]);
        assert_eq!(report.stored, vec![tmp.path().join("temp").join("escape.csv")]);
        assert!(!tmp.path().join("escape.csv").exists());
    }

    #[test]
    fn missing_sample_dir_is_an_empty_catalog() {
        let tmp = tempdir().unwrap();
        let mut selector = DataSourceSelector::new(
            DatasetResolver::default(),
            tmp.path().join("nope"),
            tmp.path().join("temp"),
        );
        assert!(selector.show_catalog(CatalogKind::Sample).is_empty());
    }
}
