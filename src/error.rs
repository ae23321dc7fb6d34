//! Error types.
//!
//! Two layers:
//!
//! - `PipelineError` / `FitError`: the component-level taxonomy. Every session
//!   component returns these, so callers can react to *kinds* of failure
//!   (revert a selection, disable exports, ...).
//! - `AppError`: what the `alps` binary prints before exiting. It carries a
//!   process exit code and a human-readable message.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the session pipeline (storage, datasets, compute, export).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file extension is not in the resolver's format table.
    #[error("Unsupported format: '.{extension}'")]
    UnsupportedFormat { extension: String },

    /// A supported-format file could not be decoded.
    #[error("Corrupt data in '{}': {reason}", path.display())]
    CorruptData { path: PathBuf, reason: String },

    #[error("Fit failed")]
    Fit(#[from] FitError),

    /// A request that is malformed independently of any file.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Confirm was requested with no catalog entry chosen.
    #[error("No dataset selected")]
    NoSelection,

    /// Rejected before any filesystem write.
    #[error("Invalid export request: {0}")]
    InvalidExportRequest(String),

    /// Staging/results directories could not be created.
    #[error("Failed to create session directory '{}'", path.display())]
    StorageInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Display text followed by every source, `": "`-separated.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(&format!(": {cause}"));
            source = cause.source();
        }
        message
    }

    /// Process exit code used when this error terminates the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::UnsupportedFormat { .. }
            | PipelineError::InvalidExportRequest(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::NoSelection => 2,
            PipelineError::CorruptData { .. } => 3,
            PipelineError::Fit(_) => 4,
            PipelineError::StorageInit { .. } | PipelineError::Io { .. } => 5,
        }
    }
}

/// Failures reported by a fitting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("numerical failure: {0}")]
    Numerical(String),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        // The binary only prints `Display`, so fold the source chain in.
        Self::new(err.exit_code(), err.report())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_keeps_exit_code_and_source_chain() {
        let err = PipelineError::io(
            "Failed to write 'x.csv'",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let app: AppError = err.into();
        assert_eq!(app.exit_code(), 5);
        assert_eq!(app.to_string(), "I/O error: Failed to write 'x.csv': denied");
    }

    #[test]
    fn fit_errors_map_to_engine_exit_code() {
        let err: PipelineError = FitError::Numerical("singular system".to_string()).into();
        assert_eq!(err.exit_code(), 4);
        let app: AppError = err.into();
        assert_eq!(app.to_string(), "Fit failed: numerical failure: singular system");
    }
}
