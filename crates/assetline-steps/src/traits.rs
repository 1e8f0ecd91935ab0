//! Trait definitions for transform steps.

use std::path::{Path, PathBuf};

/// A source file resolved from a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,

    /// Path below the glob base, mirrored under the destination
    pub relative: PathBuf,
}

/// Result of applying a step to a set of sources.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Files written under the destination directory
    pub written: Vec<PathBuf>,

    /// Sources left untouched because their output was up to date
    pub skipped: usize,
}

/// Errors that can occur while transforming sources.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source directory not found: {0}")]
    MissingSource(PathBuf),

    #[error("Invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TransformError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A transformation from source files to files under a destination directory.
///
/// Implementations must be deterministic: the same inputs and configuration
/// produce the same outputs. Outputs are computed before anything is
/// written (see [`crate::output::write_all`]), so a transform failure leaves
/// the destination untouched.
pub trait TransformStep: Send + Sync {
    /// Step identifier (e.g., "sass", "copy")
    fn name(&self) -> &'static str;

    /// Transform `sources` into files under `dest`.
    fn apply(&self, sources: &[SourceFile], dest: &Path) -> Result<StepOutput, TransformError>;
}
