use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Conditions that abort a merge run.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("No input files were supplied")]
    NoInputFiles,
    #[error("No valid input files remain after validation ({issues} issue(s) recorded)")]
    NoValidFiles { issues: usize },
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("Failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("Invalid merge configuration")]
    InvalidConfig(#[source] BoxError),
}

impl MergeError {
    pub fn read(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        MergeError::Read {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        MergeError::Write {
            path: path.into(),
            source: source.into(),
        }
    }
}
