//! Error types shared by the sync engine and the build pipeline.

use std::{io, path::PathBuf, process::ExitStatus};
use thiserror::Error;

/// Failure to obtain the store credentials. Always fatal, and always raised
/// before any network activity.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("environment variable `{0}` is not set")]
    MissingEnv(&'static str),
    #[error("reading credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid aws credentials file {0}")]
    Invalid(PathBuf),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking build tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("store rejected PUT {url}: HTTP {status}")]
    Rejected { url: String, status: u16 },
    #[error("malformed `{name}` header: {value:?}")]
    MalformedHeader { name: String, value: String },
    #[error("invalid object url for `{0}`")]
    InvalidUrl(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("sync task failed: {0}")]
    Task(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking source tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Command { program: String, status: ExitStatus },
    #[error("{path} is outside of {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("build task failed: {0}")]
    Task(String),
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Attach a path to an I/O error.
pub(crate) fn sync_io(path: impl Into<PathBuf>, source: io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn build_io(path: impl Into<PathBuf>, source: io::Error) -> BuildError {
    BuildError::Io {
        path: path.into(),
        source,
    }
}
