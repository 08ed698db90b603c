//! Outcome of comparing a local artifact against its remote copy.

use serde::Serialize;
use std::fmt;

/// One independent reason for re-uploading a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    Fingerprint { local: String, remote: String },
    Size { local: u64, remote: u64 },
    ContentType { local: String, remote: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Fingerprint { local, remote } => {
                write!(f, "hash diff local[{local}] != remote[{remote}]")
            }
            Mismatch::Size { local, remote } => {
                write!(f, "size diff local[{local}] != remote[{remote}]")
            }
            Mismatch::ContentType { local, remote } => {
                write!(f, "type diff local[{local}] != remote[{remote}]")
            }
        }
    }
}

/// Derived per file, never stored. Every mismatch found is kept so each one
/// can be reported; any single mismatch means the file must be uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDecision {
    pub reasons: Vec<Mismatch>,
}

impl SyncDecision {
    pub fn needs_upload(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn fingerprint_differs(&self) -> bool {
        self.reasons
            .iter()
            .any(|r| matches!(r, Mismatch::Fingerprint { .. }))
    }

    pub fn size_differs(&self) -> bool {
        self.reasons.iter().any(|r| matches!(r, Mismatch::Size { .. }))
    }

    pub fn content_type_differs(&self) -> bool {
        self.reasons
            .iter()
            .any(|r| matches!(r, Mismatch::ContentType { .. }))
    }
}
