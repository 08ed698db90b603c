//! Decide whether a local artifact has to be pushed.

use crate::models::{LocalDescriptor, Mismatch, RemoteDescriptor, SyncDecision};
use chrono::Utc;
use tracing::{debug, info};

/// Compare a local artifact with its remote copy.
///
/// Fingerprint, size and content type are checked independently and every
/// mismatch is reported. Content type only counts when the local side has
/// one. Modification times are logged but never decide anything: the build
/// step does not preserve them for every file type. An absent remote object
/// has an empty fingerprint and zero size, so it always needs an upload.
pub fn diff(local: &LocalDescriptor, remote: &RemoteDescriptor) -> SyncDecision {
    let mut reasons = Vec::new();

    if local.fingerprint != remote.fingerprint {
        reasons.push(Mismatch::Fingerprint {
            local: local.fingerprint.clone(),
            remote: remote.fingerprint.clone(),
        });
    }
    if local.content_length != remote.size {
        reasons.push(Mismatch::Size {
            local: local.content_length,
            remote: remote.size,
        });
    }
    if let Some(content_type) = local.content_type.as_deref() {
        if !content_type.is_empty() && content_type != remote.content_type {
            reasons.push(Mismatch::ContentType {
                local: content_type.to_string(),
                remote: remote.content_type.clone(),
            });
        }
    }

    if let Some(remote_time) = remote.mod_time {
        if local.mod_time > remote_time.with_timezone(&Utc) {
            debug!(
                "{}: date diff local[{}] > remote[{}] (ignored)",
                local.item_path, local.mod_time, remote_time
            );
        }
    }

    for reason in &reasons {
        info!("{}: {}", local.item_path, reason);
    }
    SyncDecision { reasons }
}
