//! SyncService — walks a build tree and pushes every changed file.
//!
//! Each file goes through describe → probe → diff → (maybe) upload on its
//! own; files share nothing but the read-only content table and the store
//! client. Every file is attempted even when others fail, and every outcome
//! is collected into a [`SyncReport`].

use crate::{
    errors::{SyncError, SyncResult},
    models::{ContentTable, LocalDescriptor, Mismatch},
    services::{diff::diff, store_client::StoreClient},
};
use futures::FutureExt;
use serde::Serialize;
use std::{
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// One file at a time, in walk order.
    Sequential,
    /// One task per file, spawned as soon as the file is discovered.
    #[default]
    Concurrent,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Cap on files processed at once in concurrent mode; 0 means no cap.
    pub max_in_flight: usize,
    /// Decide but never upload.
    pub dry_run: bool,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileAction {
    Uploaded {
        item_path: String,
        reasons: Vec<Mismatch>,
    },
    /// Would have been uploaded, but this is a dry run.
    Skipped {
        item_path: String,
        reasons: Vec<Mismatch>,
    },
    Unchanged {
        item_path: String,
    },
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: SyncResult<FileAction>,
}

/// Outcomes in completion order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FileOutcome>,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Serializable digest of a [`SyncReport`].
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub attempted: usize,
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub unchanged: usize,
    pub failed: Vec<FailedFile>,
}

impl SyncReport {
    pub fn actions(&self) -> impl Iterator<Item = &FileAction> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn uploaded(&self) -> Vec<&str> {
        self.actions()
            .filter_map(|a| match a {
                FileAction::Uploaded { item_path, .. } => Some(item_path.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_path(), e)))
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary {
            attempted: self.outcomes.len(),
            uploaded: Vec::new(),
            skipped: Vec::new(),
            unchanged: 0,
            failed: Vec::new(),
        };
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(FileAction::Uploaded { item_path, .. }) => {
                    summary.uploaded.push(item_path.clone())
                }
                Ok(FileAction::Skipped { item_path, .. }) => {
                    summary.skipped.push(item_path.clone())
                }
                Ok(FileAction::Unchanged { .. }) => summary.unchanged += 1,
                Err(err) => summary.failed.push(FailedFile {
                    path: outcome.path.clone(),
                    error: err.to_string(),
                }),
            }
        }
        summary
    }

    /// The last failure observed, if any file failed.
    pub fn into_result(self) -> SyncResult<()> {
        match self.outcomes.into_iter().filter_map(|o| o.result.err()).last() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct SyncService {
    client: StoreClient,
    table: Arc<ContentTable>,
    bucket: Arc<str>,
    options: SyncOptions,
}

impl SyncService {
    pub fn new(
        client: StoreClient,
        table: ContentTable,
        bucket: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            table: Arc::new(table),
            bucket: Arc::from(bucket.into()),
            options,
        }
    }

    /// Sync every file below `root`.
    ///
    /// Returns once every dispatched file has reported. A failure to walk
    /// the tree stops discovery; files already dispatched still run to
    /// completion before the walk error is returned.
    pub async fn sync_dir(&self, root: &Path) -> SyncResult<SyncReport> {
        let root: Arc<Path> = Arc::from(root);
        let limiter = (self.options.max_in_flight > 0)
            .then(|| Arc::new(Semaphore::new(self.options.max_in_flight)));

        let mut report = SyncReport::default();
        let mut tasks = JoinSet::new();
        let mut walk_error = None;

        // The walk runs inline on this task, so files are dispatched in walk order.
        for entry in WalkDir::new(&*root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    walk_error = Some(err);
                    break;
                }
            };
            // Symlinks are not followed. Only regular files are published.
            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("skipping non-regular entry {}", entry.path().display());
                }
                continue;
            }
            let path = entry.into_path();

            match self.options.mode {
                SyncMode::Sequential => {
                    report.outcomes.push(self.run_one(&root, path).await);
                }
                SyncMode::Concurrent => {
                    let service = self.clone();
                    let root = root.clone();
                    let limiter = limiter.clone();
                    tasks.spawn(async move {
                        let _permit = match limiter {
                            Some(limiter) => limiter.acquire_owned().await.ok(),
                            None => None,
                        };
                        service.run_one(&root, path).await
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|err| FileOutcome {
                path: root.to_path_buf(),
                result: Err(SyncError::Task(err.to_string())),
            });
            report.outcomes.push(outcome);
        }

        if let Some(err) = walk_error {
            warn!("walk of {} aborted: {}", root.display(), err);
            return Err(SyncError::Walk(err));
        }

        info!(
            "synced {} files from {} ({} failed)",
            report.outcomes.len(),
            root.display(),
            report.failures().count()
        );
        Ok(report)
    }

    async fn run_one(&self, root: &Path, path: PathBuf) -> FileOutcome {
        let result = AssertUnwindSafe(self.sync_file(root, &path))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(SyncError::Task(format!("{} panicked", path.display()))));
        if let Err(err) = &result {
            warn!("{} : {}", path.display(), err);
        }
        FileOutcome { path, result }
    }

    async fn sync_file(&self, root: &Path, path: &Path) -> SyncResult<FileAction> {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let local = LocalDescriptor::from_file(path, relative, &self.table).await?;
        let remote = self.client.probe(&self.bucket, &local.item_path).await?;

        let decision = diff(&local, &remote);
        let item_path = local.item_path.clone();
        if !decision.needs_upload() {
            return Ok(FileAction::Unchanged { item_path });
        }

        if self.options.dry_run {
            info!("would upload {}", path.display());
            return Ok(FileAction::Skipped {
                item_path,
                reasons: decision.reasons,
            });
        }

        info!("{}", path.display());
        self.client.upload(path, &self.bucket, &local).await?;
        Ok(FileAction::Uploaded {
            item_path,
            reasons: decision.reasons,
        })
    }
}
