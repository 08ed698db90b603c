//! BuildService — turns a source tree into a deployable build tree.
//!
//! Files are dispatched by extension (see `routes`) to build steps that run
//! concurrently, one task per file. The output is assembled in a staging
//! directory beside the deploy directory and only swapped into place when
//! every step succeeded.

use crate::{
    errors::{BuildError, BuildResult, build_io},
    handlers::build_handlers::{BuildContext, BuildHandler},
    models::content_table::extension_of,
    routes::routes::{IGNORED_NAMES, routes},
};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, process::Command, task::JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Files handed to a build step, including ignored ones.
    pub dispatched: usize,
    /// Files with no build step for their extension.
    pub unknown: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, BuildError)>,
}

impl BuildReport {
    /// The last failure observed, if any step failed.
    pub fn into_result(mut self) -> BuildResult<Self> {
        match self.failures.pop() {
            Some((_, err)) => Err(err),
            None => Ok(self),
        }
    }
}

#[derive(Clone)]
pub struct BuildService {
    routes: Arc<HashMap<&'static str, BuildHandler>>,
}

impl Default for BuildService {
    fn default() -> Self {
        Self::new(routes())
    }
}

impl BuildService {
    pub fn new(routes: HashMap<&'static str, BuildHandler>) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Run every build step for `src_dir` into `build_dir`.
    ///
    /// Unreadable entries are logged and skipped. Every file is attempted;
    /// failures are collected in the report.
    pub async fn build(&self, src_dir: &Path, build_dir: &Path) -> BuildResult<BuildReport> {
        self.build_excluding(src_dir, build_dir, &[]).await
    }

    /// [`build`](Self::build), also skipping the `excluded` directories.
    async fn build_excluding(
        &self,
        src_dir: &Path,
        build_dir: &Path,
        excluded: &[&Path],
    ) -> BuildResult<BuildReport> {
        let ctx = Arc::new(BuildContext {
            src_dir: src_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
        });
        let mut report = BuildReport::default();
        let mut tasks = JoinSet::new();

        let walker = WalkDir::new(src_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !is_ignored(e) && e.path() != build_dir && !excluded.contains(&e.path())
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("{}", err);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let ext = extension_of(&name);
            let Some(handler) = self.routes.get(ext).copied() else {
                info!("unknown ext {} ({})", ext, entry.path().display());
                report.unknown.push(entry.into_path());
                continue;
            };

            report.dispatched += 1;
            let ctx = ctx.clone();
            let path = entry.into_path();
            tasks.spawn(async move {
                let result = run_handler(handler, &ctx, &path).await;
                (path, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (path, result) = match joined {
                Ok(done) => done,
                Err(err) => (src_dir.to_path_buf(), Err(BuildError::Task(err.to_string()))),
            };
            if let Err(err) = result {
                warn!("{} : {}", path.display(), err);
                report.failures.push((path, err));
            }
        }

        info!(
            "built {} files from {} ({} failed, {} unknown)",
            report.dispatched,
            src_dir.display(),
            report.failures.len(),
            report.unknown.len()
        );
        Ok(report)
    }

    /// Build `src_dir` into a fresh staging directory, then replace
    /// `deploy_dir` with it. On any failure the staging directory is removed
    /// and `deploy_dir` is left untouched.
    pub async fn build_and_swap(&self, src_dir: &Path, deploy_dir: &Path) -> BuildResult<BuildReport> {
        let staging = staging_dir(deploy_dir);
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| build_io(&staging, e))?;
        debug!("staging build in {}", staging.display());

        let built = self
            .build_excluding(src_dir, &staging, &[deploy_dir])
            .await
            .and_then(BuildReport::into_result);
        let report = match built {
            Ok(report) => report,
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                    warn!("could not remove {}: {}", staging.display(), cleanup);
                }
                return Err(err);
            }
        };

        match fs::remove_dir_all(deploy_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(build_io(deploy_dir, err)),
        }
        fs::rename(&staging, deploy_dir)
            .await
            .map_err(|e| build_io(deploy_dir, e))?;
        set_dir_mode(deploy_dir).await?;
        info!("deployed build to {}", deploy_dir.display());
        Ok(report)
    }
}

async fn run_handler(handler: BuildHandler, ctx: &BuildContext, path: &Path) -> BuildResult<()> {
    let metadata = fs::metadata(path).await.map_err(|e| build_io(path, e))?;
    let modified = metadata.modified().map_err(|e| build_io(path, e))?;
    handler.run(ctx, path, modified).await
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && IGNORED_NAMES
            .iter()
            .any(|name| entry.file_name() == std::ffi::OsStr::new(name))
}

/// `<parent>/.<name>-build-<uuid>`, on the same filesystem as `deploy_dir`
/// so the final swap is a rename.
fn staging_dir(deploy_dir: &Path) -> PathBuf {
    let parent = deploy_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = deploy_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "site".into());
    parent.join(format!(".{}-build-{}", name, Uuid::new_v4()))
}

#[cfg(unix)]
async fn set_dir_mode(dir: &Path) -> BuildResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| build_io(dir, e))
}

#[cfg(not(unix))]
async fn set_dir_mode(_dir: &Path) -> BuildResult<()> {
    Ok(())
}

/// Top of the git work tree containing the current directory.
pub async fn git_root() -> BuildResult<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .await
        .map_err(|source| BuildError::Spawn {
            program: "git".into(),
            source,
        })?;
    if !output.status.success() {
        return Err(BuildError::Command {
            program: "git".into(),
            status: output.status,
        });
    }
    Ok(PathBuf::from(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
