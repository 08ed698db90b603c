//! Build steps, one per kind of source file.
//!
//! Every step writes its artifact at the same relative location below the
//! build directory (with the extension swapped where the step compiles),
//! then stamps it with the source's modification time and mode 0755.
//! Compilers and gzip are external programs.

use crate::{
    errors::{BuildError, BuildResult, build_io},
    models::content_table::extension_of,
};
use filetime::FileTime;
use regex::Regex;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::LazyLock,
    time::SystemTime,
};
use tokio::{fs, process::Command};

static COFFEE_JSON_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";|\(|\)").expect("punctuation pattern compiles"));
static COFFEE_JSON_BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):").expect("bare key pattern compiles"));

/// Source and destination roots for one build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub src_dir: PathBuf,
    pub build_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildHandler {
    /// Copy verbatim.
    Copy,
    /// Copy, then gzip in place.
    CopyAndZip,
    /// `lessc` to `.css`, gzipped. Partials (`_*.less`) are skipped.
    Less,
    /// `coffee -p` to `.js`, gzipped.
    CoffeeScript,
    /// `coffee -p -b` from `coffee/` into `js/` as gzipped `.json`.
    CoffeeJson,
    /// `go build` to an extensionless binary.
    Go,
    Ignore,
}

impl BuildHandler {
    pub async fn run(self, ctx: &BuildContext, path: &Path, modified: SystemTime) -> BuildResult<()> {
        match self {
            BuildHandler::Copy => copy_to_build(ctx, path, modified).await,
            BuildHandler::CopyAndZip => copy_and_zip(ctx, path, modified).await,
            BuildHandler::Less => compile_less(ctx, path, modified).await,
            BuildHandler::CoffeeScript => compile_coffee_script(ctx, path, modified).await,
            BuildHandler::CoffeeJson => compile_coffee_json(ctx, path, modified).await,
            BuildHandler::Go => compile_go(ctx, path, modified).await,
            BuildHandler::Ignore => Ok(()),
        }
    }
}

async fn copy_to_build(ctx: &BuildContext, path: &Path, modified: SystemTime) -> BuildResult<()> {
    let dest = copy(ctx, path).await?;
    finish(&dest, modified).await
}

async fn copy_and_zip(ctx: &BuildContext, path: &Path, modified: SystemTime) -> BuildResult<()> {
    let dest = copy(ctx, path).await?;
    gzip_file(&dest).await?;
    finish(&dest, modified).await
}

async fn compile_less(ctx: &BuildContext, path: &Path, modified: SystemTime) -> BuildResult<()> {
    if is_partial(path) {
        return Ok(());
    }
    let dest = replace_path_and_extension(&ctx.src_dir, &ctx.build_dir, path, ".css")?;
    ensure_parent(&dest).await?;
    pipe_command_to_file("lessc", [path.as_os_str()], &dest).await?;
    gzip_file(&dest).await?;
    finish(&dest, modified).await
}

async fn compile_coffee_script(
    ctx: &BuildContext,
    path: &Path,
    modified: SystemTime,
) -> BuildResult<()> {
    let dest = replace_path_and_extension(&ctx.src_dir, &ctx.build_dir, path, ".js")?;
    ensure_parent(&dest).await?;
    pipe_command_to_file("coffee", [OsStr::new("-p"), path.as_os_str()], &dest).await?;
    gzip_file(&dest).await?;
    finish(&dest, modified).await
}

async fn compile_coffee_json(
    ctx: &BuildContext,
    path: &Path,
    modified: SystemTime,
) -> BuildResult<()> {
    let src_dir = ctx.src_dir.join("coffee");
    let build_dir = ctx.build_dir.join("js");
    let dest = replace_path_and_extension(&src_dir, &build_dir, path, ".json")?;
    ensure_parent(&dest).await?;
    pipe_command_to_file(
        "coffee",
        [OsStr::new("-p"), OsStr::new("-b"), path.as_os_str()],
        &dest,
    )
    .await?;

    let compiled = fs::read_to_string(&dest)
        .await
        .map_err(|e| build_io(&dest, e))?;
    fs::write(&dest, quote_coffee_json(&compiled))
        .await
        .map_err(|e| build_io(&dest, e))?;

    gzip_file(&dest).await?;
    finish(&dest, modified).await
}

async fn compile_go(ctx: &BuildContext, path: &Path, modified: SystemTime) -> BuildResult<()> {
    let dest = replace_path_and_extension(&ctx.src_dir, &ctx.build_dir, path, "")?;
    ensure_parent(&dest).await?;
    let status = Command::new("go")
        .arg("build")
        .arg("-o")
        .arg(&dest)
        .arg(path)
        .status()
        .await
        .map_err(|source| BuildError::Spawn {
            program: "go".into(),
            source,
        })?;
    check_status("go", status)?;
    finish(&dest, modified).await
}

/// Turn compiled CoffeeScript object literals into JSON: drop `;`, `(` and
/// `)`, then quote bare `key:` names.
pub fn quote_coffee_json(compiled: &str) -> String {
    let stripped = COFFEE_JSON_PUNCTUATION.replace_all(compiled, "");
    COFFEE_JSON_BARE_KEY
        .replace_all(&stripped, "\"$1\":")
        .into_owned()
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('_'))
        .unwrap_or(false)
}

pub fn replace_base_path(src_dir: &Path, build_dir: &Path, path: &Path) -> BuildResult<PathBuf> {
    let relative = path
        .strip_prefix(src_dir)
        .map_err(|_| BuildError::OutsideRoot {
            path: path.to_path_buf(),
            root: src_dir.to_path_buf(),
        })?;
    Ok(build_dir.join(relative))
}

/// Swap the extension (as defined by [`extension_of`]) for `ext`, which may
/// be empty.
pub fn replace_extension(path: &Path, ext: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = &name[..name.len() - extension_of(&name).len()];
    path.with_file_name(format!("{stem}{ext}"))
}

pub fn replace_path_and_extension(
    src_dir: &Path,
    build_dir: &Path,
    path: &Path,
    ext: &str,
) -> BuildResult<PathBuf> {
    Ok(replace_extension(
        &replace_base_path(src_dir, build_dir, path)?,
        ext,
    ))
}

async fn copy(ctx: &BuildContext, path: &Path) -> BuildResult<PathBuf> {
    let dest = replace_base_path(&ctx.src_dir, &ctx.build_dir, path)?;
    ensure_parent(&dest).await?;
    fs::copy(path, &dest).await.map_err(|e| build_io(&dest, e))?;
    Ok(dest)
}

async fn ensure_parent(dest: &Path) -> BuildResult<()> {
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir).await.map_err(|e| build_io(dir, e))?;
    }
    Ok(())
}

async fn pipe_command_to_file<I, S>(program: &str, args: I, dest: &Path) -> BuildResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let file = std::fs::File::create(dest).map_err(|e| build_io(dest, e))?;
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::from(file))
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| BuildError::Spawn {
            program: program.into(),
            source,
        })?;
    check_status(program, status)
}

/// Gzip `path` in place (`gzip -n` keeps the output independent of the
/// file name and time).
pub async fn gzip_file(path: &Path) -> BuildResult<()> {
    let status = Command::new("gzip")
        .arg("-n")
        .arg(path)
        .status()
        .await
        .map_err(|source| BuildError::Spawn {
            program: "gzip".into(),
            source,
        })?;
    check_status("gzip", status)?;

    let mut zipped = path.as_os_str().to_owned();
    zipped.push(".gz");
    let zipped = PathBuf::from(zipped);
    fs::rename(&zipped, path)
        .await
        .map_err(|e| build_io(&zipped, e))
}

fn check_status(program: &str, status: ExitStatus) -> BuildResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::Command {
            program: program.into(),
            status,
        })
    }
}

/// Stamp `dest` with the source's modification time and make it 0755.
async fn finish(dest: &Path, modified: SystemTime) -> BuildResult<()> {
    let time = FileTime::from_system_time(modified);
    filetime::set_file_times(dest, time, time).map_err(|e| build_io(dest, e))?;
    set_mode(dest).await
}

#[cfg(unix)]
async fn set_mode(dest: &Path) -> BuildResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| build_io(dest, e))
}

#[cfg(not(unix))]
async fn set_mode(_dest: &Path) -> BuildResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context() -> (TempDir, BuildContext) {
        let tmp = TempDir::new().expect("tmp");
        let ctx = BuildContext {
            src_dir: tmp.path().join("src"),
            build_dir: tmp.path().join("build"),
        };
        std::fs::create_dir_all(&ctx.src_dir).expect("src");
        std::fs::create_dir_all(&ctx.build_dir).expect("build");
        (tmp, ctx)
    }

    fn gzip_available() -> bool {
        std::process::Command::new("gzip")
            .arg("--version")
            .output()
            .is_ok()
    }

    #[test]
    fn extension_replacement() {
        assert_eq!(
            replace_extension(Path::new("a/b/site.less"), ".css"),
            PathBuf::from("a/b/site.css")
        );
        assert_eq!(
            replace_extension(Path::new("cmd/server.go"), ""),
            PathBuf::from("cmd/server")
        );
    }

    #[test]
    fn base_path_replacement_rejects_foreign_paths() {
        let moved = replace_base_path(
            Path::new("/src"),
            Path::new("/build"),
            Path::new("/src/css/a.css"),
        )
        .expect("inside");
        assert_eq!(moved, PathBuf::from("/build/css/a.css"));

        let err = replace_base_path(Path::new("/src"), Path::new("/build"), Path::new("/etc/x"))
            .unwrap_err();
        assert!(matches!(err, BuildError::OutsideRoot { .. }));
    }

    #[test]
    fn coffee_json_keys_are_quoted() {
        let compiled = "({\n  name: 'site',\n  pages: [1, 2]\n});\n";
        assert_eq!(
            quote_coffee_json(compiled),
            "{\n  \"name\": 'site',\n  \"pages\": [1, 2]\n}\n"
        );
    }

    #[tokio::test]
    async fn copy_preserves_mtime_and_sets_mode() {
        let (_tmp, ctx) = context();
        let src = ctx.src_dir.join("img/logo.png");
        std::fs::create_dir_all(src.parent().expect("parent")).expect("mkdir");
        std::fs::write(&src, b"png").expect("write");
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_362_477_600);

        BuildHandler::Copy
            .run(&ctx, &src, modified)
            .await
            .expect("copy");

        let dest = ctx.build_dir.join("img/logo.png");
        assert_eq!(std::fs::read(&dest).expect("read"), b"png");
        let meta = std::fs::metadata(&dest).expect("meta");
        assert_eq!(meta.modified().expect("mtime"), modified);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(meta.permissions().mode() & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn copy_and_zip_compresses_in_place() {
        if !gzip_available() {
            return;
        }
        let (_tmp, ctx) = context();
        let src = ctx.src_dir.join("index.html");
        std::fs::write(&src, b"<html></html>").expect("write");

        BuildHandler::CopyAndZip
            .run(&ctx, &src, SystemTime::now())
            .await
            .expect("zip");

        let bytes = std::fs::read(ctx.build_dir.join("index.html")).expect("read");
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert!(!ctx.build_dir.join("index.html.gz").exists());
    }

    #[tokio::test]
    async fn less_partials_are_skipped() {
        let (_tmp, ctx) = context();
        let src = ctx.src_dir.join("_mixins.less");
        std::fs::write(&src, b".a { }").expect("write");

        BuildHandler::Less
            .run(&ctx, &src, SystemTime::now())
            .await
            .expect("skip");
        assert!(!ctx.build_dir.join("_mixins.css").exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let tmp = TempDir::new().expect("tmp");
        let err = pipe_command_to_file(
            "definitely-not-a-real-compiler",
            [OsStr::new("x")],
            &tmp.path().join("out"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
