use crate::services::{
    store_client::{DEFAULT_STORE_HOST, StoreEndpoint},
    sync_service::{SyncMode, SyncOptions},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_BUCKET: &str = "akusete.com";

/// Resolved settings for one invocation: where the site lives and which
/// task to run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory the build writes to and the deploy reads from.
    pub site_dir: PathBuf,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub enum Task {
    Build(BuildConfig),
    Deploy(DeployConfig),
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// `None` means the enclosing git work tree.
    pub source_dir: Option<PathBuf>,
    pub env: String,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub bucket: String,
    pub store_host: String,
    pub endpoint: StoreEndpoint,
    pub options: SyncOptions,
    pub json: bool,
}

/// `site-sync` command line. Unset values fall back to `SITE_SYNC_*`.
#[derive(Parser, Debug)]
#[command(author, version, about = "Static site build and incremental object-store deploy")]
pub struct Args {
    /// Site directory (overrides SITE_SYNC_SITE_DIR, default ~/Sites)
    #[arg(long, global = true)]
    pub site_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the source tree into the site directory
    Build(BuildArgs),
    /// Upload changed files from the site directory
    Deploy(DeployArgs),
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Source tree (default: the enclosing git work tree)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Build environment label
    #[arg(long)]
    pub env: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct DeployArgs {
    /// Destination bucket (overrides SITE_SYNC_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Store host buckets are addressed under (overrides SITE_SYNC_STORE_HOST)
    #[arg(long)]
    pub store_host: Option<String>,

    /// Path-style endpoint base URL (overrides SITE_SYNC_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Process one file at a time
    #[arg(long)]
    pub sequential: bool,

    /// Max files in flight, 0 for unbounded (overrides SITE_SYNC_MAX_IN_FLIGHT)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Report what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Print the sync summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name))
    }

    /// Merge parsed arguments with an environment lookup. CLI values win
    /// over the environment, which wins over built-in defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let site_dir = match args.site_dir {
            Some(dir) => dir,
            None => match env_value(&lookup, "SITE_SYNC_SITE_DIR")? {
                Some(dir) => PathBuf::from(dir),
                None => dirs::home_dir()
                    .map(|home| home.join("Sites"))
                    .ok_or_else(|| anyhow!("cannot locate home directory; pass --site-dir"))?,
            },
        };

        let task = match args.command {
            Command::Build(build) => Task::Build(BuildConfig {
                source_dir: build.source,
                env: build.env.unwrap_or_else(|| "local".into()),
            }),
            Command::Deploy(deploy) => {
                let bucket = match deploy.bucket {
                    Some(bucket) => bucket,
                    None => env_value(&lookup, "SITE_SYNC_BUCKET")?
                        .unwrap_or_else(|| DEFAULT_BUCKET.into()),
                };
                let store_host = match deploy.store_host {
                    Some(host) => host,
                    None => env_value(&lookup, "SITE_SYNC_STORE_HOST")?
                        .unwrap_or_else(|| DEFAULT_STORE_HOST.into()),
                };
                let endpoint = match deploy.endpoint {
                    Some(base) => Some(base),
                    None => env_value(&lookup, "SITE_SYNC_ENDPOINT")?,
                };
                let endpoint = match endpoint {
                    Some(base) => StoreEndpoint::PathStyle {
                        base: Url::parse(&base)
                            .with_context(|| format!("parsing endpoint `{}`", base))?,
                    },
                    None => StoreEndpoint::VirtualHost {
                        host: store_host.clone(),
                    },
                };
                let max_in_flight = match deploy.max_in_flight {
                    Some(n) => n,
                    None => env_parse(&lookup, "SITE_SYNC_MAX_IN_FLIGHT", 0)?,
                };

                Task::Deploy(DeployConfig {
                    bucket,
                    store_host,
                    endpoint,
                    options: SyncOptions {
                        mode: if deploy.sequential {
                            SyncMode::Sequential
                        } else {
                            SyncMode::Concurrent
                        },
                        max_in_flight,
                        dry_run: deploy.dry_run,
                    },
                    json: deploy.json,
                })
            }
        };

        Ok(Self { site_dir, task })
    }
}

fn env_value<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_parse<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_value(lookup, name)? {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
