use anyhow::{Context, Result};
use site_sync::{
    config::{AppConfig, BuildConfig, DeployConfig, Task},
    models::{ContentTable, Credentials},
    services::{
        build_service::{BuildService, git_root},
        signer::RequestSigner,
        store_client::StoreClient,
        sync_service::SyncService,
    },
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting site-sync with config: {:?}", cfg);

    match cfg.task {
        Task::Build(build) => run_build(&cfg.site_dir, build).await,
        Task::Deploy(deploy) => run_deploy(&cfg.site_dir, deploy).await,
    }
}

async fn run_build(site_dir: &Path, build: BuildConfig) -> Result<()> {
    tracing::info!("building for environment [{}]", build.env);

    let source = match build.source_dir {
        Some(dir) => dir,
        None => git_root().await.context("locating git work tree")?,
    };
    tracing::info!("building {} into {}", source.display(), site_dir.display());

    BuildService::default()
        .build_and_swap(&source, site_dir)
        .await
        .with_context(|| format!("building {}", source.display()))?;
    Ok(())
}

async fn run_deploy(site_dir: &Path, deploy: DeployConfig) -> Result<()> {
    // Credentials are a precondition: fail before touching the network.
    let credentials = Credentials::from_env().context("loading store credentials")?;

    let client = StoreClient::new(
        deploy.endpoint,
        RequestSigner::new(deploy.store_host),
        credentials,
    );
    let service = SyncService::new(
        client,
        ContentTable::site_defaults(),
        deploy.bucket.clone(),
        deploy.options,
    );

    tracing::info!("syncing {} to {}", site_dir.display(), deploy.bucket);
    let report = service
        .sync_dir(site_dir)
        .await
        .with_context(|| format!("syncing {}", site_dir.display()))?;

    let summary = report.summary();
    if deploy.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    for failed in &summary.failed {
        tracing::error!("{} : {}", failed.path.display(), failed.error);
    }
    tracing::info!(
        "{} uploaded, {} unchanged, {} skipped, {} failed",
        summary.uploaded.len(),
        summary.unchanged,
        summary.skipped.len(),
        summary.failed.len()
    );

    report.into_result().context("deploy finished with failures")?;
    Ok(())
}
