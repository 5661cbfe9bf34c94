mod args;
mod gpu;
mod hub;
mod launch;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hearth_common::{plan, ConfigError, ModelCatalog, ModelFootprint, PlacementPlan};

use crate::args::Args;
use crate::hub::HubClient;
use crate::launch::{launch_runtime, write_settings_file, ChatSettings, RuntimeHandle};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!(models=%args.models, model_dir=%args.model_dir, "hearth-provision starting");

    // Provisioning-time errors are fatal by design: a partially provisioned
    // host is unsafe, so every ? below aborts the run.
    if args.hub_token.is_none() && !args.allow_anonymous {
        return Err(ConfigError::MissingHubToken.into());
    }

    let catalog = ModelCatalog::parse(&args.models, &args.quantization)?;
    let policy = args.placement_policy()?;

    let pool = gpu::probe_accelerators().await;

    let hub = HubClient::new(&args.hub_url, args.hub_token.clone())?;
    let model_dir = PathBuf::from(&args.model_dir);

    let mut footprints: Vec<ModelFootprint> = Vec::with_capacity(catalog.entries.len());
    let mut artifact_dirs: Vec<PathBuf> = Vec::with_capacity(catalog.entries.len());
    for entry in &catalog.entries {
        let artifacts = hub.download_model(entry, &model_dir).await?;
        let footprint = hub::resolve_footprint(entry, &artifacts).await;
        tracing::info!(
            repo=%entry.repo_id,
            footprint_mb = footprint.footprint_mb,
            artifacts = artifacts.len(),
            "model ready on disk"
        );
        // The chat settings file points at the first artifact's directory.
        artifact_dirs.push(
            artifacts
                .first()
                .and_then(|p| p.parent())
                .unwrap_or(&model_dir)
                .to_path_buf(),
        );
        footprints.push(footprint);
    }

    let placement = plan(&footprints, &pool, &policy)?;
    report_plan(&placement);

    if args.skip_launch {
        tracing::info!("--skip-launch set, stopping after planning");
        return Ok(());
    }

    let mut handles: Vec<RuntimeHandle> = Vec::new();
    for (i, model_placement) in placement.placements.iter().enumerate() {
        let port = args.runtime_port + i as u16;
        let handle = launch_runtime(
            &args.runtime_bin,
            &args.runtime_host,
            port,
            &artifact_dirs[i],
            model_placement,
            Duration::from_secs(args.ready_timeout_secs),
        )
        .await?;
        handles.push(handle);
    }

    let settings = ChatSettings {
        default_user: args.chat_user.clone(),
        default_password: args.chat_password.clone(),
        model_path: artifact_dirs
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| args.model_dir.clone()),
        serve_port: handles.first().map(|h| h.port).unwrap_or(args.runtime_port),
    };
    write_settings_file(&args.settings_path, &settings).await?;

    tracing::info!(runtimes = handles.len(), "provisioning complete, supervising runtimes");

    // Supervise: if any runtime exits, report its status and stop the rest.
    supervise(handles).await
}

fn report_plan(placement: &PlacementPlan) {
    tracing::info!(strategy = ?placement.strategy, "placement plan computed");
    for p in &placement.placements {
        tracing::info!(
            model=%p.repo_id,
            footprint_mb = p.footprint_mb,
            devices = ?p.device_indices,
            parallelism = p.parallelism_degree,
            "placement"
        );
    }
}

async fn supervise(handles: Vec<RuntimeHandle>) -> Result<()> {
    if handles.is_empty() {
        return Ok(());
    }

    let mut tasks = Vec::new();
    for mut handle in handles {
        tasks.push(tokio::spawn(async move {
            let status = handle.child.wait().await;
            (handle.base_url, status)
        }));
    }

    // First exit wins; kill_on_drop reaps the others.
    let (result, _, _) = futures_util::future::select_all(tasks).await;
    match result {
        Ok((base_url, Ok(status))) => {
            anyhow::bail!("runtime at {base_url} exited: {status}")
        }
        Ok((base_url, Err(e))) => {
            anyhow::bail!("failed waiting on runtime at {base_url}: {e}")
        }
        Err(e) => anyhow::bail!("supervisor task failed: {e}"),
    }
}
