use std::path::Path;
use std::time::Duration;

use tokio::process::{Child, Command};

use hearth_common::placement::ModelPlacement;

/// A supervised model runtime process.
pub struct RuntimeHandle {
    pub base_url: String,
    pub port: u16,
    pub child: Child,
}

/// Spawn the serving runtime for one placement and wait for its readiness
/// probe. Failure produces a structured report (exit status or probe
/// timeout) instead of silently polling a port.
pub async fn launch_runtime(
    runtime_bin: &str,
    host: &str,
    port: u16,
    model_path: &Path,
    placement: &ModelPlacement,
    ready_timeout: Duration,
) -> anyhow::Result<RuntimeHandle> {
    let devices: Vec<String> = placement
        .device_indices
        .iter()
        .map(|i| i.to_string())
        .collect();

    tracing::info!(
        model=%placement.repo_id,
        port,
        devices=%devices.join(","),
        parallelism = placement.parallelism_degree,
        "starting model runtime"
    );

    let mut cmd = Command::new(runtime_bin);
    cmd.arg("serve")
        .arg("--model")
        .arg(model_path)
        .arg("--host")
        .arg(host)
        .arg("--port")
        .arg(port.to_string())
        .arg("--tensor-parallel-size")
        .arg(placement.parallelism_degree.to_string())
        .env("CUDA_VISIBLE_DEVICES", devices.join(","))
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        anyhow::anyhow!("failed to spawn runtime {runtime_bin} for {}: {e}", placement.repo_id)
    })?;

    let base_url = format!("http://{host}:{port}");
    match wait_runtime_ready(&mut child, &base_url, ready_timeout).await {
        Ok(()) => {
            tracing::info!(model=%placement.repo_id, %base_url, "runtime ready");
            Ok(RuntimeHandle {
                base_url,
                port,
                child,
            })
        }
        Err(e) => {
            let _ = child.kill().await;
            Err(e)
        }
    }
}

/// Explicit readiness probe: poll /health until success or deadline, and
/// notice a runtime that exits before ever becoming ready.
async fn wait_runtime_ready(
    child: &mut Child,
    base_url: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(5))
        .build()?;

    let health_url = format!("{}/health", base_url.trim_end_matches('/'));
    let start = tokio::time::Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            anyhow::bail!("runtime exited before becoming ready: {status}");
        }
        if start.elapsed() > timeout {
            anyhow::bail!(
                "runtime not ready within {}s (probe {health_url})",
                timeout.as_secs()
            );
        }

        if let Ok(resp) = http.get(&health_url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Settings consumed by the downstream chat application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub default_user: String,
    pub default_password: String,
    pub model_path: String,
    pub serve_port: u16,
}

impl ChatSettings {
    pub fn render(&self) -> String {
        format!(
            "CHAT_DEFAULT_USER={}\nCHAT_DEFAULT_PASSWORD={}\nCHAT_MODEL_PATH={}\nCHAT_SERVE_PORT={}\n",
            self.default_user, self.default_password, self.model_path, self.serve_port
        )
    }
}

pub async fn write_settings_file(path: &str, settings: &ChatSettings) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, settings.render()).await?;
    tracing::info!(%path, "wrote chat application settings");
    Ok(())
}
