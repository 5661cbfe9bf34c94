use tokio::process::Command;

use hearth_common::AcceleratorPool;

/// Probe the host's accelerators once per provisioning run. A missing or
/// failing nvidia-smi yields an empty pool; planning then fails loudly
/// instead of guessing.
pub async fn probe_accelerators() -> AcceleratorPool {
    let output = Command::new("nvidia-smi")
        .arg("--query-gpu=memory.total,memory.used")
        .arg("--format=csv,noheader,nounits")
        .output()
        .await;

    let Ok(output) = output else {
        tracing::warn!("nvidia-smi not available, assuming no accelerators");
        return AcceleratorPool::default();
    };
    if !output.status.success() {
        tracing::warn!(status=%output.status, "nvidia-smi failed, assuming no accelerators");
        return AcceleratorPool::default();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pool = AcceleratorPool::new(parse_free_memory(&stdout));
    tracing::info!(
        devices = pool.device_count(),
        total_mb = pool.total_memory_mb(),
        "probed accelerators"
    );
    pool
}

/// Parse `memory.total,memory.used` csv lines into per-device free MB.
fn parse_free_memory(stdout: &str) -> Vec<u64> {
    let mut out = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }
        let total = parts[0].parse::<u64>().unwrap_or(0);
        let used = parts[1].parse::<u64>().unwrap_or(0);
        out.push(total.saturating_sub(used));
    }
    out
}
