use clap::Parser;

use hearth_common::{AssignmentMode, DistributionMode, PlacementPolicy};

#[derive(Debug, Parser)]
pub struct Args {
    /// Model catalog: comma-separated `repo[:quant][:size_mb]` entries.
    #[arg(long, env = "HEARTH_MODELS")]
    pub models: String,

    /// Default quantization tag for entries without an explicit one.
    #[arg(long, env = "HEARTH_QUANTIZATION", default_value = "Q8_0")]
    pub quantization: String,

    /// Directory model artifacts are downloaded into.
    #[arg(long, env = "HEARTH_MODEL_DIR", default_value = "/var/lib/hearth/models")]
    pub model_dir: String,

    /// Model hub access token.
    #[arg(long, env = "HF_TOKEN")]
    pub hub_token: Option<String>,

    /// Proceed without a hub token (public repositories only).
    #[arg(long, default_value_t = false)]
    pub allow_anonymous: bool,

    /// Model hub base URL.
    #[arg(long, default_value = "https://huggingface.co")]
    pub hub_url: String,

    // ---- placement policy ----

    /// auto | single | multi
    #[arg(long, default_value = "auto")]
    pub distribution_mode: String,

    /// balanced | manual
    #[arg(long, default_value = "balanced")]
    pub assignment_mode: String,

    #[arg(long, default_value_t = 1)]
    pub max_models_per_device: u32,

    /// Minimum VRAM in MB below which a model cannot be packed at all.
    #[arg(long, default_value_t = 2048)]
    pub min_memory_mb: u64,

    #[arg(long, default_value_t = false)]
    pub allow_overcommit: bool,

    // ---- runtime launch ----

    /// Serving runtime binary (vLLM style CLI).
    #[arg(long, default_value = "vllm")]
    pub runtime_bin: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub runtime_host: String,

    /// First serving port; packed placements take consecutive ports.
    #[arg(long, default_value_t = 8080)]
    pub runtime_port: u16,

    #[arg(long, default_value_t = 180)]
    pub ready_timeout_secs: u64,

    /// Stop after printing the placement plan; do not launch runtimes.
    #[arg(long, default_value_t = false)]
    pub skip_launch: bool,

    // ---- chat application settings file ----

    #[arg(long, default_value = "/var/lib/hearth/chat-app.env")]
    pub settings_path: String,

    #[arg(long, default_value = "admin")]
    pub chat_user: String,

    #[arg(long, default_value = "localchat")]
    pub chat_password: String,
}

impl Args {
    pub fn placement_policy(&self) -> anyhow::Result<PlacementPolicy> {
        let distribution_mode = match self.distribution_mode.to_ascii_lowercase().as_str() {
            "auto" => DistributionMode::Auto,
            "single" => DistributionMode::Single,
            "multi" => DistributionMode::Multi,
            other => anyhow::bail!("unknown distribution mode: {other} (expected auto|single|multi)"),
        };
        let assignment_mode = match self.assignment_mode.to_ascii_lowercase().as_str() {
            "balanced" => AssignmentMode::Balanced,
            "manual" => AssignmentMode::Manual,
            other => anyhow::bail!("unknown assignment mode: {other} (expected balanced|manual)"),
        };
        Ok(PlacementPolicy {
            distribution_mode,
            assignment_mode,
            max_models_per_device: self.max_models_per_device,
            min_memory_required_mb: self.min_memory_mb,
            allow_overcommit: self.allow_overcommit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with(distribution: &str, assignment: &str) -> Args {
        Args::parse_from([
            "hearth-provision",
            "--models",
            "org/a",
            "--distribution-mode",
            distribution,
            "--assignment-mode",
            assignment,
        ])
    }

    #[test]
    fn parses_policy_modes() {
        let policy = args_with("Multi", "manual").placement_policy().unwrap();
        assert_eq!(policy.distribution_mode, DistributionMode::Multi);
        assert_eq!(policy.assignment_mode, AssignmentMode::Manual);
        assert_eq!(policy.max_models_per_device, 1);
        assert!(!policy.allow_overcommit);
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(args_with("tensor", "balanced").placement_policy().is_err());
        assert!(args_with("auto", "spread").placement_policy().is_err());
    }
}
