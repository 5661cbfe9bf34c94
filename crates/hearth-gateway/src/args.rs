use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    /// Address the gateway listens on.
    #[arg(long, env = "HEARTH_GATEWAY_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// Base URL of the model runtime (vLLM / llama.cpp style server).
    #[arg(long, env = "HEARTH_RUNTIME_URL", default_value = "http://127.0.0.1:8080")]
    pub runtime_url: String,

    /// Model name passed through to the runtime.
    #[arg(long, env = "HEARTH_RUNTIME_MODEL", default_value = "default")]
    pub runtime_model: String,

    /// Request timeout against the runtime, in seconds.
    #[arg(long, default_value_t = 300)]
    pub runtime_timeout_secs: u64,

    /// Path of the append-only token issuance log.
    #[arg(long, env = "HEARTH_TOKEN_LOG", default_value = "/var/lib/hearth/tokens.log")]
    pub token_log: String,

    /// Issue tokens with an expiration timestamp.
    #[arg(long, env = "HEARTH_TOKEN_EXPIRATION", default_value_t = false)]
    pub token_expiration: bool,

    /// Token lifetime in seconds, used only when expiration is enabled.
    #[arg(long, env = "HEARTH_TOKEN_TTL_SECS", default_value_t = 86_400)]
    pub token_ttl_secs: u64,

    /// Log full prompts at debug level. Off by default: generation logs
    /// carry request shape only.
    #[arg(long, default_value_t = false)]
    pub log_prompts: bool,

    // ---- runtime tuning reported by /system/memory ----

    /// Inference thread count configured on the runtime.
    #[arg(long, default_value_t = 8)]
    pub threads: u32,

    /// Runtime batch size.
    #[arg(long, default_value_t = 512)]
    pub batch_size: u32,

    /// Runtime context window size in tokens.
    #[arg(long, default_value_t = 4096)]
    pub context_size: u32,
}
