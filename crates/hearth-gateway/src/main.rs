mod args;
mod auth;
mod handlers;
mod metrics;
mod runtime;
mod state;
mod token_store;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::handlers::{create_token, generate, healthz, system_memory};
use crate::metrics::{metrics_handler, track_requests, Metrics};
use crate::runtime::{ModelRuntime, OpenAiRuntime};
use crate::state::{AppState, GatewayConfig};
use crate::token_store::{FileTokenStore, TokenStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    tracing::info!(
        listen_addr=%args.listen_addr,
        runtime_url=%args.runtime_url,
        runtime_model=%args.runtime_model,
        token_expiration=args.token_expiration,
        "gateway starting"
    );

    let runtime: Arc<dyn ModelRuntime> = Arc::new(OpenAiRuntime::new(
        args.runtime_url.clone(),
        args.runtime_model.clone(),
        Duration::from_secs(args.runtime_timeout_secs),
    )?);

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&args.token_log).await?);

    let config = GatewayConfig {
        runtime_model: args.runtime_model,
        token_ttl_ms: args
            .token_expiration
            .then_some(args.token_ttl_secs.saturating_mul(1_000)),
        log_prompts: args.log_prompts,
        threads: args.threads,
        batch_size: args.batch_size,
        context_size: args.context_size,
    };

    let st = AppState {
        runtime,
        tokens,
        metrics: Arc::new(Metrics::default()),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/token", post(create_token))
        .route("/generate", post(generate))
        .route("/system/memory", get(system_memory))
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .with_state(st);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
