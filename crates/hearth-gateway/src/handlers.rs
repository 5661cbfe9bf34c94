use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use hearth_common::GenerationRequest;

use crate::auth::{extract_bearer, issue_token, unauthorized, validate, AuthError};
use crate::state::AppState;

#[derive(Debug, Default, serde::Deserialize)]
pub struct TokenRequest {
    pub subject: Option<String>,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// POST /token. No input body required; an optional JSON body may carry a
/// subject. Issuance always succeeds unless the log write fails.
pub async fn create_token(
    State(st): State<AppState>,
    body: Option<Json<TokenRequest>>,
) -> Response {
    let subject = body
        .and_then(|Json(req)| req.subject)
        .unwrap_or_else(|| "anonymous".to_string());

    match issue_token(st.tokens.as_ref(), &subject, st.config.token_ttl_ms).await {
        Ok(token) => {
            st.metrics
                .tokens_issued
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            (StatusCode::OK, Json(json!({"token": token.value}))).into_response()
        }
        Err(e) => {
            tracing::error!(error=%e, "token log append failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "Token issuance failed"}})),
            )
                .into_response()
        }
    }
}

/// POST /generate. Auth is checked in strict order before the runtime is
/// invoked; backend failures are isolated per-request.
pub async fn generate(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerationRequest>,
) -> Response {
    use std::sync::atomic::Ordering::Relaxed;

    let Some(raw) = extract_bearer(&headers) else {
        st.metrics.auth_missing.fetch_add(1, Relaxed);
        return unauthorized(AuthError::MissingHeader);
    };

    let token = match validate(st.tokens.as_ref(), raw).await {
        Ok(token) => token,
        Err(err) => {
            match err {
                AuthError::Expired => st.metrics.auth_expired.fetch_add(1, Relaxed),
                _ => st.metrics.auth_invalid.fetch_add(1, Relaxed),
            };
            return unauthorized(err);
        }
    };

    // Request shape only; the prompt itself is logged solely at debug
    // verbosity when prompt logging is switched on.
    tracing::info!(
        subject=%token.subject,
        prompt_chars = req.prompt.chars().count(),
        max_tokens = req.max_tokens,
        temperature = req.temperature,
        "generation request"
    );
    if st.config.log_prompts {
        tracing::debug!(prompt=%req.prompt, "generation prompt");
    }

    let start = Instant::now();
    match st.runtime.generate(&req).await {
        Ok(result) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            st.metrics.generations_total.fetch_add(1, Relaxed);
            st.metrics.inference_ms_total.fetch_add(elapsed_ms, Relaxed);
            tracing::info!(
                elapsed_ms,
                prompt_tokens = result.prompt_tokens,
                completion_tokens = result.completion_tokens,
                "generation complete"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "response": result.text,
                    "usage": {
                        "prompt_tokens": result.prompt_tokens,
                        "completion_tokens": result.completion_tokens,
                        "total_tokens": result.total_tokens,
                    },
                })),
            )
                .into_response()
        }
        Err(e) => {
            st.metrics.generation_failures.fetch_add(1, Relaxed);
            tracing::error!(
                input = %truncate(&req.prompt, 120),
                error = %truncate(&e.to_string(), 200),
                "runtime generation failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "Generation failed"}})),
            )
                .into_response()
        }
    }
}

/// GET /system/memory. Host memory snapshot plus the runtime tuning the
/// gateway was configured with, for operational visibility only.
pub async fn system_memory(State(st): State<AppState>) -> Response {
    let snapshot = match tokio::fs::read_to_string("/proc/meminfo").await {
        Ok(content) => parse_meminfo(&content),
        Err(e) => {
            tracing::warn!(error=%e, "failed to read /proc/meminfo");
            None
        }
    };

    let Some(mem) = snapshot else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "Memory snapshot unavailable"}})),
        )
            .into_response();
    };

    (
        StatusCode::OK,
        Json(json!({
            "memory": {
                "total_mb": mem.total_mb,
                "available_mb": mem.available_mb,
                "used_mb": mem.used_mb,
            },
            "runtime": {
                "model": st.config.runtime_model,
                "threads": st.config.threads,
                "batch_size": st.config.batch_size,
                "context_size": st.config.context_size,
            },
        })),
    )
        .into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemorySnapshot {
    pub total_mb: u64,
    pub available_mb: u64,
    pub used_mb: u64,
}

pub(crate) fn parse_meminfo(content: &str) -> Option<MemorySnapshot> {
    let mut total_kb: Option<u64> = None;
    let mut available_kb: Option<u64> = None;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value_kb = rest
            .trim()
            .trim_end_matches("kB")
            .trim()
            .parse::<u64>()
            .ok();
        match key.trim() {
            "MemTotal" => total_kb = value_kb,
            "MemAvailable" => available_kb = value_kb,
            _ => {}
        }
    }

    let total_kb = total_kb?;
    let available_kb = available_kb.unwrap_or(0);
    Some(MemorySnapshot {
        total_mb: total_kb / 1024,
        available_mb: available_kb / 1024,
        used_mb: total_kb.saturating_sub(available_kb) / 1024,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
