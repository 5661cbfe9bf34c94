use std::time::Duration;

use serde_json::Value;

use hearth_common::{GenerationRequest, GenerationResult};

/// The model runtime failed during generation. Recoverable: surfaced as a
/// 500 with a generic message, the raw error stays in the logs.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("runtime request failed: {0}")]
    Request(String),

    #[error("runtime returned status {status}")]
    Status { status: u16, body: String },

    #[error("runtime returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Seam to the underlying serving backend. The runtime is a single shared
/// resource with its own internal concurrency limits; the gateway adds no
/// admission control of its own.
#[async_trait::async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, BackendError>;
}

/// HTTP client against an OpenAI-compatible completions endpoint
/// (vLLM, llama.cpp server).
#[derive(Debug, Clone)]
pub struct OpenAiRuntime {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl OpenAiRuntime {
    pub fn new(base_url: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
        })
    }

    fn request_body(&self, req: &GenerationRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": req.prompt,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "stream": false,
        });
        if let Some(top_p) = req.top_p {
            body["top_p"] = top_p.into();
        }
        if let Some(top_k) = req.top_k {
            body["top_k"] = top_k.into();
        }
        if let Some(stop) = req.stop_sequences.as_ref() {
            body["stop"] = stop.clone().into();
        }
        body
    }
}

#[async_trait::async_trait]
impl ModelRuntime for OpenAiRuntime {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        let url = format!("{}/v1/completions", self.base_url);
        let resp = self
            .http
            .post(url)
            .json(&self.request_body(req))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        parse_completion(&value)
    }
}

/// Extract text and usage accounting from a completions response.
pub(crate) fn parse_completion(value: &Value) -> Result<GenerationResult, BackendError> {
    let text = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c0| c0.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| BackendError::InvalidResponse("no choices[0].text".to_string()))?
        .to_string();

    let usage = value.get("usage");
    let field = |name: &str| -> u32 {
        usage
            .and_then(|u| u.get(name))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    };
    let prompt_tokens = field("prompt_tokens");
    let completion_tokens = field("completion_tokens");
    let total_tokens = match field("total_tokens") {
        0 => prompt_tokens + completion_tokens,
        n => n,
    };

    Ok(GenerationResult {
        text,
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

/// Test double. Echoes a canned completion and counts invocations so tests
/// can assert that failed auth never reaches the backend.
#[derive(Debug, Default)]
pub struct StubRuntime {
    calls: std::sync::atomic::AtomicU64,
    fail: bool,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Default::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelRuntime for StubRuntime {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::Request("stub runtime failure".to_string()));
        }
        let prompt_tokens = req.prompt.split_whitespace().count() as u32;
        Ok(GenerationResult {
            text: format!("echo: {}", req.prompt),
            prompt_tokens,
            completion_tokens: 2,
            total_tokens: prompt_tokens + 2,
        })
    }
}
