use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
    pub tokens_issued: AtomicU64,
    pub generations_total: AtomicU64,
    pub generation_failures: AtomicU64,
    pub auth_missing: AtomicU64,
    pub auth_expired: AtomicU64,
    pub auth_invalid: AtomicU64,
    /// Cumulative wall time spent inside runtime generation calls.
    pub inference_ms_total: AtomicU64,
}

pub fn render_metrics(metrics: &Metrics) -> String {
    let counters: [(&str, &str, &str, &AtomicU64); 12] = [
        ("hearth_gateway_requests_total", "counter", "Total requests handled by the gateway.", &metrics.requests_total),
        ("hearth_gateway_requests_inflight", "gauge", "Currently in-flight requests.", &metrics.requests_inflight),
        ("hearth_gateway_responses_2xx", "counter", "Total 2xx responses.", &metrics.status_2xx),
        ("hearth_gateway_responses_4xx", "counter", "Total 4xx responses.", &metrics.status_4xx),
        ("hearth_gateway_responses_5xx", "counter", "Total 5xx responses.", &metrics.status_5xx),
        ("hearth_gateway_tokens_issued", "counter", "Tokens issued.", &metrics.tokens_issued),
        ("hearth_gateway_generations_total", "counter", "Generation calls accepted.", &metrics.generations_total),
        ("hearth_gateway_generation_failures", "counter", "Generation calls that failed in the runtime.", &metrics.generation_failures),
        ("hearth_gateway_auth_missing", "counter", "Requests with a missing or malformed authorization header.", &metrics.auth_missing),
        ("hearth_gateway_auth_expired", "counter", "Requests with an expired token.", &metrics.auth_expired),
        ("hearth_gateway_auth_invalid", "counter", "Requests with an invalid or unknown token.", &metrics.auth_invalid),
        ("hearth_gateway_inference_ms_total", "counter", "Cumulative runtime generation time in milliseconds.", &metrics.inference_ms_total),
    ];

    let mut body = String::new();
    for (name, kind, help, value) in counters {
        body.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {}\n",
            value.load(Ordering::Relaxed),
        ));
    }
    body
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    let body = render_metrics(&st.metrics);
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

pub async fn track_requests(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let status = resp.status().as_u16();
    if status >= 500 {
        st.metrics.status_5xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 400 {
        st.metrics.status_4xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 200 {
        st.metrics.status_2xx.fetch_add(1, Ordering::Relaxed);
    }

    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_counter_once() {
        let metrics = Metrics::default();
        metrics.tokens_issued.store(3, Ordering::Relaxed);
        metrics.inference_ms_total.store(1200, Ordering::Relaxed);

        let body = render_metrics(&metrics);
        assert!(body.contains("hearth_gateway_tokens_issued 3\n"));
        assert!(body.contains("hearth_gateway_inference_ms_total 1200\n"));
        assert_eq!(body.matches("# TYPE").count(), 12);
    }
}
