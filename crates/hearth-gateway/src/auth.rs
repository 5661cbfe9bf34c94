use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use hearth_common::token::{IssuedToken, TokenError};

use crate::token_store::TokenStore;

/// Why a bearer was rejected. Recoverable: maps to a 401, never crashes
/// the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No Authorization header, or one that is not `Bearer <value>`.
    MissingHeader,
    /// The token is past its embedded expiration timestamp.
    Expired,
    /// The value does not decode, or is absent from the issuance log.
    Invalid,
}

impl AuthError {
    pub fn message(self) -> &'static str {
        match self {
            AuthError::MissingHeader => "Missing or malformed authorization header",
            AuthError::Expired => "Token has expired",
            AuthError::Invalid => "Invalid token",
        }
    }
}

pub fn unauthorized(err: AuthError) -> Response {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": {"message": err.message()}})),
    )
        .into_response()
}

pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Mint a token and record it. The log append completes before the token is
/// handed back, so no token is ever in flight without being durably recorded.
pub async fn issue_token(
    store: &dyn TokenStore,
    subject: &str,
    ttl_ms: Option<u64>,
) -> anyhow::Result<IssuedToken> {
    let token = IssuedToken::issue(subject, now_ms(), ttl_ms);
    store.append(&token.value).await?;
    tracing::info!(subject=%token.subject, expires=?token.expires_at_ms, "issued token");
    Ok(token)
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Strict validation order: syntactic decode, then expiration, then
/// issuance-log membership. Any failure short-circuits before the model
/// runtime is touched.
pub async fn validate(store: &dyn TokenStore, raw: &str) -> Result<IssuedToken, AuthError> {
    let token = match IssuedToken::decode(raw) {
        Ok(token) => token,
        Err(TokenError::Malformed) => return Err(AuthError::Invalid),
        Err(TokenError::Expired) => return Err(AuthError::Expired),
    };

    token.check_expiry(now_ms()).map_err(|_| AuthError::Expired)?;

    match store.contains(raw).await {
        Ok(true) => Ok(token),
        Ok(false) => Err(AuthError::Invalid),
        Err(e) => {
            tracing::error!(error=%e, "token store read failed");
            Err(AuthError::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;

    #[tokio::test]
    async fn issued_token_validates_immediately() {
        let store = MemoryTokenStore::new();
        let token = issue_token(&store, "chat-ui", None).await.unwrap();
        let validated = validate(&store, &token.value).await.unwrap();
        assert_eq!(validated.subject, "chat-ui");
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_even_when_well_formed() {
        let store = MemoryTokenStore::new();
        let stranger = IssuedToken::issue("s", now_ms(), None);
        assert_eq!(
            validate(&store, &stranger.value).await.unwrap_err(),
            AuthError::Invalid
        );
    }

    #[tokio::test]
    async fn revoked_token_stops_validating() {
        let store = MemoryTokenStore::new();
        let token = issue_token(&store, "s", None).await.unwrap();
        assert!(validate(&store, &token.value).await.is_ok());
        store.revoke(&token.value);
        assert_eq!(
            validate(&store, &token.value).await.unwrap_err(),
            AuthError::Invalid
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected_before_membership() {
        let store = MemoryTokenStore::new();
        // Issued in the past with a 1ms lifetime: recorded but long expired.
        let token = IssuedToken::issue("s", 1, Some(1));
        store.append(&token.value).await.unwrap();
        assert_eq!(
            validate(&store, &token.value).await.unwrap_err(),
            AuthError::Expired
        );
    }

    #[tokio::test]
    async fn token_without_expiry_never_expires() {
        let store = MemoryTokenStore::new();
        // Issued arbitrarily far in the past, no TTL.
        let token = IssuedToken::issue("s", 1, None);
        store.append(&token.value).await.unwrap();
        assert!(validate(&store, &token.value).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_values_are_invalid() {
        let store = MemoryTokenStore::new();
        for raw in ["", "garbage", "ht2.s.1.0.n", "ht1.s.x.0.n"] {
            assert_eq!(
                validate(&store, raw).await.unwrap_err(),
                AuthError::Invalid,
                "{raw}"
            );
        }
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer ht1.s.1.0.n".parse().unwrap(),
        );
        assert_eq!(extract_bearer(&headers), Some("ht1.s.1.0.n"));

        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }
}
