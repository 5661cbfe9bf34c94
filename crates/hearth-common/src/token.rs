use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wire format version prefix. Bump when the field layout changes.
const TOKEN_VERSION: &str = "ht1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token has expired")]
    Expired,
}

/// A bearer token plus its issuance record.
///
/// The value is an opaque dot-separated string:
/// `ht1.<subject>.<issued_at_ms>.<expires_at_ms|0>.<nonce>`.
/// There is no cryptographic signature; the append-only issuance log is the
/// sole authority, so removing a raw value from the log revokes the token
/// even though it still decodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub subject: String,
    pub issued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl IssuedToken {
    /// Mint a new token. Subjects are flattened so the dot-separated wire
    /// format stays unambiguous.
    pub fn issue(subject: &str, issued_at_ms: u64, ttl_ms: Option<u64>) -> Self {
        let subject = sanitize_subject(subject);
        let expires_at_ms = ttl_ms.map(|ttl| issued_at_ms.saturating_add(ttl));
        let nonce = Uuid::new_v4().simple().to_string();
        let value = format!(
            "{}.{}.{}.{}.{}",
            TOKEN_VERSION,
            subject,
            issued_at_ms,
            expires_at_ms.unwrap_or(0),
            nonce,
        );
        Self {
            value,
            subject,
            issued_at_ms,
            expires_at_ms,
        }
    }

    /// Syntactic decode of a presented bearer value. Does not consult the
    /// issuance log and does not check expiry.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let parts: Vec<&str> = raw.split('.').collect();
        let [version, subject, issued, expires, nonce] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };
        if *version != TOKEN_VERSION || subject.is_empty() || nonce.is_empty() {
            return Err(TokenError::Malformed);
        }
        let issued_at_ms: u64 = issued.parse().map_err(|_| TokenError::Malformed)?;
        let expires_raw: u64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        Ok(Self {
            value: raw.to_string(),
            subject: subject.to_string(),
            issued_at_ms,
            expires_at_ms: (expires_raw != 0).then_some(expires_raw),
        })
    }

    /// Expiry check against a caller-supplied clock. Tokens issued without
    /// an expiry never expire.
    pub fn check_expiry(&self, now_ms: u64) -> Result<(), TokenError> {
        match self.expires_at_ms {
            Some(exp) if now_ms > exp => Err(TokenError::Expired),
            _ => Ok(()),
        }
    }
}

fn sanitize_subject(subject: &str) -> String {
    let cleaned: String = subject
        .trim()
        .chars()
        .map(|c| if c == '.' || c.is_whitespace() { '-' } else { c })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_decode_round_trips() {
        let token = IssuedToken::issue("chat-ui", 1_700_000_000_000, Some(3_600_000));
        let decoded = IssuedToken::decode(&token.value).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn no_ttl_means_no_expiry() {
        let token = IssuedToken::issue("chat-ui", 1_700_000_000_000, None);
        assert_eq!(token.expires_at_ms, None);
        // Arbitrarily far in the future.
        assert_eq!(token.check_expiry(u64::MAX), Ok(()));
    }

    #[test]
    fn expiry_is_rejected_only_after_the_deadline() {
        let token = IssuedToken::issue("s", 1_000, Some(500));
        assert_eq!(token.check_expiry(1_400), Ok(()));
        assert_eq!(token.check_expiry(1_500), Ok(()));
        assert_eq!(token.check_expiry(1_501), Err(TokenError::Expired));
    }

    #[test]
    fn malformed_values_fail_decode() {
        for raw in [
            "",
            "ht1",
            "nonsense",
            "ht1.s.123.0",                    // too few fields
            "ht1.s.123.0.nonce.extra",        // too many fields
            "ht2.s.123.0.nonce",              // wrong version
            "ht1..123.0.nonce",               // empty subject
            "ht1.s.abc.0.nonce",              // non-numeric issued_at
            "ht1.s.123.soon.nonce",           // non-numeric expiry
            "ht1.s.123.0.",                   // empty nonce
        ] {
            assert_eq!(IssuedToken::decode(raw), Err(TokenError::Malformed), "{raw}");
        }
    }

    #[test]
    fn dotted_subject_is_flattened() {
        let token = IssuedToken::issue("web app.v2", 42, None);
        assert_eq!(token.subject, "web-app-v2");
        assert!(IssuedToken::decode(&token.value).is_ok());
    }

    #[test]
    fn empty_subject_defaults_to_anonymous() {
        let token = IssuedToken::issue("  ", 42, None);
        assert_eq!(token.subject, "anonymous");
    }
}
