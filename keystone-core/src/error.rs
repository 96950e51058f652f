use thiserror::Error;

/// Unified error type for the gateway core.
///
/// Each variant carries the HTTP status and stable `code` string from the
/// error table: invalid key format, I/O failure during key lookup, and "no
/// matching candidate" all collapse to `InvalidKey` (fail-closed, per stage 3-5).
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("invalid key")]
    InvalidKey,

    #[error("API key has expired")]
    Expired,

    #[error("API key has been revoked")]
    Revoked,

    #[error("user is suspended")]
    UserSuspended,

    #[error("monthly quota exceeded")]
    QuotaExceeded,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("transform failed: {0}")]
    TransformError(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code per `spec.md` §6/§7.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidKey
            | GatewayError::Expired
            | GatewayError::Revoked => 401,
            GatewayError::UserSuspended => 403,
            GatewayError::QuotaExceeded | GatewayError::RateLimited => 429,
            GatewayError::TransformError(_) => 500,
            GatewayError::UpstreamError(_) => 502,
            GatewayError::NotFound(_) => 404,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code, independent of the human `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidKey => "invalid_key",
            GatewayError::Expired => "expired",
            GatewayError::Revoked => "revoked",
            GatewayError::UserSuspended => "user_suspended",
            GatewayError::QuotaExceeded => "quota_exceeded",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::TransformError(_) => "transform_error",
            GatewayError::UpstreamError(_) => "upstream_error",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// `{status, code, message}` response body sent to the client.
    pub fn to_response_body(&self) -> Vec<u8> {
        serde_json::json!({
            "status": self.status_code(),
            "code": self.code(),
            "message": self.to_string(),
        })
        .to_string()
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_table() {
        assert_eq!(GatewayError::InvalidKey.status_code(), 401);
        assert_eq!(GatewayError::Expired.status_code(), 401);
        assert_eq!(GatewayError::Revoked.status_code(), 401);
        assert_eq!(GatewayError::UserSuspended.status_code(), 403);
        assert_eq!(GatewayError::QuotaExceeded.status_code(), 429);
        assert_eq!(GatewayError::RateLimited.status_code(), 429);
        assert_eq!(GatewayError::TransformError("x".into()).status_code(), 500);
        assert_eq!(GatewayError::UpstreamError("x".into()).status_code(), 502);
        assert_eq!(GatewayError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn response_body_is_valid_json_with_fields() {
        let err = GatewayError::QuotaExceeded;
        let body = err.to_response_body();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], 429);
        assert_eq!(parsed["code"], "quota_exceeded");
        assert!(parsed["message"].as_str().is_some());
    }

    #[test]
    fn codes_are_stable_independent_of_message() {
        let e1 = GatewayError::UpstreamError("timeout".into());
        let e2 = GatewayError::UpstreamError("connection refused".into());
        assert_eq!(e1.code(), e2.code());
    }
}
