use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GatewayError;
use crate::request::{Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamAuthType {
    None,
    Header,
    Bearer,
    Basic,
}

/// A forwarding target (`spec.md` §3). `auth_value` may contain `${NAME}`
/// placeholders, expanded at apply time against the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub id: Option<String>,
    pub base_url: String,
    pub timeout_ms: u64,
    pub idle_pool_size: usize,
    pub idle_timeout_ms: u64,
    pub auth_type: UpstreamAuthType,
    pub auth_header: Option<String>,
    pub auth_value: Option<String>,
}

/// Replace every `${NAME}` with the process environment variable `NAME`
/// (empty if unset) in a single left-to-right pass (`spec.md` §4.6).
pub fn expanded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = s[i + 2..].find('}') {
                let name = &s[i + 2..i + 2 + end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                i += 2 + end + 1;
                continue;
            }
        }
        // Safe: we only ever skip ASCII `${...}` runs above; otherwise advance
        // one UTF-8 scalar at a time.
        let ch = s[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Add the configured auth headers for this upstream (`spec.md` §4.6).
/// `AuthNone` returns the headers unchanged.
pub fn apply_upstream_auth(upstream: &Upstream, mut headers: HashMap<String, String>) -> HashMap<String, String> {
    match upstream.auth_type {
        UpstreamAuthType::None => {}
        UpstreamAuthType::Header => {
            if let (Some(name), Some(value)) = (&upstream.auth_header, &upstream.auth_value) {
                headers.insert(name.clone(), expanded(value));
            }
        }
        UpstreamAuthType::Bearer => {
            if let Some(value) = &upstream.auth_value {
                headers.insert("Authorization".to_string(), format!("Bearer {}", expanded(value)));
            }
        }
        UpstreamAuthType::Basic => {
            if let Some(value) = &upstream.auth_value {
                headers.insert("Authorization".to_string(), format!("Basic {}", expanded(value)));
            }
        }
    }
    headers
}

/// Resolve `base_url` against `path`/`query` using RFC 3986 reference
/// resolution (`spec.md` §4.6).
pub fn resolve_upstream_url(upstream: &Upstream, path: &str, query: &str) -> Result<url::Url, GatewayError> {
    let base = url::Url::parse(&upstream.base_url)
        .map_err(|e| GatewayError::UpstreamError(format!("invalid upstream base_url: {e}")))?;
    let reference = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };
    base.join(&reference)
        .map_err(|e| GatewayError::UpstreamError(format!("cannot resolve upstream url: {e}")))
}

/// A chunk of a streaming upstream response, as handed to the caller pumping
/// a `StreamingContext` (`spec.md` §4.2 stage 14, streaming variant).
pub struct StreamingContext {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: tokio::sync::mpsc::Receiver<Vec<u8>>,
}

/// Buffered + streaming forwarder. The core only depends on this narrow
/// capability contract (`spec.md` §6); concrete network I/O is an external
/// collaborator, out of scope here.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, req: &Request, upstream: &Upstream) -> Result<Response, GatewayError>;
    async fn forward_streaming(&self, req: &Request, upstream: &Upstream) -> Result<StreamingContext, GatewayError>;
}
