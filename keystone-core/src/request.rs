use std::collections::HashMap;

/// Incoming request, pre-rewrite. `path` is captured once at stage 1 and never
/// mutated — the post-rewrite path lives only in the forwarded upstream request
/// (`spec.md` §3 invariant: `UsageEvent.path` is always pre-rewrite).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub api_key: String,
    pub remote_ip: String,
    pub user_agent: String,
}

impl Request {
    /// Case-insensitive header lookup (headers are typically stored lower-cased
    /// by the caller, but this never assumes it).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` if the matched route's protocol requires streaming, or the
    /// `Accept` header substring-matches `text/event-stream` case-insensitively
    /// (`spec.md` §6 `ShouldStream`).
    pub fn accepts_event_stream(&self) -> bool {
        self.header("accept")
            .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
            .unwrap_or(false)
    }
}

/// A completed (buffered) response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub latency_ms: f64,
}
