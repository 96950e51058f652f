use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An append-only usage record, emitted at stage 17 and handed to a
/// `UsageRecorder` (`spec.md` §3/§6). `path` is always pre-rewrite, per the
/// route-snapshot invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub key_id: String,
    pub user_id: String,
    /// Literal `"STREAM"` for streamed calls.
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: f64,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub cost_multiplier: f64,
    pub remote_ip: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}
