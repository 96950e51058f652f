use serde::{Deserialize, Serialize};

use crate::upstream::Upstream;

/// In-process pipeline configuration, constructed by the embedder and passed
/// at `Router`/`Pipeline` construction — no file/env loader here (`spec.md`
/// §6.3). Replacing it goes through the same atomic-snapshot discipline as
/// routes: build a new `PipelineConfig`, swap it in via `UpdateConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Required literal prefix for presented API keys (e.g. `"ak_"`).
    pub key_prefix: String,
    /// Rolling window for the rate-limit engine (`spec.md` §4.2 stage 9).
    pub rate_window_seconds: u64,
    /// Burst tokens layered on top of `plan.rate_limit_per_minute`.
    pub rate_burst_tokens: u64,
    /// Used when a matched route names no upstream, and when no route
    /// matches at all (`spec.md` §4.2 stage 1/14).
    pub default_upstream: Upstream,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ak_".to_string(),
            rate_window_seconds: 60,
            rate_burst_tokens: 0,
            default_upstream: Upstream {
                id: None,
                base_url: "http://localhost:8080".to_string(),
                timeout_ms: 30_000,
                idle_pool_size: 16,
                idle_timeout_ms: 90_000,
                auth_type: crate::upstream::UpstreamAuthType::None,
                auth_header: None,
                auth_value: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_rate_limit_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.rate_window_seconds, 60);
        assert_eq!(config.key_prefix, "ak_");
    }
}
