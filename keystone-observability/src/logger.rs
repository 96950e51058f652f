use async_trait::async_trait;
use keystone_core::stores::UsageRecorder;
use keystone_core::usage::UsageEvent;
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tracing::{debug, error};

/// Where batched usage events get POSTed; `enabled = false` yields a true
/// no-op recorder with no channel or background task.
#[derive(Debug, Clone)]
pub struct UsageSinkConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
}

impl Default for UsageSinkConfig {
    fn default() -> Self {
        Self { enabled: false, endpoint: String::new(), batch_size: 100, flush_interval_secs: 5 }
    }
}

/// `UsageRecorder` satisfying `spec.md` §6's non-blocking `Record(event)`
/// contract via `mpsc::Sender::try_send` — a full channel drops the event
/// rather than stalling the request path.
pub struct ChannelUsageRecorder {
    sender: Option<mpsc::Sender<UsageEvent>>,
}

impl ChannelUsageRecorder {
    pub fn new(config: UsageSinkConfig) -> Self {
        if !config.enabled {
            return Self { sender: None };
        }
        let (tx, rx) = mpsc::channel(10_000);
        tokio::spawn(Self::flush_loop(config, rx));
        Self { sender: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    async fn flush_loop(config: UsageSinkConfig, mut rx: mpsc::Receiver<UsageEvent>) {
        let client = reqwest::Client::new();
        let mut batch: Vec<UsageEvent> = Vec::with_capacity(config.batch_size);
        let mut flush_interval = interval(Duration::from_secs(config.flush_interval_secs));

        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    batch.push(event);
                    if batch.len() >= config.batch_size {
                        Self::flush(&client, &config.endpoint, &mut batch).await;
                    }
                }
                _ = flush_interval.tick() => {
                    if !batch.is_empty() {
                        Self::flush(&client, &config.endpoint, &mut batch).await;
                    }
                }
            }
        }
    }

    async fn flush(client: &reqwest::Client, endpoint: &str, batch: &mut Vec<UsageEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut body = String::new();
        for event in batch.iter() {
            body.push_str(&serde_json::to_string(event).unwrap_or_default());
            body.push('\n');
        }
        let count = batch.len();
        match client.post(endpoint).header("Content-Type", "application/stream+json").body(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(count, "flushed usage events to sink");
            }
            Ok(resp) => {
                error!(status = %resp.status(), "usage sink rejected batch");
            }
            Err(e) => {
                error!(error = %e, "usage sink connection error");
            }
        }
        batch.clear();
    }
}

#[async_trait]
impl UsageRecorder for ChannelUsageRecorder {
    async fn record(&self, event: UsageEvent) {
        if let Some(sender) = &self.sender {
            if sender.try_send(event).is_err() {
                error!("usage event dropped: sink channel full");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> UsageSinkConfig {
        UsageSinkConfig::default()
    }

    fn enabled_config() -> UsageSinkConfig {
        UsageSinkConfig { enabled: true, endpoint: "http://localhost:9999/usage".to_string(), batch_size: 100, flush_interval_secs: 5 }
    }

    fn sample_event(id: &str) -> UsageEvent {
        UsageEvent {
            id: id.to_string(),
            key_id: "key1".to_string(),
            user_id: "user1".to_string(),
            method: "GET".to_string(),
            path: "/api/data".to_string(),
            status: 200,
            latency_ms: 12.5,
            request_bytes: 10,
            response_bytes: 100,
            cost_multiplier: 1.0,
            remote_ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn disabled_constructor_has_no_sender() {
        let recorder = ChannelUsageRecorder::disabled();
        assert!(recorder.sender.is_none());
    }

    #[test]
    fn new_with_disabled_config_has_no_sender() {
        let recorder = ChannelUsageRecorder::new(disabled_config());
        assert!(recorder.sender.is_none());
    }

    #[tokio::test]
    async fn record_on_disabled_does_not_panic() {
        let recorder = ChannelUsageRecorder::disabled();
        recorder.record(sample_event("evt1")).await;
    }

    #[tokio::test]
    async fn new_with_enabled_config_has_sender() {
        let recorder = ChannelUsageRecorder::new(enabled_config());
        assert!(recorder.sender.is_some());
    }

    #[tokio::test]
    async fn record_on_enabled_does_not_block() {
        let recorder = ChannelUsageRecorder::new(enabled_config());
        recorder.record(sample_event("evt1")).await;
        recorder.record(sample_event("evt2")).await;
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn record_backpressure_does_not_panic() {
        let recorder = ChannelUsageRecorder::new(enabled_config());
        for i in 0..10_100u32 {
            recorder.record(sample_event(&format!("evt{i}"))).await;
        }
    }
}
