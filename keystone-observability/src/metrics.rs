use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics collector for the gateway.
///
/// Collects request metrics, latency histograms, and quota/rate-limit denial
/// counters, exposed via Prometheus text exposition on the admin plane.
pub struct MetricsCollector {
    registry: Registry,

    /// Total requests handled by route, method, status.
    pub requests_total: IntCounterVec,

    /// End-to-end request latency by route.
    pub request_duration: HistogramVec,

    /// Upstream response time by upstream id.
    pub upstream_latency: HistogramVec,

    /// Expression evaluation time by kind (request_transform, response_transform, metering).
    pub expression_eval_duration: HistogramVec,

    /// Rejections at stage 8 (quota) and stage 9 (rate limit), by plan.
    pub quota_rejections_total: IntCounterVec,
    pub rate_limit_rejections_total: IntCounterVec,

    /// Active in-flight requests.
    pub active_requests: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("keystone_requests_total", "Total requests handled").namespace("keystone"),
            &["route", "method", "status"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("keystone_request_duration_seconds", "Request latency")
                .namespace("keystone")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["route"],
        )?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("keystone_upstream_latency_seconds", "Upstream response time")
                .namespace("keystone")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["upstream"],
        )?;

        let expression_eval_duration = HistogramVec::new(
            HistogramOpts::new("keystone_expression_eval_seconds", "Transform/metering expression evaluation time")
                .namespace("keystone")
                .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]),
            &["kind"],
        )?;

        let quota_rejections_total = IntCounterVec::new(
            Opts::new("keystone_quota_rejections_total", "Requests rejected for exceeding monthly quota").namespace("keystone"),
            &["plan"],
        )?;

        let rate_limit_rejections_total = IntCounterVec::new(
            Opts::new("keystone_rate_limit_rejections_total", "Requests rejected by the token-bucket rate limiter").namespace("keystone"),
            &["plan"],
        )?;

        let active_requests = IntGauge::new("keystone_active_requests", "In-flight requests")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(expression_eval_duration.clone()))?;
        registry.register(Box::new(quota_rejections_total.clone()))?;
        registry.register(Box::new(rate_limit_rejections_total.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            upstream_latency,
            expression_eval_duration,
            quota_rejections_total,
            rate_limit_rejections_total,
            active_requests,
        })
    }

    /// Record a completed request (`spec.md` §4.2 stage 20).
    pub fn record_request(&self, route: &str, method: &str, status: u16, duration_secs: f64) {
        self.requests_total.with_label_values(&[route, method, &status.to_string()]).inc();
        self.request_duration.with_label_values(&[route]).observe(duration_secs);
    }

    pub fn record_quota_rejection(&self, plan: &str) {
        self.quota_rejections_total.with_label_values(&[plan]).inc();
    }

    pub fn record_rate_limit_rejection(&self, plan: &str) {
        self.rate_limit_rejections_total.with_label_values(&[plan]).inc();
    }

    /// Prometheus text exposition for the scrape endpoint.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("failed to construct metrics registry")
    }
}
