use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::auth::AuthContext;
use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::GatewayError;
use crate::key::{self, Key};
use crate::plan::{self, Plan};
use crate::quota;
use crate::ratelimit::{self, RateLimitConfig};
use crate::request::{Request, Response};
use crate::route::Route;
use crate::router::Router;
use crate::stores::{EntitlementStore, IdGenerator, KeyStore, PlanStore, QuotaStore, RateLimitStore, UsageRecorder, UserStore};
use crate::transform::{self, Binding, ExpressionEngine, Value};
use crate::upstream::{self, Forwarder, StreamingContext, Upstream};
use crate::usage::UsageEvent;

/// Successful outcome of `Handle`/`HandleStreaming` (`spec.md` §4.2).
pub struct HandleSuccess {
    pub response: Response,
    pub auth: Option<AuthContext>,
}

/// Error outcome; `headers` carries rate-limit/quota headers even on deny.
pub struct HandleFailure {
    pub error: GatewayError,
    pub headers: HashMap<String, String>,
    pub auth: Option<AuthContext>,
}

pub type HandleResult = Result<HandleSuccess, HandleFailure>;

pub struct StreamingHandle {
    pub ctx: StreamingContext,
    pub auth: Option<AuthContext>,
    /// Opaque accounting state threaded into `record_streaming_usage` once
    /// the caller finishes pumping bytes.
    pub accounting: StreamingAccounting,
}

pub type StreamingHandleResult = Result<StreamingHandle, HandleFailure>;

/// Everything `record_streaming_usage` needs that isn't known until the
/// stream completes (`spec.md` §4.2 streaming variant).
pub struct StreamingAccounting {
    pub key_id: String,
    pub user_id: String,
    pub plan_id: String,
    pub path: String,
    pub request_bytes: u64,
    pub metering_expr: Option<String>,
    pub started_at: DateTime<Utc>,
    period_start: Option<DateTime<Utc>>,
    quota_bypass: bool,
}

/// The full request pipeline: route match through auth/quota/rate-limit,
/// transform, forward, meter, and record (`spec.md` §4.2). Grounded on
/// `ando-proxy::proxy::ProxyWorker::handle_request`'s hot/slow-path split
/// and short-circuit-enum style, generalized to this spec's fixed 20-stage
/// sequence rather than a generic, extensible plugin chain.
pub struct Pipeline {
    router: Arc<Router>,
    config: ArcSwap<PipelineConfig>,
    engine: ExpressionEngine,
    clock: Arc<dyn Clock>,
    forwarder: Arc<dyn Forwarder>,
    key_store: Arc<dyn KeyStore>,
    user_store: Arc<dyn UserStore>,
    plan_store: Arc<dyn PlanStore>,
    entitlement_store: Arc<dyn EntitlementStore>,
    rate_limit_store: Arc<dyn RateLimitStore>,
    quota_store: Arc<dyn QuotaStore>,
    usage_recorder: Arc<dyn UsageRecorder>,
    id_gen: Arc<dyn IdGenerator>,
}

struct ResolvedAuth {
    context: AuthContext,
    plan: Plan,
    key: Option<Key>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<Router>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
        forwarder: Arc<dyn Forwarder>,
        key_store: Arc<dyn KeyStore>,
        user_store: Arc<dyn UserStore>,
        plan_store: Arc<dyn PlanStore>,
        entitlement_store: Arc<dyn EntitlementStore>,
        rate_limit_store: Arc<dyn RateLimitStore>,
        quota_store: Arc<dyn QuotaStore>,
        usage_recorder: Arc<dyn UsageRecorder>,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            router,
            config: ArcSwap::from_pointee(config),
            engine: ExpressionEngine::new(),
            clock,
            forwarder,
            key_store,
            user_store,
            plan_store,
            entitlement_store,
            rate_limit_store,
            quota_store,
            usage_recorder,
            id_gen,
        }
    }

    /// `UpdateConfig` (`spec.md` §6.3): atomically replace the pipeline-level
    /// configuration (distinct from the route/upstream snapshot held by
    /// `Router`, which has its own `replace_all`).
    pub fn update_config(&self, config: PipelineConfig) {
        self.config.store(Arc::new(config));
    }

    /// `ShouldStream(request)` (`spec.md` §6): true if the matched route's
    /// protocol requires streaming, or the request's `Accept` header
    /// substring-matches `text/event-stream` (case-insensitive).
    pub fn should_stream(&self, req: &Request) -> bool {
        let streaming_route = self
            .router
            .match_request(&req.method, &req.path, req.header("host").unwrap_or(""), &req.headers)
            .map(|m| m.route.protocol.is_streaming())
            .unwrap_or(false);
        streaming_route || req.accepts_event_stream()
    }

    pub async fn handle(&self, req: &Request) -> HandleResult {
        let now = self.clock.now();
        let config = self.config.load_full();

        let route_match = self.router.match_request(
            &req.method,
            &req.path,
            req.header("host").unwrap_or(""),
            &req.headers,
        );
        let route = route_match.as_ref().map(|m| m.route.clone());
        let auth_required = route.as_ref().map(|r| r.auth_required).unwrap_or(true);

        let resolved = if auth_required {
            match self.authenticate(req, now).await {
                Ok(resolved) => resolved,
                Err(failure) => return Err(failure),
            }
        } else {
            ResolvedAuth { context: AuthContext::anonymous(), plan: anonymous_plan(), key: None }
        };

        let quota_ctx = if auth_required {
            match self.check_quota(&resolved, now).await {
                Ok(ctx) => ctx,
                Err(failure) => return Err(failure),
            }
        } else {
            QuotaOutcome { period_start: None, bypass: true }
        };

        let mut rate_headers = HashMap::new();
        if auth_required {
            if let Err(failure) = self.check_rate_limit(&resolved, now, &config, &mut rate_headers).await {
                return Err(failure);
            }
        }

        let entitlement_headers = self.entitlement_store.entitlement_headers(&resolved.plan.id).await.unwrap_or_default();

        let upstream = self.resolve_upstream(route.as_deref(), &config);
        let mut headers = req.headers.clone();
        for (name, value) in &entitlement_headers {
            headers.insert(name.clone(), value.clone());
        }

        let binding = request_binding(req, &resolved.context);
        let mut path = req.path.clone();
        let mut method = req.method.clone();
        let mut query = req.query.clone();
        let mut body: serde_json::Value = serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);

        if let Some(route) = &route {
            if let Some(transform) = &route.request_transform {
                match transform::apply_transform(&self.engine, transform, headers.clone(), &query, body.clone(), &binding, now) {
                    Ok((h, q, b, _)) => {
                        headers = h;
                        query = q;
                        body = b;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "request transform failed");
                        return Err(HandleFailure {
                            error: GatewayError::TransformError(e.to_string()),
                            headers: HashMap::new(),
                            auth: Some(resolved.context.clone()),
                        });
                    }
                }
            }

            if let Some(rewrite_expr) = &route.path_rewrite {
                match self.engine.eval_string(rewrite_expr, &binding, now) {
                    Ok(new_path) if !new_path.is_empty() => path = new_path,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "path rewrite expression failed; keeping original path"),
                }
            }
            if let Some(override_method) = &route.method_override {
                method = override_method.clone();
            }
        }

        headers = upstream::apply_upstream_auth(&upstream, headers);

        let body_bytes = if body.is_null() { req.body.clone() } else { serde_json::to_vec(&body).unwrap_or_default() };
        let forward_request = Request {
            method,
            path,
            query,
            headers,
            body: body_bytes,
            api_key: req.api_key.clone(),
            remote_ip: req.remote_ip.clone(),
            user_agent: req.user_agent.clone(),
        };

        let forward_started = self.clock.now();
        let mut response = match self.forwarder.forward(&forward_request, &upstream).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "upstream forward failed");
                return Err(HandleFailure { error: e, headers: HashMap::new(), auth: Some(resolved.context.clone()) });
            }
        };
        let latency_ms = (self.clock.now() - forward_started).num_milliseconds() as f64;
        response.latency_ms = latency_ms;

        if let Some(route) = &route {
            if let Some(transform) = &route.response_transform {
                let resp_binding = response_binding(&binding, &response);
                match transform::apply_transform(&self.engine, transform, response.headers.clone(), "", parse_body(&response.body), &resp_binding, now) {
                    Ok((h, _, b, changed)) => {
                        response.headers = h;
                        if changed {
                            response.body = serde_json::to_vec(&b).unwrap_or(response.body.clone());
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "response transform failed; passing original response through"),
                }
            }
        }

        let cost_multiplier = self
            .evaluate_metering(route.as_deref(), &resolved.plan.id, &req.method, &req.path, response.status, &response.body, now, &binding)
            .await;

        let key_id = resolved.key.as_ref().map(|k| k.id.clone()).unwrap_or_else(|| resolved.context.key_id.clone());
        let event = UsageEvent {
            id: self.id_gen.next_id(),
            key_id: key_id.clone(),
            user_id: resolved.context.user_id.clone(),
            method: req.method.clone(),
            path: req.path.clone(),
            status: response.status,
            latency_ms,
            request_bytes: req.body.len() as u64,
            response_bytes: response.body.len() as u64,
            cost_multiplier,
            remote_ip: req.remote_ip.clone(),
            user_agent: req.user_agent.clone(),
            timestamp: now,
        };
        self.usage_recorder.record(event).await;

        if auth_required && !quota_ctx.bypass {
            if let Some(period_start) = quota_ctx.period_start {
                let compute_units = match resolved.plan.meter_type {
                    plan::MeterType::Requests => 0.0,
                    plan::MeterType::ComputeUnits => cost_multiplier,
                };
                let _ = self
                    .quota_store
                    .increment(&resolved.context.user_id, period_start, 1, compute_units, response.body.len() as u64)
                    .await;
            }
        }

        if let Some(key) = &resolved.key {
            let _ = self.key_store.touch_last_used(&key.id, now).await;
        }

        for (k, v) in rate_headers {
            response.headers.insert(k, v);
        }

        Ok(HandleSuccess { response, auth: Some(resolved.context) })
    }

    pub async fn handle_streaming(&self, req: &Request) -> StreamingHandleResult {
        let now = self.clock.now();
        let config = self.config.load_full();

        let route_match = self.router.match_request(&req.method, &req.path, req.header("host").unwrap_or(""), &req.headers);
        let route = route_match.as_ref().map(|m| m.route.clone());
        let auth_required = route.as_ref().map(|r| r.auth_required).unwrap_or(true);

        let resolved = if auth_required {
            self.authenticate(req, now).await?
        } else {
            ResolvedAuth { context: AuthContext::anonymous(), plan: anonymous_plan(), key: None }
        };

        let quota_ctx = if auth_required {
            self.check_quota(&resolved, now).await?
        } else {
            QuotaOutcome { period_start: None, bypass: true }
        };

        let mut rate_headers = HashMap::new();
        if auth_required {
            self.check_rate_limit(&resolved, now, &config, &mut rate_headers).await?;
        };

        let entitlement_headers = self.entitlement_store.entitlement_headers(&resolved.plan.id).await.unwrap_or_default();
        let upstream = self.resolve_upstream(route.as_deref(), &config);
        let mut headers = req.headers.clone();
        for (name, value) in &entitlement_headers {
            headers.insert(name.clone(), value.clone());
        }

        let binding = request_binding(req, &resolved.context);
        let mut path = req.path.clone();
        let mut query = req.query.clone();
        let mut body: serde_json::Value = serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);

        if let Some(route) = &route {
            if let Some(transform) = &route.request_transform {
                let (h, q, b, _) = transform::apply_transform(&self.engine, transform, headers.clone(), &query, body.clone(), &binding, now)
                    .map_err(|e| HandleFailure {
                        error: GatewayError::TransformError(e.to_string()),
                        headers: HashMap::new(),
                        auth: Some(resolved.context.clone()),
                    })?;
                headers = h;
                query = q;
                body = b;
            }
            if let Some(rewrite_expr) = &route.path_rewrite {
                match self.engine.eval_string(rewrite_expr, &binding, now) {
                    Ok(new_path) if !new_path.is_empty() => path = new_path,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "path rewrite expression failed; keeping original path"),
                }
            }
        }
        headers = upstream::apply_upstream_auth(&upstream, headers);
        let body_bytes = if body.is_null() { req.body.clone() } else { serde_json::to_vec(&body).unwrap_or_default() };
        let forward_request = Request {
            method: req.method.clone(),
            path,
            query,
            headers,
            body: body_bytes,
            api_key: req.api_key.clone(),
            remote_ip: req.remote_ip.clone(),
            user_agent: req.user_agent.clone(),
        };

        let ctx = self
            .forwarder
            .forward_streaming(&forward_request, &upstream)
            .await
            .map_err(|e| HandleFailure { error: e, headers: HashMap::new(), auth: Some(resolved.context.clone()) })?;

        let metering_expr = route.as_ref().and_then(|r| r.metering_expr.clone());
        let accounting = StreamingAccounting {
            key_id: resolved.key.as_ref().map(|k| k.id.clone()).unwrap_or_else(|| resolved.context.key_id.clone()),
            user_id: resolved.context.user_id.clone(),
            plan_id: resolved.plan.id.clone(),
            path: req.path.clone(),
            request_bytes: req.body.len() as u64,
            metering_expr,
            started_at: now,
            period_start: quota_ctx.period_start,
            quota_bypass: quota_ctx.bypass,
        };

        Ok(StreamingHandle { ctx, auth: Some(resolved.context), accounting })
    }

    /// `RecordStreamingUsage` (`spec.md` §4.2 streaming variant): called once
    /// the caller has finished pumping bytes from a `StreamingContext`.
    /// `all_data` is the accumulated SSE text, exposed to `metering_expr` as
    /// the `allData` binding alongside `lastChunk`.
    pub async fn record_streaming_usage(
        &self,
        accounting: StreamingAccounting,
        status: u16,
        response_bytes: u64,
        last_chunk: &str,
        all_data: &str,
    ) {
        let now = self.clock.now();
        let latency_ms = (now - accounting.started_at).num_milliseconds() as f64;

        let cost_multiplier = if let Some(expr) = &accounting.metering_expr {
            let mut binding = Binding::new();
            binding.set("status", Value::Int(status as i64));
            binding.set("responseBytes", Value::Int(response_bytes as i64));
            binding.set("lastChunk", Value::String(last_chunk.to_string()));
            binding.set("allData", Value::String(all_data.to_string()));
            match self.engine.eval_float(expr, &binding, now) {
                Ok(v) => v.max(0.0),
                Err(e) => {
                    tracing::warn!(error = %e, "streaming metering expression failed; defaulting cost multiplier to 1.0");
                    1.0
                }
            }
        } else {
            1.0
        };

        let event = UsageEvent {
            id: self.id_gen.next_id(),
            key_id: accounting.key_id.clone(),
            user_id: accounting.user_id.clone(),
            method: "STREAM".to_string(),
            path: accounting.path.clone(),
            status,
            latency_ms,
            request_bytes: accounting.request_bytes,
            response_bytes,
            cost_multiplier,
            remote_ip: String::new(),
            user_agent: String::new(),
            timestamp: now,
        };
        self.usage_recorder.record(event).await;

        if !accounting.quota_bypass {
            if let Some(period_start) = accounting.period_start {
                let _ = self.quota_store.increment(&accounting.user_id, period_start, 1, cost_multiplier, response_bytes).await;
            }
        }
    }

    async fn authenticate(&self, req: &Request, now: DateTime<Utc>) -> Result<ResolvedAuth, HandleFailure> {
        let no_auth_err = |e: GatewayError| HandleFailure { error: e, headers: HashMap::new(), auth: None };

        let config = self.config.load();
        if !req.api_key.starts_with(&config.key_prefix) {
            return Err(no_auth_err(GatewayError::InvalidKey));
        }
        let prefix = key::lookup_prefix(&req.api_key).ok_or_else(|| no_auth_err(GatewayError::InvalidKey))?;

        let candidates = self.key_store.find_by_prefix(prefix).await.map_err(|e| {
            tracing::error!(error = %e, "key store lookup failed; failing closed as invalid key");
            no_auth_err(GatewayError::InvalidKey)
        })?;
        if candidates.is_empty() {
            return Err(no_auth_err(GatewayError::InvalidKey));
        }

        let matched = candidates
            .into_iter()
            .find(|k| k.verify(&req.api_key))
            .ok_or_else(|| no_auth_err(GatewayError::InvalidKey))?;

        matched.is_valid(now).map_err(|e| match e {
            key::KeyValidityError::Revoked => no_auth_err(GatewayError::Revoked),
            key::KeyValidityError::Expired => no_auth_err(GatewayError::Expired),
        })?;

        let user = self
            .user_store
            .get(&matched.user_id)
            .await
            .map_err(|e| no_auth_err(GatewayError::Internal(e)))?
            .ok_or_else(|| no_auth_err(GatewayError::NotFound("user".to_string())))?;

        if !user.is_active() {
            return Err(HandleFailure { error: GatewayError::UserSuspended, headers: HashMap::new(), auth: None });
        }

        let plan = self
            .plan_store
            .get(&user.plan_id)
            .await
            .map_err(|e| no_auth_err(GatewayError::Internal(e)))?
            .ok_or_else(|| no_auth_err(GatewayError::NotFound("plan".to_string())))?;

        let context = AuthContext {
            key_id: matched.id.clone(),
            user_id: user.id.clone(),
            plan_id: plan.id.clone(),
            rate_limit_per_minute: plan.rate_limit_per_minute,
            scopes: matched.scopes.iter().cloned().collect(),
        };

        Ok(ResolvedAuth { context, plan, key: Some(matched) })
    }

    async fn check_rate_limit(
        &self,
        resolved: &ResolvedAuth,
        now: DateTime<Utc>,
        config: &PipelineConfig,
        out_headers: &mut HashMap<String, String>,
    ) -> Result<(), HandleFailure> {
        let rl_config = RateLimitConfig {
            limit: resolved.plan.rate_limit_per_minute,
            window_seconds: config.rate_window_seconds,
            burst: config.rate_burst_tokens,
        };
        let state = self.rate_limit_store.get(&resolved.context.key_id).await.unwrap_or(None);
        let (decision, new_state) = ratelimit::check(state, &rl_config, now);
        let _ = self.rate_limit_store.put(&resolved.context.key_id, new_state).await;

        out_headers.insert("X-RateLimit-Remaining".to_string(), decision.remaining.to_string());
        out_headers.insert("X-RateLimit-Reset".to_string(), decision.reset_at.to_rfc3339());

        if !decision.allowed {
            let mut headers = out_headers.clone();
            headers.insert("Retry-After".to_string(), (decision.reset_at - now).num_seconds().max(0).to_string());
            return Err(HandleFailure { error: GatewayError::RateLimited, headers, auth: Some(resolved.context.clone()) });
        }
        Ok(())
    }

    async fn check_quota(&self, resolved: &ResolvedAuth, now: DateTime<Utc>) -> Result<QuotaOutcome, HandleFailure> {
        let bypass = resolved.key.as_ref().map(|k| k.quota_bypass).unwrap_or(false) || resolved.plan.is_unlimited();
        if bypass {
            return Ok(QuotaOutcome { period_start: None, bypass: true });
        }

        let (period_start, period_end) = quota::period_bounds(now);
        let state = self.quota_store.get(&resolved.context.user_id, period_start).await.unwrap_or(None).unwrap_or_default();
        let quota_config = quota::config_from_plan(&resolved.plan);
        let increment = match quota_config.meter_type {
            plan::MeterType::Requests => 1.0,
            plan::MeterType::ComputeUnits => quota_config.estimated_cost_per_request,
        };
        let result = quota::check(state, &quota_config, increment);

        if !result.allowed {
            let retry_after = (period_end - now).num_seconds().max(0);
            let headers = HashMap::from([
                ("X-Quota-Used".to_string(), result.attempted_total.to_string()),
                ("X-Quota-Limit".to_string(), result.limit.to_string()),
                ("X-Quota-Reset".to_string(), period_end.to_rfc3339()),
                ("Retry-After".to_string(), retry_after.to_string()),
            ]);
            return Err(HandleFailure { error: GatewayError::QuotaExceeded, headers, auth: Some(resolved.context.clone()) });
        }

        Ok(QuotaOutcome { period_start: Some(period_start), bypass: false })
    }

    fn resolve_upstream(&self, route: Option<&Route>, config: &PipelineConfig) -> Upstream {
        route
            .and_then(|r| r.upstream_id.as_ref())
            .and_then(|id| self.router.snapshot().upstream(id))
            .map(|u| (*u).clone())
            .unwrap_or_else(|| config.default_upstream.clone())
    }

    /// Stage 16 (`spec.md` §4.2): `route.metering_expr` if present, otherwise
    /// endpoint pricing rules (`spec.md` §4.6 `GetCostMultiplier`) looked up
    /// by `plan_id`.
    #[allow(clippy::too_many_arguments)]
    async fn evaluate_metering(
        &self,
        route: Option<&Route>,
        plan_id: &str,
        method: &str,
        path: &str,
        status: u16,
        response_body: &[u8],
        now: DateTime<Utc>,
        base_binding: &Binding,
    ) -> f64 {
        if let Some(expr) = route.and_then(|r| r.metering_expr.as_ref()) {
            let mut binding = base_binding.clone();
            binding.set("status", Value::Int(status as i64));
            binding.set("requestBytes", Value::Int(0));
            binding.set("responseBytes", Value::Int(response_body.len() as i64));
            binding.set("path", Value::String(path.to_string()));
            binding.set("method", Value::String(method.to_string()));
            binding.set("respBody", parse_body_value(response_body));
            return match self.engine.eval_float(expr, &binding, now) {
                Ok(v) => v.max(0.0),
                Err(e) => {
                    tracing::warn!(error = %e, "metering expression failed; defaulting cost multiplier to 1.0");
                    1.0
                }
            };
        }

        let rules = self.entitlement_store.pricing_rules(plan_id).await.unwrap_or_default();
        plan::get_cost_multiplier(&rules, method, path).max(0.0)
    }
}

struct QuotaOutcome {
    period_start: Option<DateTime<Utc>>,
    bypass: bool,
}

fn anonymous_plan() -> Plan {
    Plan {
        id: String::new(),
        rate_limit_per_minute: 0,
        requests_per_month: -1,
        meter_type: plan::MeterType::Requests,
        estimated_cost_per_request: 1.0,
        quota_enforce_mode: plan::QuotaEnforceMode::Soft,
        quota_grace_pct: 0.0,
        overage_pricing: serde_json::Value::Null,
    }
}

fn parse_body(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null)
}

fn parse_body_value(bytes: &[u8]) -> Value {
    Value::from_json(parse_body(bytes))
}

fn request_binding(req: &Request, auth: &AuthContext) -> Binding {
    let mut binding = Binding::new();
    binding.set("method", Value::String(req.method.clone()));
    binding.set("path", Value::String(req.path.clone()));
    let query_map: std::collections::HashMap<String, Value> = url::form_urlencoded::parse(req.query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    binding.set("query", Value::Map(query_map));
    let headers_map: std::collections::HashMap<String, Value> =
        req.headers.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    binding.set("headers", Value::Map(headers_map));
    binding.set("body", parse_body_value(&req.body));
    binding.set("rawBody", Value::String(String::from_utf8_lossy(&req.body).into_owned()));
    binding.set("userID", Value::String(auth.user_id.clone()));
    binding.set("planID", Value::String(auth.plan_id.clone()));
    binding.set("keyID", Value::String(auth.key_id.clone()));
    binding
}

fn response_binding(request_binding: &Binding, response: &Response) -> Binding {
    let mut binding = request_binding.clone();
    binding.set("status", Value::Int(response.status as i64));
    let headers_map: std::collections::HashMap<String, Value> =
        response.headers.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    binding.set("respHeaders", Value::Map(headers_map));
    binding.set("respBody", parse_body_value(&response.body));
    binding.set("responseBytes", Value::Int(response.body.len() as i64));
    binding
}
