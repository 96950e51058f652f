//! Narrow capability contracts the pipeline depends on (`spec.md` §6).
//! Concrete persistence (database-backed implementations) is an external
//! collaborator; this module only defines the trait boundary plus
//! in-memory reference implementations used by tests, grounded on
//! `ando-plugin::plugin::Plugin`'s async-trait pattern and
//! `ando-store::cache::ConfigCache`'s `DashMap`-backed maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::key::Key;
use crate::plan::{EndpointPricingRule, Plan};
use crate::quota::QuotaState;
use crate::ratelimit::RateLimitState;
use crate::usage::UsageEvent;
use crate::user::User;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Look up a candidate key by its lookup prefix (`spec.md` §4.2 stage 4).
    /// May return more than one record if prefixes collide; the caller tries
    /// each with `Key::verify` until one matches.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Key>, String>;
    async fn touch_last_used(&self, key_id: &str, at: DateTime<Utc>) -> Result<(), String>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<User>, String>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get(&self, plan_id: &str) -> Result<Option<Plan>, String>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Endpoint-level pricing overrides for a plan (`spec.md` §4.6
    /// `GetCostMultiplier`), in priority order.
    async fn pricing_rules(&self, plan_id: &str) -> Result<Vec<EndpointPricingRule>, String>;

    /// The plan-entitlement join's header set, injected into the outgoing
    /// upstream request (`spec.md` §4.2 stage 11).
    async fn entitlement_headers(&self, plan_id: &str) -> Result<Vec<(String, String)>, String>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key_id: &str) -> Result<Option<RateLimitState>, String>;
    async fn put(&self, key_id: &str, state: RateLimitState) -> Result<(), String>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get(&self, user_id: &str, period_start: DateTime<Utc>) -> Result<Option<QuotaState>, String>;
    async fn increment(
        &self,
        user_id: &str,
        period_start: DateTime<Utc>,
        requests: u64,
        compute_units: f64,
        bytes: u64,
    ) -> Result<QuotaState, String>;
}

/// Non-blocking usage sink (`spec.md` §4.2 stage 17/§6). Implementations must
/// never block the request path — `keystone-observability`'s
/// `ChannelUsageRecorder` satisfies this via `mpsc::Sender::try_send`.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, event: UsageEvent);
}

#[async_trait]
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// `uuid::Uuid::new_v4`-backed generator, the default in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

#[async_trait]
impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// In-memory reference implementations, used by integration tests
/// (`spec.md` §6.5) and as a starting point for embedders that don't need a
/// database-backed store.
pub mod memory {
    use super::*;

    #[derive(Default)]
    pub struct MemoryKeyStore {
        keys: DashMap<String, Key>,
    }

    impl MemoryKeyStore {
        pub fn insert(&self, key: Key) {
            self.keys.insert(key.id.clone(), key);
        }
    }

    #[async_trait]
    impl KeyStore for MemoryKeyStore {
        async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Key>, String> {
            Ok(self.keys.iter().filter(|e| e.value().prefix == prefix).map(|e| e.value().clone()).collect())
        }

        async fn touch_last_used(&self, key_id: &str, at: DateTime<Utc>) -> Result<(), String> {
            if let Some(mut entry) = self.keys.get_mut(key_id) {
                entry.last_used_at = Some(at);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryUserStore {
        users: DashMap<String, User>,
    }

    impl MemoryUserStore {
        pub fn insert(&self, user: User) {
            self.users.insert(user.id.clone(), user);
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn get(&self, user_id: &str) -> Result<Option<User>, String> {
            Ok(self.users.get(user_id).map(|e| e.value().clone()))
        }
    }

    #[derive(Default)]
    pub struct MemoryPlanStore {
        plans: DashMap<String, Plan>,
    }

    impl MemoryPlanStore {
        pub fn insert(&self, plan: Plan) {
            self.plans.insert(plan.id.clone(), plan);
        }
    }

    #[async_trait]
    impl PlanStore for MemoryPlanStore {
        async fn get(&self, plan_id: &str) -> Result<Option<Plan>, String> {
            Ok(self.plans.get(plan_id).map(|e| e.value().clone()))
        }
    }

    #[derive(Default)]
    pub struct MemoryEntitlementStore {
        rules: DashMap<String, Vec<EndpointPricingRule>>,
        headers: DashMap<String, Vec<(String, String)>>,
    }

    impl MemoryEntitlementStore {
        pub fn set_rules(&self, plan_id: impl Into<String>, rules: Vec<EndpointPricingRule>) {
            self.rules.insert(plan_id.into(), rules);
        }

        pub fn set_headers(&self, plan_id: impl Into<String>, headers: Vec<(String, String)>) {
            self.headers.insert(plan_id.into(), headers);
        }
    }

    #[async_trait]
    impl EntitlementStore for MemoryEntitlementStore {
        async fn pricing_rules(&self, plan_id: &str) -> Result<Vec<EndpointPricingRule>, String> {
            Ok(self.rules.get(plan_id).map(|e| e.value().clone()).unwrap_or_default())
        }

        async fn entitlement_headers(&self, plan_id: &str) -> Result<Vec<(String, String)>, String> {
            Ok(self.headers.get(plan_id).map(|e| e.value().clone()).unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct MemoryRateLimitStore {
        states: DashMap<String, RateLimitState>,
    }

    #[async_trait]
    impl RateLimitStore for MemoryRateLimitStore {
        async fn get(&self, key_id: &str) -> Result<Option<RateLimitState>, String> {
            Ok(self.states.get(key_id).map(|e| *e.value()))
        }

        async fn put(&self, key_id: &str, state: RateLimitState) -> Result<(), String> {
            self.states.insert(key_id.to_string(), state);
            Ok(())
        }
    }

    /// Keyed on `(user_id, period_start)` so a rollover into a new billing
    /// period starts a fresh counter automatically.
    #[derive(Default)]
    pub struct MemoryQuotaStore {
        states: DashMap<(String, DateTime<Utc>), QuotaState>,
    }

    #[async_trait]
    impl QuotaStore for MemoryQuotaStore {
        async fn get(&self, user_id: &str, period_start: DateTime<Utc>) -> Result<Option<QuotaState>, String> {
            Ok(self.states.get(&(user_id.to_string(), period_start)).map(|e| *e.value()))
        }

        async fn increment(
            &self,
            user_id: &str,
            period_start: DateTime<Utc>,
            requests: u64,
            compute_units: f64,
            bytes: u64,
        ) -> Result<QuotaState, String> {
            let mut entry = self.states.entry((user_id.to_string(), period_start)).or_default();
            entry.request_count += requests;
            entry.compute_units += compute_units;
            entry.bytes_total += bytes;
            Ok(*entry)
        }
    }

    /// Collects every recorded event in order; used to assert pipeline
    /// behavior in tests without a real observability backend.
    #[derive(Default)]
    pub struct MemoryUsageRecorder {
        events: Arc<std::sync::Mutex<Vec<UsageEvent>>>,
    }

    impl MemoryUsageRecorder {
        pub fn events(&self) -> Vec<UsageEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UsageRecorder for MemoryUsageRecorder {
        async fn record(&self, event: UsageEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Deterministic id generator for tests: `prefix-0`, `prefix-1`, ...
    pub struct SequentialIdGenerator {
        prefix: String,
        counter: AtomicU64,
    }

    impl SequentialIdGenerator {
        pub fn new(prefix: impl Into<String>) -> Self {
            Self { prefix: prefix.into(), counter: AtomicU64::new(0) }
        }
    }

    #[async_trait]
    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            format!("{}-{}", self.prefix, self.counter.fetch_add(1, Ordering::Relaxed))
        }
    }
}
