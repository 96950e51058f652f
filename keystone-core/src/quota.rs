use crate::plan::{MeterType, Plan, QuotaEnforceMode};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Per-user, per-billing-period counters (`spec.md` §3 `QuotaState`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuotaState {
    pub request_count: u64,
    pub compute_units: f64,
    pub bytes_total: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub requests_per_month: i64,
    pub meter_type: MeterType,
    pub estimated_cost_per_request: f64,
    pub enforce_mode: QuotaEnforceMode,
    pub grace_pct: f64,
}

/// `ConfigFromPlan(plan) -> Config` (`spec.md` §4.4): defaults `grace_pct` to
/// 0.05 when zero and `estimated_cost` to 1 when non-positive.
pub fn config_from_plan(plan: &Plan) -> QuotaConfig {
    QuotaConfig {
        requests_per_month: plan.requests_per_month,
        meter_type: plan.meter_type,
        estimated_cost_per_request: if plan.estimated_cost_per_request > 0.0 {
            plan.estimated_cost_per_request
        } else {
            1.0
        },
        enforce_mode: plan.quota_enforce_mode,
        grace_pct: if plan.quota_grace_pct == 0.0 { 0.05 } else { plan.quota_grace_pct },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WarningLevel {
    None,
    Approaching,
    Critical,
    Exceeded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckResult {
    pub allowed: bool,
    pub current: f64,
    /// `current + increment` — the value reported as `X-Quota-Used` on deny
    /// (`spec.md` §4.2 stage 8).
    pub attempted_total: f64,
    pub limit: i64,
    pub graced_limit: i64,
    pub warning: WarningLevel,
}

/// `PeriodBounds(now) -> (start, end)`: the first instant of the calendar
/// month and the last nanosecond of the same month, preserving the timezone
/// of the input (`spec.md` §4.4).
pub fn period_bounds<Tz: TimeZone>(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    let tz = now.timezone();
    let start = tz
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is always representable");

    let (next_year, next_month) = if now.month() == 12 { (now.year() + 1, 1) } else { (now.year(), now.month() + 1) };
    let next_start = tz
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("first of next month is always representable");
    let end = next_start - chrono::Duration::nanoseconds(1);

    (start, end)
}

/// Pure `Check(state, config, increment) -> CheckResult` (`spec.md` §4.2
/// stage 8 / §4.4). The orchestrator calls this with the *speculative*
/// increment to decide admission; the actual persisted increment is applied
/// separately after forwarding.
pub fn check(state: QuotaState, config: &QuotaConfig, increment: f64) -> CheckResult {
    let current = match config.meter_type {
        MeterType::Requests => state.request_count as f64,
        MeterType::ComputeUnits => state.compute_units,
    };

    if config.requests_per_month < 0 {
        return CheckResult {
            allowed: true,
            current,
            attempted_total: current + increment,
            limit: config.requests_per_month,
            graced_limit: config.requests_per_month,
            warning: WarningLevel::None,
        };
    }

    let limit = config.requests_per_month;
    let graced = (limit as f64 * (1.0 + config.grace_pct)).floor() as i64;

    let allowed = match config.enforce_mode {
        QuotaEnforceMode::Hard => current + increment <= graced as f64,
        QuotaEnforceMode::Warn | QuotaEnforceMode::Soft => true,
    };

    let pct_used = if limit > 0 { (current + increment) / limit as f64 * 100.0 } else { 0.0 };
    let warning = if pct_used > 100.0 {
        WarningLevel::Exceeded
    } else if pct_used >= 95.0 {
        WarningLevel::Critical
    } else if pct_used >= 80.0 {
        WarningLevel::Approaching
    } else {
        WarningLevel::None
    };

    CheckResult { allowed, current, attempted_total: current + increment, limit, graced_limit: graced, warning }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(requests_per_month: i64, grace_pct: f64, mode: QuotaEnforceMode) -> Plan {
        Plan {
            id: "p".into(),
            rate_limit_per_minute: 60,
            requests_per_month,
            meter_type: MeterType::Requests,
            estimated_cost_per_request: 1.0,
            quota_enforce_mode: mode,
            quota_grace_pct: grace_pct,
            overage_pricing: serde_json::Value::Null,
        }
    }

    #[test]
    fn config_from_plan_defaults_grace_and_cost() {
        let mut p = plan(1000, 0.0, QuotaEnforceMode::Hard);
        p.estimated_cost_per_request = 0.0;
        let config = config_from_plan(&p);
        assert_eq!(config.grace_pct, 0.05);
        assert_eq!(config.estimated_cost_per_request, 1.0);
    }

    #[test]
    fn period_bounds_span_exactly_one_month_minus_a_nanosecond() {
        let now = DateTime::parse_from_rfc3339("2026-02-15T12:00:00Z").unwrap().with_timezone(&Utc);
        let (start, end) = period_bounds(now);
        assert!(start <= now && now <= end);
        assert_eq!(start.day(), 1);
        assert_eq!(start.hour(), 0);

        let next_month_start = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(end, next_month_start - chrono::Duration::nanoseconds(1));
    }

    #[test]
    fn period_bounds_handles_december_rollover() {
        let now = DateTime::parse_from_rfc3339("2026-12-10T00:00:00Z").unwrap().with_timezone(&Utc);
        let (_, end) = period_bounds(now);
        let jan_first = DateTime::parse_from_rfc3339("2027-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(end, jan_first - chrono::Duration::nanoseconds(1));
    }

    #[test]
    fn unlimited_plan_is_always_allowed() {
        let config = config_from_plan(&plan(-1, 0.05, QuotaEnforceMode::Hard));
        let state = QuotaState { request_count: 1_000_000, ..Default::default() };
        let result = check(state, &config, 1.0);
        assert!(result.allowed);
    }

    #[test]
    fn hard_mode_denies_past_graced_limit() {
        let config = config_from_plan(&plan(100, 0.05, QuotaEnforceMode::Hard));
        let state = QuotaState { request_count: 105, ..Default::default() };
        let result = check(state, &config, 1.0);
        assert_eq!(result.graced_limit, 105);
        assert_eq!(result.attempted_total, 106.0);
        assert!(!result.allowed);
        assert_eq!(result.warning, WarningLevel::Exceeded);
    }

    #[test]
    fn warn_and_soft_modes_always_allow() {
        let config_warn = config_from_plan(&plan(10, 0.0, QuotaEnforceMode::Warn));
        let config_soft = config_from_plan(&plan(10, 0.0, QuotaEnforceMode::Soft));
        let state = QuotaState { request_count: 1000, ..Default::default() };
        assert!(check(state, &config_warn, 1.0).allowed);
        assert!(check(state, &config_soft, 1.0).allowed);
    }

    #[test]
    fn warning_level_thresholds() {
        let config = config_from_plan(&plan(100, 0.0, QuotaEnforceMode::Warn));
        assert_eq!(check(QuotaState { request_count: 50, ..Default::default() }, &config, 1.0).warning, WarningLevel::None);
        assert_eq!(check(QuotaState { request_count: 79, ..Default::default() }, &config, 1.0).warning, WarningLevel::Approaching);
        assert_eq!(check(QuotaState { request_count: 94, ..Default::default() }, &config, 1.0).warning, WarningLevel::Critical);
        assert_eq!(check(QuotaState { request_count: 100, ..Default::default() }, &config, 1.0).warning, WarningLevel::Exceeded);
    }
}
