use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterType {
    Requests,
    ComputeUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaEnforceMode {
    Hard,
    Warn,
    Soft,
}

/// A billing plan. Identity is `id`. `requests_per_month = -1` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub rate_limit_per_minute: u64,
    pub requests_per_month: i64,
    pub meter_type: MeterType,
    pub estimated_cost_per_request: f64,
    pub quota_enforce_mode: QuotaEnforceMode,
    /// Default 0.05 when unset/zero (`ConfigFromPlan`, `spec.md` §4.4).
    pub quota_grace_pct: f64,
    /// Overage pricing fields are opaque to the core; kept as free-form JSON.
    #[serde(default)]
    pub overage_pricing: serde_json::Value,
}

impl Plan {
    pub fn is_unlimited(&self) -> bool {
        self.requests_per_month < 0
    }
}

/// An endpoint-level pricing override (`spec.md` §4.6 `GetCostMultiplier`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointPricingRule {
    /// Empty matches any method.
    #[serde(default)]
    pub method: String,
    /// Exact path or a trailing-`*` prefix.
    pub path_pattern: String,
    pub cost_multiplier: f64,
}

/// Scan pricing rules in order; first match wins. `method` empty matches any
/// method; a pattern with a trailing `*` is a literal prefix match, otherwise
/// exact. No match falls back to `1.0`.
pub fn get_cost_multiplier(rules: &[EndpointPricingRule], method: &str, path: &str) -> f64 {
    for rule in rules {
        if !rule.method.is_empty() && !rule.method.eq_ignore_ascii_case(method) {
            continue;
        }
        let matched = if let Some(prefix) = rule.path_pattern.strip_suffix('*') {
            path.starts_with(prefix)
        } else {
            path == rule.path_pattern
        };
        if matched {
            return rule.cost_multiplier;
        }
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(method: &str, pattern: &str, mult: f64) -> EndpointPricingRule {
        EndpointPricingRule {
            method: method.into(),
            path_pattern: pattern.into(),
            cost_multiplier: mult,
        }
    }

    #[test]
    fn unlimited_plan_has_negative_requests_per_month() {
        let plan = Plan {
            id: "unlimited".into(),
            rate_limit_per_minute: 600,
            requests_per_month: -1,
            meter_type: MeterType::Requests,
            estimated_cost_per_request: 1.0,
            quota_enforce_mode: QuotaEnforceMode::Hard,
            quota_grace_pct: 0.05,
            overage_pricing: serde_json::Value::Null,
        };
        assert!(plan.is_unlimited());
    }

    #[test]
    fn no_match_falls_back_to_one() {
        let rules = vec![rule("POST", "/api/expensive", 5.0)];
        assert_eq!(get_cost_multiplier(&rules, "GET", "/api/cheap"), 1.0);
    }

    #[test]
    fn empty_method_matches_any() {
        let rules = vec![rule("", "/api/data", 2.5)];
        assert_eq!(get_cost_multiplier(&rules, "GET", "/api/data"), 2.5);
        assert_eq!(get_cost_multiplier(&rules, "POST", "/api/data"), 2.5);
    }

    #[test]
    fn trailing_star_is_prefix_match() {
        let rules = vec![rule("", "/api/llm/*", 10.0)];
        assert_eq!(get_cost_multiplier(&rules, "POST", "/api/llm/chat"), 10.0);
        assert_eq!(get_cost_multiplier(&rules, "POST", "/api/other"), 1.0);
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![rule("", "/api/*", 2.0), rule("", "/api/special", 9.0)];
        assert_eq!(get_cost_multiplier(&rules, "GET", "/api/special"), 2.0);
    }
}
