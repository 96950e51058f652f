use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMatchType {
    None,
    Exact,
    Wildcard,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatchType {
    Exact,
    Prefix,
    Regex,
}

impl PathMatchType {
    /// exact=3, prefix=2, regex=1 (`spec.md` §4.1 compilation ordering).
    pub fn specificity(self) -> u8 {
        match self {
            PathMatchType::Exact => 3,
            PathMatchType::Prefix => 2,
            PathMatchType::Regex => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    HttpStream,
    Sse,
    Websocket,
}

impl Protocol {
    pub fn is_streaming(self) -> bool {
        matches!(self, Protocol::HttpStream | Protocol::Sse | Protocol::Websocket)
    }
}

/// A header match predicate (`spec.md` §3/§4.1 stage 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderPredicate {
    pub name: String,
    /// Exact value, or a regex if the route marks it as such via `is_regex`.
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    pub required: bool,
}

/// Header/query/body/path rewrite set, evaluated through the expression
/// engine (`spec.md` §3/§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub set_headers: Vec<(String, String)>,
    #[serde(default)]
    pub delete_headers: Vec<String>,
    #[serde(default)]
    pub set_query: Vec<(String, String)>,
    #[serde(default)]
    pub delete_query: Vec<String>,
    /// Expression evaluating to a JSON-serializable value.
    pub body_expr: Option<String>,
}

/// A compiled-from routing rule. Immutable once part of a snapshot; replaced
/// as a whole on reload (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub priority: i32,
    pub enabled: bool,
    pub auth_required: bool,

    pub host_pattern: String,
    pub host_match_type: HostMatchType,

    pub path_pattern: String,
    pub match_type: PathMatchType,

    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub header_predicates: Vec<HeaderPredicate>,

    pub upstream_id: Option<String>,
    pub method_override: Option<String>,
    pub path_rewrite: Option<String>,
    pub request_transform: Option<Transform>,
    pub response_transform: Option<Transform>,
    pub metering_expr: Option<String>,
    pub protocol: Protocol,
}

impl Route {
    pub fn method_allowed(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn is_active(&self) -> bool {
        self.enabled
    }

    /// Host match type inference when left empty (`spec.md` §4.1): a pattern
    /// containing `*` is wildcard, any other non-empty pattern is exact, an
    /// empty pattern means "match any host".
    pub fn effective_host_match_type(&self) -> HostMatchType {
        if self.host_pattern.is_empty() {
            HostMatchType::None
        } else if self.host_match_type != HostMatchType::None {
            self.host_match_type
        } else if self.host_pattern.contains('*') {
            HostMatchType::Wildcard
        } else {
            HostMatchType::Exact
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_route() -> Route {
        Route {
            id: "r1".into(),
            priority: 0,
            enabled: true,
            auth_required: true,
            host_pattern: String::new(),
            host_match_type: HostMatchType::None,
            path_pattern: "/api/data".into(),
            match_type: PathMatchType::Exact,
            methods: vec!["GET".into()],
            header_predicates: vec![],
            upstream_id: None,
            method_override: None,
            path_rewrite: None,
            request_transform: None,
            response_transform: None,
            metering_expr: None,
            protocol: Protocol::Http,
        }
    }

    #[test]
    fn empty_methods_allows_any() {
        let mut route = base_route();
        route.methods = vec![];
        assert!(route.method_allowed("DELETE"));
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let route = base_route();
        assert!(route.method_allowed("get"));
        assert!(!route.method_allowed("post"));
    }

    #[test]
    fn host_match_type_inference() {
        let mut route = base_route();
        assert_eq!(route.effective_host_match_type(), HostMatchType::None);

        route.host_pattern = "api.example.com".into();
        assert_eq!(route.effective_host_match_type(), HostMatchType::Exact);

        route.host_pattern = "*.example.com".into();
        assert_eq!(route.effective_host_match_type(), HostMatchType::Wildcard);
    }

    #[test]
    fn specificity_ordering() {
        assert!(PathMatchType::Exact.specificity() > PathMatchType::Prefix.specificity());
        assert!(PathMatchType::Prefix.specificity() > PathMatchType::Regex.specificity());
    }
}
