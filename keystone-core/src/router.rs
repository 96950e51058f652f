use crate::route::{HostMatchType, PathMatchType, Route};
use crate::upstream::Upstream;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A successful match: the route and any named path parameters captured by a
/// regex pattern (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: HashMap<String, String>,
}

enum PathMatcher {
    Exact(String),
    /// Literal prefix (trailing `*` stripped); a prefix pattern with no `*`
    /// behaves like an exact match (`spec.md` §4.1).
    Prefix(String),
    Regex(Regex),
}

impl PathMatcher {
    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            PathMatcher::Exact(p) => (p == path).then(HashMap::new),
            PathMatcher::Prefix(p) => path.starts_with(p.as_str()).then(HashMap::new),
            PathMatcher::Regex(re) => re.captures(path).map(|caps| {
                re.capture_names()
                    .flatten()
                    .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                    .collect()
            }),
        }
    }
}

enum HostMatcher {
    Any,
    Exact(String),
    /// `*.example.com` stored as the suffix `.example.com`; matches exactly
    /// one subdomain label in front of the suffix.
    Wildcard(String),
    Regex(Regex),
}

impl HostMatcher {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostMatcher::Any => true,
            HostMatcher::Exact(p) => p == host,
            HostMatcher::Wildcard(suffix) => {
                if !host.ends_with(suffix.as_str()) {
                    return false;
                }
                let label = &host[..host.len() - suffix.len()];
                !label.is_empty() && !label.contains('.')
            }
            HostMatcher::Regex(re) => re.is_match(host),
        }
    }
}

enum HeaderValueMatcher {
    Exact(String),
    /// `None` means the configured regex failed to compile; such a predicate
    /// never matches ("fails closed", `spec.md` §4.1).
    Regex(Option<Regex>),
}

struct CompiledHeaderPredicate {
    name: String,
    required: bool,
    matcher: HeaderValueMatcher,
}

impl CompiledHeaderPredicate {
    fn satisfied(&self, headers: &HashMap<String, String>) -> bool {
        let found = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(&self.name));
        match found {
            None => !self.required,
            Some((_, value)) => match &self.matcher {
                HeaderValueMatcher::Exact(expected) => value == expected,
                HeaderValueMatcher::Regex(Some(re)) => re.is_match(value),
                HeaderValueMatcher::Regex(None) => false,
            },
        }
    }
}

struct CompiledRoute {
    route: Arc<Route>,
    path: PathMatcher,
    host: HostMatcher,
    headers: Vec<CompiledHeaderPredicate>,
}

/// Replace `{name}` placeholders with a named capture group matching any
/// run of non-`/` characters, then anchor with `^…$` unless already anchored.
fn compile_path_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            out.push_str(&format!("(?P<{}>[^/]+)", name));
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    let anchored = if out.starts_with('^') && out.ends_with('$') {
        out
    } else {
        format!("^{}$", out)
    };
    Regex::new(&anchored)
}

fn compile_path(route: &Route) -> Result<PathMatcher, regex::Error> {
    match route.match_type {
        PathMatchType::Exact => Ok(PathMatcher::Exact(route.path_pattern.clone())),
        PathMatchType::Prefix => {
            if let Some(stripped) = route.path_pattern.strip_suffix('*') {
                Ok(PathMatcher::Prefix(stripped.to_string()))
            } else {
                Ok(PathMatcher::Exact(route.path_pattern.clone()))
            }
        }
        PathMatchType::Regex => compile_path_regex(&route.path_pattern).map(PathMatcher::Regex),
    }
}

fn compile_host(route: &Route) -> Result<HostMatcher, regex::Error> {
    match route.effective_host_match_type() {
        HostMatchType::None => Ok(HostMatcher::Any),
        HostMatchType::Exact => Ok(HostMatcher::Exact(route.host_pattern.to_ascii_lowercase())),
        HostMatchType::Wildcard => {
            let pattern = &route.host_pattern;
            if let Some(suffix) = pattern.strip_prefix('*') {
                Ok(HostMatcher::Wildcard(suffix.to_ascii_lowercase()))
            } else {
                // Malformed wildcard (no leading `*`): never matches.
                Ok(HostMatcher::Regex(Regex::new("$^")?))
            }
        }
        HostMatchType::Regex => Regex::new(&route.host_pattern).map(HostMatcher::Regex),
    }
}

fn compile_headers(route: &Route) -> Vec<CompiledHeaderPredicate> {
    route
        .header_predicates
        .iter()
        .map(|p| {
            let matcher = if p.is_regex {
                HeaderValueMatcher::Regex(Regex::new(&p.value).ok())
            } else {
                HeaderValueMatcher::Exact(p.value.clone())
            };
            CompiledHeaderPredicate {
                name: p.name.clone(),
                required: p.required,
                matcher,
            }
        })
        .collect()
}

/// Normalize an incoming `Host` header: strip a trailing port, a trailing
/// `.`, and lower-case (`spec.md` §4.1).
pub fn normalize_host(host: &str) -> String {
    let without_port = host.split(':').next().unwrap_or(host);
    without_port.trim_end_matches('.').to_ascii_lowercase()
}

/// Immutable bundle of (matcher, routes, upstream map, refreshed_at) — the
/// `RouteSnapshot` of `spec.md` §3, swapped atomically on reload.
pub struct RouteSnapshot {
    compiled: Vec<CompiledRoute>,
    routes_by_id: HashMap<String, Arc<Route>>,
    upstreams: HashMap<String, Arc<Upstream>>,
    pub refreshed_at: DateTime<Utc>,
}

impl RouteSnapshot {
    fn empty() -> Self {
        Self {
            compiled: Vec::new(),
            routes_by_id: HashMap::new(),
            upstreams: HashMap::new(),
            refreshed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Sort by (priority descending, match-type specificity descending, path
    /// pattern length descending); compile each; skip (and log) compile
    /// failures so they never surface inside request handling.
    fn build(mut routes: Vec<Route>, upstreams: Vec<Upstream>, now: DateTime<Utc>) -> Self {
        routes.retain(|r| r.is_active());
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.match_type.specificity().cmp(&a.match_type.specificity()))
                .then_with(|| b.path_pattern.len().cmp(&a.path_pattern.len()))
        });

        let mut compiled = Vec::with_capacity(routes.len());
        let mut routes_by_id = HashMap::with_capacity(routes.len());
        for route in routes {
            let route = Arc::new(route);
            routes_by_id.insert(route.id.clone(), route.clone());
            let path = match compile_path(&route) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(route_id = %route.id, error = %e, "failed to compile route path pattern; skipping route");
                    continue;
                }
            };
            let host = match compile_host(&route) {
                Ok(h) => h,
                Err(e) => {
                    tracing::error!(route_id = %route.id, error = %e, "failed to compile route host pattern; skipping route");
                    continue;
                }
            };
            let headers = compile_headers(&route);
            compiled.push(CompiledRoute { route, path, host, headers });
        }

        let upstreams = upstreams
            .into_iter()
            .filter_map(|u| u.id.clone().map(|id| (id, Arc::new(u))))
            .collect();

        Self { compiled, routes_by_id, upstreams, refreshed_at: now }
    }

    fn find(
        &self,
        method: &str,
        path: &str,
        host: &str,
        headers: &HashMap<String, String>,
    ) -> Option<RouteMatch> {
        for candidate in &self.compiled {
            if !candidate.route.method_allowed(method) {
                continue;
            }
            if !candidate.host.matches(host) {
                continue;
            }
            let Some(params) = candidate.path.matches(path) else { continue };
            if !candidate.headers.iter().all(|p| p.satisfied(headers)) {
                continue;
            }
            return Some(RouteMatch { route: candidate.route.clone(), params });
        }
        None
    }

    pub fn upstream(&self, id: &str) -> Option<Arc<Upstream>> {
        self.upstreams.get(id).cloned()
    }

    pub fn route(&self, id: &str) -> Option<Arc<Route>> {
        self.routes_by_id.get(id).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.routes_by_id.len()
    }
}

/// Hot-reloadable route table. Readers take a single atomic load per request;
/// a background task (or an explicit `UpdateConfig` call) rebuilds and
/// atomically swaps a fresh snapshot — modeled on
/// `ando-core::router::Router`'s `ArcSwap` + `DashMap` + atomic-version idiom.
pub struct Router {
    snapshot: ArcSwap<RouteSnapshot>,
    routes: DashMap<String, Route>,
    upstreams: DashMap<String, Upstream>,
    version: AtomicU64,
}

impl Router {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RouteSnapshot::empty()),
            routes: DashMap::new(),
            upstreams: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn add_route(&self, route: Route, now: DateTime<Utc>) {
        self.routes.insert(route.id.clone(), route);
        self.rebuild(now);
    }

    pub fn remove_route(&self, id: &str, now: DateTime<Utc>) {
        self.routes.remove(id);
        self.rebuild(now);
    }

    pub fn add_upstream(&self, upstream: Upstream, now: DateTime<Utc>) {
        if let Some(id) = upstream.id.clone() {
            self.upstreams.insert(id, upstream);
            self.rebuild(now);
        }
    }

    /// Replace the entire route/upstream set in one shot (`UpdateConfig`,
    /// `spec.md` §6) and rebuild a fresh snapshot.
    pub fn replace_all(&self, routes: Vec<Route>, upstreams: Vec<Upstream>, now: DateTime<Utc>) {
        self.routes.clear();
        for r in routes {
            self.routes.insert(r.id.clone(), r);
        }
        self.upstreams.clear();
        for u in upstreams {
            if let Some(id) = u.id.clone() {
                self.upstreams.insert(id, u);
            }
        }
        self.rebuild(now);
    }

    fn rebuild(&self, now: DateTime<Utc>) {
        let routes: Vec<Route> = self.routes.iter().map(|e| e.value().clone()).collect();
        let upstreams: Vec<Upstream> = self.upstreams.iter().map(|e| e.value().clone()).collect();
        let snapshot = RouteSnapshot::build(routes, upstreams, now);
        self.snapshot.store(Arc::new(snapshot));
        self.version.fetch_add(1, Ordering::Release);
        tracing::info!(version = self.version(), "route snapshot rebuilt");
    }

    /// Load the current snapshot once and match against it. Never tears: a
    /// concurrent reload either hasn't been observed yet or has fully
    /// replaced the pointer (`spec.md` §3/§5/§8).
    pub fn match_request(
        &self,
        method: &str,
        path: &str,
        host: &str,
        headers: &HashMap<String, String>,
    ) -> Option<RouteMatch> {
        let snapshot = self.snapshot.load();
        snapshot.find(method, path, normalize_host(host).as_str(), headers)
    }

    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.load_full()
    }

    pub fn route_count(&self) -> usize {
        self.snapshot.load().route_count()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
