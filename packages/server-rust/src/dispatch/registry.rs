//! Ordered handler registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use smarthub_core::{ApiMethod, AuthLevel, RouteMatch, RoutePattern, WILDCARD_ROUTE};

use crate::traits::ApiHandler;

// ---------------------------------------------------------------------------
// RouteSpec
// ---------------------------------------------------------------------------

/// Method, route pattern, and access settings of a registration.
///
/// Defaults to any method on any route at `AuthLevel::Usage` with one-time
/// tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: ApiMethod,
    pub pattern: String,
    pub auth_level: AuthLevel,
    /// Lifetime of tokens issued for this route, in seconds. `0` = one-time.
    pub token_expiration_secs: u64,
}

impl RouteSpec {
    #[must_use]
    pub fn new(method: ApiMethod, pattern: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            auth_level: AuthLevel::default(),
            token_expiration_secs: 0,
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self::new(ApiMethod::Any, WILDCARD_ROUTE)
    }

    #[must_use]
    pub fn get(pattern: impl Into<String>) -> Self {
        Self::new(ApiMethod::Get, pattern)
    }

    #[must_use]
    pub fn post(pattern: impl Into<String>) -> Self {
        Self::new(ApiMethod::Post, pattern)
    }

    #[must_use]
    pub fn delete(pattern: impl Into<String>) -> Self {
        Self::new(ApiMethod::Delete, pattern)
    }

    #[must_use]
    pub fn auth_level(mut self, level: AuthLevel) -> Self {
        self.auth_level = level;
        self
    }

    #[must_use]
    pub fn token_expiration(mut self, secs: u64) -> Self {
        self.token_expiration_secs = secs;
        self
    }
}

impl Default for RouteSpec {
    fn default() -> Self {
        Self::any()
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// A handler bound to a method, a route pattern, and an auth level.
///
/// Two registrations are equal when they share the same handler instance,
/// method, and pattern.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn ApiHandler>,
    pub method: ApiMethod,
    pub route: RoutePattern,
    pub auth_level: AuthLevel,
    pub token_expiration_secs: u64,
}

impl Registration {
    #[must_use]
    pub fn new(handler: Arc<dyn ApiHandler>, spec: RouteSpec) -> Self {
        Self {
            handler,
            method: spec.method,
            route: RoutePattern::parse(&spec.pattern),
            auth_level: spec.auth_level,
            token_expiration_secs: spec.token_expiration_secs,
        }
    }

    /// Identity check on the (handler, method, pattern) triple.
    #[must_use]
    pub fn is_same(&self, handler: &Arc<dyn ApiHandler>, method: ApiMethod, pattern: &str) -> bool {
        Arc::ptr_eq(&self.handler, handler)
            && self.method == method
            && self.route.as_str() == pattern
    }

    #[must_use]
    pub fn accepts(&self, method: ApiMethod, route: &str) -> bool {
        self.method.accepts(method) && self.route.matches(route)
    }

    #[must_use]
    pub fn route_base(&self) -> &str {
        self.route.route_base()
    }

    fn describe(&self) -> Value {
        json!({
            "identifier": self.route.identifier(),
            "route": self.route.as_str(),
            "parameters": self.route.parameters(),
            "authLevel": self.auth_level,
        })
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("handler", &self.handler.name())
            .field("method", &self.method)
            .field("route", &self.route.as_str())
            .field("auth_level", &self.auth_level)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Registrations in dispatch order.
///
/// Handlers resolving authorization are kept first; everything else keeps
/// its insertion order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    #[must_use]
    pub fn contains(&self, handler: &Arc<dyn ApiHandler>, method: ApiMethod, pattern: &str) -> bool {
        self.registrations
            .iter()
            .any(|r| r.is_same(handler, method, pattern))
    }

    /// Appends `registration`. Returns `false` if an equal one exists.
    pub fn insert(&mut self, registration: Registration) -> bool {
        if self.contains(
            &registration.handler,
            registration.method,
            registration.route.as_str(),
        ) {
            return false;
        }
        self.registrations.push(registration);
        // Stable: only moves authorization resolvers ahead.
        self.registrations
            .sort_by_key(|r| !r.handler.resolves_authorization());
        true
    }

    /// Removes the matching registration. Returns `false` if absent.
    pub fn remove(&mut self, handler: &Arc<dyn ApiHandler>, method: ApiMethod, pattern: &str) -> bool {
        let before = self.registrations.len();
        self.registrations
            .retain(|r| !r.is_same(handler, method, pattern));
        self.registrations.len() != before
    }

    /// Registrations accepting `method` on `route`, in dispatch order.
    #[must_use]
    pub fn matching(&self, method: ApiMethod, route: &str) -> Vec<Registration> {
        self.registrations
            .iter()
            .filter(|r| r.accepts(method, route))
            .cloned()
            .collect()
    }

    /// First non-wildcard registration whose route base prefixes `route`.
    #[must_use]
    pub fn attribute(&self, route: &str) -> Option<RouteMatch> {
        self.registrations
            .iter()
            .find(|r| !r.route.is_wildcard() && route.starts_with(r.route_base()))
            .map(|r| RouteMatch {
                route: r.route.as_str().to_string(),
                identifier: r.route.identifier().to_string(),
            })
    }

    /// Registrations grouped by handler name, then by method.
    #[must_use]
    pub fn describe(&self) -> Value {
        let mut grouped: BTreeMap<String, BTreeMap<&'static str, Vec<Value>>> = BTreeMap::new();
        for registration in &self.registrations {
            grouped
                .entry(registration.handler.name().to_string())
                .or_default()
                .entry(registration.method.as_str())
                .or_default()
                .push(registration.describe());
        }

        let mut out = Map::new();
        for (name, methods) in grouped {
            let methods: Map<String, Value> = methods
                .into_iter()
                .map(|(method, items)| (method.to_string(), Value::Array(items)))
                .collect();
            out.insert(name, json!({ "method": methods }));
        }
        Value::Object(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use smarthub_core::ApiRequest;

    use super::*;
    use crate::traits::HandlerReply;

    struct Named {
        name: &'static str,
        resolver: bool,
    }

    impl ApiHandler for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            Ok(HandlerReply::Nothing)
        }

        fn resolves_authorization(&self) -> bool {
            self.resolver
        }
    }

    fn handler(name: &'static str, resolver: bool) -> Arc<dyn ApiHandler> {
        Arc::new(Named { name, resolver })
    }

    fn names(registry: &HandlerRegistry) -> Vec<String> {
        registry.iter().map(|r| r.handler.name().to_string()).collect()
    }

    #[test]
    fn duplicate_triple_is_rejected() {
        let mut registry = HandlerRegistry::new();
        let h = handler("devices", false);
        assert!(registry.insert(Registration::new(h.clone(), RouteSpec::get(":/devices/"))));
        assert!(!registry.insert(Registration::new(h.clone(), RouteSpec::get(":/devices/"))));
        assert_eq!(registry.len(), 1);
        // Same handler, other method: distinct registration.
        assert!(registry.insert(Registration::new(h, RouteSpec::post(":/devices/"))));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn same_route_different_instances_are_distinct() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.insert(Registration::new(handler("a", false), RouteSpec::any())));
        assert!(registry.insert(Registration::new(handler("a", false), RouteSpec::any())));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn resolvers_move_first_keeping_relative_order() {
        let mut registry = HandlerRegistry::new();
        registry.insert(Registration::new(handler("one", false), RouteSpec::any()));
        registry.insert(Registration::new(handler("two", false), RouteSpec::any()));
        registry.insert(Registration::new(handler("auth", true), RouteSpec::any()));
        registry.insert(Registration::new(handler("three", false), RouteSpec::any()));
        assert_eq!(names(&registry), vec!["auth", "one", "two", "three"]);
    }

    #[test]
    fn remove_deletes_matching_triple_only() {
        let mut registry = HandlerRegistry::new();
        let h = handler("devices", false);
        registry.insert(Registration::new(h.clone(), RouteSpec::get(":/devices/")));
        registry.insert(Registration::new(h.clone(), RouteSpec::post(":/devices/")));

        assert!(registry.remove(&h, ApiMethod::Get, ":/devices/"));
        assert!(!registry.remove(&h, ApiMethod::Get, ":/devices/"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&h, ApiMethod::Post, ":/devices/"));
    }

    #[test]
    fn matching_filters_on_method_and_route() {
        let mut registry = HandlerRegistry::new();
        registry.insert(Registration::new(handler("all", false), RouteSpec::any()));
        registry.insert(Registration::new(handler("get", false), RouteSpec::get(":/conf/")));
        registry.insert(Registration::new(handler("post", false), RouteSpec::post(":/conf/")));
        registry.insert(Registration::new(handler("other", false), RouteSpec::get(":/other/")));

        let matched: Vec<String> = registry
            .matching(ApiMethod::Get, ":/conf/x/")
            .iter()
            .map(|r| r.handler.name().to_string())
            .collect();
        assert_eq!(matched, vec!["all", "get"]);
    }

    #[test]
    fn attribute_skips_wildcards() {
        let mut registry = HandlerRegistry::new();
        registry.insert(Registration::new(handler("all", false), RouteSpec::any()));
        registry.insert(Registration::new(
            handler("dev", false),
            RouteSpec::get(":/device/get/[id]/"),
        ));
        let found = registry.attribute(":/device/get/4/").unwrap();
        assert_eq!(found.route, ":/device/get/[id]/");
        assert!(registry.attribute(":/unknown/").is_none());
    }

    #[test]
    fn describe_groups_by_handler_and_method() {
        let mut registry = HandlerRegistry::new();
        let h = handler("env", false);
        registry.insert(Registration::new(
            h.clone(),
            RouteSpec::get(":/environment/conf/get/").auth_level(AuthLevel::Admin),
        ));
        registry.insert(Registration::new(h, RouteSpec::post(":/environment/conf/set/")));

        let described = registry.describe();
        let gets = &described["env"]["method"]["GET"];
        assert_eq!(gets[0]["route"], ":/environment/conf/get/");
        assert_eq!(gets[0]["authLevel"], 90);
        assert_eq!(described["env"]["method"]["POST"].as_array().unwrap().len(), 1);
    }
}
