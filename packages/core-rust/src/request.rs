//! Logical record of one inbound API call.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{ApiMethod, AuthenticationData};

/// Registration the request was attributed to, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub route: String,
    pub identifier: String,
}

/// One inbound call after transport parsing.
///
/// `route` is the request path with the API prefix stripped, e.g.
/// `:/device/set/12/on/`. `path_segments` holds the route split on `/`
/// without the trailing empty segment and without the first segment,
/// which is kept as `action`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub method: ApiMethod,
    pub source_ip: Option<String>,
    pub route: String,
    pub path_segments: Vec<String>,
    pub action: Option<String>,
    pub params: Map<String, Value>,
    /// Request payload; positional route parameters are bound here too.
    pub data: Map<String, Value>,
    pub authentication_data: Option<AuthenticationData>,
    pub registration: Option<RouteMatch>,
}

impl ApiRequest {
    /// Builds a request for `route`, deriving `action` and `path_segments`.
    #[must_use]
    pub fn new(method: ApiMethod, route: impl Into<String>) -> Self {
        let route = route.into();
        let mut path_segments: Vec<String> = route.split('/').map(str::to_string).collect();
        if path_segments.last().is_some_and(String::is_empty) {
            path_segments.pop();
        }
        let action = if path_segments.is_empty() {
            None
        } else {
            Some(path_segments.remove(0))
        };

        Self {
            method,
            source_ip: None,
            route,
            path_segments,
            action,
            params: Map::new(),
            data: Map::new(),
            authentication_data: None,
            registration: None,
        }
    }

    #[must_use]
    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_authentication(mut self, authentication: AuthenticationData) -> Self {
        self.authentication_data = Some(authentication);
        self
    }

    /// String view of a bound data value, if present.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}
