//! Route patterns and positional parameter binding.
//!
//! A pattern is either the `*` wildcard or a path such as
//! `:/device/set/[id]/[status]/[color*]/`. Bracketed segments declare
//! positional parameters; a trailing `*` inside the brackets marks the
//! parameter optional. Parameters are expected after the static segments.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DispatchError;
use crate::hash::route_identifier;

/// Pattern matching every route.
pub const WILDCARD_ROUTE: &str = "*";

/// `[name]` or `[name*]`.
static PARAMETER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\[\]\*]+)(\*)?\]$").expect("route parameter regex should be valid")
});

/// One declared positional parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteParameter {
    pub name: String,
    pub optional: bool,
}

impl RouteParameter {
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Parsed route pattern of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pattern: String,
    route_base: String,
    identifier: String,
    parameters: Vec<RouteParameter>,
    nb_optional_parameters: usize,
    /// Static segments between the action segment and the first parameter.
    static_segments: usize,
}

impl RoutePattern {
    /// Parses `pattern`. Parsing never fails: segments that do not look like
    /// `[name]` or `[name*]` are treated as static.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let identifier = route_identifier(pattern);
        if pattern == WILDCARD_ROUTE {
            return Self {
                pattern: pattern.to_string(),
                route_base: pattern.to_string(),
                identifier,
                parameters: Vec::new(),
                nb_optional_parameters: 0,
                static_segments: 0,
            };
        }

        let mut segments: Vec<&str> = pattern.split('/').collect();
        if segments.last() == Some(&"") {
            segments.pop();
        }

        let mut parameters = Vec::new();
        let mut static_total = 0usize;
        for segment in &segments {
            match PARAMETER_REGEX.captures(segment) {
                Some(caps) => parameters.push(RouteParameter {
                    name: caps[1].to_string(),
                    optional: caps.get(2).is_some(),
                }),
                None => static_total += 1,
            }
        }

        let route_base = match pattern.find('[') {
            Some(idx) => pattern[..idx].to_string(),
            None => pattern.to_string(),
        };
        let nb_optional_parameters = parameters.iter().filter(|p| p.optional).count();

        Self {
            pattern: pattern.to_string(),
            route_base,
            identifier,
            parameters,
            nb_optional_parameters,
            // The first segment is the action and is stripped from requests.
            static_segments: static_total.saturating_sub(1),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Pattern up to its first parameter; used as the match prefix.
    #[must_use]
    pub fn route_base(&self) -> &str {
        &self.route_base
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn parameters(&self) -> &[RouteParameter] {
        &self.parameters
    }

    #[must_use]
    pub fn nb_optional_parameters(&self) -> usize {
        self.nb_optional_parameters
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.pattern == WILDCARD_ROUTE
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Returns `true` if a request on `route` should reach this pattern.
    #[must_use]
    pub fn matches(&self, route: &str) -> bool {
        self.is_wildcard() || route.starts_with(&self.route_base)
    }

    /// Binds trailing `path_segments` positionally into `data`.
    ///
    /// Keys already present in `data` are left untouched. Missing optional
    /// parameters are bound to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ParameterBinding`] listing every declared
    /// parameter when fewer than the required parameters are present.
    pub fn bind(
        &self,
        path_segments: &[String],
        data: &mut Map<String, Value>,
    ) -> Result<(), DispatchError> {
        let required =
            self.static_segments + self.parameters.len() - self.nb_optional_parameters;
        if path_segments.len() < required {
            return Err(DispatchError::ParameterBinding {
                expected: self.parameters.clone(),
            });
        }

        for (i, parameter) in self.parameters.iter().enumerate() {
            if data.contains_key(&parameter.name) {
                continue;
            }
            let value = path_segments
                .get(self.static_segments + i)
                .map_or(Value::Null, |s| Value::String(s.clone()));
            data.insert(parameter.name.clone(), value);
        }
        Ok(())
    }
}
