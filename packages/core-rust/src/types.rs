use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ApiMethod
// ---------------------------------------------------------------------------

/// HTTP verb a registration listens to. `Any` is the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Get,
    Post,
    Delete,
    Any,
}

impl ApiMethod {
    /// Wire form of the method (`GET`, `POST`, `DELETE` or `*`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Any => "*",
        }
    }

    /// Returns `true` if a registration declared with `self` accepts a
    /// request issued with `request_method`.
    #[must_use]
    pub fn accepts(self, request_method: ApiMethod) -> bool {
        self == Self::Any || self == request_method
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported verb.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported api method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for ApiMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "DELETE" => Ok(Self::Delete),
            "*" => Ok(Self::Any),
            other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

impl Serialize for ApiMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuthLevel
// ---------------------------------------------------------------------------

/// Ordered authorization level. A registration with level `A` is reachable
/// by a caller resolved at level `L` iff `A <= L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AuthLevel {
    /// No authorization required.
    None,
    /// Regular end-user access.
    #[default]
    Usage,
    /// Administration (configuration changes).
    Admin,
    /// Developer diagnostics.
    Dev,
}

impl AuthLevel {
    /// Numeric wire value, kept sparse so intermediate levels can be added.
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Usage => 80,
            Self::Admin => 90,
            Self::Dev => 100,
        }
    }

    /// Maps a wire value back to the highest level it satisfies.
    #[must_use]
    pub fn from_value(value: u8) -> Self {
        match value {
            0..=79 => Self::None,
            80..=89 => Self::Usage,
            90..=99 => Self::Admin,
            _ => Self::Dev,
        }
    }
}

impl Serialize for AuthLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

impl<'de> Deserialize<'de> for AuthLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(u8::deserialize(deserializer)?))
    }
}

// ---------------------------------------------------------------------------
// AuthenticationData
// ---------------------------------------------------------------------------

/// Outcome of the authorization phase for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationData {
    /// Level granted to the caller.
    pub level: AuthLevel,
    /// Authenticated user name, when the resolver knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AuthenticationData {
    #[must_use]
    pub fn new(level: AuthLevel) -> Self {
        Self {
            level,
            username: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns `true` when a registration requiring `required` may run.
    #[must_use]
    pub fn permits(&self, required: AuthLevel) -> bool {
        required <= self.level
    }
}
