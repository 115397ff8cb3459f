//! Fixed-level authorization resolver.
//!
//! Stands in for a real authentication plugin: every caller, or only the
//! callers whose source address is listed as trusted, receive a configured
//! level.

use std::collections::HashSet;

use smarthub_core::{ApiRequest, ApiResponse, AuthLevel, AuthenticationData};
use tracing::debug;

use crate::traits::{ApiHandler, HandlerReply};

pub struct StaticAuthorization {
    default_level: AuthLevel,
    trusted_level: AuthLevel,
    trusted_ips: HashSet<String>,
}

impl StaticAuthorization {
    /// Grants `level` to every caller.
    #[must_use]
    pub fn new(level: AuthLevel) -> Self {
        Self {
            default_level: level,
            trusted_level: level,
            trusted_ips: HashSet::new(),
        }
    }

    /// Grants `level` to callers coming from one of `ips`.
    #[must_use]
    pub fn trust<I, S>(mut self, ips: I, level: AuthLevel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_ips.extend(ips.into_iter().map(Into::into));
        self.trusted_level = level;
        self
    }

    fn level_for(&self, request: &ApiRequest) -> AuthLevel {
        match &request.source_ip {
            Some(ip) if self.trusted_ips.contains(ip) => self.trusted_level,
            _ => self.default_level,
        }
    }
}

impl ApiHandler for StaticAuthorization {
    fn name(&self) -> &str {
        "authentication"
    }

    /// Answers an empty success so a lone match reads as an unknown route.
    fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
        Ok(HandlerReply::ready(ApiResponse::empty()))
    }

    fn resolves_authorization(&self) -> bool {
        true
    }

    fn authorize(&self, request: &ApiRequest) -> Option<AuthenticationData> {
        let level = self.level_for(request);
        debug!(ip = request.source_ip.as_deref().unwrap_or("-"), ?level, "authorization resolved");
        Some(AuthenticationData::new(level))
    }
}
