//! SHA-256 digest helpers for route identifiers and scheduler dedup keys.
//!
//! Route identifiers only need to be stable and short: they show up in
//! diagnostics and are embedded in route-scoped tokens. Collisions are
//! tolerated because nothing routes on them.

use sha2::{Digest, Sha256};

/// Number of hex characters kept for a route identifier.
const ROUTE_IDENTIFIER_LEN: usize = 8;

/// Full lowercase hex SHA-256 digest of `input`.
///
/// # Examples
///
/// ```
/// use smarthub_core::hash::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Short, deterministic identifier of a route pattern.
///
/// # Examples
///
/// ```
/// use smarthub_core::hash::route_identifier;
///
/// assert_eq!(route_identifier("*"), route_identifier("*"));
/// assert_eq!(route_identifier(":/infos/").len(), 8);
/// ```
#[must_use]
pub fn route_identifier(route: &str) -> String {
    let mut digest = sha256_hex(route);
    digest.truncate(ROUTE_IDENTIFIER_LEN);
    digest
}
