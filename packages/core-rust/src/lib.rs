//! `smarthub` core: API request/response records, registrations, and route patterns.

pub mod error;
pub mod hash;
pub mod registration;
pub mod request;
pub mod response;
pub mod types;

pub use error::DispatchError;
pub use registration::{RouteParameter, RoutePattern, WILDCARD_ROUTE};
pub use request::{ApiRequest, RouteMatch};
pub use response::{ApiResponse, ErrorEnvelope, Payload, JSON_CONTENT_TYPE};
pub use types::{ApiMethod, AuthLevel, AuthenticationData};
