//! Dispatch error taxonomy.
//!
//! Every variant converts into a failed [`ApiResponse`] so that no error
//! crosses the dispatcher boundary: a failing handler only contributes one
//! failure response to the aggregate.

use serde_json::json;

use crate::registration::RouteParameter;
use crate::response::ApiResponse;

/// Error code answered when only catch-all handlers matched.
pub const UNKNOWN_ROUTE_CODE: i64 = 1;
/// Error code for a caller whose level is below the registration's.
pub const UNAUTHORIZED_CODE: i64 = 812;
/// Error code for missing positional route parameters.
pub const PARAMETER_BINDING_CODE: i64 = 7258;
/// Error code for a handler that failed without an explicit response.
pub const HANDLER_ERROR_CODE: i64 = 7298;
/// Error code for a failure of the wait-for-all step itself.
pub const AGGREGATION_ERROR_CODE: i64 = -1;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Too few trailing path segments for the declared parameters.
    #[error("Invalid parameters. Expected : {}", describe_parameters(.expected))]
    ParameterBinding { expected: Vec<RouteParameter> },

    /// The registration's level exceeds the caller's resolved level.
    #[error("Unauthorized")]
    Unauthorized,

    /// The handler failed while building or settling its reply.
    #[error("Oops something wrong occurred")]
    Handler(#[source] anyhow::Error),

    /// A handler rejected with an explicit failure response.
    #[error("{}", .0.error_message)]
    Rejected(ApiResponse),

    /// Only the catch-all or authorization handler answered.
    #[error("Unknown api called")]
    UnknownRoute,

    /// Awaiting the pending responses failed.
    #[error("Unable to aggregate responses")]
    Aggregation(#[source] anyhow::Error),
}

impl DispatchError {
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::ParameterBinding { .. } => PARAMETER_BINDING_CODE,
            Self::Unauthorized => UNAUTHORIZED_CODE,
            Self::Handler(_) => HANDLER_ERROR_CODE,
            Self::Rejected(response) => response.error_code,
            Self::UnknownRoute => UNKNOWN_ROUTE_CODE,
            Self::Aggregation(_) => AGGREGATION_ERROR_CODE,
        }
    }

    /// Converts the error into the structured failure sent to the caller.
    #[must_use]
    pub fn into_response(self) -> ApiResponse {
        match self {
            Self::Rejected(response) => response,
            other => ApiResponse::failure(other.code(), other.to_string()).with_data(json!({})),
        }
    }
}

impl From<ApiResponse> for DispatchError {
    fn from(response: ApiResponse) -> Self {
        Self::Rejected(response)
    }
}

/// `a, b (optional)` rendering used in binding errors.
fn describe_parameters(parameters: &[RouteParameter]) -> String {
    parameters
        .iter()
        .map(|p| {
            if p.optional {
                format!("{} (optional)", p.name)
            } else {
                p.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
