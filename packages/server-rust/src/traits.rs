use futures_util::future::BoxFuture;
use smarthub_core::{ApiRequest, ApiResponse, AuthenticationData, DispatchError};

/// Pending answer of one handler. `Err` is a rejection and is converted into
/// a failure response during aggregation.
pub type ResponseFuture = BoxFuture<'static, Result<ApiResponse, DispatchError>>;

/// What a handler hands back to the dispatcher for one request.
pub enum HandlerReply {
    /// A single pending response.
    One(ResponseFuture),
    /// Several pending responses, flattened into the fan-out.
    Many(Vec<ResponseFuture>),
    /// The handler does not serve this route (catch-all registrations).
    Nothing,
}

impl HandlerReply {
    /// Wraps an already-known response.
    #[must_use]
    pub fn ready(response: ApiResponse) -> Self {
        Self::One(Box::pin(futures_util::future::ready(Ok(response))))
    }

    /// Wraps an already-known rejection.
    #[must_use]
    pub fn reject(error: impl Into<DispatchError>) -> Self {
        let error = error.into();
        Self::One(Box::pin(futures_util::future::ready(Err(error))))
    }

    /// Wraps any `'static` future.
    pub fn future<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = Result<ApiResponse, DispatchError>> + Send + 'static,
    {
        Self::One(Box::pin(fut))
    }
}

/// A plugin-facing API endpoint registered against the dispatcher.
///
/// `process_api` runs synchronously on the dispatch path and returns the
/// pending work; long-running I/O belongs inside the returned futures.
pub trait ApiHandler: Send + Sync {
    /// Stable name used to group registrations in diagnostics.
    fn name(&self) -> &str;

    /// Handles one request.
    ///
    /// # Errors
    ///
    /// An `Err` is caught by the dispatcher and answered with a generic
    /// handler failure; it never aborts the fan-out.
    fn process_api(&self, request: &ApiRequest) -> anyhow::Result<HandlerReply>;

    /// `true` for handlers that resolve the caller's authorization. They run
    /// in the authorization phase and are not gated by their own level.
    fn resolves_authorization(&self) -> bool {
        false
    }

    /// Authorization phase hook. Returning `Some` fixes the caller's level
    /// for the rest of the dispatch.
    fn authorize(&self, _request: &ApiRequest) -> Option<AuthenticationData> {
        None
    }
}

/// Issues route-scoped tokens. Implemented by the authentication module.
pub trait TokenIssuer: Send + Sync {
    /// Generates a token for `route_identifier`. An expiration of `0` means
    /// a one-time token.
    fn generate_token(&self, route_identifier: &str, expiration_secs: u64) -> Option<String>;
}
