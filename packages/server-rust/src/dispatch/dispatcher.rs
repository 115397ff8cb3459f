//! Request dispatch engine.
//!
//! One inbound call is fanned out to every matching registration and the
//! pending answers are reduced to one response:
//!
//! 1. **Build** (`build_request`): transport call -> `ApiRequest`
//! 2. **Authorize**: resolver handlers fix the caller's level once
//! 3. **Fan out** (`dispatch`): gate, bind parameters, invoke handlers
//! 4. **Resolve** (`resolve`): await everything, keep the last response
//! 5. **Send** (`send`): render once onto the transport handle

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{join_all, ready};
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use smarthub_core::{ApiMethod, ApiRequest, ApiResponse, AuthLevel, DispatchError, RoutePattern};
use tracing::{debug, error, info, warn};

use super::infos::{InfosHandler, INFOS_ROUTE};
use super::registry::{HandlerRegistry, Registration, RouteSpec};
use super::transport::{
    api_method, form_fields, json_fields, source_ip, ReplyHandle, TransportCall,
    HEADER_APPLICATION_FORM, HEADER_APPLICATION_JSON,
};
use crate::service::config::DispatcherConfig;
use crate::service::registry::{ManagedService, ServiceState, ServiceStatus};
use crate::traits::{ApiHandler, HandlerReply, ResponseFuture, TokenIssuer};

/// Service name of the dispatcher.
pub const DISPATCHER_SERVICE: &str = "dispatcher";

/// Turns transport calls into aggregated API responses.
///
/// The registry is owned by the dispatcher and shared only with its own
/// introspection handler.
pub struct Dispatcher {
    state: ServiceState,
    config: DispatcherConfig,
    registry: Arc<RwLock<HandlerRegistry>>,
    infos: Arc<dyn ApiHandler>,
    token_issuer: RwLock<Option<Arc<dyn TokenIssuer>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
        let infos: Arc<dyn ApiHandler> = Arc::new(InfosHandler::new(Arc::clone(&registry)));
        Self {
            state: ServiceState::new(DISPATCHER_SERVICE),
            config,
            registry,
            infos,
            token_issuer: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers `handler` for `spec`. Returns `false` (and logs a warning)
    /// if the same (handler, method, pattern) triple is already registered.
    pub fn register_handler(&self, handler: Arc<dyn ApiHandler>, spec: RouteSpec) -> bool {
        let pattern = spec.pattern.clone();
        let name = handler.name().to_string();
        let inserted = self
            .registry
            .write()
            .insert(Registration::new(handler, spec));
        if inserted {
            debug!(handler = %name, route = %pattern, "api handler registered");
        } else {
            warn!(handler = %name, route = %pattern, "delegate already registered");
        }
        inserted
    }

    /// Removes the registration matching the (handler, method, pattern)
    /// triple. Returns `false` (and logs a warning) if it was not registered.
    pub fn unregister_handler(&self, handler: &Arc<dyn ApiHandler>, spec: &RouteSpec) -> bool {
        let removed = self
            .registry
            .write()
            .remove(handler, spec.method, &spec.pattern);
        if !removed {
            warn!(handler = handler.name(), route = %spec.pattern, "delegate not registered");
        }
        removed
    }

    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registry.read().len()
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    pub fn set_token_issuer(&self, issuer: Arc<dyn TokenIssuer>) {
        *self.token_issuer.write() = Some(issuer);
    }

    /// Token scoped to `route`, or `None` without a token issuer.
    #[must_use]
    pub fn token_for_route(&self, route: &str, expiration_secs: u64) -> Option<String> {
        let issuer = self.token_issuer.read().clone()?;
        let pattern = RoutePattern::parse(route);
        issuer.generate_token(pattern.identifier(), expiration_secs)
    }

    // -----------------------------------------------------------------------
    // Request building
    // -----------------------------------------------------------------------

    /// Parses a transport call into an API request.
    ///
    /// GET merges query parameters, POST merges form or JSON body fields
    /// (the JSON payload field is moved into `data`), DELETE merges body
    /// fields.
    #[must_use]
    pub fn build_request(&self, call: TransportCall) -> ApiRequest {
        let method = api_method(&call.method).unwrap_or(ApiMethod::Get);
        let route = call
            .path
            .strip_prefix(self.config.api_prefix.as_str())
            .unwrap_or(&call.path)
            .to_string();

        let mut request = ApiRequest::new(method, route);
        request.source_ip = call.remote_addr.as_deref().map(source_ip);

        match method {
            ApiMethod::Get => {
                if let Some(query) = &call.query {
                    request.params.extend(form_fields(query.as_bytes()));
                }
            }
            ApiMethod::Post if call.has_content_type(HEADER_APPLICATION_FORM) => {
                request.params.extend(form_fields(&call.body));
            }
            ApiMethod::Post if call.has_content_type(HEADER_APPLICATION_JSON) => {
                if let Some(mut fields) = json_fields(&call.body) {
                    match fields.remove(&self.config.data_field) {
                        Some(Value::Object(data)) => request.data = data,
                        Some(other) => {
                            request.data.insert(self.config.data_field.clone(), other);
                        }
                        None => warn!(route = %request.route, "Empty body content"),
                    }
                    request.params.extend(fields);
                }
            }
            ApiMethod::Delete => {
                let fields = if call.has_content_type(HEADER_APPLICATION_JSON) {
                    json_fields(&call.body).unwrap_or_default()
                } else {
                    form_fields(&call.body)
                };
                request.params.extend(fields);
            }
            _ => {}
        }

        request.registration = self.registry.read().attribute(&request.route);

        info!(
            method = %request.method,
            path = %call.path,
            ip = request.source_ip.as_deref().unwrap_or("-"),
            content_type = call.content_type.as_deref().unwrap_or(""),
            "api call"
        );
        request
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Fans `request` out to every matching registration.
    ///
    /// Runs the authorization phase first: unless the request already
    /// carries authentication data, the first resolver returning `Some`
    /// fixes the caller's level. The fan-out then gates every non-resolver
    /// registration against that level, binds positional parameters into
    /// `request.data`, and collects the handlers' pending responses. No
    /// handler error escapes: each becomes a rejected future.
    pub fn dispatch(&self, request: &mut ApiRequest) -> Vec<ResponseFuture> {
        let matching = self
            .registry
            .read()
            .matching(request.method, &request.route);

        if request.authentication_data.is_none() {
            request.authentication_data = matching
                .iter()
                .filter(|r| r.handler.resolves_authorization())
                .find_map(|r| r.handler.authorize(request));
        }

        let mut pending: Vec<ResponseFuture> = Vec::with_capacity(matching.len());
        for registration in &matching {
            let handler = &registration.handler;
            debug!(
                handler = handler.name(),
                level = ?registration.auth_level,
                caller_level = ?request.authentication_data.as_ref().map(|a| a.level),
                "api registered for handler"
            );

            if !handler.resolves_authorization() {
                if let Some(auth) = &request.authentication_data {
                    if !auth.permits(registration.auth_level) {
                        pending.push(rejected(DispatchError::Unauthorized));
                        continue;
                    }
                }
            }

            if registration.route.has_parameters() {
                if let Err(e) = registration
                    .route
                    .bind(&request.path_segments, &mut request.data)
                {
                    debug!(handler = handler.name(), error = %e, "parameter binding failed");
                    pending.push(rejected(e));
                    continue;
                }
            }

            let request: &ApiRequest = request;
            match catch_unwind(AssertUnwindSafe(|| handler.process_api(request))) {
                Ok(Ok(HandlerReply::One(fut))) => pending.push(fut),
                Ok(Ok(HandlerReply::Many(futs))) => pending.extend(futs),
                Ok(Ok(HandlerReply::Nothing)) => {
                    error!(handler = handler.name(), route = %request.route, "Error in web service api response");
                    pending.push(Box::pin(ready(Ok(ApiResponse::empty()))));
                }
                Ok(Err(e)) => {
                    error!(handler = handler.name(), error = %e, "api handler failed");
                    pending.push(rejected(DispatchError::Handler(e)));
                }
                Err(_panic) => {
                    error!(handler = handler.name(), route = %request.route, "api handler panicked");
                    pending.push(rejected(DispatchError::Handler(anyhow::anyhow!(
                        "api handler panicked"
                    ))));
                }
            }
        }
        pending
    }

    /// Awaits every pending response and reduces them to one.
    ///
    /// The last response (in registration order) wins, failures included.
    /// A lone successful response means only a catch-all or authorization
    /// handler answered, so it becomes an unknown-route failure. A panic
    /// while awaiting fails the whole aggregation.
    pub async fn resolve(pending: Vec<ResponseFuture>) -> ApiResponse {
        let settled = join_all(
            pending
                .into_iter()
                .map(|fut| AssertUnwindSafe(fut).catch_unwind()),
        )
        .await;

        let mut responses = Vec::with_capacity(settled.len());
        for outcome in settled {
            match outcome {
                Ok(Ok(response)) => responses.push(response),
                Ok(Err(e)) => {
                    debug!(code = e.code(), error = %e, "handler rejected");
                    responses.push(e.into_response());
                }
                Err(_panic) => {
                    let e = DispatchError::Aggregation(anyhow::anyhow!("handler future panicked"));
                    error!(error = %e, "failed to settle api responses");
                    return e.into_response();
                }
            }
        }

        reduce(responses)
    }

    /// Dispatches and resolves `request` in one step.
    pub async fn handle(&self, mut request: ApiRequest) -> ApiResponse {
        let pending = self.dispatch(&mut request);
        Self::resolve(pending).await
    }

    /// Writes `response` to the transport handle unless already sent.
    pub fn send(&self, response: &ApiResponse, handle: &mut ReplyHandle) {
        if !handle.send(response) {
            debug!("response already sent, ignoring");
        }
    }
}

/// Last response wins; a single success is an unknown route.
fn reduce(responses: Vec<ApiResponse>) -> ApiResponse {
    let count = responses.len();
    match responses.into_iter().last() {
        Some(response) if count == 1 && response.success => {
            DispatchError::UnknownRoute.into_response()
        }
        Some(response) => response,
        None => DispatchError::UnknownRoute.into_response(),
    }
}

fn rejected(error: DispatchError) -> ResponseFuture {
    Box::pin(ready(Err(error)))
}

#[async_trait]
impl ManagedService for Dispatcher {
    fn name(&self) -> &'static str {
        self.state.name()
    }

    fn status(&self) -> ServiceStatus {
        self.state.status()
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.state.is_running() {
            warn!("Web services are already running");
            return Ok(());
        }
        self.registry.write().insert(Registration::new(
            Arc::clone(&self.infos),
            RouteSpec::get(INFOS_ROUTE).auth_level(AuthLevel::Dev),
        ));
        self.state.mark_running();
        info!(registrations = self.registration_count(), "dispatcher started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.state.is_running() {
            warn!("dispatcher is not running, nothing to do");
            return Ok(());
        }
        self.state.mark_stopped();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use axum::http::Method;
    use serde_json::json;
    use smarthub_core::error::{PARAMETER_BINDING_CODE, UNAUTHORIZED_CODE, UNKNOWN_ROUTE_CODE};
    use smarthub_core::AuthenticationData;

    use super::*;

    /// Handler answering a fixed response and counting invocations.
    struct Fixed {
        name: &'static str,
        response: Result<ApiResponse, ApiResponse>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl Fixed {
        fn ok(name: &'static str, payload: Value) -> Arc<Self> {
            Arc::new(Self {
                name,
                response: Ok(ApiResponse::ok(payload)),
                calls: AtomicU32::new(0),
                delay: None,
            })
        }

        fn fail(name: &'static str, code: i64) -> Arc<Self> {
            Arc::new(Self {
                name,
                response: Err(ApiResponse::failure(code, "failed")),
                calls: AtomicU32::new(0),
                delay: None,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ApiHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.response.clone();
            let delay = self.delay;
            Ok(HandlerReply::future(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response.map_err(DispatchError::from)
            }))
        }
    }

    /// Resolver granting a fixed level and answering an empty success.
    struct Auth {
        level: Option<AuthLevel>,
    }

    impl ApiHandler for Auth {
        fn name(&self) -> &str {
            "authentication"
        }

        fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            Ok(HandlerReply::ready(ApiResponse::empty()))
        }

        fn resolves_authorization(&self) -> bool {
            true
        }

        fn authorize(&self, _request: &ApiRequest) -> Option<AuthenticationData> {
            self.level.map(AuthenticationData::new)
        }
    }

    /// Echoes the bound request data.
    struct Echo;

    impl ApiHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn process_api(&self, request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            Ok(HandlerReply::ready(ApiResponse::ok(Value::Object(
                request.data.clone(),
            ))))
        }
    }

    struct Broken;

    impl ApiHandler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            anyhow::bail!("boom")
        }
    }

    /// Panics while building its reply.
    struct Panicky;

    impl ApiHandler for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        fn process_api(&self, request: &ApiRequest) -> anyhow::Result<HandlerReply> {
            let empty: Vec<ApiResponse> = Vec::new();
            let response = empty[request.path_segments.len()].clone();
            Ok(HandlerReply::ready(response))
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatcherConfig::default())
    }

    fn get(route: &str) -> ApiRequest {
        ApiRequest::new(ApiMethod::Get, route)
    }

    fn as_handler<T: ApiHandler + 'static>(h: &Arc<T>) -> Arc<dyn ApiHandler> {
        Arc::clone(h) as Arc<dyn ApiHandler>
    }

    #[test]
    fn duplicate_registration_keeps_one_entry() {
        let d = dispatcher();
        let h: Arc<dyn ApiHandler> = Fixed::ok("a", json!({}));
        assert!(d.register_handler(Arc::clone(&h), RouteSpec::get(":/a/")));
        assert!(!d.register_handler(Arc::clone(&h), RouteSpec::get(":/a/")));
        assert_eq!(d.registration_count(), 1);
    }

    #[test]
    fn unregister_removes_and_warns_when_absent() {
        let d = dispatcher();
        let h: Arc<dyn ApiHandler> = Fixed::ok("a", json!({}));
        d.register_handler(Arc::clone(&h), RouteSpec::get(":/a/"));
        assert!(d.unregister_handler(&h, &RouteSpec::get(":/a/")));
        assert!(!d.unregister_handler(&h, &RouteSpec::get(":/a/")));
        assert_eq!(d.registration_count(), 0);
    }

    #[tokio::test]
    async fn without_authentication_every_match_fires() {
        let d = dispatcher();
        let usage = Fixed::ok("usage", json!({"n": 1}));
        let dev = Fixed::ok("dev", json!({"n": 2}));
        d.register_handler(as_handler(&usage), RouteSpec::get(":/x/"));
        d.register_handler(
            as_handler(&dev),
            RouteSpec::get(":/x/").auth_level(AuthLevel::Dev),
        );

        let response = d.handle(get(":/x/")).await;

        assert_eq!(usage.calls(), 1);
        assert_eq!(dev.calls(), 1);
        assert_eq!(response, ApiResponse::ok(json!({"n": 2})));
    }

    #[tokio::test]
    async fn level_gate_rejects_without_invoking() {
        let d = dispatcher();
        let usage = Fixed::ok("usage", json!({"n": 1}));
        let admin = Fixed::ok("admin", json!({"n": 2}));
        d.register_handler(as_handler(&usage), RouteSpec::get(":/x/"));
        d.register_handler(
            as_handler(&admin),
            RouteSpec::get(":/x/").auth_level(AuthLevel::Admin),
        );

        let mut request =
            get(":/x/").with_authentication(AuthenticationData::new(AuthLevel::Usage));
        let pending = d.dispatch(&mut request);
        assert_eq!(pending.len(), 2);
        let response = Dispatcher::resolve(pending).await;

        assert_eq!(usage.calls(), 1);
        assert_eq!(admin.calls(), 0);
        assert_eq!(response.error_code, UNAUTHORIZED_CODE);
        assert_eq!(response.error_message, "Unauthorized");
    }

    #[tokio::test]
    async fn equal_level_is_permitted() {
        let d = dispatcher();
        let admin = Fixed::ok("admin", json!({"ok": true}));
        let other = Fixed::ok("other", json!({}));
        d.register_handler(as_handler(&other), RouteSpec::get(":/x/"));
        d.register_handler(
            as_handler(&admin),
            RouteSpec::get(":/x/").auth_level(AuthLevel::Admin),
        );

        let request = get(":/x/").with_authentication(AuthenticationData::new(AuthLevel::Admin));
        let response = d.handle(request).await;
        assert_eq!(admin.calls(), 1);
        assert_eq!(response, ApiResponse::ok(json!({"ok": true})));
    }

    #[tokio::test]
    async fn resolver_level_applies_to_later_handlers_regardless_of_order() {
        let d = dispatcher();
        let admin = Fixed::ok("admin", json!({}));
        // Registered before the resolver: still gated by the resolved level.
        d.register_handler(
            as_handler(&admin),
            RouteSpec::get(":/x/").auth_level(AuthLevel::Admin),
        );
        d.register_handler(
            Arc::new(Auth {
                level: Some(AuthLevel::Usage),
            }),
            RouteSpec::any(),
        );

        let mut request = get(":/x/");
        let response = Dispatcher::resolve(d.dispatch(&mut request)).await;

        assert_eq!(
            request.authentication_data,
            Some(AuthenticationData::new(AuthLevel::Usage))
        );
        assert_eq!(admin.calls(), 0);
        assert_eq!(response.error_code, UNAUTHORIZED_CODE);
    }

    #[tokio::test]
    async fn resolver_is_not_gated_by_its_own_level() {
        let d = dispatcher();
        d.register_handler(
            Arc::new(Auth {
                level: Some(AuthLevel::None),
            }),
            RouteSpec::any().auth_level(AuthLevel::Dev),
        );

        let mut request = get(":/nothing/");
        let pending = d.dispatch(&mut request);
        assert_eq!(pending.len(), 1);
        let response = Dispatcher::resolve(pending).await;
        // Lone success from the resolver: unknown route.
        assert_eq!(response.error_code, UNKNOWN_ROUTE_CODE);
        assert_eq!(response.error_message, "Unknown api called");
    }

    #[tokio::test]
    async fn parameter_shortfall_rejects_without_invoking() {
        let d = dispatcher();
        let dev = Fixed::ok("device", json!({}));
        let other = Fixed::ok("other", json!({}));
        d.register_handler(as_handler(&other), RouteSpec::any());
        d.register_handler(
            as_handler(&dev),
            RouteSpec::get(":/device/set/[id]/[status*]/"),
        );

        let response = d.handle(get(":/device/set/")).await;

        assert_eq!(dev.calls(), 0);
        assert_eq!(response.error_code, PARAMETER_BINDING_CODE);
        assert_eq!(
            response.error_message,
            "Invalid parameters. Expected : id, status (optional)"
        );
    }

    #[tokio::test]
    async fn parameters_are_bound_into_data() {
        let d = dispatcher();
        d.register_handler(Fixed::ok("first", json!({})), RouteSpec::any());
        d.register_handler(Arc::new(Echo), RouteSpec::get(":/device/get/[id]/"));

        let response = d.handle(get(":/device/get/42/").with_data("extra", json!(1))).await;
        assert_eq!(response, ApiResponse::ok(json!({"id": "42", "extra": 1})));
    }

    #[tokio::test]
    async fn last_response_wins_including_failures() {
        let d = dispatcher();
        d.register_handler(Fixed::ok("a", json!({"v": "a"})), RouteSpec::any());
        d.register_handler(Fixed::fail("b", 800), RouteSpec::any());
        d.register_handler(Fixed::ok("c", json!({"v": "c"})), RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response, ApiResponse::ok(json!({"v": "c"})));

        let d = dispatcher();
        d.register_handler(Fixed::ok("a", json!({"v": "a"})), RouteSpec::any());
        d.register_handler(Fixed::fail("b", 800), RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert!(!response.success);
        assert_eq!(response.error_code, 800);
    }

    #[tokio::test]
    async fn order_follows_registration_not_completion() {
        let d = dispatcher();
        let slow = Arc::new(Fixed {
            name: "slow",
            response: Ok(ApiResponse::ok(json!({"v": "slow"}))),
            calls: AtomicU32::new(0),
            delay: Some(Duration::from_millis(30)),
        });
        d.register_handler(Fixed::ok("fast", json!({"v": "fast"})), RouteSpec::any());
        d.register_handler(slow, RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response, ApiResponse::ok(json!({"v": "slow"})));
    }

    #[tokio::test]
    async fn single_success_becomes_unknown_route() {
        let d = dispatcher();
        d.register_handler(Fixed::ok("only", json!({})), RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response.error_code, UNKNOWN_ROUTE_CODE);
    }

    #[tokio::test]
    async fn no_match_is_unknown_route() {
        let d = dispatcher();
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response.error_code, UNKNOWN_ROUTE_CODE);
    }

    #[tokio::test]
    async fn handler_error_becomes_generic_failure() {
        let d = dispatcher();
        d.register_handler(Fixed::ok("a", json!({})), RouteSpec::any());
        d.register_handler(Arc::new(Broken), RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response.error_code, smarthub_core::error::HANDLER_ERROR_CODE);
        assert_eq!(response.error_message, "Oops something wrong occurred");
    }

    #[tokio::test]
    async fn panicking_handler_becomes_generic_failure() {
        let d = Arc::new(dispatcher());
        d.register_handler(Fixed::ok("a", json!({})), RouteSpec::any());
        d.register_handler(Arc::new(Panicky), RouteSpec::any());

        let task = {
            let d = Arc::clone(&d);
            tokio::spawn(async move { d.handle(get(":/x/")).await })
        };
        let response = task.await.unwrap();
        assert_eq!(response.error_code, smarthub_core::error::HANDLER_ERROR_CODE);
        assert_eq!(response.error_message, "Oops something wrong occurred");
    }

    #[tokio::test]
    async fn many_reply_is_flattened() {
        struct Multi;
        impl ApiHandler for Multi {
            fn name(&self) -> &str {
                "multi"
            }
            fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
                let first: ResponseFuture = Box::pin(ready(Ok(ApiResponse::ok(json!(1)))));
                let second: ResponseFuture = Box::pin(ready(Ok(ApiResponse::ok(json!(2)))));
                Ok(HandlerReply::Many(vec![first, second]))
            }
        }

        let d = dispatcher();
        d.register_handler(Arc::new(Multi), RouteSpec::any());
        let mut request = get(":/x/");
        let pending = d.dispatch(&mut request);
        assert_eq!(pending.len(), 2);
        assert_eq!(Dispatcher::resolve(pending).await, ApiResponse::ok(json!(2)));
    }

    #[tokio::test]
    async fn nothing_reply_counts_as_empty_success() {
        struct Silent;
        impl ApiHandler for Silent {
            fn name(&self) -> &str {
                "silent"
            }
            fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
                Ok(HandlerReply::Nothing)
            }
        }

        let d = dispatcher();
        d.register_handler(Arc::new(Silent), RouteSpec::any());
        d.register_handler(Arc::new(Silent), RouteSpec::any());
        let response = d.handle(get(":/x/")).await;
        assert_eq!(response, ApiResponse::empty());
    }

    #[tokio::test]
    async fn panicking_future_fails_aggregation() {
        let pending: Vec<ResponseFuture> = vec![
            Box::pin(ready(Ok(ApiResponse::empty()))),
            Box::pin(async {
                if true {
                    panic!("handler exploded");
                }
                Ok(ApiResponse::empty())
            }),
        ];
        let response = Dispatcher::resolve(pending).await;
        assert_eq!(response.error_code, smarthub_core::error::AGGREGATION_ERROR_CODE);
    }

    #[test]
    fn build_request_parses_get_query() {
        let d = dispatcher();
        let call = TransportCall::new(Method::GET, "/api/:/conf/devices/get/")
            .with_query("page=2&q=lamp")
            .with_remote_addr("::ffff:192.168.0.7");
        let request = d.build_request(call);

        assert_eq!(request.method, ApiMethod::Get);
        assert_eq!(request.route, ":/conf/devices/get/");
        assert_eq!(request.action.as_deref(), Some(":"));
        assert_eq!(request.path_segments, vec!["conf", "devices", "get"]);
        assert_eq!(request.source_ip.as_deref(), Some("192.168.0.7"));
        assert_eq!(request.params["page"], "2");
        assert_eq!(request.params["q"], "lamp");
    }

    #[test]
    fn build_request_extracts_json_data_field() {
        let d = dispatcher();
        let call = TransportCall::new(Method::POST, "/api/:/conf/devices/set/")
            .with_body("application/json", r#"{"data":{"name":"lamp"},"token":"t"}"#);
        let request = d.build_request(call);

        assert_eq!(request.method, ApiMethod::Post);
        assert_eq!(Value::Object(request.data), json!({"name": "lamp"}));
        assert_eq!(Value::Object(request.params), json!({"token": "t"}));
    }

    #[test]
    fn build_request_without_data_field_keeps_params() {
        let d = dispatcher();
        let call = TransportCall::new(Method::POST, "/api/:/x/")
            .with_body("application/json", r#"{"token":"t"}"#);
        let request = d.build_request(call);
        assert!(request.data.is_empty());
        assert_eq!(request.params["token"], "t");
    }

    #[test]
    fn build_request_parses_form_and_delete_bodies() {
        let d = dispatcher();
        let post = d.build_request(
            TransportCall::new(Method::POST, "/api/:/x/")
                .with_body("application/x-www-form-urlencoded", "a=1"),
        );
        assert_eq!(post.params["a"], "1");

        let delete = d.build_request(
            TransportCall::new(Method::DELETE, "/api/:/x/")
                .with_body("application/json", r#"{"id":5}"#),
        );
        assert_eq!(delete.method, ApiMethod::Delete);
        assert_eq!(delete.params["id"], 5);
    }

    #[test]
    fn build_request_attributes_registration() {
        let d = dispatcher();
        d.register_handler(Arc::new(Echo), RouteSpec::get(":/device/get/[id]/"));
        let request = d.build_request(TransportCall::new(Method::GET, "/api/:/device/get/3/"));
        let attributed = request.registration.unwrap();
        assert_eq!(attributed.route, ":/device/get/[id]/");
        assert_eq!(
            attributed.identifier,
            smarthub_core::hash::route_identifier(":/device/get/[id]/")
        );
    }

    #[test]
    fn token_requires_issuer() {
        struct Issuer;
        impl TokenIssuer for Issuer {
            fn generate_token(&self, route_identifier: &str, expiration_secs: u64) -> Option<String> {
                Some(format!("{route_identifier}:{expiration_secs}"))
            }
        }

        let d = dispatcher();
        assert!(d.token_for_route(":/camera/snapshot/", 60).is_none());
        d.set_token_issuer(Arc::new(Issuer));
        let token = d.token_for_route(":/camera/snapshot/", 60).unwrap();
        assert_eq!(
            token,
            format!("{}:60", smarthub_core::hash::route_identifier(":/camera/snapshot/"))
        );
    }

    #[tokio::test]
    async fn start_registers_infos_once() {
        let d = dispatcher();
        d.start().await.unwrap();
        d.start().await.unwrap();
        assert_eq!(d.status(), ServiceStatus::Running);
        assert_eq!(d.registration_count(), 1);

        d.stop().await.unwrap();
        d.start().await.unwrap();
        assert_eq!(d.registration_count(), 1);
    }

    #[tokio::test]
    async fn send_writes_once() {
        let d = dispatcher();
        let mut handle = ReplyHandle::new();
        d.send(&ApiResponse::empty(), &mut handle);
        d.send(&ApiResponse::failure(1, "x"), &mut handle);
        let response = handle.into_response().unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
