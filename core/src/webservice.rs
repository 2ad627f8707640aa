//! The request dispatcher.
//!
//! # Design
//! A `Webservice` owns a base URL, a transport and the context outcomes are
//! delivered on. It holds no per-request mutable state: every call to
//! [`Webservice::request`] composes behaviors, builds the request, sweeps
//! superseded tasks, dispatches, and later classifies the transport result.
//!
//! The work splits the same way as a stateless client. `build_request` is a
//! pure function from resource and behavior to `HttpRequest`, and `classify`
//! is a pure function from transport result to `Outcome`. Only `start` and
//! `deliver` have side effects.
//!
//! Classification, including decoding, runs on the transport's thread.
//! Behavior completion hooks and caller callbacks run on the main context,
//! hook first, exactly one outcome per attempt.

use std::fmt;
use std::sync::{Arc, Weak};

use url::Url;

use crate::behavior::{CompositeBehavior, EmptyBehavior, RequestBehavior};
use crate::cancellation::CancellationPolicy;
use crate::codec::Encoder;
use crate::components::UrlComponents;
use crate::config::WebserviceConfig;
use crate::context::{Job, MainContext, SerialContext};
use crate::error::{ApiError, DataError, NetworkError, TaggedError};
use crate::header::HeaderProvider;
use crate::http::{Body, HttpRequest, HttpResponse};
use crate::resource::Resource;
use crate::retry::{PendingRequest, RetryError, RetryToken};
use crate::transport::{TaskState, Transport, TransportResult, TransportTask, UreqTransport};

/// Caller callbacks for one logical request.
///
/// `on_result` receives every outcome unless a network-failure callback is
/// registered, in which case connectivity failures go there instead.
pub struct Completion<A> {
    on_result: Arc<dyn Fn(Result<A, ApiError>) + Send + Sync>,
    on_network_failure: Option<Arc<dyn Fn(ApiError) + Send + Sync>>,
}

impl<A> Completion<A> {
    pub fn new(on_result: impl Fn(Result<A, ApiError>) + Send + Sync + 'static) -> Self {
        Self {
            on_result: Arc::new(on_result),
            on_network_failure: None,
        }
    }

    pub fn on_network_failure(mut self, callback: impl Fn(ApiError) + Send + Sync + 'static) -> Self {
        self.on_network_failure = Some(Arc::new(callback));
        self
    }

    pub(crate) fn succeed(&self, value: A) {
        (self.on_result)(Ok(value));
    }

    pub(crate) fn fail(&self, error: ApiError) {
        (self.on_result)(Err(error));
    }

    pub(crate) fn network_fail(&self, error: ApiError) {
        match &self.on_network_failure {
            Some(callback) => callback(error),
            None => self.fail(error),
        }
    }
}

impl<A> Clone for Completion<A> {
    fn clone(&self) -> Self {
        Self {
            on_result: self.on_result.clone(),
            on_network_failure: self.on_network_failure.clone(),
        }
    }
}

/// What the unauthorized handler receives in place of a failure callback.
#[derive(Debug)]
pub struct AuthFailure {
    pub request: HttpRequest,
    /// The rejecting response, body included.
    pub response: HttpResponse,
    /// The error the caller would otherwise have received.
    pub error: ApiError,
    pub retry: RetryToken,
}

/// Recovers from rejected credentials, typically by refreshing them out of
/// band and redeeming `failure.retry`.
pub trait UnauthorizedResponseHandler: Send + Sync {
    fn on_auth_failure(&self, service: &Webservice, failure: AuthFailure);
}

impl<F> UnauthorizedResponseHandler for F
where
    F: Fn(&Webservice, AuthFailure) + Send + Sync,
{
    fn on_auth_failure(&self, service: &Webservice, failure: AuthFailure) {
        self(service, failure)
    }
}

pub(crate) struct ServiceInner {
    base_url: Url,
    transport: Arc<dyn Transport>,
    main: Arc<dyn MainContext>,
    behavior: Arc<dyn RequestBehavior>,
    default_headers: Option<Arc<dyn HeaderProvider>>,
    unauthorized_handler: Option<Arc<dyn UnauthorizedResponseHandler>>,
    config: WebserviceConfig,
}

/// Cheap to clone; clones share the same transport and configuration.
#[derive(Clone)]
pub struct Webservice {
    inner: Arc<ServiceInner>,
}

/// Non-owning handle held by retry tokens.
#[derive(Clone)]
pub(crate) struct WeakWebservice(Weak<ServiceInner>);

impl WeakWebservice {
    pub(crate) fn upgrade(&self) -> Option<Webservice> {
        self.0.upgrade().map(|inner| Webservice { inner })
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        WeakWebservice(Weak::new())
    }
}

/// Result of classifying one transport completion.
enum Outcome<A> {
    Cancelled,
    Success { value: A, response: HttpResponse },
    Failure(ApiError),
    NetworkFailure(ApiError),
    Unauthorized { error: ApiError, response: HttpResponse },
}

impl Webservice {
    /// A service on the default ureq transport, delivering on its own
    /// `SerialContext` thread.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> WebserviceBuilder {
        WebserviceBuilder {
            base_url: base_url.into(),
            transport: None,
            main: None,
            behavior: None,
            default_headers: None,
            unauthorized_handler: None,
            config: WebserviceConfig::default(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn config(&self) -> &WebserviceConfig {
        &self.inner.config
    }

    /// Dispatch `resource` with only the service-level behavior.
    pub fn request<A: Send + 'static>(&self, resource: &Resource<A>, completion: Completion<A>) {
        self.request_with(resource, Arc::new(EmptyBehavior), completion);
    }

    /// Dispatch `resource`, running `behavior` after the service-level one.
    ///
    /// Returns immediately. The outcome is delivered on the main context.
    pub fn request_with<A: Send + 'static>(
        &self,
        resource: &Resource<A>,
        behavior: Arc<dyn RequestBehavior>,
        completion: Completion<A>,
    ) {
        let composed: Arc<dyn RequestBehavior> = Arc::new(CompositeBehavior::new(vec![
            self.inner.behavior.clone(),
            behavior,
        ]));
        self.start(resource.clone(), composed, completion, 0);
    }

    /// Redeem a retry token issued by this service.
    pub fn retry(&self, token: &RetryToken) -> Result<(), RetryError> {
        token.redeem(self)
    }

    /// Build the wire request for `resource` as `behavior` shapes it.
    pub fn build_request<A>(
        &self,
        resource: &Resource<A>,
        behavior: &dyn RequestBehavior,
    ) -> Result<HttpRequest, ApiError> {
        let url = behavior
            .modify_components(self.components_for(resource))
            .to_url()?;

        let body = match resource.method().body() {
            None => None,
            Some(Body::Raw(bytes)) => Some(bytes.clone()),
            Some(Body::Json(value)) => Some(
                resource
                    .encoder()
                    .encode(value)
                    .ok_or(DataError::InvalidJson)?,
            ),
        };

        let mut headers = Vec::new();
        if let Some(provider) = &self.inner.default_headers {
            headers.extend(provider.headers());
        }
        if let Some(provider) = resource.header_provider() {
            headers.extend(provider.headers());
        }
        headers.extend(behavior.additional_headers());

        let request = HttpRequest {
            method: resource.method().http_method(),
            url,
            headers,
            body,
        };
        Ok(behavior.modify_request(request))
    }

    pub(crate) fn post(&self, job: Job) {
        self.inner.main.dispatch(job);
    }

    pub(crate) fn downgrade(&self) -> WeakWebservice {
        WeakWebservice(Arc::downgrade(&self.inner))
    }

    pub(crate) fn start<A: Send + 'static>(
        &self,
        resource: Resource<A>,
        behavior: Arc<dyn RequestBehavior>,
        completion: Completion<A>,
        attempt: u32,
    ) {
        let request = match self.build_request(&resource, behavior.as_ref()) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(endpoint = resource.endpoint(), %error, "could not build request");
                self.post(Box::new(move || completion.fail(error)));
                return;
            }
        };
        tracing::trace!(method = %request.method, url = %request.url, attempt, "built request");

        self.cancel_superseded(resource.cancellation_policy(), &request.url);
        behavior.before_send(&request);

        let retry = RetryToken::new(
            attempt,
            request.url.clone(),
            Arc::new(PendingRequest {
                resource: resource.clone(),
                behavior: behavior.clone(),
                completion: completion.clone(),
            }),
            self.downgrade(),
        );

        let service = self.clone();
        let sent = request.clone();
        let task = self.inner.transport.dispatch(
            request,
            Box::new(move |result| {
                let outcome = service.classify(&resource, result);
                let deliverer = service.clone();
                service.post(Box::new(move || {
                    deliverer.deliver(outcome, sent, behavior.as_ref(), &completion, retry)
                }));
            }),
        );
        tracing::trace!(task = %task.id(), "started task");
    }

    fn components_for<A>(&self, resource: &Resource<A>) -> UrlComponents {
        let base = &self.inner.base_url;
        UrlComponents {
            scheme: base.scheme().to_string(),
            host: base.host_str().map(str::to_string),
            port: base.port(),
            path: format!("{}{}", base.path().trim_end_matches('/'), resource.endpoint()),
            query: resource.query().to_vec(),
            fragment: None,
        }
    }

    /// Cancel in-flight tasks the new request supersedes. Tasks started
    /// concurrently after the enumeration are not seen.
    fn cancel_superseded(&self, policy: &CancellationPolicy, url: &Url) {
        if policy.is_none() {
            return;
        }
        for task in self.inner.transport.running_tasks() {
            if task.state() != TaskState::Running {
                continue;
            }
            if policy.matches(url, &task.original_request().url) {
                tracing::debug!(
                    task = %task.id(),
                    running = %task.original_request().url,
                    superseded_by = %url,
                    "cancelling superseded request"
                );
                task.cancel();
            }
        }
    }

    fn classify<A>(&self, resource: &Resource<A>, result: TransportResult) -> Outcome<A> {
        let response = match result {
            Ok(response) => response,
            Err(error) if error.is_cancelled() => return Outcome::Cancelled,
            Err(error) if error.is_connectivity() => {
                tracing::debug!(url = error.url(), "no connectivity");
                let kind = NetworkError::NoConnection {
                    code: error.code(),
                    failing_url: error.url().to_string(),
                };
                return Outcome::NetworkFailure(TaggedError::with_source(kind, error).into());
            }
            Err(error) => return Outcome::Failure(error.into()),
        };

        let status = response.status;
        if !self.inner.config.is_valid_status(status) {
            let mut error: ApiError = NetworkError::HttpError(i32::from(status)).into();
            if let Some(handler) = resource.error_response_handler() {
                if let Some(mapped) = (**handler)(status, response.body.as_deref()) {
                    error = mapped;
                }
            }
            if self.inner.config.is_auth_failure(status) && self.inner.unauthorized_handler.is_some() {
                return Outcome::Unauthorized { error, response };
            }
            return Outcome::Failure(error);
        }

        let parsed = match response.body.as_deref() {
            Some(data) => resource.parse(data),
            None => return Outcome::Failure(NetworkError::HttpError(-1).into()),
        };
        match parsed {
            Ok(value) => Outcome::Success { value, response },
            Err(error) => Outcome::Failure(error),
        }
    }

    fn deliver<A>(
        &self,
        outcome: Outcome<A>,
        request: HttpRequest,
        behavior: &dyn RequestBehavior,
        completion: &Completion<A>,
        retry: RetryToken,
    ) {
        match outcome {
            Outcome::Cancelled => {
                tracing::trace!(url = %request.url, "request cancelled");
                behavior.after_complete(None);
            }
            Outcome::Success { value, response } => {
                tracing::trace!(url = %request.url, status = response.status, "request succeeded");
                behavior.after_complete(Some(&response));
                completion.succeed(value);
            }
            Outcome::Failure(error) => {
                tracing::debug!(url = %request.url, %error, "request failed");
                behavior.after_failure(&error, &retry);
                completion.fail(error);
            }
            Outcome::NetworkFailure(error) => {
                behavior.after_failure(&error, &retry);
                completion.network_fail(error);
            }
            Outcome::Unauthorized { error, response } => {
                tracing::debug!(url = %request.url, status = response.status, "authorization rejected");
                let retry = retry.diverted();
                behavior.after_failure(&error, &retry);
                match &self.inner.unauthorized_handler {
                    Some(handler) => handler.on_auth_failure(
                        self,
                        AuthFailure {
                            request,
                            response,
                            error,
                            retry,
                        },
                    ),
                    None => completion.fail(error),
                }
            }
        }
    }
}

impl fmt::Debug for Webservice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webservice")
            .field("base_url", &self.inner.base_url.as_str())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

pub struct WebserviceBuilder {
    base_url: String,
    transport: Option<Arc<dyn Transport>>,
    main: Option<Arc<dyn MainContext>>,
    behavior: Option<Arc<dyn RequestBehavior>>,
    default_headers: Option<Arc<dyn HeaderProvider>>,
    unauthorized_handler: Option<Arc<dyn UnauthorizedResponseHandler>>,
    config: WebserviceConfig,
}

impl WebserviceBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn main_context(mut self, main: Arc<dyn MainContext>) -> Self {
        self.main = Some(main);
        self
    }

    /// Behavior applied to every request, before any call-level behavior.
    pub fn behavior(mut self, behavior: Arc<dyn RequestBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn default_headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.default_headers = Some(Arc::new(provider));
        self
    }

    pub fn unauthorized_handler(mut self, handler: impl UnauthorizedResponseHandler + 'static) -> Self {
        self.unauthorized_handler = Some(Arc::new(handler));
        self
    }

    pub fn config(mut self, config: WebserviceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Webservice, ApiError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| TaggedError::with_source(NetworkError::MalformedUrl, e))?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(NetworkError::MalformedUrl.into());
        }

        Ok(Webservice {
            inner: Arc::new(ServiceInner {
                base_url,
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(UreqTransport::default())),
                main: self
                    .main
                    .unwrap_or_else(|| Arc::new(SerialContext::new())),
                behavior: self.behavior.unwrap_or_else(|| Arc::new(EmptyBehavior)),
                default_headers: self.default_headers,
                unauthorized_handler: self.unauthorized_handler,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::codec::JsonEncoder;
    use crate::components::QueryItem;
    use crate::header::{HttpHeaders, StaticHeaders};
    use crate::http::{HttpMethod, Method};
    use crate::transport::TransportError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Thing {
        name: String,
        number: i64,
    }

    fn service(base: &str) -> Webservice {
        Webservice::new(base).unwrap()
    }

    struct Rewrite;

    impl RequestBehavior for Rewrite {
        fn modify_components(&self, components: UrlComponents) -> UrlComponents {
            components.with_host(Some("rewritten.example".to_string()))
        }

        fn additional_headers(&self) -> Vec<(String, String)> {
            vec![("X-Call".to_string(), "1".to_string())]
        }
    }

    #[test]
    fn path_is_base_path_plus_endpoint() {
        let svc = service("http://localhost:3000/api/v1");
        let req = svc
            .build_request(&Resource::<Thing>::new("/things"), &EmptyBehavior)
            .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url.as_str(), "http://localhost:3000/api/v1/things");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let svc = service("http://localhost:3000/");
        let req = svc
            .build_request(&Resource::<Thing>::new("/things"), &EmptyBehavior)
            .unwrap();
        assert_eq!(req.url.as_str(), "http://localhost:3000/things");
    }

    #[test]
    fn query_keeps_order_and_duplicates() {
        let resource = Resource::<Thing>::new("/things").with_query(vec![
            QueryItem::new("limit", "10"),
            QueryItem::new("tag", "a"),
            QueryItem::new("tag", "b"),
        ]);
        let req = service("http://localhost:3000")
            .build_request(&resource, &EmptyBehavior)
            .unwrap();
        assert_eq!(req.url.query(), Some("limit=10&tag=a&tag=b"));
    }

    #[test]
    fn relative_endpoint_on_root_base_is_bad_components() {
        let err = service("http://localhost:3000")
            .build_request(&Resource::<Thing>::new("things"), &EmptyBehavior)
            .unwrap_err();
        assert!(matches!(err, ApiError::Url(_)));
    }

    #[test]
    fn headers_are_additive_in_precedence_order() {
        let svc = Webservice::builder("http://localhost:3000")
            .default_headers(StaticHeaders::new([("Accept", "application/json")]))
            .build()
            .unwrap();
        let resource = Resource::<Thing>::new("/things")
            .with_header_provider(StaticHeaders::new([("Accept", "text/plain")]));
        let req = svc.build_request(&resource, &Rewrite).unwrap();
        assert_eq!(
            req.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "text/plain".to_string()),
                ("X-Call".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(req.url.host_str(), Some("rewritten.example"));
    }

    #[test]
    fn raw_bodies_pass_through_and_json_bodies_are_encoded() {
        let svc = service("http://localhost:3000");

        let raw = Resource::<Thing>::new("/upload")
            .with_method(Method::Put(Some(Body::Raw(vec![0, 159, 146, 150]))));
        let req = svc.build_request(&raw, &EmptyBehavior).unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.body, Some(vec![0, 159, 146, 150]));

        let value = serde_json::json!({"name": "test", "number": 1});
        let json = Resource::<Thing>::new("/things")
            .with_method(Method::Post(Some(Body::Json(value.clone()))))
            .with_header_provider(HttpHeaders::json_content());
        let req = svc.build_request(&json, &EmptyBehavior).unwrap();
        assert_eq!(req.body, JsonEncoder.encode(&value));
        assert!(req.has_header("content-type"));
    }

    #[test]
    fn failing_encoder_is_invalid_json() {
        struct Refuse;
        impl Encoder for Refuse {
            fn encode(&self, _: &serde_json::Value) -> Option<Vec<u8>> {
                None
            }
        }
        let resource = Resource::<Thing>::new("/things")
            .with_method(Method::Patch(Some(Body::Json(serde_json::json!({})))))
            .with_encoder(Refuse);
        let err = service("http://localhost:3000")
            .build_request(&resource, &EmptyBehavior)
            .unwrap_err();
        assert_eq!(err.data_kind(), Some(DataError::InvalidJson));
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = Webservice::new("not a url").unwrap_err();
        assert_eq!(err.network_kind(), Some(&NetworkError::MalformedUrl));
        let err = Webservice::new("mailto:someone@example.com").unwrap_err();
        assert_eq!(err.network_kind(), Some(&NetworkError::MalformedUrl));
    }

    #[test]
    fn classify_maps_each_transport_result() {
        let svc = service("http://localhost:3000");
        let resource = Resource::<Thing>::new("/things");
        let url = "http://localhost:3000/things".to_string();

        let ok = svc.classify(
            &resource,
            Ok(HttpResponse::new(200, br#"{"name":"test","number":1}"#.to_vec())),
        );
        assert!(matches!(ok, Outcome::Success { ref value, .. } if value.name == "test"));

        let cancelled = svc.classify(&resource, Err(TransportError::Cancelled { url: url.clone() }));
        assert!(matches!(cancelled, Outcome::Cancelled));

        let offline = svc.classify(&resource, Err(TransportError::NotConnected { url: url.clone() }));
        match offline {
            Outcome::NetworkFailure(err) => assert_eq!(
                err.network_kind(),
                Some(&NetworkError::NoConnection {
                    code: -1009,
                    failing_url: url.clone()
                })
            ),
            _ => panic!("expected network failure"),
        }

        let other = svc.classify(
            &resource,
            Err(TransportError::Failed {
                url,
                source: "reset".into(),
            }),
        );
        assert!(matches!(other, Outcome::Failure(ApiError::Transport(_))));
    }

    #[test]
    fn classify_status_handling() {
        let svc = service("http://localhost:3000");
        let resource = Resource::<Thing>::new("/things");

        let err = svc.classify(&resource, Ok(HttpResponse::new(500, b"oops".to_vec())));
        match err {
            Outcome::Failure(e) => assert_eq!(e.network_kind(), Some(&NetworkError::HttpError(500))),
            _ => panic!("expected failure"),
        }

        // No unauthorized handler: 401 is an ordinary failure.
        let err = svc.classify(&resource, Ok(HttpResponse::new(401, Vec::new())));
        assert!(matches!(err, Outcome::Failure(_)));

        let bad = svc.classify(&resource, Ok(HttpResponse::new(200, b"[]".to_vec())));
        match bad {
            Outcome::Failure(e) => assert_eq!(e.data_kind(), Some(DataError::Parse)),
            _ => panic!("expected parse failure"),
        }

        let missing = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: None,
        };
        match svc.classify(&resource, Ok(missing)) {
            Outcome::Failure(e) => assert_eq!(e.network_kind(), Some(&NetworkError::HttpError(-1))),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn error_response_handler_overrides_default_error() {
        #[derive(Debug, thiserror::Error)]
        #[error("quota exceeded")]
        struct Quota;

        let svc = service("http://localhost:3000");
        let resource = Resource::<Thing>::new("/things").with_error_response_handler(|status, body| {
            (status == 429 && body == Some(b"quota".as_slice())).then(|| ApiError::response(Quota))
        });

        match svc.classify(&resource, Ok(HttpResponse::new(429, b"quota".to_vec()))) {
            Outcome::Failure(e) => assert_eq!(e.to_string(), "quota exceeded"),
            _ => panic!("expected failure"),
        }
        match svc.classify(&resource, Ok(HttpResponse::new(503, b"busy".to_vec()))) {
            Outcome::Failure(e) => assert_eq!(e.network_kind(), Some(&NetworkError::HttpError(503))),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn empty_resource_accepts_no_content() {
        let svc = service("http://localhost:3000");
        let resource = Resource::empty("/things/1").with_method(Method::Delete(None));
        let outcome = svc.classify(&resource, Ok(HttpResponse::new(204, Vec::new())));
        assert!(matches!(outcome, Outcome::Success { .. }));
    }
}
