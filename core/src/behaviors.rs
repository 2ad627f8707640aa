//! Concrete behaviors shipped with the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::behavior::RequestBehavior;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::RetryToken;

// ---------------------------------------------------------------------------
// Activity indicator
// ---------------------------------------------------------------------------

/// Shared count of requests in flight.
///
/// The observer fires on the transitions 0 → 1 (`true`) and 1 → 0
/// (`false`), which is when a spinner should appear or disappear. Whoever
/// composes behaviors owns the indicator and hands clones of the `Arc` to
/// each `ActivityIndicatorBehavior`.
#[derive(Default)]
pub struct ActivityIndicator {
    active: AtomicUsize,
    observer: Option<Box<dyn Fn(bool) + Send + Sync>>,
}

impl ActivityIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            active: AtomicUsize::new(0),
            observer: Some(Box::new(observer)),
        }
    }

    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.count() > 0
    }

    pub fn increment(&self) {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            self.notify(true);
        }
    }

    /// Saturates at zero.
    pub fn decrement(&self) {
        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.notify(false);
        }
    }

    fn notify(&self, active: bool) {
        if let Some(observer) = &self.observer {
            observer(active);
        }
    }
}

/// Counts the request as active from `before_send` until it completes,
/// fails or is cancelled.
#[derive(Clone)]
pub struct ActivityIndicatorBehavior {
    indicator: Arc<ActivityIndicator>,
}

impl ActivityIndicatorBehavior {
    pub fn new(indicator: Arc<ActivityIndicator>) -> Self {
        Self { indicator }
    }
}

impl RequestBehavior for ActivityIndicatorBehavior {
    fn before_send(&self, _request: &HttpRequest) {
        self.indicator.increment();
    }

    fn after_complete(&self, _response: Option<&HttpResponse>) {
        self.indicator.decrement();
    }

    fn after_failure(&self, _error: &ApiError, _retry: &RetryToken) {
        self.indicator.decrement();
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

/// Identifier handed out by a [`BackgroundTaskHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackgroundTaskId(pub u64);

/// Platform hook that keeps the process alive while work is outstanding.
pub trait BackgroundTaskHost: Send + Sync {
    fn begin_task(&self, name: &str) -> BackgroundTaskId;
    fn end_task(&self, id: BackgroundTaskId);
}

/// Holds a background task open for the duration of one request.
///
/// Keeps the task handle internally, so use one instance per request (pass
/// it as the call-level behavior), never as a service-wide behavior.
pub struct BackgroundTaskBehavior {
    host: Arc<dyn BackgroundTaskHost>,
    name: String,
    current: Mutex<Option<BackgroundTaskId>>,
}

impl BackgroundTaskBehavior {
    pub fn new(host: Arc<dyn BackgroundTaskHost>, name: impl Into<String>) -> Self {
        Self {
            host,
            name: name.into(),
            current: Mutex::new(None),
        }
    }

    fn end(&self) {
        let finished = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = finished {
            self.host.end_task(id);
        }
    }
}

impl RequestBehavior for BackgroundTaskBehavior {
    fn before_send(&self, _request: &HttpRequest) {
        let id = self.host.begin_task(&self.name);
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(stale) = previous {
            tracing::warn!(task = stale.0, "background task still open, ending it");
            self.host.end_task(stale);
        }
    }

    fn after_complete(&self, _response: Option<&HttpResponse>) {
        self.end();
    }

    fn after_failure(&self, _error: &ApiError, _retry: &RetryToken) {
        self.end();
    }
}

// ---------------------------------------------------------------------------
// Authorization header
// ---------------------------------------------------------------------------

/// Current access token, shared between the auth behavior and whatever
/// refreshes it.
#[derive(Debug, Default)]
pub struct Credentials {
    token: RwLock<Option<String>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Adds `Authorization: <scheme> <token>` when a token is available and the
/// request does not already carry one.
pub struct AuthHeaderBehavior {
    credentials: Arc<Credentials>,
    scheme: String,
}

impl AuthHeaderBehavior {
    pub fn bearer(credentials: Arc<Credentials>) -> Self {
        Self::new(credentials, "Bearer")
    }

    pub fn new(credentials: Arc<Credentials>, scheme: impl Into<String>) -> Self {
        Self {
            credentials,
            scheme: scheme.into(),
        }
    }
}

impl RequestBehavior for AuthHeaderBehavior {
    fn modify_request(&self, request: HttpRequest) -> HttpRequest {
        if request.has_header("Authorization") {
            return request;
        }
        match self.credentials.token() {
            Some(token) => {
                request.appending_headers([("Authorization", format!("{} {token}", self.scheme))])
            }
            None => request,
        }
    }
}
