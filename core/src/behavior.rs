//! Request behaviors: composable middleware around a request's lifecycle.
//!
//! # Design
//! A behavior can rewrite URL components before the URL is assembled,
//! contribute headers, rewrite the built request, and observe the attempt
//! (`before_send`, then exactly one of `after_complete` / `after_failure`).
//! Every hook has a no-op default, so implementors override only what they
//! need.
//!
//! `CompositeBehavior` applies its members in declaration order. The
//! transforming hooks thread their output through each member in turn; the
//! observing hooks fan out with no aggregation. `after_failure` hands the
//! same retry token to every member. Tokens are single-use, so when two
//! members try to retry only the first succeeds.
//!
//! Behaviors are shared across concurrent requests. State that belongs to a
//! single attempt must either live in an instance created for that attempt
//! or be kept in atomics.

use std::sync::Arc;

use crate::components::UrlComponents;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::RetryToken;

pub trait RequestBehavior: Send + Sync {
    fn modify_components(&self, components: UrlComponents) -> UrlComponents {
        components
    }

    /// Headers appended after the service defaults and the resource's own.
    fn additional_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn modify_request(&self, request: HttpRequest) -> HttpRequest {
        request
    }

    fn before_send(&self, _request: &HttpRequest) {}

    /// Called on success and on cancellation. `response` is `None` for a
    /// cancelled request.
    fn after_complete(&self, _response: Option<&HttpResponse>) {}

    fn after_failure(&self, _error: &ApiError, _retry: &RetryToken) {}
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBehavior;

impl RequestBehavior for EmptyBehavior {}

/// Ordered list of behaviors acting as one.
#[derive(Clone, Default)]
pub struct CompositeBehavior {
    behaviors: Vec<Arc<dyn RequestBehavior>>,
}

impl CompositeBehavior {
    pub fn new(behaviors: Vec<Arc<dyn RequestBehavior>>) -> Self {
        Self { behaviors }
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

impl RequestBehavior for CompositeBehavior {
    fn modify_components(&self, components: UrlComponents) -> UrlComponents {
        self.behaviors
            .iter()
            .fold(components, |acc, b| b.modify_components(acc))
    }

    fn additional_headers(&self) -> Vec<(String, String)> {
        self.behaviors
            .iter()
            .flat_map(|b| b.additional_headers())
            .collect()
    }

    fn modify_request(&self, request: HttpRequest) -> HttpRequest {
        self.behaviors
            .iter()
            .fold(request, |acc, b| b.modify_request(acc))
    }

    fn before_send(&self, request: &HttpRequest) {
        self.behaviors.iter().for_each(|b| b.before_send(request));
    }

    fn after_complete(&self, response: Option<&HttpResponse>) {
        self.behaviors.iter().for_each(|b| b.after_complete(response));
    }

    fn after_failure(&self, error: &ApiError, retry: &RetryToken) {
        self.behaviors
            .iter()
            .for_each(|b| b.after_failure(error, retry));
    }
}
