//! Typed, declarative description of one remote operation.
//!
//! # Design
//! A `Resource<A>` carries everything needed to build a request and to turn
//! the response into an `A`: endpoint, method and body, query, header
//! contribution, decoder, error mapping and cancellation policy. It holds no
//! per-request state. Capabilities are reference counted, so cloning is
//! cheap and one resource can back any number of concurrent requests.
//!
//! The `with_*` methods consume and return the resource; once handed to a
//! `Webservice` it is never mutated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cancellation::CancellationPolicy;
use crate::codec::{Decoder, Encoder, IgnoreBody, JsonDecoder, JsonEncoder};
use crate::components::QueryItem;
use crate::error::{ApiError, DataError};
use crate::header::HeaderProvider;
use crate::http::Method;

/// Maps a non-success status and its body to a domain error. Returning
/// `None` keeps the default `HttpError(status)`.
pub type ErrorResponseHandler = Arc<dyn Fn(u16, Option<&[u8]>) -> Option<ApiError> + Send + Sync>;

pub struct Resource<A> {
    endpoint: String,
    method: Method,
    query: Vec<QueryItem>,
    header_provider: Option<Arc<dyn HeaderProvider>>,
    cancellation_policy: CancellationPolicy,
    error_response_handler: Option<ErrorResponseHandler>,
    decoder: Arc<dyn Decoder<A>>,
    encoder: Arc<dyn Encoder>,
}

impl<A: DeserializeOwned + 'static> Resource<A> {
    /// A GET resource decoded with the default JSON decoder.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_decoder(endpoint, JsonDecoder::<A>::default())
    }
}

impl Resource<()> {
    /// A resource whose response body is ignored.
    pub fn empty(endpoint: impl Into<String>) -> Self {
        Self::with_decoder(endpoint, IgnoreBody)
    }
}

impl<A> Resource<A> {
    pub fn with_decoder(endpoint: impl Into<String>, decoder: impl Decoder<A> + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::default(),
            query: Vec::new(),
            header_provider: None,
            cancellation_policy: CancellationPolicy::None,
            error_response_handler: None,
            decoder: Arc::new(decoder),
            encoder: Arc::new(JsonEncoder),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_query(mut self, query: Vec<QueryItem>) -> Self {
        self.query = query;
        self
    }

    pub fn with_header_provider(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.header_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation_policy = policy;
        self
    }

    pub fn with_error_response_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(u16, Option<&[u8]>) -> Option<ApiError> + Send + Sync + 'static,
    {
        self.error_response_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn query(&self) -> &[QueryItem] {
        &self.query
    }

    pub fn header_provider(&self) -> Option<&Arc<dyn HeaderProvider>> {
        self.header_provider.as_ref()
    }

    pub fn cancellation_policy(&self) -> &CancellationPolicy {
        &self.cancellation_policy
    }

    pub fn error_response_handler(&self) -> Option<&ErrorResponseHandler> {
        self.error_response_handler.as_ref()
    }

    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    /// Decode response bytes. A panicking decoder is reported as a parse
    /// failure.
    pub fn parse(&self, data: &[u8]) -> Result<A, ApiError> {
        match catch_unwind(AssertUnwindSafe(|| self.decoder.decode(data))) {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => {
                tracing::warn!(endpoint = %self.endpoint, "decoder panicked");
                Err(DataError::Parse.into())
            }
        }
    }
}

impl<A: 'static> Resource<A> {
    /// Same request, with the decoded value post-processed by `f`.
    pub fn map<B, F>(&self, f: F) -> Resource<B>
    where
        B: 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let decoder = self.decoder.clone();
        Resource {
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            query: self.query.clone(),
            header_provider: self.header_provider.clone(),
            cancellation_policy: self.cancellation_policy.clone(),
            error_response_handler: self.error_response_handler.clone(),
            decoder: Arc::new(move |bytes: &[u8]| decoder.decode(bytes).map(&f)),
            encoder: self.encoder.clone(),
        }
    }
}

impl<A> Clone for Resource<A> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            query: self.query.clone(),
            header_provider: self.header_provider.clone(),
            cancellation_policy: self.cancellation_policy.clone(),
            error_response_handler: self.error_response_handler.clone(),
            decoder: self.decoder.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

impl<A> std::fmt::Debug for Resource<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("query", &self.query)
            .field("cancellation_policy", &self.cancellation_policy)
            .finish_non_exhaustive()
    }
}
