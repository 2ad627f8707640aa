//! Networking core for app clients: typed resources dispatched through a
//! pluggable transport, shaped by composable request behaviors.
//!
//! # Overview
//! A [`Resource`] describes one remote operation: endpoint, method and
//! body, query, headers, decoder, error mapping and cancellation policy.
//! A [`Webservice`] turns resources into `HttpRequest` values against its
//! base URL, hands them to a [`Transport`], and delivers exactly one typed
//! outcome per attempt on a [`MainContext`].
//!
//! # Design
//! - Request building and response classification are pure functions of
//!   their inputs; only dispatch and delivery have side effects.
//! - [`RequestBehavior`] hooks (URL rewriting, extra headers, request
//!   mutation, lifecycle observation) compose in declaration order, the
//!   service-level behavior first.
//! - Failures carry a single-use [`RetryToken`]. An
//!   [`UnauthorizedResponseHandler`] takes over rejected-credential
//!   responses and decides whether to retry.
//! - The transport is a trait. [`UreqTransport`] is the bundled blocking
//!   implementation; tests substitute one driven by hand.

pub mod behavior;
pub mod behaviors;
pub mod cancellation;
pub mod codec;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod header;
pub mod http;
pub mod pagination;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod transport;
pub mod webservice;

pub use behavior::{CompositeBehavior, EmptyBehavior, RequestBehavior};
pub use behaviors::{
    ActivityIndicator, ActivityIndicatorBehavior, AuthHeaderBehavior, BackgroundTaskBehavior,
    BackgroundTaskHost, BackgroundTaskId, Credentials,
};
pub use cancellation::CancellationPolicy;
pub use codec::{Decoder, Encoder, IgnoreBody, JsonDecoder, JsonEncoder, KeyDecodingStrategy};
pub use components::{QueryItem, UrlComponents};
pub use config::{TransportConfig, WebserviceConfig};
pub use context::{InlineContext, MainContext, MainQueue, SerialContext};
pub use error::{
    ApiError, DataError, DecodeError, ErrorKind, NetworkError, TaggedError, UrlComponentsError,
};
pub use header::{CompositeHeaderProvider, FnHeaderProvider, HeaderProvider, HttpHeaders, StaticHeaders};
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse, Method};
pub use pagination::{Page, Pagination};
pub use registry::WebserviceRegistry;
pub use resource::{ErrorResponseHandler, Resource};
pub use retry::{RetryError, RetryToken};
pub use transport::{TaskState, Transport, TransportError, TransportTask, UreqTransport};
pub use webservice::{AuthFailure, Completion, UnauthorizedResponseHandler, Webservice, WebserviceBuilder};
