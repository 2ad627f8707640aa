//! Error taxonomy for the request pipeline.
//!
//! # Design
//! Every failure a caller can observe belongs to a small, closed set of
//! kinds grouped by domain: data (decoding), network (HTTP and
//! connectivity), and URL construction. Each kind carries a stable numeric
//! code and a human description through [`ErrorKind`]. [`TaggedError`] pairs
//! a kind with an optional underlying error so the original cause (a serde
//! error, a URL parse error) stays reachable through `source()`.
//!
//! [`ApiError`] is the sum type handed to completion callbacks and behavior
//! hooks.

use std::fmt;

use thiserror::Error;

use crate::transport::TransportError;

/// Boxed underlying cause, kept for chaining.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A member of one of the closed error domains.
pub trait ErrorKind: fmt::Debug + Send + Sync + 'static {
    /// Stable numeric code for this kind.
    fn code(&self) -> i64;

    /// Human-readable description.
    fn description(&self) -> String;

    /// Domain tag. Defaults to the implementing type's name.
    fn domain(&self) -> &'static str {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name)
    }
}

/// Failures turning response bytes into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataError {
    /// The bytes are not well-formed JSON.
    InvalidJson,
    /// The JSON is well-formed but does not fit the target type.
    Parse,
}

impl ErrorKind for DataError {
    fn code(&self) -> i64 {
        match self {
            DataError::InvalidJson => 13001,
            DataError::Parse => 13002,
        }
    }

    fn description(&self) -> String {
        match self {
            DataError::InvalidJson => "Data is not valid JSON".to_string(),
            DataError::Parse => "Data could not be parsed into the expected type".to_string(),
        }
    }
}

/// Failures at the HTTP or connectivity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The server answered with a status outside the valid set. `-1` is
    /// used when a valid status arrived without a body.
    HttpError(i32),
    /// Credentials were rejected and could not be recovered.
    AuthenticationError,
    /// The device is offline or the request timed out.
    NoConnection { code: i64, failing_url: String },
    /// A URL string could not be parsed.
    MalformedUrl,
}

impl ErrorKind for NetworkError {
    fn code(&self) -> i64 {
        match self {
            NetworkError::HttpError(status) => i64::from(*status),
            NetworkError::AuthenticationError => 401,
            NetworkError::NoConnection { code, .. } => *code,
            NetworkError::MalformedUrl => -1000,
        }
    }

    fn description(&self) -> String {
        match self {
            NetworkError::HttpError(status) => format!("Request failed with HTTP status: {status}"),
            NetworkError::AuthenticationError => "Authentication details were rejected".to_string(),
            NetworkError::NoConnection { failing_url, .. } => {
                format!("No connection available for request to {failing_url}")
            }
            NetworkError::MalformedUrl => "The URL is malformed".to_string(),
        }
    }
}

/// Failures assembling a URL from its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlComponentsError {
    BadComponents,
}

impl ErrorKind for UrlComponentsError {
    fn code(&self) -> i64 {
        14001
    }

    fn description(&self) -> String {
        "URL components do not form a valid URL".to_string()
    }
}

/// An error kind paired with the error that caused it, if any.
#[derive(Debug)]
pub struct TaggedError<K: ErrorKind> {
    kind: K,
    source: Option<BoxError>,
}

impl<K: ErrorKind> TaggedError<K> {
    pub fn new(kind: K) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(kind: K, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn code(&self) -> i64 {
        self.kind.code()
    }

    pub fn domain(&self) -> &'static str {
        self.kind.domain()
    }
}

impl<K: ErrorKind> fmt::Display for TaggedError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.kind.domain(),
            self.kind.description(),
            self.kind.code()
        )
    }
}

impl<K: ErrorKind> std::error::Error for TaggedError<K> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type produced by decoders.
pub type DecodeError = TaggedError<DataError>;

/// Every failure delivered to a caller or a behavior hook.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Data(#[from] TaggedError<DataError>),

    #[error(transparent)]
    Network(#[from] TaggedError<NetworkError>),

    #[error(transparent)]
    Url(#[from] TaggedError<UrlComponentsError>),

    /// The transport failed in a way that is neither cancellation nor lost
    /// connectivity.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Domain error produced by a resource's error-response handler.
    #[error(transparent)]
    Response(BoxError),
}

impl ApiError {
    /// Wrap an application-defined error, typically from an error-response
    /// handler.
    pub fn response(error: impl Into<BoxError>) -> Self {
        ApiError::Response(error.into())
    }

    /// Numeric code of the underlying kind, if the error is a tagged one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Data(e) => Some(e.code()),
            ApiError::Network(e) => Some(e.code()),
            ApiError::Url(e) => Some(e.code()),
            ApiError::Transport(e) => Some(e.code()),
            ApiError::Response(_) => None,
        }
    }

    pub fn network_kind(&self) -> Option<&NetworkError> {
        match self {
            ApiError::Network(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn data_kind(&self) -> Option<DataError> {
        match self {
            ApiError::Data(e) => Some(*e.kind()),
            _ => None,
        }
    }
}

impl From<DataError> for ApiError {
    fn from(kind: DataError) -> Self {
        ApiError::Data(TaggedError::new(kind))
    }
}

impl From<NetworkError> for ApiError {
    fn from(kind: NetworkError) -> Self {
        ApiError::Network(TaggedError::new(kind))
    }
}

impl From<UrlComponentsError> for ApiError {
    fn from(kind: UrlComponentsError) -> Self {
        ApiError::Url(TaggedError::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn domain_is_the_type_name() {
        assert_eq!(DataError::InvalidJson.domain(), "DataError");
        assert_eq!(NetworkError::MalformedUrl.domain(), "NetworkError");
        assert_eq!(UrlComponentsError::BadComponents.domain(), "UrlComponentsError");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(DataError::InvalidJson.code(), 13001);
        assert_eq!(DataError::Parse.code(), 13002);
        assert_eq!(NetworkError::HttpError(503).code(), 503);
        assert_eq!(NetworkError::AuthenticationError.code(), 401);
        assert_eq!(
            NetworkError::NoConnection {
                code: -1009,
                failing_url: "http://x".to_string()
            }
            .code(),
            -1009
        );
        assert_eq!(UrlComponentsError::BadComponents.code(), 14001);
    }

    #[test]
    fn display_combines_domain_description_and_code() {
        let err = TaggedError::new(NetworkError::HttpError(500));
        assert_eq!(
            err.to_string(),
            "NetworkError - Request failed with HTTP status: 500 (500)"
        );
    }

    #[test]
    fn tagged_error_chains_its_source() {
        let cause = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = TaggedError::with_source(DataError::InvalidJson, cause);
        assert!(err.source().is_some());

        let bare = TaggedError::new(DataError::Parse);
        assert!(bare.source().is_none());
    }

    #[test]
    fn api_error_exposes_kinds() {
        let err: ApiError = NetworkError::HttpError(404).into();
        assert_eq!(err.code(), Some(404));
        assert_eq!(err.network_kind(), Some(&NetworkError::HttpError(404)));
        assert!(err.data_kind().is_none());

        let err: ApiError = DataError::Parse.into();
        assert_eq!(err.data_kind(), Some(DataError::Parse));

        let err = ApiError::response(std::io::Error::other("teapot"));
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "teapot");
    }
}
