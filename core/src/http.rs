//! HTTP types shared by the pipeline and its transports.
//!
//! # Design
//! Requests and responses are plain data. The pipeline builds an
//! `HttpRequest`, hands it to a [`Transport`](crate::transport::Transport),
//! and receives an `HttpResponse` back; nothing here performs I/O.
//!
//! Headers are an ordered list rather than a map: header contributions from
//! several sources are additive, and duplicates reach the wire as-is.
//!
//! [`Method`] is the resource-facing view: the verb plus an optional
//! [`Body`] that is encoded when the request is built.

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::{ApiError, DataError, TaggedError};

/// HTTP verb of a wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload attached to a [`Method`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Sent unchanged.
    Raw(Vec<u8>),
    /// Serialized by the resource's encoder when the request is built.
    Json(serde_json::Value),
}

impl Body {
    /// Capture any serializable value as a structured body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Body::Json)
            .map_err(|e| TaggedError::with_source(DataError::InvalidJson, e).into())
    }
}

/// Verb plus optional body, as declared on a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Get(Option<Body>),
    Post(Option<Body>),
    Put(Option<Body>),
    Patch(Option<Body>),
    Delete(Option<Body>),
}

impl Method {
    pub fn http_method(&self) -> HttpMethod {
        match self {
            Method::Get(_) => HttpMethod::Get,
            Method::Post(_) => HttpMethod::Post,
            Method::Put(_) => HttpMethod::Put,
            Method::Patch(_) => HttpMethod::Patch,
            Method::Delete(_) => HttpMethod::Delete,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match self {
            Method::Get(body)
            | Method::Post(body)
            | Method::Put(body)
            | Method::Patch(body)
            | Method::Delete(body) => body.as_ref(),
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get(None)
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append headers after any already present. Existing values with the
    /// same name are kept.
    pub fn appending_headers<I, N, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(n, v)| (n.into(), v.into())));
        self
    }

    /// All values for `name`, compared case-insensitively, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header_values(name).next().is_some()
    }
}

/// An HTTP response described as plain data.
///
/// `body` is `None` only when the transport delivered no payload at all; an
/// empty body is `Some(vec![])`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
