//! Mutable URL components, assembled into a `Url` only once behaviors have
//! had their say.

use url::{form_urlencoded, Url};

use crate::error::{ApiError, TaggedError, UrlComponentsError};

/// A single `name=value` query pair. `value` is optional so key-only items
/// (`?flag`) can be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryItem {
    pub name: String,
    pub value: Option<String>,
}

impl QueryItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// The pieces of a URL before they are validated.
///
/// The query is an ordered list; duplicate names are kept and emitted in
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlComponents {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub query: Vec<QueryItem>,
    pub fragment: Option<String>,
}

impl UrlComponents {
    /// Decompose an existing URL.
    pub fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().map(str::to_string),
            port: url.port(),
            path: url.path().to_string(),
            query: url.query().map(parse_query).unwrap_or_default(),
            fragment: url.fragment().map(str::to_string),
        }
    }

    /// Assemble the components into a URL.
    ///
    /// Fails with `BadComponents` when there is no host, the path is not
    /// absolute, or any piece is rejected by the URL parser.
    pub fn to_url(&self) -> Result<Url, ApiError> {
        let host = match self.host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(bad_components(None)),
        };
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(bad_components(None));
        }

        let mut url = Url::parse(&format!("{}://{}", self.scheme, host))
            .map_err(|e| bad_components(Some(e)))?;
        if url.cannot_be_a_base() {
            return Err(bad_components(None));
        }
        url.set_port(self.port).map_err(|_| bad_components(None))?;
        url.set_path(&self.path);

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for item in &self.query {
                match &item.value {
                    Some(value) => pairs.append_pair(&item.name, value),
                    None => pairs.append_key_only(&item.name),
                };
            }
        }
        url.set_fragment(self.fragment.as_deref());
        Ok(url)
    }

    pub fn appending_query(mut self, items: impl IntoIterator<Item = QueryItem>) -> Self {
        self.query.extend(items);
        self
    }

    pub fn replacing_query(mut self, items: Vec<QueryItem>) -> Self {
        self.query = items;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

fn bad_components(source: Option<url::ParseError>) -> ApiError {
    match source {
        Some(e) => TaggedError::with_source(UrlComponentsError::BadComponents, e).into(),
        None => UrlComponentsError::BadComponents.into(),
    }
}

/// Split a raw query into items, keeping pieces without `=` as flags.
fn parse_query(query: &str) -> Vec<QueryItem> {
    query
        .split('&')
        .filter(|piece| !piece.is_empty())
        .filter_map(|piece| {
            let (name, value) = form_urlencoded::parse(piece.as_bytes()).next()?;
            Some(if piece.contains('=') {
                QueryItem::new(name, value)
            } else {
                QueryItem::flag(name)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components() -> UrlComponents {
        UrlComponents {
            scheme: "https".to_string(),
            host: Some("api.example.com".to_string()),
            port: Some(8443),
            path: "/v1/things".to_string(),
            query: Vec::new(),
            fragment: None,
        }
    }

    #[test]
    fn assembles_all_parts() {
        let url = components()
            .appending_query([QueryItem::new("limit", "10"), QueryItem::flag("verbose")])
            .to_url()
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com:8443/v1/things?limit=10&verbose");
    }

    #[test]
    fn duplicate_query_names_keep_their_order() {
        let url = components()
            .appending_query([
                QueryItem::new("b", "2"),
                QueryItem::new("a", "1"),
                QueryItem::new("b", "3"),
            ])
            .to_url()
            .unwrap();
        assert_eq!(url.query(), Some("b=2&a=1&b=3"));
    }

    #[test]
    fn empty_query_emits_no_question_mark() {
        let url = components().to_url().unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn missing_host_is_bad_components() {
        let err = components().with_host(None).to_url().unwrap_err();
        assert_eq!(err.code(), Some(14001));
    }

    #[test]
    fn relative_path_is_bad_components() {
        let err = components().with_path("things").to_url().unwrap_err();
        assert!(matches!(err, ApiError::Url(_)));
    }

    #[test]
    fn invalid_host_is_bad_components() {
        let err = components()
            .with_host(Some("bad host".to_string()))
            .to_url()
            .unwrap_err();
        assert!(matches!(err, ApiError::Url(_)));
    }

    #[test]
    fn from_url_round_trips_the_pieces() {
        let url = Url::parse("http://localhost:3000/things?limit=10&limit=20#top").unwrap();
        let parts = UrlComponents::from_url(&url);
        assert_eq!(parts.host.as_deref(), Some("localhost"));
        assert_eq!(parts.port, Some(3000));
        assert_eq!(parts.path, "/things");
        assert_eq!(
            parts.query,
            vec![QueryItem::new("limit", "10"), QueryItem::new("limit", "20")]
        );
        assert_eq!(parts.fragment.as_deref(), Some("top"));
        assert_eq!(parts.to_url().unwrap(), url);
    }

    #[test]
    fn from_url_keeps_key_only_items_as_flags() {
        let url = Url::parse("http://localhost:3000/things?verbose&limit=10&empty=&a%20b").unwrap();
        let parts = UrlComponents::from_url(&url);
        assert_eq!(
            parts.query,
            vec![
                QueryItem::flag("verbose"),
                QueryItem::new("limit", "10"),
                QueryItem::new("empty", ""),
                QueryItem::flag("a b"),
            ]
        );
        assert_eq!(parts.to_url().unwrap().query(), Some("verbose&limit=10&empty=&a+b"));
    }

    #[test]
    fn transformers_replace_individual_parts() {
        let url = components()
            .with_scheme("http")
            .with_port(None)
            .with_path("/other")
            .replacing_query(vec![QueryItem::new("q", "x")])
            .to_url()
            .unwrap();
        assert_eq!(url.as_str(), "http://api.example.com/other?q=x");
    }
}
