//! Header providers: ordered header contributions evaluated per request.

use std::sync::Arc;

/// Produces header pairs each time a request is built.
pub trait HeaderProvider: Send + Sync {
    fn headers(&self) -> Vec<(String, String)>;

    /// Chain another provider after this one.
    fn and<P>(self, other: P) -> CompositeHeaderProvider
    where
        Self: Sized + 'static,
        P: HeaderProvider + 'static,
    {
        CompositeHeaderProvider::new(vec![Arc::new(self), Arc::new(other)])
    }
}

impl<T: HeaderProvider + ?Sized> HeaderProvider for Arc<T> {
    fn headers(&self) -> Vec<(String, String)> {
        (**self).headers()
    }
}

/// Fixed list of headers.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(Vec<(String, String)>);

impl StaticHeaders {
    pub fn new<I, N, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self(
            headers
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

/// Headers computed by a closure on every call, e.g. from a session store.
pub struct FnHeaderProvider<F>(F);

impl<F> FnHeaderProvider<F>
where
    F: Fn() -> Vec<(String, String)> + Send + Sync,
{
    pub fn new(provide: F) -> Self {
        Self(provide)
    }
}

impl<F> HeaderProvider for FnHeaderProvider<F>
where
    F: Fn() -> Vec<(String, String)> + Send + Sync,
{
    fn headers(&self) -> Vec<(String, String)> {
        (self.0)()
    }
}

/// Concatenation of several providers, in order.
#[derive(Clone, Default)]
pub struct CompositeHeaderProvider {
    providers: Vec<Arc<dyn HeaderProvider>>,
}

impl CompositeHeaderProvider {
    pub fn new(providers: Vec<Arc<dyn HeaderProvider>>) -> Self {
        Self { providers }
    }
}

impl HeaderProvider for CompositeHeaderProvider {
    fn headers(&self) -> Vec<(String, String)> {
        self.providers.iter().flat_map(|p| p.headers()).collect()
    }

    fn and<P>(mut self, other: P) -> CompositeHeaderProvider
    where
        P: HeaderProvider + 'static,
    {
        self.providers.push(Arc::new(other));
        self
    }
}

/// Common content-type presets.
pub struct HttpHeaders;

impl HttpHeaders {
    pub fn json_content() -> StaticHeaders {
        StaticHeaders::new([("Content-Type", "application/json; charset=utf-8")])
    }

    pub fn form_content() -> StaticHeaders {
        StaticHeaders::new([("Content-Type", "application/x-www-form-urlencoded")])
    }

    pub fn plain_text_content() -> StaticHeaders {
        StaticHeaders::new([("Content-Type", "text/plain")])
    }
}
