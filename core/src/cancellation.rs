//! Duplicate-request suppression rules.
//!
//! # Design
//! A policy is a pure function of two URLs: the one about to be dispatched
//! and one already in flight. `Path` and `Uri` compare both structurally;
//! `Pattern` only looks at the running request's absolute URL.

use regex::Regex;
use url::Url;

/// Decides whether a new request supersedes an in-flight one.
#[derive(Debug, Clone, Default)]
pub enum CancellationPolicy {
    /// Never cancel.
    #[default]
    None,
    /// Cancel running requests with the same path, whatever their query.
    Path,
    /// Cancel running requests with the same path and query. The fragment
    /// is ignored.
    Uri,
    /// Cancel running requests whose absolute URL matches the expression.
    Pattern(Regex),
}

impl CancellationPolicy {
    pub fn pattern(expression: &str) -> Result<Self, regex::Error> {
        Regex::new(expression).map(CancellationPolicy::Pattern)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CancellationPolicy::None)
    }

    /// Whether starting `candidate` should cancel `running`.
    pub fn matches(&self, candidate: &Url, running: &Url) -> bool {
        match self {
            CancellationPolicy::None => false,
            CancellationPolicy::Path => candidate.path() == running.path(),
            CancellationPolicy::Uri => {
                candidate.path() == running.path() && candidate.query() == running.query()
            }
            CancellationPolicy::Pattern(regex) => regex.is_match(running.as_str()),
        }
    }
}
