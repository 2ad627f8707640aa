//! Retry tokens: explicit, single-use permission to re-dispatch a request.
//!
//! # Design
//! When an attempt fails, behaviors and the unauthorized handler receive a
//! `RetryToken`. It snapshots the resource, the composed behavior and the
//! caller's completion, so redeeming it re-enters the pipeline exactly as
//! the original call did, as a new attempt.
//!
//! A token can be redeemed once; clones share that state. Each re-dispatch
//! counts toward `WebserviceConfig::max_retries`. Redeeming at the limit
//! returns `RetryError::Exhausted`. When the attempt was handed to the
//! unauthorized handler the caller has not been answered yet, so it then
//! receives `NetworkError::AuthenticationError`; otherwise the caller already
//! got the attempt's failure and nothing more is delivered.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::behavior::RequestBehavior;
use crate::error::{ApiError, NetworkError};
use crate::resource::Resource;
use crate::webservice::{Completion, WeakWebservice, Webservice};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("retry token for {url} was already redeemed")]
    AlreadyRedeemed { url: String },

    #[error("retry limit of {limit} reached for {url}")]
    Exhausted { url: String, limit: u32 },

    #[error("the webservice that issued this retry token no longer exists")]
    ServiceDropped,
}

/// Type-erased snapshot of one logical request.
pub(crate) trait Replay: Send + Sync {
    fn replay(&self, service: &Webservice, attempt: u32);
    fn exhaust(&self, service: &Webservice, error: ApiError);
}

pub(crate) struct PendingRequest<A> {
    pub(crate) resource: Resource<A>,
    pub(crate) behavior: Arc<dyn RequestBehavior>,
    pub(crate) completion: Completion<A>,
}

impl<A: Send + 'static> Replay for PendingRequest<A> {
    fn replay(&self, service: &Webservice, attempt: u32) {
        service.start(
            self.resource.clone(),
            self.behavior.clone(),
            self.completion.clone(),
            attempt,
        );
    }

    fn exhaust(&self, service: &Webservice, error: ApiError) {
        let completion = self.completion.clone();
        service.post(Box::new(move || completion.fail(error)));
    }
}

#[derive(Clone)]
pub struct RetryToken {
    attempt: u32,
    url: Url,
    replay: Arc<dyn Replay>,
    redeemed: Arc<AtomicBool>,
    service: WeakWebservice,
    /// The attempt's outcome went to the unauthorized handler instead of the
    /// caller.
    diverted: bool,
}

impl RetryToken {
    pub(crate) fn new(attempt: u32, url: Url, replay: Arc<dyn Replay>, service: WeakWebservice) -> Self {
        Self {
            attempt,
            url,
            replay,
            redeemed: Arc::new(AtomicBool::new(false)),
            service,
            diverted: false,
        }
    }

    /// The same token, marked as standing in for the caller's answer.
    pub(crate) fn diverted(&self) -> Self {
        Self {
            diverted: true,
            ..self.clone()
        }
    }

    /// Zero for the first dispatch of a request, incremented on every retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// URL of the attempt that failed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_redeemed(&self) -> bool {
        self.redeemed.load(Ordering::SeqCst)
    }

    /// Redeem through the issuing webservice. Equivalent to
    /// `webservice.retry(&token)`.
    pub fn retry(&self) -> Result<(), RetryError> {
        match self.service.upgrade() {
            Some(service) => service.retry(self),
            None => Err(RetryError::ServiceDropped),
        }
    }

    pub(crate) fn redeem(&self, service: &Webservice) -> Result<(), RetryError> {
        let url = self.url.to_string();
        if self.redeemed.swap(true, Ordering::SeqCst) {
            tracing::warn!(%url, attempt = self.attempt, "retry token redeemed more than once");
            return Err(RetryError::AlreadyRedeemed { url });
        }

        let limit = service.config().max_retries;
        if self.attempt >= limit {
            tracing::warn!(%url, limit, diverted = self.diverted, "retry limit reached");
            if self.diverted {
                self.replay
                    .exhaust(service, NetworkError::AuthenticationError.into());
            }
            return Err(RetryError::Exhausted { url, limit });
        }

        tracing::debug!(%url, attempt = self.attempt + 1, "retrying request");
        self.replay.replay(service, self.attempt + 1);
        Ok(())
    }

    /// A token bound to no request, for exercising behaviors in isolation.
    #[cfg(test)]
    pub(crate) fn detached(url: Url) -> Self {
        struct Nothing;
        impl Replay for Nothing {
            fn replay(&self, _: &Webservice, _: u32) {}
            fn exhaust(&self, _: &Webservice, _: ApiError) {}
        }
        Self::new(0, url, Arc::new(Nothing), WeakWebservice::detached())
    }
}

impl fmt::Debug for RetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryToken")
            .field("attempt", &self.attempt)
            .field("url", &self.url.as_str())
            .field("redeemed", &self.is_redeemed())
            .finish()
    }
}
