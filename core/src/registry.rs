//! Explicit lookup table of configured services.
//!
//! Applications that talk to several backends keep one `WebserviceRegistry`
//! and pass it where it is needed. Services are keyed by their parsed base
//! URL, so `http://host` and `http://host/` name the same entry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use url::Url;

use crate::webservice::Webservice;

#[derive(Debug, Default)]
pub struct WebserviceRegistry {
    services: RwLock<HashMap<String, Webservice>>,
}

impl WebserviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under its base URL, returning any service it
    /// replaced.
    pub fn add(&self, service: Webservice) -> Option<Webservice> {
        let key = service.base_url().to_string();
        tracing::debug!(base_url = %key, "registering webservice");
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, service)
    }

    pub fn get(&self, base_url: &str) -> Option<Webservice> {
        let key = key_for(base_url)?;
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn remove(&self, base_url: &str) -> Option<Webservice> {
        let key = key_for(base_url)?;
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }

    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key_for(base_url: &str) -> Option<String> {
    Url::parse(base_url).ok().map(String::from)
}
