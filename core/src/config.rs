//! Tunables for the dispatcher and the bundled transport.
//!
//! Both structs deserialize with every field optional, so a host
//! application can embed them in its own settings file and override only
//! what it needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebserviceConfig {
    /// Statuses treated as success.
    pub valid_status_codes: Vec<u16>,
    /// Statuses routed to the unauthorized handler, when one is configured.
    pub auth_failure_codes: Vec<u16>,
    /// How many times one logical request may be re-dispatched through
    /// retry tokens before the caller receives an authentication error.
    pub max_retries: u32,
}

impl Default for WebserviceConfig {
    fn default() -> Self {
        Self {
            valid_status_codes: vec![200, 201, 204],
            auth_failure_codes: vec![401],
            max_retries: 3,
        }
    }
}

impl WebserviceConfig {
    pub fn is_valid_status(&self, status: u16) -> bool {
        self.valid_status_codes.contains(&status)
    }

    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.auth_failure_codes.contains(&status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on a whole request, connect through body read.
    pub timeout_ms: Option<u64>,
}

impl TransportConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
