// Shared transport configuration for building the portal's reqwest::Client.
//
// The device serves plain HTTP on its setup AP. Redirects are never
// followed: the submission endpoint answers with a 302 that is itself the
// success signal.

use std::time::Duration;

use reqwest::redirect::Policy;

use crate::error::Error;

const USER_AGENT: &str = concat!("improv/", env!("CARGO_PKG_VERSION"));

/// Per-request timeouts for the two portal calls.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for a single readiness probe (`GET /`).
    pub probe_timeout: Duration,
    /// Timeout for the credential submission request.
    pub submit_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` that does not follow redirects and never
    /// reuses a pooled connection across device reboots.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))
    }
}
