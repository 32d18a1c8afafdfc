// Captive portal HTTP client
//
// Two calls against the device's setup-AP gateway: a lightweight readiness
// probe on `/` and the credential hand-off on `/wifisave`. Readiness
// polling (retry budget, cancellation) lives in `improv-core`; this module
// only performs single attempts and classifies their results.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CACHE_CONTROL;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Well-known gateway address of an ESPHome device in setup-AP mode.
pub const DEFAULT_PORTAL_URL: &str = "http://192.168.4.1/";

const SUBMIT_PATH: &str = "wifisave";

/// Message fragments that mark a connection the device tore down on purpose.
///
/// ESPHome drops the TCP connection as soon as it starts applying the new
/// credentials and restarts its radio, often before the response is sent.
const DROPPED_CONNECTION_MARKERS: &[&str] = &[
    "reset",
    "aborted",
    "econnreset",
    "closed before message completed",
];

/// Result of a credential submission that produced an answer we can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The device accepted the request (HTTP 200/302, or dropped the
    /// connection while applying the credentials).
    Sent,
    /// The device answered with any other status.
    Failed { status: u16 },
}

impl SubmitOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// How a transport-level submission failure is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDisposition {
    /// Reset/aborted connection: treated as a successful submission.
    ///
    /// This is a known false-positive source. A reset caused by anything
    /// other than the device applying credentials looks identical.
    ConnectionDropped,
    /// Any other transport failure.
    Unreachable,
}

/// Classify a transport failure message (the full error chain, joined).
pub fn classify_transport_failure(message: &str) -> TransportDisposition {
    let lower = message.to_ascii_lowercase();
    if DROPPED_CONNECTION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
    {
        TransportDisposition::ConnectionDropped
    } else {
        TransportDisposition::Unreachable
    }
}

/// Map a completed submission response status to an outcome.
pub fn classify_status(status: StatusCode) -> SubmitOutcome {
    match status {
        StatusCode::OK | StatusCode::FOUND => SubmitOutcome::Sent,
        other => SubmitOutcome::Failed {
            status: other.as_u16(),
        },
    }
}

/// Raw HTTP client for the device's captive portal.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: Url,
    transport: TransportConfig,
}

impl PortalClient {
    /// Create a client for the portal at `base_url`.
    pub fn new(base_url: Url, transport: TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            transport,
        })
    }

    /// The portal base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Single readiness probe: `GET /`, success on any 2xx status.
    pub async fn probe(&self) -> Result<(), Error> {
        trace!(url = %self.base_url, "probing captive portal");

        let resp = self
            .http
            .get(self.base_url.clone())
            .header(CACHE_CONTROL, "no-store")
            .timeout(self.transport.probe_timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.transport.probe_timeout))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::NotReady {
                status: status.as_u16(),
            })
        }
    }

    /// Hand the target network credentials to the device.
    ///
    /// Issues a single `GET /wifisave?ssid=..&psk=..` without following
    /// redirects. A reset/aborted connection counts as [`SubmitOutcome::Sent`];
    /// see [`TransportDisposition::ConnectionDropped`] for the caveat.
    pub async fn submit_credentials(
        &self,
        ssid: &str,
        psk: &SecretString,
    ) -> Result<SubmitOutcome, Error> {
        let url = self.base_url.join(SUBMIT_PATH)?;
        debug!(%url, ssid, "submitting Wi-Fi credentials");

        let result = self
            .http
            .get(url)
            .query(&[("ssid", ssid), ("psk", psk.expose_secret())])
            .timeout(self.transport.submit_timeout)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let outcome = classify_status(resp.status());
                debug!(status = resp.status().as_u16(), ?outcome, "portal answered");
                Ok(outcome)
            }
            Err(e) if e.is_timeout() => Err(Error::Timeout {
                timeout_ms: millis(self.transport.submit_timeout),
            }),
            Err(e) => {
                let chain = error_chain(&e);
                if is_dropped_connection(&e)
                    || classify_transport_failure(&chain)
                        == TransportDisposition::ConnectionDropped
                {
                    warn!(
                        error = %chain,
                        "portal dropped the connection, assuming credentials were applied"
                    );
                    Ok(SubmitOutcome::Sent)
                } else {
                    Err(Error::PortalUnreachable { reason: chain })
                }
            }
        }
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: millis(timeout),
        }
    } else {
        Error::Transport(err)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Join an error and all of its sources into one message.
///
/// reqwest keeps the interesting part (`Connection reset by peer`) in the
/// source chain, not in its own `Display`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Check the source chain for an I/O reset/abort, independent of wording.
fn is_dropped_connection(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = inner.source();
    }
    false
}
