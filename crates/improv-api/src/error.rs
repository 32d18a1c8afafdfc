use thiserror::Error;

/// Top-level error type for the `improv-api` crate.
///
/// Covers the failure modes of talking to the device's captive portal.
/// `improv-core` maps these into stage-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error that was not classified any further.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request did not complete within its per-call timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Failed to build the underlying HTTP client.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Portal ──────────────────────────────────────────────────────
    /// The portal answered, but not with a success status.
    #[error("Captive portal not ready (HTTP {status})")]
    NotReady { status: u16 },

    /// Transport failure during credential submission that does not look
    /// like the device dropping the connection to apply the credentials.
    #[error("Captive portal unreachable: {reason}")]
    PortalUnreachable { reason: String },
}

impl Error {
    /// Returns `true` if this is a per-request timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
