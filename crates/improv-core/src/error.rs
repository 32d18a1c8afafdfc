// ── Core error types ──
//
// Stage-level errors of a provisioning run. Consumers never see reqwest
// errors directly: the `From<improv_api::Error>` impl folds transport
// failures into `Timeout` / `PortalUnreachable`.

use thiserror::Error;

use crate::config::Security;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Security mode '{security}' requires a non-empty AP password")]
    InvalidSecurityConfig { security: Security },

    // ── OS network stack ─────────────────────────────────────────────
    #[error("Failed to enumerate network adapters: {reason}")]
    AdapterEnumeration { reason: String },

    #[error("No network adapter selected")]
    NoAdapterSelected,

    #[error("Failed to install Wi-Fi profile for '{ssid}' (exit status {status})")]
    ProfileInstallFailed { ssid: String, status: i32 },

    #[error("Failed to join '{ssid}' on adapter '{adapter}' (exit status {status})")]
    JoinFailed {
        adapter: String,
        ssid: String,
        status: i32,
    },

    #[error("Failed to run '{command}': {reason}")]
    Command { command: String, reason: String },

    // ── Polling / portal ─────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout {
        operation: String,
        timeout_ms: u64,
        /// Error of the last failed attempt, if the wait was a poll.
        last_error: Option<String>,
    },

    #[error("Captive portal unreachable: {reason}")]
    PortalUnreachable { reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Provisioning cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A release action that failed. Logged and reported, never escalated.
#[derive(Debug, Clone, Error)]
#[error("Cleanup '{label}' failed: {reason}")]
pub struct CleanupError {
    pub label: String,
    pub reason: String,
}

impl CleanupError {
    pub fn new(label: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            label: label.into(),
            reason: reason.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<improv_api::Error> for CoreError {
    fn from(err: improv_api::Error) -> Self {
        match err {
            improv_api::Error::Timeout { timeout_ms } => CoreError::Timeout {
                operation: "captive portal response".into(),
                timeout_ms,
                last_error: None,
            },
            improv_api::Error::PortalUnreachable { reason } => {
                CoreError::PortalUnreachable { reason }
            }
            improv_api::Error::Transport(e) => CoreError::PortalUnreachable {
                reason: e.to_string(),
            },
            improv_api::Error::NotReady { status } => CoreError::PortalUnreachable {
                reason: format!("portal answered HTTP {status}"),
            },
            improv_api::Error::ClientBuild(msg) => CoreError::Internal(msg),
            improv_api::Error::InvalidUrl(e) => CoreError::Internal(format!("Invalid URL: {e}")),
        }
    }
}
