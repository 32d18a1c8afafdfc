//! CLI error types with miette diagnostics.
//!
//! Maps config and provisioning failures into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use improv_config::ConfigError;
use improv_core::{CoreError, Stage, StageFailure};

/// Process exit codes.
pub mod exit_code {
    /// Provisioned, or stopped by a signal after cleanup.
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    /// The setup AP or its captive portal never became reachable.
    pub const SETUP: i32 = 3;
    /// The device rejected the credentials or dropped off during submission.
    pub const REJECTED: i32 = 4;
    pub const TIMEOUT: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(improv::no_config),
        help(
            "Create {path}, point --config-file at another file,\n\
             or pass --ap-ssid, --wifi-ssid and --wifi-password."
        )
    )]
    NoConfig { path: String },

    #[error("Config validation failed: {}", issues.join("; "))]
    #[diagnostic(
        code(improv::invalid_config),
        help("Check the ap / wifi sections of your config file or the matching flags.")
    )]
    InvalidConfig { issues: Vec<String> },

    #[error(transparent)]
    #[diagnostic(code(improv::config))]
    Config(Box<figment::Error>),

    // ── Adapter selection ────────────────────────────────────────────

    #[error("No network adapter selected")]
    #[diagnostic(
        code(improv::no_adapter),
        help("Pick one interactively, or set --interface-name / --interface-mac.")
    )]
    NoAdapter,

    #[error("Could not list network adapters: {reason}")]
    #[diagnostic(
        code(improv::adapters),
        help("Adapter discovery runs `Get-NetAdapter` through PowerShell.")
    )]
    AdapterEnumeration { reason: String },

    // ── Setup connection ─────────────────────────────────────────────

    #[error("Connecting to device failed while {stage}")]
    #[diagnostic(
        code(improv::setup_failed),
        help("Check if Captive Portal AP exists and is reachable.")
    )]
    SetupFailed {
        stage: String,
        #[source]
        source: CoreError,
    },

    // ── Submission ───────────────────────────────────────────────────

    #[error("Device rejected the credentials (HTTP {status})")]
    #[diagnostic(
        code(improv::rejected),
        help("Check your configuration and try again.")
    )]
    Rejected { status: u16 },

    #[error("Device became unreachable while sending credentials: {reason}")]
    #[diagnostic(
        code(improv::unreachable),
        help("Check your configuration and try again.")
    )]
    DeviceUnreachable { reason: String },

    #[error("Sending credentials timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(improv::timeout),
        help("Sometimes a timeout occurs when the Wi-Fi credentials are wrong.")
    )]
    SubmitTimeout { timeout_ms: u64 },

    // ── Lifecycle ────────────────────────────────────────────────────

    #[error("Provisioning interrupted")]
    #[diagnostic(code(improv::interrupted))]
    Interrupted,

    #[error("Provisioning aborted unexpectedly")]
    #[diagnostic(code(improv::internal))]
    Internal {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. }
            | Self::InvalidConfig { .. }
            | Self::Config(_)
            | Self::NoAdapter => exit_code::USAGE,
            Self::SetupFailed { .. } => exit_code::SETUP,
            Self::Rejected { .. } | Self::DeviceUnreachable { .. } => exit_code::REJECTED,
            Self::SubmitTimeout { .. } => exit_code::TIMEOUT,
            Self::Interrupted => exit_code::SUCCESS,
            Self::AdapterEnumeration { .. } | Self::Internal { .. } => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Invalid { issues } => CliError::InvalidConfig { issues },
            ConfigError::Figment(e) => CliError::Config(e),
        }
    }
}

// ── StageFailure → CliError mapping ──────────────────────────────────

impl From<StageFailure> for CliError {
    fn from(failure: StageFailure) -> Self {
        let StageFailure { stage, error } = failure;
        match (stage, error) {
            (_, CoreError::Cancelled) => CliError::Interrupted,

            (_, CoreError::InvalidSecurityConfig { security }) => CliError::InvalidConfig {
                issues: vec![format!("ap.password: required for {security}")],
            },

            (_, CoreError::NoAdapterSelected) => CliError::NoAdapter,

            (_, CoreError::AdapterEnumeration { reason }) => {
                CliError::AdapterEnumeration { reason }
            }

            (Stage::CredentialSubmit, CoreError::Timeout { timeout_ms, .. }) => {
                CliError::SubmitTimeout { timeout_ms }
            }

            (Stage::CredentialSubmit, CoreError::PortalUnreachable { reason }) => {
                CliError::DeviceUnreachable { reason }
            }

            (Stage::CredentialSubmit | Stage::AdapterResolution, other) => CliError::Internal {
                source: Box::new(other),
            },

            (stage, source) => CliError::SetupFailed {
                stage: stage_activity(stage).into(),
                source,
            },
        }
    }
}

fn stage_activity(stage: Stage) -> &'static str {
    match stage {
        Stage::AdapterResolution => "selecting a network adapter",
        Stage::ProfileInstall => "setting up the network profile",
        Stage::ApJoin => "connecting to the AP",
        Stage::IpAcquired => "waiting for an IP address",
        Stage::PortalReady => "waiting for the captive portal",
        Stage::CredentialSubmit => "sending credentials",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(stage: Stage, error: CoreError) -> CliError {
        StageFailure::new(stage, error).into()
    }

    fn timeout() -> CoreError {
        CoreError::Timeout {
            operation: "x".into(),
            timeout_ms: 5000,
            last_error: None,
        }
    }

    #[test]
    fn setup_stages_map_to_setup_exit_code() {
        for stage in [
            Stage::ProfileInstall,
            Stage::ApJoin,
            Stage::IpAcquired,
            Stage::PortalReady,
        ] {
            let err = failure(stage, timeout());
            assert!(matches!(err, CliError::SetupFailed { .. }), "{stage}");
            assert_eq!(err.exit_code(), exit_code::SETUP);
        }
    }

    #[test]
    fn submit_failures_are_distinguished() {
        let err = failure(Stage::CredentialSubmit, timeout());
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);

        let err = failure(
            Stage::CredentialSubmit,
            CoreError::PortalUnreachable {
                reason: "refused".into(),
            },
        );
        assert_eq!(err.exit_code(), exit_code::REJECTED);

        assert_eq!(
            CliError::Rejected { status: 404 }.exit_code(),
            exit_code::REJECTED
        );
    }

    #[test]
    fn cancellation_exits_cleanly() {
        let err = failure(Stage::IpAcquired, CoreError::Cancelled);
        assert_eq!(err.exit_code(), exit_code::SUCCESS);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err: CliError = ConfigError::Invalid {
            issues: vec!["wifi.ssid: required".into()],
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert_eq!(
            failure(Stage::AdapterResolution, CoreError::NoAdapterSelected).exit_code(),
            exit_code::USAGE
        );
    }
}
