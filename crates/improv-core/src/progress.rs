// ── Provisioning progress events ──
//
// The orchestrator reports every stage transition through a `ProgressSink`.
// Rendering is the consumer's business; the core only emits.

use serde::Serialize;
use tokio::sync::mpsc;

/// Stages of a provisioning run, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    AdapterResolution,
    ProfileInstall,
    ApJoin,
    IpAcquired,
    PortalReady,
    CredentialSubmit,
}

impl Stage {
    /// Short operator-facing description.
    pub fn title(self) -> &'static str {
        match self {
            Self::AdapterResolution => "Selecting network adapter",
            Self::ProfileInstall => "Setting up network",
            Self::ApJoin => "Connecting to AP",
            Self::IpAcquired => "Waiting for IP address",
            Self::PortalReady => "Waiting for Captive Portal",
            Self::CredentialSubmit => "Sending credentials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
    },
    StageSucceeded {
        stage: Stage,
        /// e.g. the chosen adapter or the acquired address.
        detail: Option<String>,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    /// Terminal: the device accepted the credentials.
    Provisioned,
    /// Terminal: the device answered the submission with an error status.
    ProvisioningFailed {
        status: u16,
    },
    /// Terminal: a stage failed and the run stopped.
    Aborted {
        stage: Stage,
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Provisioned | Self::ProvisioningFailed { .. } | Self::Aborted { .. }
        )
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}
