// ── Provisioning orchestrator ──
//
// Drives one run through its stages, strictly in sequence:
//
//   AdapterResolution → ProfileInstall → ApJoin → IpAcquired
//     → PortalReady → CredentialSubmit
//
// The temporary profile's cleanup is registered the moment it exists and
// run through its handle before `run` returns, whatever the outcome. The
// shared registry only sees it if the process is interrupted mid-run.

use std::net::Ipv4Addr;
use std::sync::Arc;

use improv_api::{DEFAULT_PORTAL_URL, SubmitOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::{find_adapter_by_mac, resolve_configured};
use crate::cleanup::CleanupRegistry;
use crate::config::ProvisionConfig;
use crate::error::CoreError;
use crate::model::NetworkAdapter;
use crate::network::{AdapterPicker, NetworkStack, is_usable_ipv4};
use crate::portal::CaptivePortal;
use crate::profile::create_temp_profile;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink, Stage};
use crate::retry::{RetryError, millis, retry};

/// How a run ended when no stage aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The device accepted the credentials (or dropped the connection
    /// while applying them).
    Provisioned { adapter: String },
    /// The device answered the submission with a non-success status.
    Rejected { status: u16 },
}

/// The stage that aborted a run and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: CoreError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: CoreError) -> Self {
        Self { stage, error }
    }

    /// Whether the run stopped before the device was reachable over HTTP.
    pub fn is_setup_failure(&self) -> bool {
        !matches!(self.stage, Stage::CredentialSubmit)
    }
}

/// Why one address poll did not produce a usable address yet.
#[derive(Debug, thiserror::Error)]
enum AddressPoll {
    #[error("no IPv4 address yet")]
    Missing,
    #[error("only {0} assigned so far")]
    NotUsable(Ipv4Addr),
    #[error(transparent)]
    Stack(#[from] CoreError),
}

/// Stop before `stage` once the run has been cancelled.
fn checkpoint(stage: Stage, cancel: &CancellationToken) -> Result<(), StageFailure> {
    if cancel.is_cancelled() {
        debug!(%stage, "cancelled before stage");
        return Err(StageFailure::new(stage, CoreError::Cancelled));
    }
    Ok(())
}

/// Runs provisioning against a [`NetworkStack`], asking `P` when the
/// configured adapter selector matches nothing.
pub struct Provisioner<S, P> {
    stack: Arc<S>,
    picker: P,
    cleanup: CleanupRegistry,
    progress: Arc<dyn ProgressSink>,
    portal_url: Url,
}

impl<S: NetworkStack, P: AdapterPicker> Provisioner<S, P> {
    pub fn new(stack: Arc<S>, picker: P, cleanup: CleanupRegistry) -> Result<Self, CoreError> {
        let portal_url = Url::parse(DEFAULT_PORTAL_URL)
            .map_err(|e| CoreError::Internal(format!("Invalid portal URL: {e}")))?;
        Ok(Self {
            stack,
            picker,
            cleanup,
            progress: Arc::new(NoProgress),
            portal_url,
        })
    }

    /// Report stage transitions to `sink`.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Talk to the portal at `url` instead of the device's gateway address.
    #[must_use]
    pub fn with_portal_url(mut self, url: Url) -> Self {
        self.portal_url = url;
        self
    }

    /// Provision the device described by `config`.
    ///
    /// `Ok` covers both terminal device answers; `Err` means a stage
    /// aborted. The temporary profile is removed before this returns.
    pub async fn run(
        &self,
        config: &ProvisionConfig,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, StageFailure> {
        let result = self.provision(config, cancel).await;

        match &result {
            Ok(ProvisionOutcome::Provisioned { .. }) => {
                info!(ssid = %config.wifi.ssid, "device provisioned");
                self.progress.emit(ProgressEvent::Provisioned);
            }
            Ok(ProvisionOutcome::Rejected { status }) => {
                warn!(status, "device rejected the credentials");
                self.progress
                    .emit(ProgressEvent::ProvisioningFailed { status: *status });
            }
            Err(failure) => {
                warn!(stage = %failure.stage, error = %failure.error, "provisioning aborted");
                self.progress.emit(ProgressEvent::Aborted {
                    stage: failure.stage,
                    error: failure.error.to_string(),
                });
            }
        }
        result
    }

    async fn provision(
        &self,
        config: &ProvisionConfig,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, StageFailure> {
        // Reject a bad AP config before touching the OS at all.
        if let Err(error) = config.ap.validate() {
            self.stage(Stage::ProfileInstall, std::future::ready(Err(error)), |()| None)
                .await?;
        }

        let adapter = self
            .stage(Stage::AdapterResolution, self.resolve_adapter(config), |a| {
                Some(format!("{} @ {}", a.name, a.mac))
            })
            .await?;
        info!(adapter = %adapter.name, mac = %adapter.mac, "using network adapter");

        checkpoint(Stage::ProfileInstall, cancel)?;
        let profile = self
            .stage(
                Stage::ProfileInstall,
                create_temp_profile(&config.ap, self.stack.as_ref()),
                |p| Some(p.ssid.clone()),
            )
            .await?;
        let handle = profile.register_cleanup(&self.cleanup, Arc::clone(&self.stack));

        let result = self.run_on_ap(config, &adapter, cancel).await;

        if let Err(e) = handle.run().await {
            // Already logged by the handle; never changes the outcome.
            debug!(error = %e, "temporary profile removal failed");
        }
        result
    }

    /// Stages that run while the temporary profile is installed.
    async fn run_on_ap(
        &self,
        config: &ProvisionConfig,
        adapter: &NetworkAdapter,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, StageFailure> {
        checkpoint(Stage::ApJoin, cancel)?;
        self.stage(Stage::ApJoin, self.join(adapter, &config.ap.ssid), |()| None)
            .await?;

        let ip = self
            .stage(
                Stage::IpAcquired,
                self.wait_for_ip(adapter, config, cancel),
                |ip| Some(ip.to_string()),
            )
            .await?;
        info!(adapter = %adapter.name, %ip, "acquired address on setup AP");

        let portal = CaptivePortal::from_timing(self.portal_url.clone(), &config.timing)
            .map_err(|e| StageFailure::new(Stage::PortalReady, e))?;
        self.stage(Stage::PortalReady, portal.wait_for_ready(cancel), |()| None)
            .await?;

        checkpoint(Stage::CredentialSubmit, cancel)?;
        let outcome = self
            .stage(
                Stage::CredentialSubmit,
                portal.submit_credentials(&config.wifi),
                |o| match o {
                    SubmitOutcome::Sent => None,
                    SubmitOutcome::Failed { status } => Some(format!("HTTP {status}")),
                },
            )
            .await?;

        Ok(match outcome {
            SubmitOutcome::Sent => ProvisionOutcome::Provisioned {
                adapter: adapter.name.clone(),
            },
            SubmitOutcome::Failed { status } => ProvisionOutcome::Rejected { status },
        })
    }

    async fn resolve_adapter(
        &self,
        config: &ProvisionConfig,
    ) -> Result<NetworkAdapter, CoreError> {
        let adapters = self.stack.list_adapters().await.map_err(|e| match e {
            CoreError::AdapterEnumeration { .. } => e,
            other => CoreError::AdapterEnumeration {
                reason: other.to_string(),
            },
        })?;
        debug!(count = adapters.len(), "enumerated network adapters");

        if let Some(found) = resolve_configured(&config.interface, &adapters) {
            return Ok(found.clone());
        }
        debug!(selector = ?config.interface, "no configured adapter matched, asking operator");

        let chosen = self
            .picker
            .pick(&adapters)
            .await?
            .ok_or(CoreError::NoAdapterSelected)?;
        find_adapter_by_mac(&adapters, &chosen)
            .cloned()
            .ok_or(CoreError::NoAdapterSelected)
    }

    async fn join(&self, adapter: &NetworkAdapter, ssid: &str) -> Result<(), CoreError> {
        let status = self.stack.join(&adapter.name, ssid).await?;
        if status.success() {
            Ok(())
        } else {
            Err(CoreError::JoinFailed {
                adapter: adapter.name.clone(),
                ssid: ssid.to_owned(),
                status: status.code(),
            })
        }
    }

    async fn wait_for_ip(
        &self,
        adapter: &NetworkAdapter,
        config: &ProvisionConfig,
        cancel: &CancellationToken,
    ) -> Result<Ipv4Addr, CoreError> {
        let budget = config.timing.ip_budget;
        let result = retry(budget, cancel, |attempt| async move {
            debug!(attempt, adapter = %adapter.name, "checking for IPv4 address");
            match self.stack.ipv4_address(&adapter.name).await? {
                Some(ip) if is_usable_ipv4(ip) => Ok(ip),
                Some(ip) => Err(AddressPoll::NotUsable(ip)),
                None => Err(AddressPoll::Missing),
            }
        })
        .await;

        match result {
            Ok(ip) => Ok(ip),
            Err(RetryError::Cancelled) => Err(CoreError::Cancelled),
            Err(RetryError::Exhausted { last, .. }) => Err(CoreError::Timeout {
                operation: format!("an IPv4 address on '{}'", adapter.name),
                timeout_ms: millis(budget.max_elapsed),
                last_error: Some(last.to_string()),
            }),
        }
    }

    /// Run one stage, bracketing it with progress events and logs.
    async fn stage<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T, CoreError>>,
        detail: impl FnOnce(&T) -> Option<String>,
    ) -> Result<T, StageFailure> {
        debug!(%stage, "stage started");
        self.progress.emit(ProgressEvent::StageStarted { stage });

        match work.await {
            Ok(value) => {
                info!(%stage, "stage succeeded");
                self.progress.emit(ProgressEvent::StageSucceeded {
                    stage,
                    detail: detail(&value),
                });
                Ok(value)
            }
            Err(error) => {
                warn!(%stage, error = %error, "stage failed");
                self.progress.emit(ProgressEvent::StageFailed {
                    stage,
                    error: error.to_string(),
                });
                Err(StageFailure::new(stage, error))
            }
        }
    }
}
