// ── Captive portal readiness and hand-off ──
//
// Wraps the single-shot `improv_api::PortalClient` calls with the polling
// budget from `Timing` and folds transport errors into `CoreError`.

use improv_api::{PortalClient, SubmitOutcome, TransportConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::{Timing, WifiCredentials};
use crate::error::CoreError;
use crate::retry::{RetryBudget, RetryError, millis, retry};

pub struct CaptivePortal {
    client: PortalClient,
    budget: RetryBudget,
}

impl CaptivePortal {
    pub fn new(client: PortalClient, budget: RetryBudget) -> Self {
        Self { client, budget }
    }

    /// Build a portal client for `base_url` with the timeouts in `timing`.
    pub fn from_timing(base_url: Url, timing: &Timing) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            probe_timeout: timing.probe_timeout,
            submit_timeout: timing.submit_timeout,
        };
        let client = PortalClient::new(base_url, transport)?;
        Ok(Self::new(client, timing.portal_budget))
    }

    pub fn base_url(&self) -> &Url {
        self.client.base_url()
    }

    /// Poll `GET /` until the portal answers 2xx or the budget runs out.
    pub async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        debug!(url = %self.client.base_url(), "waiting for captive portal");

        let result = retry(self.budget, cancel, |attempt| async move {
            debug!(attempt, "probing captive portal");
            self.client.probe().await
        })
        .await;

        match result {
            Ok(()) => {
                info!(url = %self.client.base_url(), "captive portal is ready");
                Ok(())
            }
            Err(RetryError::Cancelled) => Err(CoreError::Cancelled),
            Err(RetryError::Exhausted { last, .. }) => Err(CoreError::Timeout {
                operation: "captive portal".into(),
                timeout_ms: millis(self.budget.max_elapsed),
                last_error: Some(last.to_string()),
            }),
        }
    }

    /// Send the target network credentials. `Failed` is a normal outcome.
    pub async fn submit_credentials(
        &self,
        credentials: &WifiCredentials,
    ) -> Result<SubmitOutcome, CoreError> {
        let outcome = self
            .client
            .submit_credentials(&credentials.ssid, &credentials.password)
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn timing() -> Timing {
        Timing {
            portal_budget: RetryBudget::new(Duration::from_millis(600), Duration::from_millis(50)),
            probe_timeout: Duration::from_millis(200),
            ..Timing::default()
        }
    }

    fn portal(server: &MockServer) -> CaptivePortal {
        CaptivePortal::from_timing(Url::parse(&server.uri()).unwrap(), &timing()).unwrap()
    }

    #[tokio::test]
    async fn ready_once_portal_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let portal = portal(&server);
        portal
            .wait_for_ready(&CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn never_ready_times_out_with_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let portal = portal(&server);
        let err = portal
            .wait_for_ready(&CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            CoreError::Timeout {
                operation,
                last_error,
                ..
            } => {
                assert_eq!(operation, "captive portal");
                assert!(last_error.unwrap().contains("503"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_wait_reports_cancelled() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let portal = portal(&server);
        let err = portal.wait_for_ready(&cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
