// ── Runtime provisioning configuration ──
//
// These types describe *what* to provision and *how long* to wait.
// They carry secrets but never touch disk: `improv-config` merges the
// config file and flags, validates, and hands a `ProvisionConfig` in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::MacAddress;
use crate::retry::RetryBudget;

/// Security mode of the device's setup access point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Security {
    Open,
    #[serde(rename = "wpa2-psk")]
    #[strum(serialize = "wpa2-psk")]
    Wpa2Psk,
}

/// The device's temporary setup AP.
#[derive(Debug, Clone)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: Option<SecretString>,
    pub security: Security,
}

impl AccessPointConfig {
    /// Build an AP config, deriving `security` from the password when absent.
    ///
    /// An empty password counts as no password.
    pub fn new(
        ssid: impl Into<String>,
        password: Option<SecretString>,
        security: Option<Security>,
    ) -> Result<Self, CoreError> {
        let password = password.filter(|p| !p.expose_secret().is_empty());
        let security = security.unwrap_or(if password.is_some() {
            Security::Wpa2Psk
        } else {
            Security::Open
        });
        let config = Self {
            ssid: ssid.into(),
            password,
            security,
        };
        config.validate()?;
        Ok(config)
    }

    /// `wpa2-psk` requires a non-empty password.
    pub fn validate(&self) -> Result<(), CoreError> {
        let has_password = self
            .password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().is_empty());
        if self.security == Security::Wpa2Psk && !has_password {
            return Err(CoreError::InvalidSecurityConfig {
                security: self.security,
            });
        }
        Ok(())
    }
}

/// Target network handed to the device.
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: SecretString,
}

/// Which adapter should join the setup AP.
///
/// Evaluated in fixed precedence: MAC, then name, then nothing (interactive).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InterfaceSelector {
    Mac(MacAddress),
    Name(String),
    #[default]
    Any,
}

impl InterfaceSelector {
    /// Collapse the two optional config fields into one selector.
    /// A MAC wins over a name when both are set; blanks are ignored.
    pub fn from_parts(name: Option<String>, mac: Option<String>) -> Self {
        match (
            name.filter(|n| !n.trim().is_empty()),
            mac.filter(|m| !m.trim().is_empty()),
        ) {
            (_, Some(mac)) => Self::Mac(MacAddress::new(mac)),
            (Some(name), None) => Self::Name(name),
            (None, None) => Self::Any,
        }
    }
}

/// Time budgets for the polling stages and portal requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Waiting for the adapter to get an IPv4 address on the AP.
    pub ip_budget: RetryBudget,
    /// Waiting for the captive portal to answer `GET /`.
    pub portal_budget: RetryBudget,
    /// Per-attempt timeout of a portal readiness probe.
    pub probe_timeout: Duration,
    /// Timeout of the credential submission request.
    pub submit_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ip_budget: RetryBudget::new(Duration::from_secs(20), Duration::from_millis(500)),
            portal_budget: RetryBudget::new(Duration::from_secs(15), Duration::from_millis(400)),
            probe_timeout: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(5),
        }
    }
}

/// Fully validated input of one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub ap: AccessPointConfig,
    pub wifi: WifiCredentials,
    pub interface: InterfaceSelector,
    pub timing: Timing,
}
