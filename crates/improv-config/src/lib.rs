//! Configuration loading for the `improv` CLI.
//!
//! YAML (or TOML) config file, `IMPROV_`-prefixed environment, and CLI
//! flags, merged with figment in that order of increasing priority and
//! validated into an `improv_core::ProvisionConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use improv_core::{
    AccessPointConfig, CoreError, InterfaceSelector, ProvisionConfig, RetryBudget, Security,
    Timing, WifiCredentials,
};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const ENV_PREFIX: &str = "IMPROV_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config validation failed: {}", issues.join("; "))]
    Invalid { issues: Vec<String> },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Raw config structs ──────────────────────────────────────────────
//
// Everything optional: required fields are enforced in `validate` so that
// one pass can report every missing setting.

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    #[serde(default)]
    pub ap: RawAccessPoint,

    #[serde(default)]
    pub wifi: RawWifi,

    #[serde(default)]
    pub interface: RawInterface,

    #[serde(default)]
    pub timing: RawTiming,
}

/// The device's setup AP.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawAccessPoint {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// `open` or `wpa2-psk`; derived from `password` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
}

/// Network the device should join.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawWifi {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Adapter selection. `mac` wins over `name`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawInterface {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// Scalar that may stand in for a string. Environment values and unquoted
/// YAML such as `password: 12345678` arrive as numbers or booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

/// Accept a string, number or boolean and keep its textual form.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(s) => s,
        Scalar::Bool(b) => b.to_string(),
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
    }))
}

/// Optional overrides of the polling budgets.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawTiming {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_timeout_ms: Option<u64>,
}

impl RawTiming {
    fn resolve(&self) -> Timing {
        let defaults = Timing::default();
        let secs = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_secs);
        let ms = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_millis);

        Timing {
            ip_budget: RetryBudget::new(
                secs(self.ip_timeout_secs, defaults.ip_budget.max_elapsed),
                ms(self.ip_interval_ms, defaults.ip_budget.interval),
            ),
            portal_budget: RetryBudget::new(
                secs(self.portal_timeout_secs, defaults.portal_budget.max_elapsed),
                ms(self.portal_interval_ms, defaults.portal_budget.interval),
            ),
            probe_timeout: ms(self.probe_timeout_ms, defaults.probe_timeout),
            submit_timeout: ms(self.submit_timeout_ms, defaults.submit_timeout),
        }
    }
}

// ── Flag overrides ──────────────────────────────────────────────────

/// Values given on the command line. `None` leaves lower layers alone.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub ap_ssid: Option<String>,
    pub ap_password: Option<String>,
    pub ap_security: Option<Security>,
    pub wifi_ssid: Option<String>,
    pub wifi_password: Option<String>,
    pub interface_name: Option<String>,
    pub interface_mac: Option<String>,
}

impl ConfigOverrides {
    fn to_raw(&self) -> RawConfig {
        RawConfig {
            ap: RawAccessPoint {
                ssid: self.ap_ssid.clone(),
                password: self.ap_password.clone(),
                security: self.ap_security,
            },
            wifi: RawWifi {
                ssid: self.wifi_ssid.clone(),
                password: self.wifi_password.clone(),
            },
            interface: RawInterface {
                name: self.interface_name.clone(),
                mac: self.interface_mac.clone(),
            },
            timing: RawTiming::default(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Per-user config file via XDG / platform conventions.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "improv", "improv")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
}

/// Pick the config file: the explicit path if given, else `./config.yaml`,
/// else the per-user file if it exists. Falls back to `./config.yaml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(".").join(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    global_config_path()
        .filter(|p| p.exists())
        .unwrap_or(local)
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered figment: file < environment < flags.
pub fn figment(path: &Path, overrides: &ConfigOverrides) -> Figment {
    let mut figment = Figment::new();
    if path.exists() {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        figment = if is_toml {
            figment.merge(Toml::file(path))
        } else {
            figment.merge(Yaml::file(path))
        };
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Serialized::defaults(overrides.to_raw()))
}

/// Load and validate the provisioning config.
///
/// A missing file is fine as long as environment and flags alone form a
/// valid config; otherwise it is reported as [`ConfigError::NotFound`].
pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<ProvisionConfig, ConfigError> {
    let raw: RawConfig = figment(path, overrides).extract()?;
    match validate(&raw) {
        Ok(config) => Ok(config),
        Err(ConfigError::Invalid { .. }) if !path.exists() => Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e),
    }
}

/// Turn a merged raw config into a validated `ProvisionConfig`.
pub fn validate(raw: &RawConfig) -> Result<ProvisionConfig, ConfigError> {
    let mut issues = Vec::new();

    let ap_ssid = required(raw.ap.ssid.as_deref(), "ap.ssid", &mut issues);
    let wifi_ssid = required(raw.wifi.ssid.as_deref(), "wifi.ssid", &mut issues);
    let wifi_password = required(raw.wifi.password.as_deref(), "wifi.password", &mut issues);

    let ap = ap_ssid.and_then(|ssid| {
        let password = raw.ap.password.clone().map(SecretString::from);
        match AccessPointConfig::new(ssid, password, raw.ap.security) {
            Ok(ap) => Some(ap),
            Err(CoreError::InvalidSecurityConfig { .. }) => {
                issues.push("ap.password: password required for wpa2-psk".into());
                None
            }
            Err(e) => {
                issues.push(format!("ap: {e}"));
                None
            }
        }
    });

    match (ap, wifi_ssid, wifi_password) {
        (Some(ap), Some(ssid), Some(password)) if issues.is_empty() => Ok(ProvisionConfig {
            ap,
            wifi: WifiCredentials {
                ssid: ssid.to_owned(),
                password: SecretString::from(password.to_owned()),
            },
            interface: InterfaceSelector::from_parts(
                raw.interface.name.clone(),
                raw.interface.mac.clone(),
            ),
            timing: raw.timing.resolve(),
        }),
        _ => Err(ConfigError::Invalid { issues }),
    }
}

fn required<'a>(value: Option<&'a str>, field: &str, issues: &mut Vec<String>) -> Option<&'a str> {
    if value.is_none() {
        issues.push(format!("{field}: required"));
    }
    value
}
