//! Clap derive structures for the `improv` CLI.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use improv_config::ConfigOverrides;
use improv_core::Security;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// improv -- send Wi-Fi credentials to an ESPHome device via its captive portal
#[derive(Debug, Parser)]
#[command(
    name = "improv",
    version,
    about = "Send Wi-Fi credentials to an ESPHome device via its captive portal",
    long_about = "Joins the device's setup access point with a temporary Wi-Fi profile,\n\
        waits for the captive portal, and submits the target network credentials.\n\n\
        Settings come from a YAML config file, IMPROV_* environment variables,\n\
        and the flags below, in increasing order of priority."
)]
pub struct Cli {
    /// Setup AP SSID
    #[arg(long, value_name = "SSID")]
    pub ap_ssid: Option<String>,

    /// Setup AP password
    #[arg(long, value_name = "PASSWORD")]
    pub ap_password: Option<String>,

    /// Setup AP security (defaults to wpa2-psk when a password is given)
    #[arg(long, value_name = "MODE")]
    pub ap_security: Option<SecurityArg>,

    /// Wi-Fi SSID the device should join
    #[arg(long, value_name = "SSID")]
    pub wifi_ssid: Option<String>,

    /// Wi-Fi password
    #[arg(long, value_name = "PASSWORD")]
    pub wifi_password: Option<String>,

    /// Network interface name
    #[arg(long, value_name = "NAME")]
    pub interface_name: Option<String>,

    /// Network interface MAC address (wins over --interface-name)
    #[arg(long, value_name = "MAC")]
    pub interface_mac: Option<String>,

    /// Path to the config file [default: ./config.yaml]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Captive portal base URL
    #[arg(
        long,
        env = "IMPROV_PORTAL_URL",
        default_value = improv_core::DEFAULT_PORTAL_URL,
        hide = true
    )]
    pub portal_url: Url,

    /// When to use color output
    #[arg(long, default_value = "auto")]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Flag values layered on top of the config file and environment.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            ap_ssid: self.ap_ssid.clone(),
            ap_password: self.ap_password.clone(),
            ap_security: self.ap_security.map(Security::from),
            wifi_ssid: self.wifi_ssid.clone(),
            wifi_password: self.wifi_password.clone(),
            interface_name: self.interface_name.clone(),
            interface_mac: self.interface_mac.clone(),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecurityArg {
    /// No encryption
    Open,
    /// WPA2 personal (pre-shared key)
    Wpa2Psk,
}

impl From<SecurityArg> for Security {
    fn from(arg: SecurityArg) -> Self {
        match arg {
            SecurityArg::Open => Security::Open,
            SecurityArg::Wpa2Psk => Security::Wpa2Psk,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}
