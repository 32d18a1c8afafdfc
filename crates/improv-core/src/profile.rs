// ── Temporary AP profile ──
//
// Render a WLAN profile for the setup AP, hand it to the OS through a
// throwaway file, and give back what is needed to remove it again. The
// file only transports the XML; it is deleted right after installation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::cleanup::{CleanupAction, CleanupHandle, CleanupRegistry};
use crate::config::{AccessPointConfig, Security};
use crate::error::{CleanupError, CoreError};
use crate::network::NetworkStack;

const PROFILE_NAMESPACE: &str = "http://www.microsoft.com/networking/WLAN/profile/v1";

/// An installed, ephemeral join profile for the setup AP.
#[derive(Debug, Clone)]
pub struct TempProfile {
    pub ssid: String,
    pub xml: String,
    /// Where the XML was written for installation. Already deleted.
    pub path: PathBuf,
    pub security: Security,
}

impl TempProfile {
    /// Release action that removes this profile from the OS by SSID.
    pub fn cleanup_action<S: NetworkStack>(&self, stack: Arc<S>) -> CleanupAction {
        let ssid = self.ssid.clone();
        Box::new(move || Box::pin(async move { remove_profile(stack.as_ref(), &ssid).await }))
    }

    /// Register [`Self::cleanup_action`] with `registry`.
    ///
    /// Call immediately after [`create_temp_profile`] returns, before any
    /// other stage can fail.
    pub fn register_cleanup<S: NetworkStack>(
        &self,
        registry: &CleanupRegistry,
        stack: Arc<S>,
    ) -> CleanupHandle {
        registry.register(
            format!("remove profile '{}'", self.ssid),
            self.cleanup_action(stack),
        )
    }
}

/// Remove an installed profile by SSID. Failures are reported, not escalated.
pub async fn remove_profile<S: NetworkStack>(stack: &S, ssid: &str) -> Result<(), CleanupError> {
    let label = format!("remove profile '{ssid}'");
    match stack.remove_profile(ssid).await {
        Ok(status) if status.success() => {
            info!(ssid, "removed temporary Wi-Fi profile");
            Ok(())
        }
        Ok(status) => Err(CleanupError::new(label, format!("exit status {status}"))),
        Err(e) => Err(CleanupError::new(label, e)),
    }
}

/// Validate, render, write, install, and delete the transport file.
pub async fn create_temp_profile<S: NetworkStack>(
    config: &AccessPointConfig,
    stack: &S,
) -> Result<TempProfile, CoreError> {
    let xml = render_profile_xml(config)?;

    let mut file = tempfile::Builder::new()
        .prefix("wifi-")
        .suffix(".xml")
        .tempfile()?;
    file.write_all(xml.as_bytes())?;
    file.flush()?;

    // Close our handle so the OS tool can open the file freely; the path
    // still deletes itself on drop if anything below bails out early.
    let temp_path = file.into_temp_path();
    let path = temp_path.to_path_buf();
    debug!(path = %path.display(), ssid = %config.ssid, "installing temporary Wi-Fi profile");

    let status = stack.install_profile(&path).await;

    if let Err(e) = temp_path.close() {
        warn!(path = %path.display(), error = %e, "failed to delete temporary profile file");
    }

    let status = status?;
    if !status.success() {
        return Err(CoreError::ProfileInstallFailed {
            ssid: config.ssid.clone(),
            status: status.code(),
        });
    }

    info!(ssid = %config.ssid, security = %config.security, "installed temporary Wi-Fi profile");
    Ok(TempProfile {
        ssid: config.ssid.clone(),
        xml,
        path,
        security: config.security,
    })
}

/// Render the WLAN profile document for `config`.
///
/// Fails with [`CoreError::InvalidSecurityConfig`] when `wpa2-psk` has no
/// password. Every user-controlled string is XML-escaped.
pub fn render_profile_xml(config: &AccessPointConfig) -> Result<String, CoreError> {
    config.validate()?;

    let ssid = escape_xml(&config.ssid);
    let security = match config.security {
        Security::Open => "
      <authEncryption>
        <authentication>open</authentication>
        <encryption>none</encryption>
        <useOneX>false</useOneX>
      </authEncryption>"
            .to_owned(),
        Security::Wpa2Psk => {
            let key = config
                .password
                .as_ref()
                .map(|p| escape_xml(p.expose_secret()))
                .ok_or(CoreError::InvalidSecurityConfig {
                    security: config.security,
                })?;
            format!(
                "
      <authEncryption>
        <authentication>WPA2PSK</authentication>
        <encryption>AES</encryption>
        <useOneX>false</useOneX>
      </authEncryption>
      <sharedKey>
        <keyType>passPhrase</keyType>
        <protected>false</protected>
        <keyMaterial>{key}</keyMaterial>
      </sharedKey>"
            )
        }
    };

    Ok(format!(
        r#"<?xml version="1.0"?>
<WLANProfile xmlns="{PROFILE_NAMESPACE}">
  <name>{ssid}</name>
  <SSIDConfig>
    <SSID>
      <name>{ssid}</name>
    </SSID>
  </SSIDConfig>
  <connectionType>ESS</connectionType>
  <connectionMode>manual</connectionMode>
  <MSM>
    <security>{security}</security>
  </MSM>
</WLANProfile>"#
    ))
}

/// Escape `< > & " '` for use in XML text and attribute values.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
