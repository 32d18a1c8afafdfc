//! `NetworkStack` backed by `netsh wlan` and PowerShell networking cmdlets.

use std::net::Ipv4Addr;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use improv_core::{CommandStatus, CoreError, MacAddress, NetworkAdapter, NetworkStack, is_usable_ipv4};

const ADAPTER_QUERY: &str =
    "Get-NetAdapter | Select-Object Name,InterfaceDescription,Status,MacAddress | ConvertTo-Json";

/// Windows WLAN stack driven through command-line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetshStack;

impl NetshStack {
    pub fn new() -> Self {
        Self
    }

    async fn netsh(args: &[String]) -> Result<CommandStatus, CoreError> {
        let command_line = format!("netsh {}", args.join(" "));
        debug!(command = %command_line, "running");

        let status = Command::new("netsh")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| CoreError::Command {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        let status = CommandStatus::from(status);
        trace!(command = %command_line, %status, "finished");
        Ok(status)
    }

    /// Run a PowerShell script and return its stdout.
    async fn powershell(script: &str) -> Result<String, CoreError> {
        trace!(script, "running powershell");
        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::Command {
                command: "powershell".into(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CoreError::Command {
                command: "powershell".into(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl NetworkStack for NetshStack {
    async fn list_adapters(&self) -> Result<Vec<NetworkAdapter>, CoreError> {
        let json = Self::powershell(ADAPTER_QUERY)
            .await
            .map_err(|e| CoreError::AdapterEnumeration {
                reason: e.to_string(),
            })?;
        parse_adapters(&json)
    }

    async fn install_profile(&self, path: &Path) -> Result<CommandStatus, CoreError> {
        Self::netsh(&[
            "wlan".into(),
            "add".into(),
            "profile".into(),
            format!("filename={}", path.display()),
        ])
        .await
    }

    async fn remove_profile(&self, ssid: &str) -> Result<CommandStatus, CoreError> {
        Self::netsh(&[
            "wlan".into(),
            "delete".into(),
            "profile".into(),
            format!("name={ssid}"),
        ])
        .await
    }

    async fn join(&self, adapter: &str, ssid: &str) -> Result<CommandStatus, CoreError> {
        Self::netsh(&[
            "wlan".into(),
            "connect".into(),
            format!("name={ssid}"),
            format!("interface={adapter}"),
        ])
        .await
    }

    async fn ipv4_address(&self, adapter: &str) -> Result<Option<Ipv4Addr>, CoreError> {
        let json = Self::powershell(&ipv4_query(adapter)).await?;
        Ok(parse_ipv4(&json))
    }
}

// ── PowerShell output parsing ────────────────────────────────────────

/// `ConvertTo-Json` emits a bare object for a single result.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsAdapter {
    name: String,
    #[serde(default)]
    interface_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    mac_address: Option<String>,
}

impl From<PsAdapter> for NetworkAdapter {
    fn from(a: PsAdapter) -> Self {
        Self {
            name: a.name,
            description: a.interface_description.unwrap_or_default(),
            status: a.status.unwrap_or_default(),
            mac: MacAddress::new(a.mac_address.unwrap_or_default()),
        }
    }
}

fn parse_adapters(json: &str) -> Result<Vec<NetworkAdapter>, CoreError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: OneOrMany<PsAdapter> =
        serde_json::from_str(json).map_err(|e| CoreError::AdapterEnumeration {
            reason: format!("unexpected Get-NetAdapter output: {e}"),
        })?;
    Ok(parsed.into_vec().into_iter().map(NetworkAdapter::from).collect())
}

fn ipv4_query(adapter: &str) -> String {
    format!(
        "Get-NetIPAddress -InterfaceAlias {} -AddressFamily IPv4 -ErrorAction SilentlyContinue \
         | Select-Object -ExpandProperty IPAddress | ConvertTo-Json",
        ps_quote(adapter)
    )
}

/// First usable address in `Get-NetIPAddress` JSON output, if any.
fn parse_ipv4(json: &str) -> Option<Ipv4Addr> {
    let parsed: OneOrMany<String> = serde_json::from_str(json.trim()).ok()?;
    parsed
        .into_vec()
        .iter()
        .filter_map(|s| s.parse::<Ipv4Addr>().ok())
        .find(|ip| is_usable_ipv4(*ip))
}

/// Single-quoted PowerShell string literal.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
