// ── OS collaborator contracts ──
//
// The core never shells out itself. The binary supplies a `NetworkStack`
// (netsh / PowerShell on Windows) and an `AdapterPicker` (terminal
// prompt); tests supply fakes.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::CoreError;
use crate::model::{MacAddress, NetworkAdapter};

/// Exit status of an OS network command. Zero is success; any other
/// value is preserved verbatim as error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus(pub i32);

impl CommandStatus {
    pub const SUCCESS: Self = Self(0);

    pub fn success(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        // Killed by a signal: no code, report as -1.
        Self(status.code().unwrap_or(-1))
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations on the host's network stack.
///
/// `Err` means the command could not be run at all; a command that ran
/// and failed returns `Ok` with a non-zero [`CommandStatus`].
pub trait NetworkStack: Send + Sync + 'static {
    /// Enumerate adapters. Failures are fatal to the run.
    fn list_adapters(&self) -> impl Future<Output = Result<Vec<NetworkAdapter>, CoreError>> + Send;

    /// Install a join profile from an XML file on disk.
    fn install_profile(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<CommandStatus, CoreError>> + Send;

    /// Remove a previously installed profile by SSID.
    fn remove_profile(
        &self,
        ssid: &str,
    ) -> impl Future<Output = Result<CommandStatus, CoreError>> + Send;

    /// Associate `adapter` with the network `ssid`.
    fn join(
        &self,
        adapter: &str,
        ssid: &str,
    ) -> impl Future<Output = Result<CommandStatus, CoreError>> + Send;

    /// Current non-internal IPv4 address of `adapter`, if any.
    fn ipv4_address(
        &self,
        adapter: &str,
    ) -> impl Future<Output = Result<Option<Ipv4Addr>, CoreError>> + Send;
}

/// Interactive fallback when no configured selector matched.
pub trait AdapterPicker: Send + Sync {
    /// Let the operator choose an adapter; `None` when they declined.
    fn pick(
        &self,
        adapters: &[NetworkAdapter],
    ) -> impl Future<Output = Result<Option<MacAddress>, CoreError>> + Send;
}

/// Whether an address counts as "acquired" on the setup AP.
///
/// Loopback is internal. Link-local (169.254/16) is what Windows assigns
/// while DHCP is still pending, so it does not count either.
pub fn is_usable_ipv4(addr: Ipv4Addr) -> bool {
    !addr.is_loopback() && !addr.is_link_local() && !addr.is_unspecified()
}
