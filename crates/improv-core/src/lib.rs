//! Provisioning core between `improv-api` and the `improv` binary.
//!
//! Hands Wi-Fi credentials to an ESPHome-style device through its temporary
//! setup access point:
//!
//! - **[`Provisioner`]**: Runs one provisioning attempt through its fixed
//!   stages ([`Stage`]): pick an adapter, install a temporary AP profile,
//!   join the AP, wait for an address and for the captive portal, then
//!   submit the credentials. Reports transitions through a [`ProgressSink`].
//!
//! - **[`CleanupRegistry`]**: Injectable set of release actions. The binary
//!   drains it on signals and fatal errors; the orchestrator runs its own
//!   entry through a [`CleanupHandle`] on every normal exit.
//!
//! - **[`retry()`]**: Fixed-interval poller bounded by a wall-clock
//!   [`RetryBudget`] and a cancellation token.
//!
//! - **Collaborators** ([`NetworkStack`], [`AdapterPicker`]): The OS
//!   commands and the interactive prompt live outside this crate.

pub mod adapter;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod model;
pub mod network;
pub mod orchestrator;
pub mod portal;
pub mod profile;
pub mod progress;
pub mod retry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cleanup::{CleanupAction, CleanupHandle, CleanupRegistry};
pub use config::{
    AccessPointConfig, InterfaceSelector, ProvisionConfig, Security, Timing, WifiCredentials,
};
pub use error::{CleanupError, CoreError};
pub use model::{MacAddress, NetworkAdapter, normalize_mac};
pub use network::{AdapterPicker, CommandStatus, NetworkStack, is_usable_ipv4};
pub use orchestrator::{ProvisionOutcome, Provisioner, StageFailure};
pub use portal::CaptivePortal;
pub use profile::{TempProfile, create_temp_profile, escape_xml, render_profile_xml};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, Stage};
pub use retry::{RetryBudget, RetryError, retry};

// Submission outcome comes straight from the HTTP layer.
pub use improv_api::{DEFAULT_PORTAL_URL, SubmitOutcome};
