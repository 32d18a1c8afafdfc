// ── Network adapter domain types ──
//
// Adapters come from the OS enumeration collaborator. The MAC address is
// the stable identity; names can change between reboots or locales.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address compared by its normalized form.
///
/// Normalization lowercases the input and strips every non-hex character,
/// so `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` and `aabb.ccdd.eeff` are
/// the same address. The raw form is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MacAddress {
    raw: String,
    normalized: String,
}

impl MacAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_mac(&raw);
        Self { raw, normalized }
    }

    /// Lowercase hex digits only (e.g. `aabbccddeeff`).
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The address as the OS or user wrote it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Lowercase, then drop everything that is not a hex digit.
pub fn normalize_mac(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(char::is_ascii_hexdigit)
        .collect()
}

impl PartialEq for MacAddress {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for MacAddress {}

impl std::hash::Hash for MacAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for MacAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for MacAddress {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.raw
    }
}

// ── NetworkAdapter ──────────────────────────────────────────────────

/// An OS-visible network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub name: String,
    pub description: String,
    /// OS-reported link status (e.g. `Up`, `Disconnected`).
    pub status: String,
    pub mac: MacAddress,
}

impl NetworkAdapter {
    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("up")
    }
}
