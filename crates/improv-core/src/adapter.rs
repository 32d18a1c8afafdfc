// ── Adapter resolution ──
//
// Map the configured selector onto one enumerated adapter. No match is not
// an error here: the orchestrator falls back to the interactive picker.

use crate::config::InterfaceSelector;
use crate::model::{MacAddress, NetworkAdapter};

/// First adapter whose normalized MAC equals `mac`.
///
/// Adapters sharing a normalized MAC are indistinguishable; the first wins.
pub fn find_adapter_by_mac<'a>(
    adapters: &'a [NetworkAdapter],
    mac: &MacAddress,
) -> Option<&'a NetworkAdapter> {
    adapters.iter().find(|a| a.mac == *mac)
}

/// First adapter whose name matches exactly.
pub fn find_adapter_by_name<'a>(
    adapters: &'a [NetworkAdapter],
    name: &str,
) -> Option<&'a NetworkAdapter> {
    adapters.iter().find(|a| a.name == name)
}

/// Resolve the selector: MAC, then name, then nothing.
pub fn resolve_configured<'a>(
    selector: &InterfaceSelector,
    adapters: &'a [NetworkAdapter],
) -> Option<&'a NetworkAdapter> {
    match selector {
        InterfaceSelector::Mac(mac) => find_adapter_by_mac(adapters, mac),
        InterfaceSelector::Name(name) => find_adapter_by_name(adapters, name),
        InterfaceSelector::Any => None,
    }
}
