//! Interactive adapter selection.

use std::io::IsTerminal;

use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use tracing::warn;

use improv_core::{AdapterPicker, CoreError, MacAddress, NetworkAdapter};

/// Terminal prompt listing every adapter as `name @ mac`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptPicker;

impl PromptPicker {
    pub fn new() -> Self {
        Self
    }
}

impl AdapterPicker for PromptPicker {
    async fn pick(&self, adapters: &[NetworkAdapter]) -> Result<Option<MacAddress>, CoreError> {
        if adapters.is_empty() {
            return Ok(None);
        }
        if !std::io::stdin().is_terminal() {
            warn!("no adapter configured and stdin is not a terminal");
            return Ok(None);
        }

        let items: Vec<String> = adapters.iter().map(adapter_label).collect();
        let macs: Vec<MacAddress> = adapters.iter().map(|a| a.mac.clone()).collect();

        // dialoguer blocks on terminal input.
        let selection = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select network interface")
                .items(&items)
                .default(0)
                .interact_opt()
        })
        .await
        .map_err(|e| CoreError::Internal(format!("adapter prompt panicked: {e}")))?
        .map_err(|e| CoreError::Internal(format!("adapter prompt failed: {e}")))?;

        Ok(selection.and_then(|i| macs.get(i).cloned()))
    }
}

/// `Name @ MAC  (description)`.
fn adapter_label(adapter: &NetworkAdapter) -> String {
    if adapter.description.is_empty() {
        format!("{} @ {}", adapter.name, adapter.mac)
    } else {
        format!("{} @ {}  ({})", adapter.name, adapter.mac, adapter.description)
    }
}
