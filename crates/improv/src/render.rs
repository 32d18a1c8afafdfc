//! Terminal presentation: banner, per-stage spinners, closing notes.
//!
//! Consumes the core's `ProgressEvent` stream. Spinners draw on stderr
//! and vanish on non-interactive terminals; the final line of every stage
//! is always printed to stdout.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::sync::mpsc;

use improv_core::{ProgressEvent, Stage};

use crate::cli::ColorMode;

const BAR: &str = "│";

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Static output ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Ui {
    color: bool,
}

impl Ui {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> String) -> String {
        if self.color {
            style(text)
        } else {
            text.to_owned()
        }
    }

    fn gray(&self, text: &str) -> String {
        self.paint(text, |s| s.bright_black().to_string())
    }

    fn green(&self, text: &str) -> String {
        self.paint(text, |s| s.green().to_string())
    }

    fn red(&self, text: &str) -> String {
        self.paint(text, |s| s.red().to_string())
    }

    pub fn intro(&self, config_path: &Path, target: &str) {
        println!();
        println!(
            "┌  {}",
            self.paint(" Improv // via Captive Portal ", |s| s
                .black()
                .on_bright_blue()
                .bold()
                .to_string())
        );
        println!("{BAR}");
        println!("{BAR}  {}", self.gray(&format!("Version: {}", env!("CARGO_PKG_VERSION"))));
        println!("{BAR}  {}", self.gray(&format!("Config : {}", config_path.display())));
        println!("{BAR}  {}", self.gray(&format!("Target : {target}")));
        println!("{BAR}");
    }

    pub fn note(&self, body: &str) {
        println!("{BAR}");
        println!("◇  {}", self.paint("Note.", |s| s.bold().to_string()));
        for line in body.lines() {
            println!("{BAR}  {line}");
        }
        println!("{BAR}");
    }

    pub fn outro(&self, message: &str) {
        println!("└  {message}");
        println!();
    }

    fn header(&self, title: &str) {
        println!("◇  {}", self.paint(title, |s| s.bold().to_string()));
    }

    fn stage_line(&self, title: &str, status: &str) {
        println!("{BAR}  {} {} {status}", self.gray("↳"), self.gray(&format!("{title} ...")));
    }

    fn detail_line(&self, text: &str) {
        println!("{BAR}    {}", self.gray(text));
    }
}

// ── Progress rendering ───────────────────────────────────────────────

/// Visual group a stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Adapter,
    Connect,
    Provision,
}

fn group_of(stage: Stage) -> Group {
    match stage {
        Stage::AdapterResolution => Group::Adapter,
        Stage::ProfileInstall | Stage::ApJoin | Stage::IpAcquired | Stage::PortalReady => {
            Group::Connect
        }
        Stage::CredentialSubmit => Group::Provision,
    }
}

fn group_title(group: Group) -> &'static str {
    match group {
        Group::Adapter => "Selecting network adapter",
        Group::Connect => "Connecting to device",
        Group::Provision => "Provisioning device",
    }
}

fn spinner(message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("{prefix}{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("◒◐◓◑●");
    let pb = ProgressBar::new_spinner()
        .with_style(style)
        .with_prefix(format!("{BAR}  "))
        .with_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

struct Renderer {
    ui: Ui,
    group: Option<Group>,
    active: Option<ProgressBar>,
}

impl Renderer {
    fn clear_spinner(&mut self) {
        if let Some(pb) = self.active.take() {
            pb.finish_and_clear();
        }
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => {
                let group = group_of(stage);
                if self.group != Some(group) {
                    self.group = Some(group);
                    // The adapter prompt owns the terminal during resolution.
                    if group != Group::Adapter {
                        self.ui.header(group_title(group));
                    }
                }
                if group != Group::Adapter {
                    self.active = Some(spinner(format!("{}...", stage.title())));
                }
            }
            ProgressEvent::StageSucceeded { stage, detail } => {
                self.clear_spinner();
                match (stage, detail) {
                    (Stage::AdapterResolution, Some(adapter)) => {
                        println!("{BAR}  {} {}", self.ui.gray("Adapter:"), adapter);
                        println!("{BAR}");
                    }
                    (Stage::CredentialSubmit, None) => {
                        self.ui.stage_line("Credentials", &self.ui.green("SENT"));
                    }
                    (Stage::CredentialSubmit, Some(answer)) => {
                        self.ui.stage_line("Credentials", &self.ui.red("REJECTED"));
                        self.ui.detail_line(&format!("Device answered {answer}"));
                    }
                    (Stage::AdapterResolution, None) => {}
                    (stage, detail) => {
                        self.ui.stage_line(stage.title(), &self.ui.green("DONE"));
                        if let Some(detail) = detail.filter(|_| stage == Stage::IpAcquired) {
                            self.ui.detail_line(&detail);
                        }
                    }
                }
            }
            ProgressEvent::StageFailed { stage, error } => {
                self.clear_spinner();
                if stage != Stage::AdapterResolution {
                    self.ui.stage_line(stage.title(), &self.ui.red("FAILED"));
                    self.ui.detail_line(&error);
                }
            }
            ProgressEvent::Provisioned => {
                self.ui.note(
                    "Credentials are sent directly to the device,\n\
                     without any verification of correctness.",
                );
                self.ui.outro("Device provisioned");
            }
            ProgressEvent::ProvisioningFailed { .. } => {
                self.ui.outro("Check your configuration and try again.");
            }
            ProgressEvent::Aborted { stage, .. } => {
                self.clear_spinner();
                match group_of(stage) {
                    Group::Connect => self.ui.outro("Check AP and try again."),
                    Group::Provision => self.ui.outro("Check your configuration and try again."),
                    Group::Adapter => self.ui.outro("No adapter, nothing to do."),
                }
            }
        }
    }
}

/// Render events until the sender side is dropped.
pub async fn render_progress(mut events: mpsc::UnboundedReceiver<ProgressEvent>, ui: Ui) {
    let mut renderer = Renderer {
        ui,
        group: None,
        active: None,
    };
    while let Some(event) = events.recv().await {
        renderer.handle(event);
    }
    renderer.clear_spinner();
}
