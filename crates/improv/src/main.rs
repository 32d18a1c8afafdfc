mod cli;
mod error;
mod netsh;
mod picker;
mod render;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use improv_core::{CleanupRegistry, ProvisionOutcome, Provisioner};

use crate::cli::Cli;
use crate::error::CliError;
use crate::netsh::NetshStack;
use crate::picker::PromptPicker;
use crate::render::{Ui, render_progress, should_color};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cleanup = CleanupRegistry::new();
    let cancel = CancellationToken::new();

    let mut task = tokio::spawn(run(cli, cleanup.clone(), cancel.clone()));

    let result = tokio::select! {
        biased;
        () = shutdown_signal() => {
            // Let the run stop at its next suspension point so an in-progress
            // OS command finishes and its cleanup gets registered.
            debug!("shutdown signal received, stopping");
            cancel.cancel();
            tokio::select! {
                biased;
                joined = &mut task => flatten(joined),
                () = shutdown_signal() => {
                    warn!("second signal received, aborting");
                    task.abort();
                    Err(CliError::Interrupted)
                }
            }
        }
        joined = &mut task => flatten(joined),
    };

    // Anything the run did not release itself (signal, panic) goes here.
    for failure in cleanup.run_all().await {
        warn!(error = %failure, "cleanup failed");
    }

    if let Err(err) = result {
        let code = err.exit_code();
        if !matches!(err, CliError::Interrupted) {
            eprintln!("{:?}", miette::Report::new(err));
        }
        std::process::exit(code);
    }
}

fn flatten(joined: Result<Result<(), CliError>, JoinError>) -> Result<(), CliError> {
    joined.unwrap_or_else(|e| Err(CliError::Internal { source: Box::new(e) }))
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl+C, SIGTERM or SIGHUP (Ctrl+Break on Windows).
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let other = async {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(mut term), Ok(mut hup)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = hup.recv() => {}
                }
            }
            _ => std::future::pending::<()>().await,
        }
    };

    #[cfg(windows)]
    let other = async {
        match tokio::signal::windows::ctrl_break() {
            Ok(mut brk) => {
                brk.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(any(unix, windows)))]
    let other = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = other => {}
    }
}

async fn run(cli: Cli, cleanup: CleanupRegistry, cancel: CancellationToken) -> Result<(), CliError> {
    let path = improv_config::config_path(cli.config_file.as_deref());
    let config = improv_config::load(&path, &cli.overrides())?;
    debug!(path = %path.display(), "configuration loaded");

    let ui = Ui::new(should_color(cli.color));
    ui.intro(&path, &config.wifi.ssid);

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx, ui));

    let provisioner = Provisioner::new(Arc::new(NetshStack::new()), PromptPicker::new(), cleanup)
        .map_err(|e| CliError::Internal { source: Box::new(e) })?
        .with_progress(Arc::new(tx))
        .with_portal_url(cli.portal_url);

    let outcome = provisioner.run(&config, &cancel).await;

    // Dropping the provisioner closes the channel and lets the renderer finish.
    drop(provisioner);
    if let Err(e) = renderer.await {
        warn!(error = %e, "progress renderer stopped unexpectedly");
    }

    match outcome {
        Ok(ProvisionOutcome::Provisioned { adapter }) => {
            debug!(adapter, "done");
            Ok(())
        }
        Ok(ProvisionOutcome::Rejected { status }) => Err(CliError::Rejected { status }),
        Err(failure) => Err(failure.into()),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::exit_code;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            exit_code::SUCCESS,
            exit_code::GENERAL,
            exit_code::USAGE,
            exit_code::SETUP,
            exit_code::REJECTED,
            exit_code::TIMEOUT,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
