use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ConnectionManager, ConnectionStatus, OperationState, OperationStatus, ProgressRouter,
    TransportConfig,
};
use shared::protocol::{InstallOptions, RemoteTarget, StartRequest};
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    /// Gateway base URL; http(s) is rewritten to the matching socket scheme.
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server_url: String,
    /// Give up after this many consecutive failed connection attempts.
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the gateway on this machine.
    Install {
        #[arg(long)]
        node: bool,
        #[arg(long)]
        openclaw: bool,
    },
    /// Remove the gateway from this machine.
    Uninstall,
    /// Upgrade an existing installation in place.
    Upgrade,
    /// Provision the gateway on a remote host over SSH.
    RemoteInstall {
        #[arg(long)]
        host: String,
        #[arg(long)]
        username: String,
    },
}

impl Command {
    fn into_request(self) -> StartRequest {
        match self {
            Command::Install { node, openclaw } => StartRequest::Install(InstallOptions {
                install_node: node,
                install_openclaw: openclaw,
            }),
            Command::Uninstall => StartRequest::Uninstall,
            Command::Upgrade => StartRequest::Upgrade,
            Command::RemoteInstall { host, username } => {
                StartRequest::RemoteInstall(RemoteTarget { host, username })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let mut config = TransportConfig::for_server(&cli.server_url)?;
    config.max_reconnect_attempts = cli.max_reconnect_attempts;
    let manager = ConnectionManager::new(config);
    let router = ProgressRouter::new(Arc::clone(&manager));

    let request = cli.command.into_request();
    let kind = request.kind();

    manager.connect().await;
    let mut status = manager.subscribe_status();
    loop {
        match *status.borrow_and_update() {
            ConnectionStatus::Connected => break,
            ConnectionStatus::Unreachable => bail!("gateway unreachable at {}", cli.server_url),
            _ => {}
        }
        status.changed().await?;
    }
    info!(%kind, "connected; starting operation");

    router.start(request).await?;
    let mut states = router.subscribe(kind);

    let mut printed_lines: u64 = 0;
    let mut last_stage = String::new();
    let mut cancel_requested = false;

    let outcome = loop {
        let state = states.borrow_and_update().clone();
        render(&state, &mut printed_lines, &mut last_stage);
        if state.status.is_terminal() {
            break state;
        }

        tokio::select! {
            changed = states.changed() => changed?,
            changed = status.changed() => {
                changed?;
                if *status.borrow() == ConnectionStatus::Unreachable {
                    bail!("lost the gateway mid-{kind}; final state is owned by the gateway");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if cancel_requested {
                    bail!("{kind} abandoned; the gateway keeps running it server-side");
                }
                cancel_requested = true;
                eprintln!("cancelling {kind}... (press ctrl-c again to abandon)");
                router.cancel(kind).await?;
            }
        }
    };

    manager.disconnect().await;

    match outcome.status {
        OperationStatus::Completed => {
            println!("{kind} completed");
            Ok(())
        }
        OperationStatus::Cancelled => bail!(
            "{kind} cancelled: {}",
            outcome.error.as_deref().unwrap_or("operation cancelled")
        ),
        _ => bail!(
            "{kind} failed: {}",
            outcome.error.as_deref().unwrap_or("operation failed")
        ),
    }
}

/// Prints stage transitions and any output lines appended since the last
/// call, using the emitted-line counter to stay correct across ring-buffer
/// eviction.
fn render(state: &OperationState, printed_lines: &mut u64, last_stage: &mut String) {
    if !state.current_stage.is_empty() && state.current_stage != *last_stage {
        *last_stage = state.current_stage.clone();
        match state.progress_pct {
            Some(pct) => println!("==> {last_stage} ({pct:.0}%)"),
            None => println!("==> {last_stage}"),
        }
    }

    let unseen = (state.lines_emitted - *printed_lines) as usize;
    let start = state.output.len().saturating_sub(unseen);
    for line in state.output.iter().skip(start) {
        println!("{line}");
    }
    *printed_lines = state.lines_emitted;
}
