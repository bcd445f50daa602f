// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay — field-deployed print agent.
//
// Entry point. Initialises logging, loads the configuration, wires the
// renderer, print sinks and backend client, and hands over to the
// supervisor until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use printrelay_agent::render::HtmlRenderer;
use printrelay_agent::supervisor::{self, Supervisor, SupervisorOptions};
use printrelay_agent::{AuthClient, JobDispatcher};
use printrelay_core::AgentConfig;
use printrelay_core::error::Result;
use printrelay_print::{RawOptions, SinkTable};

/// Relay print jobs from the backend to printers on the local network.
#[derive(Parser, Debug)]
#[command(name = "printrelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Agent configuration file
    #[arg(long, value_name = "FILE", default_value = "config/config.json")]
    config: PathBuf,

    /// Printer registry file
    #[arg(long, value_name = "FILE", default_value = "config/printers.json")]
    printers: PathBuf,

    /// Scan the local subnet even when printers are already known
    #[arg(long)]
    discover: bool,

    /// Merge the backend's printer list before registering
    #[arg(long)]
    sync: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "printrelay failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AgentConfig::load(&cli.config)?;
    tracing::info!(version = %config.app_version, api = %config.api_url, "printrelay starting");

    let renderer = HtmlRenderer::from_config(&config);
    let missing = renderer.missing_tools().await;
    if !missing.is_empty() {
        tracing::warn!(?missing, "HTML converters not found, jobs will fail until installed");
    }

    let sinks = SinkTable::standard(RawOptions {
        connect_timeout: config.printer_connect_timeout(),
        drain_delay: config.drain_delay(),
    });
    let dispatcher = Arc::new(JobDispatcher::new(Arc::new(renderer), sinks));
    let backend = Arc::new(AuthClient::from_config(&config)?);

    let shutdown = CancellationToken::new();
    tokio::spawn(supervisor::cancel_on_signal(shutdown.clone()));

    let opts = SupervisorOptions {
        printers_path: cli.printers,
        discover: cli.discover,
        sync: cli.sync,
    };
    Supervisor::new(config, opts, backend, dispatcher, shutdown)
        .run()
        .await
}
