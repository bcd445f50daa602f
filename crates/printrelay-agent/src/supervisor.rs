// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Supervisor — start-up orchestration and process lifetime.
//
// Owns the printer registry. Before any session starts it discovers and
// syncs printers, registers the ones without a credential and saves the
// result; afterwards it only waits for the shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{Result, classify_error};
use printrelay_core::types::Printer;
use printrelay_print::discovery::{NetworkScanner, ScanOptions};
use printrelay_print::registry::PrinterRegistry;

use crate::auth::PrinterBackend;
use crate::dispatcher::JobDispatcher;
use crate::session::{SessionClient, SessionOptions};

/// Start-up switches from the command line.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub printers_path: PathBuf,
    /// Scan the subnet even when the registry already has printers.
    pub discover: bool,
    /// Merge the backend's printer list before registering.
    pub sync: bool,
}

pub struct Supervisor {
    config: AgentConfig,
    opts: SupervisorOptions,
    backend: Arc<dyn PrinterBackend>,
    dispatcher: Arc<JobDispatcher>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: AgentConfig,
        opts: SupervisorOptions,
        backend: Arc<dyn PrinterBackend>,
        dispatcher: Arc<JobDispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            opts,
            backend,
            dispatcher,
            shutdown,
        }
    }

    /// Load, discover, sync, register and save. Only registry I/O errors
    /// are fatal; everything else is logged and skipped.
    pub async fn prepare(&self) -> Result<PrinterRegistry> {
        let mut registry = PrinterRegistry::load(&self.opts.printers_path)?;

        if registry.is_empty() || self.opts.discover {
            self.discover(&mut registry).await;
        }
        if self.opts.sync {
            match self.backend.fetch_printers().await {
                Ok(printers) => {
                    let added = registry.merge(printers);
                    info!(added, "merged backend printer list");
                }
                Err(e) => warn!(error = %e, "printer sync failed"),
            }
        }

        let pending: Vec<Printer> = registry
            .printers()
            .iter()
            .filter(|p| p.is_enabled && !p.is_registered())
            .cloned()
            .collect();
        for printer in pending {
            match self.backend.register(&printer).await {
                Ok(credential) => registry.set_credential(&printer.ip, credential)?,
                Err(e) => warn!(
                    printer = %printer.label(),
                    error = %e,
                    class = ?classify_error(&e),
                    "registration failed, printer will not start a session"
                ),
            }
        }

        registry.save()?;
        Ok(registry)
    }

    async fn discover(&self, registry: &mut PrinterRegistry) {
        let scanner = NetworkScanner::new(ScanOptions::from_config(&self.config));
        let handle = match scanner.scan_local() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, class = ?classify_error(&e), "discovery aborted");
                return;
            }
        };
        let found = handle.collect().await;
        let added = registry.merge(found.into_iter().map(|host| {
            Printer::discovered(
                host.ip.to_string(),
                host.port,
                self.config.tenant_id,
                self.config.restaurant_id,
            )
        }));
        info!(added, "discovered printers merged");
    }

    /// Prepare, start one session per enabled registered printer, and wait
    /// for shutdown. Returns once every session has stopped.
    pub async fn run(self) -> Result<()> {
        let registry = self.prepare().await?;

        let active: Vec<Printer> = registry
            .printers()
            .iter()
            .filter(|p| p.is_enabled && p.is_registered())
            .cloned()
            .collect();
        if active.is_empty() {
            info!(known = registry.len(), "no enabled printer has a credential, nothing to run");
            return Ok(());
        }

        let session_opts = SessionOptions::from_config(&self.config);
        let mut sessions = JoinSet::new();
        for printer in active {
            info!(printer = %printer.label(), address = %printer.address(), "starting session");
            let client = SessionClient::new(
                printer,
                session_opts.clone(),
                Arc::clone(&self.dispatcher),
                self.shutdown.child_token(),
            );
            sessions.spawn(client.run());
        }
        info!(sessions = sessions.len(), "agent running");

        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "session task panicked");
            }
        }
        info!("all sessions stopped");
        Ok(())
    }
}

/// Resolve on Ctrl-C or (on Unix) SIGTERM, then cancel `token`.
pub async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
    token.cancel();
}
