// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print sinks: the last hop between a rendered artifact and the hardware.
//
// Each `SinkKind` maps to exactly one sink in a `SinkTable`, so adding a
// transmission path means adding an enum variant and a table entry.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use printrelay_core::error::{AgentError, Result};
use printrelay_core::types::{DEFAULT_THERMAL_WIDTH, Printer, SinkKind};

use crate::escpos;
use crate::raw_client::{self, RawOptions};
use crate::spooler::{self, SpoolCommand};

/// What a renderer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A raster image (PNG) for the ESC/POS path.
    Bitmap,
    /// A paginated document (PDF) for the spooler.
    Document,
}

/// A rendered file on disk, waiting to be printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// One way of getting an artifact onto paper.
#[async_trait]
pub trait PrintSink: Send + Sync {
    /// Transmit one copy of `artifact` to `printer`.
    async fn send(&self, printer: &Printer, artifact: &Artifact) -> Result<()>;
}

/// Rasterizes bitmaps to ESC/POS and writes them to the printer's raw port.
#[derive(Debug, Clone, Default)]
pub struct EscPosSink {
    opts: RawOptions,
}

impl EscPosSink {
    pub fn new(opts: RawOptions) -> Self {
        Self { opts }
    }

    /// Decode and encode off the async runtime; large receipts take a while.
    async fn encode(path: PathBuf, width: u32) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || {
            let img = image::open(&path).map_err(|e| {
                AgentError::Image(format!("cannot decode {}: {e}", path.display()))
            })?;
            Ok(escpos::encode_receipt(&img, width))
        })
        .await
        .map_err(|e| AgentError::Image(format!("encoder task failed: {e}")))?
    }
}

#[async_trait]
impl PrintSink for EscPosSink {
    async fn send(&self, printer: &Printer, artifact: &Artifact) -> Result<()> {
        if artifact.kind != ArtifactKind::Bitmap {
            return Err(AgentError::UnsupportedPrinter(format!(
                "{} is a raw ESC/POS printer and needs a bitmap",
                printer.label()
            )));
        }
        let width = if printer.raster_width == 0 {
            DEFAULT_THERMAL_WIDTH
        } else {
            printer.raster_width
        };
        let bytes = Self::encode(artifact.path.clone(), width).await?;
        debug!(printer = %printer.label(), bytes = bytes.len(), width, "sending ESC/POS job");
        raw_client::send_raw(&printer.address(), &bytes, self.opts).await
    }
}

/// Hands documents to the OS spooler.
#[derive(Debug, Clone)]
pub struct SpoolerSink {
    command: SpoolCommand,
}

impl Default for SpoolerSink {
    fn default() -> Self {
        Self::new(SpoolCommand::platform())
    }
}

impl SpoolerSink {
    pub fn new(command: SpoolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl PrintSink for SpoolerSink {
    async fn send(&self, printer: &Printer, artifact: &Artifact) -> Result<()> {
        let destination = if printer.name.trim().is_empty() {
            printer.ip.as_str()
        } else {
            printer.name.as_str()
        };
        spooler::submit(&self.command, destination, &artifact.path).await
    }
}

/// Handler table: one sink per `SinkKind`.
#[derive(Clone)]
pub struct SinkTable {
    raw_escpos: Arc<dyn PrintSink>,
    spooler: Arc<dyn PrintSink>,
}

impl SinkTable {
    pub fn new(raw_escpos: Arc<dyn PrintSink>, spooler: Arc<dyn PrintSink>) -> Self {
        Self {
            raw_escpos,
            spooler,
        }
    }

    /// Production sinks with the given raw-socket options.
    pub fn standard(opts: RawOptions) -> Self {
        Self::new(
            Arc::new(EscPosSink::new(opts)),
            Arc::new(SpoolerSink::default()),
        )
    }

    pub fn get(&self, kind: SinkKind) -> &dyn PrintSink {
        match kind {
            SinkKind::RawEscPos => self.raw_escpos.as_ref(),
            SinkKind::Spooler => self.spooler.as_ref(),
        }
    }
}
