// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatch: validate → render → send every copy → report.
//
// The rendered artifact is deleted after a fully successful dispatch and
// left in the work directory after a failure so it can be inspected.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use printrelay_core::error::{AgentError, Result, classify_error};
use printrelay_core::message::SessionMessage;
use printrelay_core::types::{DEFAULT_THERMAL_WIDTH, Job, Printer, SinkKind};
use printrelay_print::sink::{ArtifactKind, SinkTable};

use crate::render::{RenderRequest, Renderer};

pub struct JobDispatcher {
    renderer: Arc<dyn Renderer>,
    sinks: SinkTable,
}

impl JobDispatcher {
    pub fn new(renderer: Arc<dyn Renderer>, sinks: SinkTable) -> Self {
        Self { renderer, sinks }
    }

    /// Print `job` on `printer` and build the result message for the
    /// backend: `printed` on success, `print_failed` with the reason
    /// otherwise.
    #[instrument(skip_all, fields(printer = %printer.label(), job_id = job.job_id.as_deref().unwrap_or("-")))]
    pub async fn dispatch(&self, printer: &Printer, job: &Job) -> SessionMessage {
        match self.print(printer, job).await {
            Ok(()) => {
                info!(copies = job.effective_copies(), "job printed");
                SessionMessage::printed(&printer.credential, job.job_id.clone())
            }
            Err(e) => {
                warn!(error = %e, class = ?classify_error(&e), "job failed");
                SessionMessage::print_failed(&printer.credential, job.job_id.clone(), e.to_string())
            }
        }
    }

    async fn print(&self, printer: &Printer, job: &Job) -> Result<()> {
        if !job.has_content() {
            return Err(AgentError::InvalidJob("job content is empty".into()));
        }

        let sink_kind = printer.printer_type.sink();
        let request = RenderRequest {
            kind: match sink_kind {
                SinkKind::RawEscPos => ArtifactKind::Bitmap,
                SinkKind::Spooler => ArtifactKind::Document,
            },
            width: if printer.raster_width == 0 {
                DEFAULT_THERMAL_WIDTH
            } else {
                printer.raster_width
            },
            stem: artifact_stem(printer, job),
        };
        let artifact = self.renderer.render(job, &request).await?;

        let sink = self.sinks.get(sink_kind);
        let copies = job.effective_copies();
        for copy in 1..=copies {
            if let Err(e) = sink.send(printer, &artifact).await {
                warn!(copy, copies, artifact = %artifact.path.display(), "copy failed, keeping artifact");
                return Err(e);
            }
            debug!(copy, copies, "copy sent");
        }

        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            warn!(path = %artifact.path.display(), error = %e, "could not delete rendered artifact");
        }
        Ok(())
    }
}

/// `<credential>_job_<jobId>`, restricted to file-name-safe characters.
/// Jobs without an id get a random one.
pub fn artifact_stem(printer: &Printer, job: &Job) -> String {
    let id = job
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    format!("{}_job_{}", printer.credential, id)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
