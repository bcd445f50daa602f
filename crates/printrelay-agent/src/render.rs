// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job rendering: structured job content → bitmap or document on disk.
//
// `HtmlRenderer` fills an HTML template with the job content and converts
// it with the wkhtmltox tools (`wkhtmltoimage` for thermal bitmaps,
// `wkhtmltopdf` for spooler documents).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{AgentError, Result};
use printrelay_core::types::Job;
use printrelay_print::sink::{Artifact, ArtifactKind};

/// Placeholder replaced by the rendered job content in template files.
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";

/// What to produce for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub kind: ArtifactKind,
    /// Page width in pixels (bitmaps only).
    pub width: u32,
    /// File name without extension, unique per job.
    pub stem: String,
}

/// Turns a job into a printable artifact.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &Job, request: &RenderRequest) -> Result<Artifact>;
}

#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    templates_dir: PathBuf,
    default_template: String,
    work_dir: PathBuf,
    image_tool: String,
    pdf_tool: String,
}

impl HtmlRenderer {
    pub fn new(templates_dir: PathBuf, default_template: String, work_dir: PathBuf) -> Self {
        Self {
            templates_dir,
            default_template,
            work_dir,
            image_tool: "wkhtmltoimage".into(),
            pdf_tool: "wkhtmltopdf".into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.templates_dir.clone(),
            config.default_template.clone(),
            config.work_dir.clone(),
        )
    }

    /// Override the converter programs (full paths or names on `PATH`).
    pub fn with_tools(mut self, image_tool: impl Into<String>, pdf_tool: impl Into<String>) -> Self {
        self.image_tool = image_tool.into();
        self.pdf_tool = pdf_tool.into();
        self
    }

    /// Converters that cannot be started. Empty when both are usable.
    pub async fn missing_tools(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for tool in [&self.image_tool, &self.pdf_tool] {
            let probe = Command::new(tool)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if probe.is_err() {
                missing.push(tool.clone());
            }
        }
        missing
    }

    /// The HTML document for `job`, from its template or the built-in layout.
    pub async fn build_html(&self, job: &Job, width: u32) -> Result<String> {
        let name = job.template.as_deref().unwrap_or(&self.default_template);
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(AgentError::Render(format!("invalid template name {name:?}")));
        }
        let body = content_html(&job.content);
        let path = self.templates_dir.join(format!("{name}.html"));
        match tokio::fs::read_to_string(&path).await {
            Ok(template) => Ok(template.replace(CONTENT_PLACEHOLDER, &body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(template = %path.display(), "template missing, using built-in layout");
                Ok(builtin_layout(&body, width))
            }
            Err(e) => Err(AgentError::Render(format!("cannot read {}: {e}", path.display()))),
        }
    }

    async fn convert(&self, tool: &str, args: &[String], html: &Path, out: &Path) -> Result<()> {
        let output = Command::new(tool)
            .args(args)
            .arg(html)
            .arg(out)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AgentError::Render(format!("{tool} is not installed or not on PATH"))
                }
                _ => AgentError::Render(format!("cannot run {tool}: {e}")),
            })?;
        if !output.status.success() {
            return Err(AgentError::Render(format!(
                "{tool} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn render(&self, job: &Job, request: &RenderRequest) -> Result<Artifact> {
        tokio::fs::create_dir_all(&self.work_dir).await.map_err(|e| {
            AgentError::Render(format!("cannot create {}: {e}", self.work_dir.display()))
        })?;

        let html = self.build_html(job, request.width).await?;
        let html_path = self.work_dir.join(format!("{}.html", request.stem));
        tokio::fs::write(&html_path, html).await?;

        let (tool, args, ext) = match request.kind {
            ArtifactKind::Bitmap => (
                &self.image_tool,
                vec![
                    "--quiet".to_owned(),
                    "--format".to_owned(),
                    "png".to_owned(),
                    "--width".to_owned(),
                    request.width.to_string(),
                ],
                "png",
            ),
            ArtifactKind::Document => (&self.pdf_tool, vec!["--quiet".to_owned()], "pdf"),
        };
        let out = self.work_dir.join(format!("{}.{ext}", request.stem));
        let result = self.convert(tool, &args, &html_path, &out).await;

        if let Err(e) = tokio::fs::remove_file(&html_path).await {
            warn!(path = %html_path.display(), error = %e, "could not remove intermediate HTML");
        }
        result?;

        info!(path = %out.display(), kind = ?request.kind, "job rendered");
        Ok(Artifact {
            path: out,
            kind: request.kind,
        })
    }
}

fn builtin_layout(body: &str, width: u32) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\
         body{{margin:0;padding:8px;width:{width}px;box-sizing:border-box;\
         font-family:monospace;font-size:20px;color:#000;background:#fff}}\
         table{{width:100%;border-collapse:collapse}}th{{text-align:left;padding-right:8px}}\
         ul{{margin:0;padding-left:16px}}\
         </style></head><body>\n{body}\n</body></html>\n"
    )
}

/// Render arbitrary JSON as nested HTML: objects become key/value tables,
/// arrays become lists, scalars become escaped text.
pub fn content_html(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_html(s).replace('\n', "<br>"),
        Value::Array(items) => {
            let mut out = String::from("<ul>");
            for item in items {
                out.push_str("<li>");
                out.push_str(&content_html(item));
                out.push_str("</li>");
            }
            out.push_str("</ul>");
            out
        }
        Value::Object(map) => {
            let mut out = String::from("<table>");
            for (key, item) in map {
                out.push_str(&format!(
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape_html(key),
                    content_html(item)
                ));
            }
            out.push_str("</table>");
            out
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(content: Value, template: Option<&str>) -> Job {
        Job {
            job_id: Some("1".into()),
            tenant_id: None,
            restaurant_id: None,
            content,
            copies: 1,
            category: None,
            template: template.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn template_placeholder_is_filled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kitchen.html"),
            "<html><body><h1>Kitchen</h1>{{content}}</body></html>",
        )
        .unwrap();
        let r = HtmlRenderer::new(dir.path().into(), "order".into(), dir.path().into());
        let html = r.build_html(&job(json!({"table": 4}), Some("kitchen")), 384).await.unwrap();
        assert_eq!(
            html,
            "<html><body><h1>Kitchen</h1><table><tr><th>table</th><td>4</td></tr></table></body></html>"
        );
    }

    #[tokio::test]
    async fn missing_template_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let r = HtmlRenderer::new(dir.path().into(), "order".into(), dir.path().into());
        let html = r.build_html(&job(json!(["Pizza", "Water"]), None), 576).await.unwrap();
        assert!(html.contains("width:576px"));
        assert!(html.contains("<ul><li>Pizza</li><li>Water</li></ul>"));
    }

    #[test]
    fn content_is_escaped() {
        assert_eq!(
            content_html(&json!("<b>Tom & \"Jerry\"</b>\nnext")),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;<br>next"
        );
    }

    #[tokio::test]
    async fn template_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let r = HtmlRenderer::new(dir.path().into(), "order".into(), dir.path().into());
        let err = r.build_html(&job(json!("x"), Some("../secrets")), 384).await.unwrap_err();
        assert!(matches!(err, AgentError::Render(_)));
    }

    #[tokio::test]
    async fn unreadable_template_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("order.html")).unwrap();
        let r = HtmlRenderer::new(dir.path().into(), "order".into(), dir.path().into());
        let err = r.build_html(&job(json!("x"), None), 384).await.unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[tokio::test]
    async fn missing_converter_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let r = HtmlRenderer::new(dir.path().into(), "order".into(), dir.path().join("work"))
            .with_tools("printrelay-no-such-image-tool", "printrelay-no-such-pdf-tool");
        let request = RenderRequest {
            kind: ArtifactKind::Bitmap,
            width: 384,
            stem: "k_job_1".into(),
        };
        let err = r.render(&job(json!("hello"), None), &request).await.unwrap_err();
        assert!(err.to_string().contains("printrelay-no-such-image-tool is not installed"));
        // The intermediate HTML is cleaned up even on failure.
        assert!(!dir.path().join("work").join("k_job_1.html").exists());

        let missing = r.missing_tools().await;
        assert_eq!(missing.len(), 2);
    }
}
