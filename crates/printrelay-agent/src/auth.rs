// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend HTTP API: printer registration and printer list sync.
//
// Both calls authenticate with the tenant API key in `X-Api-Key` and answer
// with a `{data: {...}}` envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{AgentError, Result};
use printrelay_core::types::Printer;

/// Header carrying the tenant API key (`X-Api-Key`) on every backend
/// request and on the session handshake. Lowercase so it can be used as a
/// static header name.
pub const API_KEY_HEADER: &str = "x-api-key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The backend operations the supervisor needs.
#[async_trait]
pub trait PrinterBackend: Send + Sync {
    /// Register `printer` and return the session credential issued for it.
    async fn register(&self, printer: &Printer) -> Result<String>;

    /// The printers the backend already knows for this tenant.
    async fn fetch_printers(&self) -> Result<Vec<Printer>>;
}

pub struct AuthClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(api_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Registration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/printers", api_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Self::new(&config.api_url, config.api_key.clone())
    }

    /// Send a prepared request and decode the JSON body, turning transport
    /// failures and 4xx/5xx statuses into registration errors.
    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let resp = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| AgentError::Registration(format!("{}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Registration(format!(
                "API error {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AgentError::Registration(format!("unreadable response: {e}")))
    }
}

#[async_trait]
impl PrinterBackend for AuthClient {
    #[instrument(skip_all, fields(printer = %printer.label(), ip = %printer.ip))]
    async fn register(&self, printer: &Printer) -> Result<String> {
        let body = self.call(self.http.post(&self.endpoint).json(printer)).await?;
        let credential = parse_credential(&body)?;
        info!("printer registered");
        Ok(credential)
    }

    #[instrument(skip_all)]
    async fn fetch_printers(&self) -> Result<Vec<Printer>> {
        let body = self.call(self.http.get(&self.endpoint)).await?;
        let printers = parse_printers(&body)?;
        info!(count = printers.len(), "printer list fetched from backend");
        Ok(printers)
    }
}

/// `data.agent_key` from a registration response.
pub fn parse_credential(body: &Value) -> Result<String> {
    body.pointer("/data/agent_key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AgentError::Registration("no agent_key found in response".into()))
}

/// `data.printers` from a list response. Entries that do not parse are
/// skipped; a `data` object without `printers` is an empty list.
pub fn parse_printers(body: &Value) -> Result<Vec<Printer>> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| AgentError::Registration("response has no data object".into()))?;
    let Some(items) = data.get("printers").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Printer>(item.clone()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "skipping unreadable printer entry");
                None
            }
        })
        .collect())
}
