// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// Written once at first run and read at start-up. Every component receives
// the parts it needs through its constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Environment variable overriding `apiKey`.
pub const ENV_API_KEY: &str = "PRINTRELAY_API_KEY";
/// Environment variable overriding `apiUrl`.
pub const ENV_API_URL: &str = "PRINTRELAY_API_URL";
/// Environment variable overriding `wsUrl`.
pub const ENV_WS_URL: &str = "PRINTRELAY_WS_URL";

/// Persistent agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub app_version: String,
    /// Tenant API key, sent as `X-Api-Key` on registration and session open.
    pub api_key: String,
    pub tenant_id: i64,
    pub restaurant_id: i64,
    /// HTTP base URL of the backend (registration, printer sync).
    pub api_url: String,
    /// Duplex session endpoint (`ws://` or `wss://`).
    pub ws_url: String,

    // -- Session --
    /// Wait between reconnect attempts.
    pub reconnect_delay_secs: u64,
    /// Upper bound for the reconnect wait. Equal to `reconnect_delay_secs`
    /// means a fixed backoff.
    pub max_reconnect_delay_secs: u64,
    /// Stop a printer's session for good when the backend sends `unregister`.
    pub stop_on_unregister: bool,

    // -- Discovery --
    pub scan_concurrency: usize,
    pub probe_timeout_ms: u64,
    pub scan_ports: Vec<u16>,

    // -- Dispatch --
    /// Pause after writing a raw job before closing the socket.
    pub drain_delay_ms: u64,
    pub printer_connect_timeout_secs: u64,
    pub templates_dir: PathBuf,
    pub default_template: String,
    /// Where rendered artifacts are written (and left behind on failure).
    pub work_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            api_key: String::new(),
            tenant_id: 0,
            restaurant_id: 0,
            api_url: "https://api.perfect-menu.it".to_owned(),
            ws_url: "wss://ws.perfect-menu.it/agent".to_owned(),
            reconnect_delay_secs: 5,
            max_reconnect_delay_secs: 5,
            stop_on_unregister: false,
            scan_concurrency: 50,
            probe_timeout_ms: 300,
            scan_ports: vec![9100],
            drain_delay_ms: 500,
            printer_connect_timeout_secs: 5,
            templates_dir: PathBuf::from("templates"),
            default_template: "order".to_owned(),
            work_dir: PathBuf::from("tmp"),
        }
    }
}

impl AgentConfig {
    /// Read the config file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&data)
            .map_err(|e| AgentError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Write the config file, creating its directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_API_KEY) {
            self.api_key = v;
        }
        if let Some(v) = non_empty(ENV_API_URL) {
            self.api_url = v;
        }
        if let Some(v) = non_empty(ENV_WS_URL) {
            self.ws_url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(AgentError::Config("apiKey is empty".into()));
        }
        if self.api_url.trim().is_empty() {
            return Err(AgentError::Config("apiUrl is empty".into()));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AgentError::Config(format!(
                "wsUrl must be a ws:// or wss:// URL, got {:?}",
                self.ws_url
            )));
        }
        if self.scan_concurrency == 0 {
            return Err(AgentError::Config("scanConcurrency must be at least 1".into()));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs.max(self.reconnect_delay_secs))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn printer_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.printer_connect_timeout_secs)
    }
}
