// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the printrelay agent.

use serde::{Deserialize, Deserializer, Serialize};

/// Default raw-print port (HP JetDirect).
pub const DEFAULT_PRINTER_PORT: u16 = 9100;

/// Raster width given to freshly discovered thermal printers (58mm head).
pub const DEFAULT_THERMAL_WIDTH: u32 = 384;

/// Raster width assumed for persisted records that predate the `size` field.
pub const LEGACY_RASTER_WIDTH: u32 = 576;

/// Printer hardware family. Decides which sink a job goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterType {
    Thermal,
    Inkjet,
    Laser,
    /// Empty or unrecognised `type` field.
    #[default]
    #[serde(other)]
    Unset,
}

impl PrinterType {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// The transmission path used for this printer family.
    ///
    /// Unset printers go through the raw ESC/POS path, which is what every
    /// record written before the `type` field existed expects.
    pub fn sink(&self) -> SinkKind {
        match self {
            Self::Thermal | Self::Unset => SinkKind::RawEscPos,
            Self::Inkjet | Self::Laser => SinkKind::Spooler,
        }
    }
}

/// Closed set of transmission paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// Rasterize to ESC/POS and push over a raw TCP socket.
    RawEscPos,
    /// Hand a rendered document to the OS print spooler.
    Spooler,
}

/// A printer known to the agent.
///
/// The JSON shape matches what the backend accepts on registration and what
/// older agents persisted, so field names are kept as-is on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Printer {
    #[serde(default)]
    pub name: String,
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
    #[serde(default)]
    pub tenant_id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub restaurant_id: i64,
    /// Per-printer session credential issued by the backend. Empty until
    /// the printer is registered.
    #[serde(rename = "agent_key", default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
    #[serde(rename = "type", default, skip_serializing_if = "PrinterType::is_unset")]
    pub printer_type: PrinterType,
    /// Raster width in dots. Zero means "not recorded".
    #[serde(rename = "size", alias = "rasterWidth", default, skip_serializing_if = "is_zero_u32")]
    pub raster_width: u32,
}

fn default_port() -> u16 {
    DEFAULT_PRINTER_PORT
}

fn enabled_by_default() -> bool {
    true
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

impl Printer {
    /// A printer found by a subnet scan.
    pub fn discovered(ip: impl Into<String>, port: u16, tenant_id: i64, restaurant_id: i64) -> Self {
        let ip = ip.into();
        Self {
            name: format!("printer-{ip}"),
            ip,
            port,
            description: String::new(),
            is_enabled: true,
            tenant_id,
            restaurant_id,
            credential: String::new(),
            printer_type: PrinterType::Unset,
            raster_width: DEFAULT_THERMAL_WIDTH,
        }
    }

    /// `ip:port`, falling back to the raw-print port when none is recorded.
    pub fn address(&self) -> String {
        let port = if self.port == 0 {
            DEFAULT_PRINTER_PORT
        } else {
            self.port
        };
        format!("{}:{}", self.ip, port)
    }

    /// Human label for logs.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.ip
        } else {
            &self.name
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.credential.is_empty()
    }
}

/// A print job received over the session. Lives only for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default, alias = "id", deserialize_with = "deserialize_job_id")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub restaurant_id: Option<i64>,
    /// Opaque render input, handed to the renderer untouched.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default = "one")]
    pub copies: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

fn one() -> i64 {
    1
}

/// Job ids arrive as either JSON numbers or strings.
fn deserialize_job_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl Job {
    /// Copies to print; anything below one prints once.
    pub fn effective_copies(&self) -> u32 {
        self.copies.clamp(1, u32::MAX as i64) as u32
    }

    /// Whether there is anything to render at all.
    pub fn has_content(&self) -> bool {
        match &self.content {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}

/// Per-printer session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingRegistrationAck,
    Active,
}

/// Classification of errors for retry and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip, dropped socket, busy printer. Retried or reported upstream.
    Transient,
    /// Bad input, rejected without any network I/O.
    Validation,
    /// The host itself cannot do the operation (e.g. no IPv4 interface).
    Environment,
    /// Needs an operator (missing credential, unreadable registry file).
    Configuration,
}
