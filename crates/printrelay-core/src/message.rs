// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session wire messages exchanged with the backend.
//
// One JSON object per frame. The `type` field selects the meaning; the
// credential, job payload and error text are optional and only present on
// the message types that use them.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::types::Job;

/// Recognised `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Register,
    Registered,
    Ping,
    Pong,
    PrintOrder,
    Printed,
    PrintFailed,
    Unregister,
    /// Anything newer than this agent understands.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Registered => "registered",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::PrintOrder => "print_order",
            Self::Printed => "printed",
            Self::PrintFailed => "print_failed",
            Self::Unregister => "unregister",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "agent_key", default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(rename = "order", alias = "job", default, skip_serializing_if = "Option::is_none")]
    pub job: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "job_id", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Milliseconds since the Unix epoch; set on `pong`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl SessionMessage {
    fn bare(kind: MessageType, credential: &str) -> Self {
        Self {
            kind,
            credential: Some(credential.to_owned()),
            job: None,
            error: None,
            job_id: None,
            timestamp: None,
        }
    }

    pub fn register(credential: &str) -> Self {
        Self::bare(MessageType::Register, credential)
    }

    pub fn pong(credential: &str) -> Self {
        Self {
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            ..Self::bare(MessageType::Pong, credential)
        }
    }

    pub fn printed(credential: &str, job_id: Option<String>) -> Self {
        Self {
            job_id,
            ..Self::bare(MessageType::Printed, credential)
        }
    }

    pub fn print_failed(credential: &str, job_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            error: Some(error.into()),
            ..Self::bare(MessageType::PrintFailed, credential)
        }
    }

    /// Decode one frame. A frame that is not a JSON object with a `type`
    /// string is a protocol error.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AgentError::Protocol(format!("malformed frame: {e}")))
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the job payload of a `print_order` message.
    ///
    /// The payload is either one job object or the backend's order envelope
    /// `{success, data: {orders: [...]}}`, which yields one job per order.
    /// An object without a `content` field is itself the render input.
    pub fn jobs(&self) -> Result<Vec<Job>> {
        let raw = self
            .job
            .as_ref()
            .ok_or_else(|| AgentError::InvalidJob("print_order without a job payload".into()))?;

        match raw.pointer("/data/orders") {
            Some(serde_json::Value::Array(orders)) => {
                if raw.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
                    return Err(AgentError::InvalidJob("backend flagged the order as unsuccessful".into()));
                }
                if orders.is_empty() {
                    return Err(AgentError::InvalidJob("order envelope holds no orders".into()));
                }
                orders.iter().map(job_from_value).collect()
            }
            _ => Ok(vec![job_from_value(raw)?]),
        }
    }
}

fn job_from_value(raw: &serde_json::Value) -> Result<Job> {
    let mut job: Job = serde_json::from_value(raw.clone())
        .map_err(|e| AgentError::InvalidJob(format!("unreadable job payload: {e}")))?;
    if raw.get("content").is_none() {
        job.content = raw.clone();
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_frame_shape() {
        let text = SessionMessage::register("key-7").encode().unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "register");
        assert_eq!(v["agent_key"], "key-7");
        assert!(v.get("order").is_none());
        assert!(v.get("error").is_none());
    }

    #[test]
    fn pong_carries_timestamp() {
        let msg = SessionMessage::pong("k");
        assert_eq!(msg.kind, MessageType::Pong);
        assert!(msg.timestamp.unwrap() > 0);
    }

    #[test]
    fn unknown_type_decodes() {
        let msg = SessionMessage::decode(r#"{"type":"something_else","extra":1}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
    }

    #[test]
    fn malformed_frame_is_protocol_error() {
        assert!(matches!(
            SessionMessage::decode("not json"),
            Err(AgentError::Protocol(_))
        ));
        assert!(matches!(
            SessionMessage::decode(r#"{"agent_key":"x"}"#),
            Err(AgentError::Protocol(_))
        ));
    }

    #[test]
    fn print_order_payload_parses() {
        let msg = SessionMessage::decode(
            r#"{"type":"print_order","order":{"jobId":"j-1","content":"hello","copies":2}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageType::PrintOrder);
        let jobs = msg.jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id.as_deref(), Some("j-1"));
        assert_eq!(jobs[0].effective_copies(), 2);
        assert_eq!(jobs[0].content, "hello");
    }

    #[test]
    fn order_envelope_yields_one_job_per_order() {
        let msg = SessionMessage::decode(
            r#"{"type":"print_order","order":{"success":true,"data":{"orders":[
                {"id":7,"restaurantId":2,"table":{"number":4},"orderPlates":[]},
                {"id":8,"restaurantId":2,"table":{"number":5},"orderPlates":[]}]}}}"#,
        )
        .unwrap();
        let jobs = msg.jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_id.as_deref(), Some("7"));
        assert_eq!(jobs[1].restaurant_id, Some(2));
        // No `content` field: the order object is what gets rendered.
        assert_eq!(jobs[1].content["table"]["number"], 5);
        assert!(jobs[0].has_content());
    }

    #[test]
    fn empty_or_failed_envelope_is_invalid() {
        for payload in [
            r#"{"success":true,"data":{"orders":[]}}"#,
            r#"{"success":false,"data":{"orders":[{"id":1}]}}"#,
        ] {
            let msg = SessionMessage::decode(&format!(r#"{{"type":"print_order","order":{payload}}}"#))
                .unwrap();
            assert!(matches!(msg.jobs(), Err(AgentError::InvalidJob(_))));
        }
    }

    #[test]
    fn print_order_without_payload_is_invalid() {
        let msg = SessionMessage::decode(r#"{"type":"print_order"}"#).unwrap();
        assert!(matches!(msg.jobs(), Err(AgentError::InvalidJob(_))));
    }

    #[test]
    fn failure_report_keeps_job_id() {
        let msg = SessionMessage::print_failed("k", Some("j-9".into()), "connection refused");
        let v: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(v["type"], "print_failed");
        assert_eq!(v["job_id"], "j-9");
        assert_eq!(v["error"], "connection refused");
    }
}
