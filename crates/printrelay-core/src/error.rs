// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printrelay.

use thiserror::Error;

use crate::types::ErrorClass;

/// Top-level error type for all agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    // -- Discovery --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("no local IPv4 address found: {0}")]
    NoLocalAddress(String),

    // -- Registry / configuration --
    #[error("printer registry error: {0}")]
    Registry(String),

    #[error("configuration error: {0}")]
    Config(String),

    // -- Backend --
    #[error("session error: {0}")]
    Session(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("printer registration failed: {0}")]
    Registration(String),

    // -- Job dispatch --
    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("unsupported printer: {0}")]
    UnsupportedPrinter(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("printer connection failed: {0}")]
    PrinterConnection(String),

    #[error("spooler error: {0}")]
    Spooler(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Classify an error for the retry/report policy.
///
/// Transient errors are retried by the session loop (or reported upstream as
/// `print_failed` for jobs); the rest are never retried automatically.
pub fn classify_error(err: &AgentError) -> ErrorClass {
    match err {
        AgentError::Session(_)
        | AgentError::PrinterConnection(_)
        | AgentError::Spooler(_)
        | AgentError::Discovery(_)
        | AgentError::Render(_) => ErrorClass::Transient,

        AgentError::Protocol(_)
        | AgentError::InvalidJob(_)
        | AgentError::UnsupportedPrinter(_)
        | AgentError::Image(_)
        | AgentError::Serialization(_) => ErrorClass::Validation,

        AgentError::NoLocalAddress(_) => ErrorClass::Environment,

        AgentError::Registration(_) | AgentError::Config(_) | AgentError::Registry(_) => {
            ErrorClass::Configuration
        }

        AgentError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::Configuration
            }
            _ => ErrorClass::Transient,
        },
    }
}
