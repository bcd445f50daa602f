// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay — Core types, wire messages, configuration and errors shared
// across all crates.

pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use config::AgentConfig;
pub use error::{AgentError, classify_error};
pub use message::{MessageType, SessionMessage};
pub use types::*;
