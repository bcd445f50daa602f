// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay Agent — backend sessions, job dispatch, and start-up
// orchestration. The `printrelay` binary is a thin CLI over `Supervisor`.

pub mod auth;
pub mod dispatcher;
pub mod render;
pub mod retry;
pub mod session;
pub mod supervisor;

pub use auth::{AuthClient, PrinterBackend};
pub use dispatcher::JobDispatcher;
pub use render::{HtmlRenderer, Renderer};
pub use session::{SessionClient, SessionOptions, SessionStatus};
pub use supervisor::{Supervisor, SupervisorOptions};
