// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay Print — everything that touches a physical printer: ESC/POS
// rasterization, raw TCP and spooler sinks, subnet scanning, and the
// persisted printer registry.

pub mod discovery;
pub mod escpos;
pub mod raw_client;
pub mod registry;
pub mod sink;
pub mod spooler;

pub use discovery::{FoundHost, NetworkScanner, ScanOptions};
pub use raw_client::RawOptions;
pub use registry::PrinterRegistry;
pub use sink::{Artifact, ArtifactKind, PrintSink, SinkTable};
