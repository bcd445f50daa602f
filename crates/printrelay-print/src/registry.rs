// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent set of known printers, keyed by IP.
//
// Records only ever get added or have their credential filled in. Discovery
// and backend sync go through `merge`, which never touches an IP that is
// already known, so local edits survive every rescan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use printrelay_core::error::{AgentError, Result};
use printrelay_core::types::{LEGACY_RASTER_WIDTH, Printer};

#[derive(Debug, Clone)]
pub struct PrinterRegistry {
    path: PathBuf,
    printers: Vec<Printer>,
}

impl PrinterRegistry {
    /// An empty registry that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            printers: Vec::new(),
        }
    }

    /// Load the registry file. A missing file is an empty registry.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut registry = Self::empty(path);
        let records = read_records(path)?;
        let total = records.len();
        let added = registry.merge(records);
        if added < total {
            warn!(dropped = total - added, "duplicate IPs in registry file");
        }
        info!(printers = registry.len(), "printer registry loaded");
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn printers(&self) -> &[Printer] {
        &self.printers
    }

    pub fn len(&self) -> usize {
        self.printers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.printers.is_empty()
    }

    pub fn get(&self, ip: &str) -> Option<&Printer> {
        self.printers.iter().find(|p| p.ip == ip)
    }

    /// Append every incoming printer whose IP is not known yet. Returns how
    /// many were added; known IPs keep their existing record untouched.
    /// Added records without a raster width get the legacy width, the same
    /// value a reload from disk would give them.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Printer>) -> usize {
        let mut known: HashSet<String> = self.printers.iter().map(|p| p.ip.clone()).collect();
        let before = self.printers.len();
        for mut printer in incoming {
            if printer.ip.is_empty() || !known.insert(printer.ip.clone()) {
                continue;
            }
            if printer.raster_width == 0 {
                printer.raster_width = LEGACY_RASTER_WIDTH;
            }
            self.printers.push(printer);
        }
        self.printers.len() - before
    }

    /// Record the credential the backend issued for `ip`.
    pub fn set_credential(&mut self, ip: &str, credential: impl Into<String>) -> Result<()> {
        let printer = self
            .printers
            .iter_mut()
            .find(|p| p.ip == ip)
            .ok_or_else(|| AgentError::Registry(format!("no printer with IP {ip}")))?;
        printer.credential = credential.into();
        Ok(())
    }

    /// Write the registry back to its file.
    ///
    /// Records already on disk whose IP this registry does not hold are
    /// kept, so a hand edit made while the agent ran is not lost. The file is
    /// replaced atomically.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<()> {
        let mut merged = self.clone();
        let on_disk = read_records(&self.path)?;
        let kept = merged.merge(on_disk);
        if kept > 0 {
            info!(kept, "keeping printers added to the file externally");
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                AgentError::Registry(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        let json = serde_json::to_vec_pretty(&merged.printers)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| AgentError::Registry(format!("cannot write {}: {e}", self.path.display())))?;

        info!(printers = merged.len(), "printer registry saved");
        Ok(())
    }
}

/// Parse the registry file, applying the legacy raster width to records
/// that lack one.
fn read_records(path: &Path) -> Result<Vec<Printer>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(AgentError::Registry(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut records: Vec<Printer> = serde_json::from_str(&data)
        .map_err(|e| AgentError::Registry(format!("cannot parse {}: {e}", path.display())))?;
    for printer in &mut records {
        if printer.raster_width == 0 {
            printer.raster_width = LEGACY_RASTER_WIDTH;
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printrelay_core::types::DEFAULT_THERMAL_WIDTH;

    #[test]
    fn merge_never_overwrites_known_ip() {
        let mut reg = PrinterRegistry::empty("unused.json");
        let mut kitchen = Printer::discovered("10.0.0.5", 9100, 1, 1);
        kitchen.name = "Kitchen".into();
        kitchen.credential = "key-5".into();
        assert_eq!(reg.merge([kitchen.clone()]), 1);

        let rediscovered = Printer::discovered("10.0.0.5", 9100, 1, 1);
        let fresh = Printer::discovered("10.0.0.6", 9100, 1, 1);
        assert_eq!(reg.merge([rediscovered.clone(), fresh]), 1);
        assert_eq!(reg.get("10.0.0.5"), Some(&kitchen));

        // Idempotent: the same batch again changes nothing.
        let snapshot = reg.printers().to_vec();
        assert_eq!(reg.merge([rediscovered]), 0);
        assert_eq!(reg.printers(), snapshot.as_slice());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = PrinterRegistry::load(dir.path().join("printers.json")).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn legacy_records_get_default_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printers.json");
        std::fs::write(
            &path,
            r#"[{"name":"Bar","ip":"10.0.0.7","port":9100,"description":"","isEnabled":true,"tenantId":1},
                {"name":"Dup","ip":"10.0.0.7","port":9100,"description":"","isEnabled":true,"tenantId":1}]"#,
        )
        .unwrap();
        let reg = PrinterRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.printers()[0].name, "Bar");
        assert_eq!(reg.printers()[0].raster_width, LEGACY_RASTER_WIDTH);
    }

    #[test]
    fn synced_printer_keeps_its_width_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printers.json");
        let synced: Printer = serde_json::from_str(r#"{"ip":"10.0.0.2","agent_key":"k"}"#).unwrap();
        assert_eq!(synced.raster_width, 0);

        let mut reg = PrinterRegistry::empty(&path);
        reg.merge([synced, Printer::discovered("10.0.0.3", 9100, 1, 1)]);
        assert_eq!(reg.get("10.0.0.2").unwrap().raster_width, LEGACY_RASTER_WIDTH);
        assert_eq!(reg.get("10.0.0.3").unwrap().raster_width, DEFAULT_THERMAL_WIDTH);
        reg.save().unwrap();

        let restarted = PrinterRegistry::load(&path).unwrap();
        assert_eq!(restarted.get("10.0.0.2").unwrap().raster_width, LEGACY_RASTER_WIDTH);
        assert_eq!(restarted.get("10.0.0.3").unwrap().raster_width, DEFAULT_THERMAL_WIDTH);
    }

    #[test]
    fn save_round_trips_and_keeps_external_additions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("printers.json");

        let mut reg = PrinterRegistry::empty(&path);
        reg.merge([Printer::discovered("10.0.0.5", 9100, 1, 1)]);
        reg.save().unwrap();

        // Someone adds a printer to the file by hand while we run.
        let mut on_disk: Vec<Printer> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        on_disk.push(Printer::discovered("10.0.0.99", 9100, 1, 1));
        std::fs::write(&path, serde_json::to_vec(&on_disk).unwrap()).unwrap();

        reg.set_credential("10.0.0.5", "key-5").unwrap();
        reg.save().unwrap();

        let reloaded = PrinterRegistry::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let first = reloaded.get("10.0.0.5").unwrap();
        assert_eq!(first.credential, "key-5");
        assert_eq!(first.raster_width, DEFAULT_THERMAL_WIDTH);
        assert!(reloaded.get("10.0.0.99").is_some());
    }

    #[test]
    fn unknown_ip_credential_is_registry_error() {
        let mut reg = PrinterRegistry::empty("unused.json");
        let err = reg.set_credential("10.9.9.9", "k").unwrap_err();
        assert!(matches!(err, AgentError::Registry(_)));
    }

    #[test]
    fn corrupt_file_is_registry_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printers.json");
        std::fs::write(&path, "{not an array").unwrap();
        assert!(matches!(
            PrinterRegistry::load(&path),
            Err(AgentError::Registry(_))
        ));
    }
}
