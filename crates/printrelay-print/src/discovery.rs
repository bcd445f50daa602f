// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subnet scanner for raw-print printers.
//
// Probes every host in the agent's /24 with a plain TCP connect. A fixed
// pool of workers pulls addresses from a bounded queue, so the number of
// sockets open at once never exceeds the configured concurrency.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{AgentError, Result};
use printrelay_core::types::DEFAULT_PRINTER_PORT;

/// Capacity of the address queue and the result channel.
const QUEUE_CAPACITY: usize = 256;

/// Tuning for one scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Ports tried in order; the first one that accepts wins.
    pub ports: Vec<u16>,
    pub probe_timeout: Duration,
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ports: vec![DEFAULT_PRINTER_PORT],
            probe_timeout: Duration::from_millis(300),
            concurrency: 50,
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        let ports = if config.scan_ports.is_empty() {
            vec![DEFAULT_PRINTER_PORT]
        } else {
            config.scan_ports.clone()
        };
        Self {
            ports,
            probe_timeout: config.probe_timeout(),
            concurrency: config.scan_concurrency.max(1),
        }
    }
}

/// A host that accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundHost {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Stream of hosts found by one scan. Ends when every candidate has been
/// probed. Dropping it stops every worker before its next probe.
pub struct ScanHandle {
    rx: mpsc::Receiver<FoundHost>,
}

impl ScanHandle {
    pub async fn next(&mut self) -> Option<FoundHost> {
        self.rx.recv().await
    }

    /// Drain the whole scan.
    pub async fn collect(mut self) -> Vec<FoundHost> {
        let mut hosts = Vec::new();
        while let Some(host) = self.rx.recv().await {
            hosts.push(host);
        }
        info!(found = hosts.len(), "network scan complete");
        hosts
    }
}

pub struct NetworkScanner {
    opts: ScanOptions,
}

impl NetworkScanner {
    pub fn new(opts: ScanOptions) -> Self {
        Self { opts }
    }

    /// The first non-loopback IPv4 address among the host's interfaces.
    /// Works without a default route.
    pub fn local_ipv4() -> Result<Ipv4Addr> {
        let interfaces = local_ip_address::list_afinet_netifas()
            .map_err(|e| AgentError::NoLocalAddress(format!("cannot list interfaces: {e}")))?;
        select_ipv4(interfaces)
    }

    /// Scan the agent's own /24, skipping the agent itself.
    pub fn scan_local(&self) -> Result<ScanHandle> {
        let local = Self::local_ipv4()?;
        let [a, b, c, _] = local.octets();
        info!(local = %local, subnet = %format!("{a}.{b}.{c}.0/24"), ports = ?self.opts.ports, "scanning for printers");
        self.scan([a, b, c], Some(local))
    }

    /// Scan hosts 1–254 of `prefix`. Must be called inside a Tokio runtime.
    pub fn scan(&self, prefix: [u8; 3], exclude: Option<Ipv4Addr>) -> Result<ScanHandle> {
        self.scan_with(prefix, exclude, probe)
    }

    /// [`scan`](Self::scan) with the reachability check supplied by the caller.
    fn scan_with<P, F>(&self, prefix: [u8; 3], exclude: Option<Ipv4Addr>, prober: P) -> Result<ScanHandle>
    where
        P: Fn(Ipv4Addr, u16, Duration) -> F + Clone + Send + Sync + 'static,
        F: Future<Output = bool> + Send + 'static,
    {
        if self.opts.ports.is_empty() {
            return Err(AgentError::Discovery("no ports to probe".into()));
        }
        let (work_tx, work_rx) = mpsc::channel::<Ipv4Addr>(QUEUE_CAPACITY);
        let (found_tx, found_rx) = mpsc::channel(QUEUE_CAPACITY);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let targets = candidates(prefix, exclude);
        tokio::spawn(async move {
            for ip in targets {
                if work_tx.send(ip).await.is_err() {
                    break;
                }
            }
        });

        for _ in 0..self.opts.concurrency.max(1) {
            let work_rx = Arc::clone(&work_rx);
            let found_tx = found_tx.clone();
            let ports = self.opts.ports.clone();
            let timeout = self.opts.probe_timeout;
            let prober = prober.clone();
            tokio::spawn(async move {
                loop {
                    if found_tx.is_closed() {
                        break;
                    }
                    let next = work_rx.lock().await.recv().await;
                    let Some(ip) = next else { break };
                    for &port in &ports {
                        if prober(ip, port, timeout).await {
                            debug!(ip = %ip, port, "printer port open");
                            if found_tx.send(FoundHost { ip, port }).await.is_err() {
                                return;
                            }
                            break;
                        }
                    }
                }
            });
        }

        Ok(ScanHandle { rx: found_rx })
    }
}

/// The first IPv4 interface address that is neither loopback nor
/// unspecified, in the order the OS lists them.
pub fn select_ipv4(interfaces: impl IntoIterator<Item = (String, IpAddr)>) -> Result<Ipv4Addr> {
    interfaces
        .into_iter()
        .find_map(|(name, addr)| match addr {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => {
                debug!(interface = %name, ip = %ip, "local address selected");
                Some(ip)
            }
            _ => None,
        })
        .ok_or_else(|| AgentError::NoLocalAddress("no non-loopback IPv4 interface".into()))
}

/// Host addresses .1 through .254 of `prefix`, minus `exclude`.
pub fn candidates(prefix: [u8; 3], exclude: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
    let [a, b, c] = prefix;
    (1..=254u8)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .filter(|ip| Some(*ip) != exclude)
        .collect()
}

/// Reachability only: the socket is dropped as soon as it connects.
async fn probe(ip: Ipv4Addr, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn opts(port: u16) -> ScanOptions {
        ScanOptions {
            ports: vec![port],
            probe_timeout: Duration::from_millis(200),
            concurrency: 16,
        }
    }

    #[test]
    fn candidates_skip_network_broadcast_and_self() {
        let all = candidates([192, 168, 1], None);
        assert_eq!(all.len(), 254);
        assert_eq!(all[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(all[253], Ipv4Addr::new(192, 168, 1, 254));

        let without_self = candidates([192, 168, 1], Some(Ipv4Addr::new(192, 168, 1, 23)));
        assert_eq!(without_self.len(), 253);
        assert!(!without_self.contains(&Ipv4Addr::new(192, 168, 1, 23)));
    }

    #[tokio::test]
    async fn finds_listening_loopback_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let found = NetworkScanner::new(opts(port))
            .scan([127, 0, 0], None)
            .unwrap()
            .collect()
            .await;
        assert!(found.contains(&FoundHost {
            ip: Ipv4Addr::LOCALHOST,
            port
        }));
    }

    #[tokio::test]
    async fn excluded_address_is_never_probed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let found = NetworkScanner::new(opts(port))
            .scan([127, 0, 0], Some(Ipv4Addr::LOCALHOST))
            .unwrap()
            .collect()
            .await;
        assert!(found.iter().all(|h| h.ip != Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn first_lan_ipv4_interface_wins() {
        let interfaces = vec![
            ("lo".to_owned(), IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ("eth0".to_owned(), IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))),
            ("eth0".to_owned(), IpAddr::V4(Ipv4Addr::new(10, 9, 9, 5))),
            ("tun0".to_owned(), IpAddr::V4(Ipv4Addr::new(172, 16, 0, 2))),
        ];
        assert_eq!(select_ipv4(interfaces).unwrap(), Ipv4Addr::new(10, 9, 9, 5));
    }

    #[test]
    fn loopback_only_host_has_no_local_address() {
        let interfaces = vec![
            ("lo".to_owned(), IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ("lo".to_owned(), IpAddr::V6(Ipv6Addr::LOCALHOST)),
        ];
        assert!(matches!(select_ipv4(interfaces), Err(AgentError::NoLocalAddress(_))));
        assert!(matches!(select_ipv4(Vec::new()), Err(AgentError::NoLocalAddress(_))));
    }

    #[tokio::test]
    async fn in_flight_probes_never_exceed_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let probed = Arc::new(AtomicUsize::new(0));
        let scanner = NetworkScanner::new(ScanOptions {
            ports: vec![DEFAULT_PRINTER_PORT],
            probe_timeout: Duration::from_millis(50),
            concurrency: 2,
        });

        let (f, p, n) = (in_flight.clone(), peak.clone(), probed.clone());
        let found = scanner
            .scan_with([10, 0, 0], None, move |_ip, _port, _timeout| {
                let (f, p, n) = (f.clone(), p.clone(), n.clone());
                async move {
                    let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    f.fetch_sub(1, Ordering::SeqCst);
                    n.fetch_add(1, Ordering::SeqCst);
                    false
                }
            })
            .unwrap()
            .collect()
            .await;

        assert!(found.is_empty());
        assert_eq!(probed.load(Ordering::SeqCst), 254);
        let peak = peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight probes: {peak}");
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_workers() {
        let probed = Arc::new(AtomicUsize::new(0));
        let n = probed.clone();
        let handle = NetworkScanner::new(opts(DEFAULT_PRINTER_PORT))
            .scan_with([10, 0, 0], None, move |_ip, _port, _timeout| {
                let n = n.clone();
                async move {
                    n.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    false
                }
            })
            .unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_millis(200)).await;
        // At most one probe per worker may have started before the drop.
        assert!(probed.load(Ordering::SeqCst) <= 16);
    }

    #[tokio::test]
    async fn empty_port_list_is_discovery_error() {
        let scanner = NetworkScanner::new(ScanOptions {
            ports: Vec::new(),
            ..ScanOptions::default()
        });
        assert!(matches!(
            scanner.scan([10, 0, 0], None),
            Err(AgentError::Discovery(_))
        ));
    }

    #[test]
    fn options_follow_config() {
        let mut config = AgentConfig::default();
        config.scan_ports.clear();
        config.scan_concurrency = 0;
        let o = ScanOptions::from_config(&config);
        assert_eq!(o.ports, vec![DEFAULT_PRINTER_PORT]);
        assert_eq!(o.concurrency, 1);
        assert_eq!(o.probe_timeout, Duration::from_millis(300));
    }
}
