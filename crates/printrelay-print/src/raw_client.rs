// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP print client (JetDirect, port 9100).
//
// Open a fresh socket, write the printer-native byte stream, pause so the
// printer can pull the data out of its receive buffer, then close. No
// framing, no acknowledgement; the printer has to understand the bytes.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use printrelay_core::error::{AgentError, Result};

/// Chunk size for writes, so progress shows up in debug logs.
const CHUNK_SIZE: usize = 8192;

/// Connection parameters for one raw transmission.
#[derive(Debug, Clone, Copy)]
pub struct RawOptions {
    pub connect_timeout: Duration,
    /// Pause after the last byte before the socket is closed.
    pub drain_delay: Duration,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            drain_delay: Duration::from_millis(500),
        }
    }
}

/// Send `data` to `addr` (`ip:port`) over a new TCP connection.
pub async fn send_raw(addr: &str, data: &[u8], opts: RawOptions) -> Result<()> {
    info!(addr = %addr, total = data.len(), "connecting via raw TCP");

    let mut stream = tokio::time::timeout(opts.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            AgentError::PrinterConnection(format!(
                "connection to {addr} timed out after {}ms",
                opts.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| AgentError::PrinterConnection(format!("connect to {addr}: {e}")))?;

    let mut sent = 0usize;
    for chunk in data.chunks(CHUNK_SIZE) {
        stream.write_all(chunk).await.map_err(|e| {
            AgentError::PrinterConnection(format!("write to {addr} failed at byte {sent}: {e}"))
        })?;
        sent += chunk.len();
        debug!(sent, total = data.len(), "raw TCP progress");
    }

    stream
        .flush()
        .await
        .map_err(|e| AgentError::PrinterConnection(format!("flush {addr}: {e}")))?;

    tokio::time::sleep(opts.drain_delay).await;

    // The data is already on the wire; a failed FIN is not worth a reprint.
    if let Err(e) = stream.shutdown().await {
        debug!(addr = %addr, error = %e, "raw TCP shutdown");
    }

    info!(addr = %addr, total = data.len(), "raw TCP job sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn fast() -> RawOptions {
        RawOptions {
            connect_timeout: Duration::from_secs(2),
            drain_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn delivers_every_byte() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        send_raw(&addr, &payload, fast()).await.unwrap();
        assert_eq!(server.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn refused_connection_is_printer_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };
        let err = send_raw(&addr, b"x", fast()).await.unwrap_err();
        assert!(matches!(err, AgentError::PrinterConnection(_)));
    }
}
