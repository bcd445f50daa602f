// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SessionClient — one reconnecting WebSocket session per printer.
//
// 1. Connect to the backend with the tenant API key in `X-Api-Key`
// 2. Send `register` with the printer's credential
// 3. Read frames strictly in order: `registered` activates the session,
//    `ping` is answered with `pong`, `print_order` runs the job dispatcher
//    inline and reports the outcome, `unregister` ends the connection
// 4. On any error wait for the backoff, then start over; only shutdown
//    (or `unregister` with stop-on-unregister set) ends the loop

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use printrelay_core::config::AgentConfig;
use printrelay_core::error::{AgentError, Result};
use printrelay_core::message::{MessageType, SessionMessage};
use printrelay_core::types::{Printer, SessionState};

use crate::auth::API_KEY_HEADER;
use crate::dispatcher::JobDispatcher;
use crate::retry::{Backoff, ReconnectPolicy, session_seed};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for TCP + TLS + upgrade handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ws_url: String,
    pub api_key: String,
    pub policy: ReconnectPolicy,
    pub stop_on_unregister: bool,
}

impl SessionOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            api_key: config.api_key.clone(),
            policy: ReconnectPolicy::from_config(config),
            stop_on_unregister: config.stop_on_unregister,
        }
    }
}

/// Observable session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Backoff waits taken since the session client started.
    pub backoff_waits: u32,
}

/// Why one connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    Dropped(AgentError),
    Unregistered,
    Shutdown,
}

/// What the read loop does after a text frame.
enum Flow {
    Continue,
    Unregistered,
}

pub struct SessionClient {
    printer: Printer,
    opts: SessionOptions,
    dispatcher: Arc<JobDispatcher>,
    shutdown: CancellationToken,
    status: watch::Sender<SessionStatus>,
}

impl SessionClient {
    pub fn new(
        printer: Printer,
        opts: SessionOptions,
        dispatcher: Arc<JobDispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus {
            state: SessionState::Disconnected,
            backoff_waits: 0,
        });
        Self {
            printer,
            opts,
            dispatcher,
            shutdown,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            debug!(printer = %self.printer.label(), from = ?s.state, to = ?state, "session state");
            s.state = state;
            true
        });
    }

    /// Reconnect loop. Returns on shutdown, or after `unregister` when the
    /// options say to stop.
    pub async fn run(self) {
        info!(printer = %self.printer.label(), url = %self.opts.ws_url, "session client started");
        let mut backoff = Backoff::seeded(self.opts.policy, session_seed(&self.printer.ip));

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(SessionState::Connecting);
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.connect() => result,
            };

            let delay = match connected {
                Ok(ws) => {
                    backoff.reset();
                    match self.run_connection(ws).await {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Unregistered if self.opts.stop_on_unregister => {
                            info!(printer = %self.printer.label(), "unregistered by backend, stopping session");
                            break;
                        }
                        ConnectionEnd::Unregistered => {
                            info!(printer = %self.printer.label(), "unregistered by backend, will reconnect");
                            backoff.base_delay()
                        }
                        ConnectionEnd::Dropped(e) => {
                            warn!(printer = %self.printer.label(), error = %e, "session dropped");
                            backoff.next_delay()
                        }
                    }
                }
                Err(e) => {
                    warn!(printer = %self.printer.label(), error = %e, "session connect failed");
                    backoff.next_delay()
                }
            };

            self.set_state(SessionState::Disconnected);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.status.send_modify(|s| s.backoff_waits += 1);
        }

        self.set_state(SessionState::Disconnected);
        info!(printer = %self.printer.label(), "session client stopped");
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self
            .opts
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| AgentError::Session(format!("invalid session URL: {e}")))?;
        let key = HeaderValue::from_str(&self.opts.api_key)
            .map_err(|e| AgentError::Session(format!("API key is not a valid header value: {e}")))?;
        request.headers_mut().insert(API_KEY_HEADER, key);

        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| AgentError::Session(format!("connect to {} timed out", self.opts.ws_url)))?
            .map_err(|e| AgentError::Session(format!("connect to {}: {e}", self.opts.ws_url)))?;
        info!(printer = %self.printer.label(), "session connected");
        Ok(ws)
    }

    /// Serve one connection until it drops, the backend unregisters us, or
    /// shutdown is requested.
    async fn run_connection(&self, ws: WsStream) -> ConnectionEnd {
        let (mut sink, mut stream) = ws.split();

        self.set_state(SessionState::AwaitingRegistrationAck);
        if let Err(e) = send(&mut sink, &SessionMessage::register(&self.printer.credential)).await {
            return ConnectionEnd::Dropped(e);
        }

        loop {
            // Only the read is raced against shutdown; a job that has started
            // is finished and reported before the next frame is looked at.
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.close().await;
                    return ConnectionEnd::Shutdown;
                }
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match self.handle_text(text.as_str(), &mut sink).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Unregistered) => {
                        let _ = sink.close().await;
                        return ConnectionEnd::Unregistered;
                    }
                    Err(e) => return ConnectionEnd::Dropped(e),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        return ConnectionEnd::Dropped(AgentError::Session(format!("pong failed: {e}")));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default();
                    return ConnectionEnd::Dropped(AgentError::Session(format!(
                        "closed by backend: {reason}"
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionEnd::Dropped(AgentError::Session(format!("read failed: {e}"))),
                None => return ConnectionEnd::Dropped(AgentError::Session("connection closed".into())),
            }
        }
    }

    async fn handle_text<S>(&self, text: &str, sink: &mut S) -> Result<Flow>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let msg = SessionMessage::decode(text)?;
        let credential = &self.printer.credential;

        match msg.kind {
            MessageType::Registered => {
                self.set_state(SessionState::Active);
                info!(printer = %self.printer.label(), "session active");
            }
            MessageType::Ping => send(sink, &SessionMessage::pong(credential)).await?,
            MessageType::PrintOrder => match msg.jobs() {
                Ok(jobs) => {
                    for job in jobs {
                        let outcome = self.dispatcher.dispatch(&self.printer, &job).await;
                        send(sink, &outcome).await?;
                    }
                }
                Err(e) => {
                    warn!(printer = %self.printer.label(), error = %e, "unusable print order");
                    send(sink, &SessionMessage::print_failed(credential, msg.job_id.clone(), e.to_string())).await?;
                }
            },
            MessageType::Unregister => return Ok(Flow::Unregistered),
            MessageType::Register
            | MessageType::Pong
            | MessageType::Printed
            | MessageType::PrintFailed
            | MessageType::Unknown => {
                debug!(printer = %self.printer.label(), kind = %msg.kind, "ignoring message");
            }
        }
        Ok(Flow::Continue)
    }
}

async fn send<S>(sink: &mut S, msg: &SessionMessage) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = msg.encode()?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| AgentError::Session(format!("send {} failed: {e}", msg.kind)))
}
