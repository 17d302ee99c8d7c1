//! Chat session client
//!
//! [`ChatClient`] owns at most one live socket. Its lifecycle is
//! `Disconnected -> Connecting -> Connected -> Disconnected`; every way out
//! of a connection (caller disconnect, server close, socket error, send
//! timeout) ends in the same reset that clears identity, messages, error
//! text and pending sends.
//!
//! The socket itself lives in a spawned connection task that selects over
//! inbound frames, commands from the handle, and the earliest pending-send
//! deadline. Observable state sits behind a shared lock; the handle's
//! getters read it and [`ChatClient::next_event`] reports changes.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hive_core::{ChatMessage, ChatStore, ClientConfig, MessageId};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::auth::{CredentialExchanger, SessionToken};
use crate::endpoint::Endpoints;
use crate::error::{Error, Result};
use crate::outbox::SendCoordinator;
use crate::protocol::Frame;
use crate::reconcile::{self, Reconciled};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Close code and reason from the server's close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The caller disconnected, or connected again
    Requested,
    /// The server closed the socket
    Remote(Option<CloseInfo>),
    /// Handshake or socket I/O failed
    Transport(String),
    /// A sent message was not confirmed within the window
    SendTimeout(MessageId),
}

impl CloseCause {
    /// The failure behind an unplanned close, if there was one
    pub fn error(&self) -> Option<Error> {
        match self {
            CloseCause::Requested | CloseCause::Remote(_) => None,
            CloseCause::Transport(e) => Some(Error::Transport(e.clone())),
            CloseCause::SendTimeout(message_id) => Some(Error::SendTimeout {
                message_id: message_id.clone(),
            }),
        }
    }
}

/// Event reported to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// An inbound frame changed the message store
    StoreUpdated(Reconciled),
    SendConfirmed { message_id: MessageId },
    SendTimedOut { message_id: MessageId },
    /// The session was reset to a clean slate
    Disconnected { cause: CloseCause },
}

struct SessionState {
    connection: ConnectionState,
    identity: Option<String>,
    last_error: Option<String>,
    store: ChatStore,
    outbox: SendCoordinator,
}

impl SessionState {
    /// Back to the pristine pre-auth state. Returns the number of pending
    /// sends that were cancelled.
    fn reset(&mut self) -> usize {
        self.connection = ConnectionState::Disconnected;
        self.identity = None;
        self.last_error = None;
        self.store.clear();
        self.outbox.cancel_all()
    }
}

enum ClientCommand {
    Send(Frame),
    Disconnect,
}

struct Connection {
    cmd_tx: mpsc::Sender<ClientCommand>,
    task: JoinHandle<()>,
}

/// Client handle for one chat session at a time
pub struct ChatClient {
    config: ClientConfig,
    endpoints: Endpoints,
    exchanger: CredentialExchanger,
    state: Arc<RwLock<SessionState>>,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: mpsc::Receiver<ClientEvent>,
    connection: Option<Connection>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::parse(&config.server_url)?;
        let exchanger = CredentialExchanger::new(&endpoints, config.connect_timeout())?;
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);

        let state = Arc::new(RwLock::new(SessionState {
            connection: ConnectionState::Disconnected,
            identity: None,
            last_error: None,
            store: ChatStore::new(),
            outbox: SendCoordinator::new(config.send_policy, config.send_timeout()),
        }));

        Ok(Self {
            config,
            endpoints,
            exchanger,
            state,
            event_tx,
            event_rx,
            connection: None,
        })
    }

    /// Authenticate with `secret`, then open the chat socket as `identity`.
    ///
    /// Returns once the socket is being opened; watch for
    /// [`ClientEvent::StateChanged`] to learn when it is ready. An auth
    /// failure is returned and its message placed in the error slot.
    pub async fn connect(&mut self, identity: impl Into<String>, secret: &str) -> Result<()> {
        self.disconnect().await;

        let identity = identity.into();
        self.state.write().await.identity = Some(identity.clone());
        info!(identity = %identity, server = %self.endpoints, "Connecting");

        let token = match self.exchanger.exchange(secret).await {
            Ok(token) => token,
            Err(e) => {
                let mut s = self.state.write().await;
                s.identity = None;
                s.last_error = Some(match &e {
                    Error::Auth(message) => message.clone(),
                    other => other.to_string(),
                });
                return Err(e);
            }
        };

        self.connect_with_token(identity, token).await
    }

    /// Open the chat socket with an already issued token
    pub async fn connect_with_token(
        &mut self,
        identity: impl Into<String>,
        token: SessionToken,
    ) -> Result<()> {
        self.disconnect().await;

        let url = self.endpoints.socket_url(token.as_str())?;
        {
            let mut s = self.state.write().await;
            s.reset();
            s.identity = Some(identity.into());
            s.connection = ConnectionState::Connecting;
        }
        emit(&self.event_tx, ClientEvent::StateChanged(ConnectionState::Connecting));

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let task = tokio::spawn(connection_task(
            url,
            self.config.connect_timeout(),
            self.config.close_timeout(),
            self.state.clone(),
            self.event_tx.clone(),
            cmd_rx,
        ));

        self.connection = Some(Connection { cmd_tx, task });
        Ok(())
    }

    /// Close the socket, if any, and wait for the session to reset
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            let _ = conn.cmd_tx.send(ClientCommand::Disconnect).await;
            if let Err(e) = conn.task.await {
                error!(error = %e, "Connection task failed");
            }
        }

        self.state.write().await.reset();
    }

    /// Send a chat message.
    ///
    /// Returns the new message's id, which stays pending until the server
    /// echoes it back. Fails closed with [`Error::NotConnected`] (also
    /// written to the error slot) when there is no ready connection, and
    /// with [`Error::SendBusy`] when the single-send policy is saturated.
    pub async fn send(&self, text: impl Into<String>) -> Result<MessageId> {
        let mut s = self.state.write().await;

        let cmd_tx = match (&self.connection, s.connection) {
            (Some(conn), ConnectionState::Connected) => conn.cmd_tx.clone(),
            _ => {
                let err = Error::NotConnected;
                warn!("Send attempted while disconnected");
                s.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        let sender = s.identity.clone().unwrap_or_default();
        let message = ChatMessage::new(sender, text);
        let message_id = message.message_id.clone();
        s.outbox.register(message_id.clone(), message.timestamp)?;
        drop(s);

        if cmd_tx
            .send(ClientCommand::Send(Frame::ChatSend(message)))
            .await
            .is_err()
        {
            // Connection task already exited and reset the session
            self.state.write().await.outbox.cancel(&message_id);
            return Err(Error::NotConnected);
        }

        debug!(message_id = %message_id, "Message sent");
        Ok(message_id)
    }

    /// Get the next client event
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    /// Get the next client event without waiting
    pub fn try_recv_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn identity(&self) -> Option<String> {
        self.state.read().await.identity.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Snapshot of the message store
    pub async fn messages(&self) -> ChatStore {
        self.state.read().await.store.clone()
    }

    /// Ids of sent messages still awaiting confirmation
    pub async fn pending(&self) -> Vec<MessageId> {
        self.state.read().await.outbox.pending_ids()
    }

    pub async fn is_pending(&self, message_id: &MessageId) -> bool {
        self.state.read().await.outbox.is_pending(message_id)
    }

    /// True while the send policy refuses new messages
    pub async fn is_sending(&self) -> bool {
        self.state.read().await.outbox.is_busy()
    }
}

/// Queue an event for the UI. State getters stay authoritative, so an
/// event that does not fit is dropped.
fn emit(event_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = event_tx.try_send(event) {
        debug!(event = ?event, "Event buffer full, dropping event");
    }
}

/// Main connection task
async fn connection_task(
    url: Url,
    connect_timeout: Duration,
    close_timeout: Duration,
    state: Arc<RwLock<SessionState>>,
    event_tx: mpsc::Sender<ClientEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    let host = url.host_str().unwrap_or_default().to_string();
    debug!(host = %host, "Opening chat socket");

    // The URL carries the token, so it is never logged
    let socket: Socket = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => {
            match result {
                Ok(Ok((socket, response))) => {
                    debug!(status = %response.status(), "Socket handshake complete");
                    socket
                }
                Ok(Err(e)) => {
                    warn!(host = %host, error = %e, "Socket handshake failed");
                    finish(&state, &event_tx, CloseCause::Transport(e.to_string())).await;
                    return;
                }
                Err(_) => {
                    let message = format!(
                        "handshake timed out after {}ms",
                        connect_timeout.as_millis()
                    );
                    warn!(host = %host, "Socket handshake timed out");
                    finish(&state, &event_tx, CloseCause::Transport(message)).await;
                    return;
                }
            }
        }
        _ = cmd_rx.recv() => {
            debug!("Disconnect requested during handshake");
            finish(&state, &event_tx, CloseCause::Requested).await;
            return;
        }
    };

    {
        let mut s = state.write().await;
        s.connection = ConnectionState::Connected;
    }
    emit(&event_tx, ClientEvent::StateChanged(ConnectionState::Connected));
    info!(host = %host, "Chat socket connected");

    let (mut writer, mut reader) = socket.split();

    let cause = loop {
        let deadline = state.read().await.outbox.next_deadline();

        tokio::select! {
            // Incoming frame from server
            frame = reader.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_text(text.as_str(), &state, &event_tx).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let info = frame.map(|f| CloseInfo {
                            code: u16::from(f.code),
                            reason: f.reason.as_str().to_string(),
                        });
                        info!(close = ?info, "Server closed connection");
                        break CloseCause::Remote(info);
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        debug!(len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        // Not actionable on its own; the session ends here
                        warn!(error = %e, "Socket error");
                        break CloseCause::Transport(e.to_string());
                    }
                    None => {
                        debug!("Socket stream ended");
                        break CloseCause::Remote(None);
                    }
                }
            }

            // Outgoing command
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(frame)) => {
                        let text = match frame.to_text() {
                            Ok(text) => text,
                            Err(e) => {
                                error!(error = %e, "Failed to encode frame");
                                continue;
                            }
                        };
                        if let Err(e) = writer.send(WsMessage::text(text)).await {
                            warn!(error = %e, "Write error");
                            break CloseCause::Transport(e.to_string());
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        close_socket(&mut writer, &mut reader, close_timeout).await;
                        break CloseCause::Requested;
                    }
                }
            }

            // Pending send watchdog
            _ = sleep_until_deadline(deadline) => {
                let expired = state.write().await.outbox.take_expired(Instant::now());
                if let Some(first) = expired.first().cloned() {
                    for message_id in expired {
                        warn!(message_id = %message_id, "Send not confirmed in time, dropping session");
                        emit(&event_tx, ClientEvent::SendTimedOut { message_id });
                    }
                    close_socket(&mut writer, &mut reader, close_timeout).await;
                    break CloseCause::SendTimeout(first);
                }
            }
        }
    };

    finish(&state, &event_tx, cause).await;
}

/// Reconcile one text frame and resolve any sends it confirms
async fn handle_text(
    text: &str,
    state: &Arc<RwLock<SessionState>>,
    event_tx: &mpsc::Sender<ClientEvent>,
) {
    let (reconciled, confirmed) = {
        let mut guard = state.write().await;
        let s = &mut *guard;
        let reconciled = match reconcile::apply_text(&mut s.store, text) {
            Ok(reconciled) => reconciled,
            // Already logged by the reconciler
            Err(_) => return,
        };
        (reconciled, s.outbox.confirm(&s.store))
    };

    emit(event_tx, ClientEvent::StoreUpdated(reconciled));
    for message_id in confirmed {
        emit(event_tx, ClientEvent::SendConfirmed { message_id });
    }
}

/// Send a close frame and wait, bounded, for the server to finish the close
async fn close_socket(
    writer: &mut SplitSink<Socket, WsMessage>,
    reader: &mut SplitStream<Socket>,
    close_timeout: Duration,
) {
    if let Err(e) = writer.send(WsMessage::Close(None)).await {
        debug!(error = %e, "Close frame not sent");
        return;
    }

    let observed = tokio::time::timeout(close_timeout, async {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;

    if observed.is_err() {
        debug!(timeout_ms = close_timeout.as_millis() as u64, "Close not acknowledged in time");
    }
}

/// Clean-slate reset shared by every exit path
async fn finish(
    state: &Arc<RwLock<SessionState>>,
    event_tx: &mpsc::Sender<ClientEvent>,
    cause: CloseCause,
) {
    let cancelled = state.write().await.reset();
    if cancelled > 0 {
        debug!(count = cancelled, "Cancelled pending sends");
    }

    info!(cause = ?cause, "Disconnected from server");
    emit(event_tx, ClientEvent::StateChanged(ConnectionState::Disconnected));
    emit(event_tx, ClientEvent::Disconnected { cause });
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
