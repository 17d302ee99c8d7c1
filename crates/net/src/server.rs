//! Chat relay server
//!
//! Serves the two endpoints the client talks to:
//!
//! - `GET /auth` trades the connection password for a token
//! - `GET /chat?token=...` upgrades to a WebSocket that receives a
//!   `chat:list` snapshot, then every `chat:broadcast`
//!
//! Each submitted message is stored under its id and broadcast to every
//! socket, sender included. A token opens one socket and is dropped when
//! that socket closes; tokens never used expire. Messages live in memory
//! only, capped at the most recent [`MAX_MESSAGE_HISTORY`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use hive_core::{ChatMessage, MessageId};
use rand::Rng;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::PASSWORD_HEADER;
use crate::error::{Error, Result};
use crate::protocol::{ErrorResponse, Frame, TokenResponse};

/// Capacity of the broadcast channel; sockets further behind get a snapshot
const BROADCAST_CAPACITY: usize = 256;

/// Length of issued session tokens
const TOKEN_LEN: usize = 16;

/// How long an issued token may go unused before it expires
const TOKEN_TTL: Duration = Duration::from_secs(60);

/// Maximum messages kept for snapshots
pub const MAX_MESSAGE_HISTORY: usize = 500;

/// Relay server settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    /// Argon2 PHC string of the connection password
    pub password_hash: String,
}

impl RelayConfig {
    /// Build a config, hashing the plain connection password
    pub fn with_password(bind: SocketAddr, password: &str) -> Result<Self> {
        Ok(Self {
            bind,
            password_hash: hash_password(password)?,
        })
    }
}

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Auth(format!("failed to hash password: {}", e)))
}

fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!(error = %e, "Stored password hash is invalid");
            false
        }
    }
}

/// Generate a random session token
fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

struct IssuedToken {
    issued_at: Instant,
    /// Set once a socket has been opened with the token
    in_use: bool,
}

/// Drop tokens that were never used within their TTL
fn prune_unused_tokens(tokens: &mut HashMap<String, IssuedToken>, now: Instant) -> usize {
    let before = tokens.len();
    tokens.retain(|_, t| t.in_use || now.duration_since(t.issued_at) < TOKEN_TTL);
    before - tokens.len()
}

/// Mark a fresh, unused token as taken by a socket
fn claim_token(tokens: &mut HashMap<String, IssuedToken>, token: &str, now: Instant) -> bool {
    match tokens.get_mut(token) {
        Some(t) if !t.in_use && now.duration_since(t.issued_at) < TOKEN_TTL => {
            t.in_use = true;
            true
        }
        _ => false,
    }
}

/// Store a message, evicting the oldest once over the history cap
fn store_message(messages: &mut HashMap<MessageId, ChatMessage>, message: ChatMessage) {
    messages.insert(message.message_id.clone(), message);

    while messages.len() > MAX_MESSAGE_HISTORY {
        let oldest = messages
            .values()
            .min_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.message_id.cmp(&b.message_id))
            })
            .map(|m| m.message_id.clone());
        match oldest {
            Some(id) => {
                messages.remove(&id);
            }
            None => break,
        }
    }
}

/// Server state shared across handlers
struct RelayState {
    password_hash: String,
    tokens: RwLock<HashMap<String, IssuedToken>>,
    messages: RwLock<HashMap<MessageId, ChatMessage>>,
    broadcast_tx: broadcast::Sender<ChatMessage>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayState {
    async fn snapshot(&self) -> Frame {
        Frame::ChatList(self.messages.read().await.clone())
    }
}

/// Relay server handle
pub struct RelayServer {
    addr: SocketAddr,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind and start serving in the background
    pub async fn start(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let addr = listener.local_addr()?;

        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RelayState {
            password_hash: config.password_hash,
            tokens: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            broadcast_tx,
            shutdown_tx,
        });

        let app = Router::new()
            .route("/auth", get(handle_auth))
            .route("/chat", get(handle_chat))
            .with_state(state.clone());

        let mut shutdown_rx = state.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Relay server error");
            }
            info!("Relay server stopped");
        });

        info!(addr = %addr, "Relay server started");

        Ok(Self { addr, state })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should be configured with
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of stored messages
    pub async fn message_count(&self) -> usize {
        self.state.messages.read().await.len()
    }

    /// Number of tokens issued and not yet released
    pub async fn active_tokens(&self) -> usize {
        self.state.tokens.read().await.len()
    }

    /// Close every socket and stop accepting connections
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
        info!("Relay server shutdown initiated");
    }
}

/// `GET /auth`
async fn handle_auth(State(state): State<Arc<RelayState>>, headers: HeaderMap) -> Response {
    let password = headers.get(PASSWORD_HEADER).and_then(|v| v.to_str().ok());

    let authorized = match password {
        Some(password) => verify_password(&state.password_hash, password),
        None => false,
    };

    if !authorized {
        warn!("Rejected auth attempt");
        let body = ErrorResponse {
            code: StatusCode::UNAUTHORIZED.as_u16(),
            message: "invalid password".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let token = generate_token();
    {
        let mut tokens = state.tokens.write().await;
        let expired = prune_unused_tokens(&mut tokens, Instant::now());
        if expired > 0 {
            debug!(count = expired, "Expired unused tokens");
        }
        tokens.insert(
            token.clone(),
            IssuedToken {
                issued_at: Instant::now(),
                in_use: false,
            },
        );
    }
    debug!("Issued session token");

    (StatusCode::OK, Json(TokenResponse { token })).into_response()
}

#[derive(Debug, Deserialize)]
struct ChatParams {
    #[serde(default)]
    token: Option<String>,
}

/// `GET /chat?token=...`
async fn handle_chat(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
    Query(params): Query<ChatParams>,
) -> Response {
    let claimed = match &params.token {
        Some(token) => claim_token(&mut *state.tokens.write().await, token, Instant::now()),
        None => false,
    };

    let token = match params.token {
        Some(token) if claimed => token,
        _ => {
            warn!("Rejected socket with invalid token");
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Handle a single client socket
async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, token: String) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no message falls in between
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    info!(conn_id = %conn_id, "Client joined");

    if let Err(e) = send_frame(&mut sender, &state.snapshot().await).await {
        warn!(conn_id = %conn_id, error = %e, "Failed to send chat list");
    } else {
        loop {
            tokio::select! {
                // Incoming frame from client
                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let text: &str = &text;
                            handle_incoming(text, &state, conn_id).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(conn_id = %conn_id, "Connection closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(conn_id = %conn_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                // Message to fan out
                delta = broadcast_rx.recv() => {
                    let frame = match delta {
                        Ok(message) => Frame::ChatBroadcast(message),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(conn_id = %conn_id, skipped = skipped, "Client lagged, resending chat list");
                            state.snapshot().await
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if let Err(e) = send_frame(&mut sender, &frame).await {
                        debug!(conn_id = %conn_id, error = %e, "Write failed");
                        break;
                    }
                }

                _ = shutdown_rx.recv() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    // Tokens are single-session
    state.tokens.write().await.remove(&token);
    info!(conn_id = %conn_id, "Client left");
}

/// Handle a frame sent by a client
async fn handle_incoming(text: &str, state: &Arc<RelayState>, conn_id: Uuid) {
    match Frame::from_text(text) {
        Ok(Frame::ChatSend(message)) => {
            debug!(conn_id = %conn_id, message_id = %message.message_id, "Broadcasting message");
            let mut messages = state.messages.write().await;
            store_message(&mut messages, message.clone());
            // Sent under the lock so broadcasts follow store order
            let _ = state.broadcast_tx.send(message);
        }
        Ok(other) => {
            debug!(conn_id = %conn_id, kind = other.kind(), "Ignoring unexpected frame");
        }
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "Invalid frame from client");
        }
    }
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let text = frame
        .to_text()
        .map_err(|e| Error::Protocol(format!("Serialization failed: {}", e)))?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}
