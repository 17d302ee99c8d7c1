//! Hive Network Library
//!
//! Client side of the chat relay protocol, plus the relay server itself.
//!
//! # Architecture
//!
//! - **Auth**: Trades a secret for a session token over HTTP
//! - **Session**: Owns the WebSocket and the connection state machine
//! - **Reconcile**: Applies snapshots and broadcasts to the message store
//! - **Outbox**: Tracks sends until the server echoes them back
//! - **Server**: Relay that authenticates, stores and fans out messages
//!
//! # Usage
//!
//! ```ignore
//! let mut client = ChatClient::new(ClientConfig::load()?)?;
//! client.connect("alice", "hunter2").await?;
//!
//! client.send("hello").await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ClientEvent::StoreUpdated(_) => { /* redraw */ }
//!         ClientEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod auth;
pub mod endpoint;
pub mod error;
pub mod outbox;
pub mod protocol;
pub mod reconcile;
pub mod server;
pub mod session;

pub use auth::{CredentialExchanger, SessionToken};
pub use endpoint::Endpoints;
pub use error::{Error, Result};
pub use outbox::{PendingSend, SendCoordinator};
pub use protocol::Frame;
pub use reconcile::Reconciled;
pub use server::{hash_password, RelayConfig, RelayServer};
pub use session::{ChatClient, ClientEvent, CloseCause, CloseInfo, ConnectionState};
