//! Hive Core Library
//!
//! Chat message model, the keyed message store, and client configuration
//! shared by the network layer and the terminal front end.

pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::{ClientConfig, SendPolicy, DEFAULT_PORT};
pub use error::{Error, Result};
pub use models::*;
pub use store::ChatStore;
