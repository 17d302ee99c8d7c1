//! Data models for Hive

mod message;

pub use message::*;
