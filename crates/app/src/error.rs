//! Error types for the hive binary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] hive_core::Error),

    #[error(transparent)]
    Net(#[from] hive_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no password given")]
    MissingSecret,
}

pub type Result<T> = std::result::Result<T, Error>;
