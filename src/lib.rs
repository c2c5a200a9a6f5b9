pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;
pub mod util;

use mio::Token;
use thiserror::{self, Error};

pub const SERVER: Token = Token(0);

#[derive(Debug, Error)]
pub enum ServerError {
    /// Derived IO error
    #[error("Io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The environment held a setting we could not use
    #[error("Bad configuration: {0}")]
    Config(#[from] config::ConfigError),
}
