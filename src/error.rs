//! Error types for relay-rs.

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("relay queue is closed")]
    QueueClosed,

    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
