//! Error types for the networking layer.

use thiserror::Error;

/// Errors surfaced by transports, sockets and the data plane.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("multicast join failed: {0}")]
    MulticastJoin(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer {url} answered {status}")]
    PeerStatus { url: String, status: u16 },

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("send to {0} failed: {1}")]
    SendFailed(String, String),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
