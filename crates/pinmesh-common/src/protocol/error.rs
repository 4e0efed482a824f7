use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid multiaddr: {0}")]
    Address(String),

    #[error("{0} is not a peer")]
    NotAPeer(String),

    #[error("consensus error: {0}")]
    Consensus(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl From<std::net::AddrParseError> for ClusterError {
    fn from(err: std::net::AddrParseError) -> Self {
        ClusterError::Address(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
