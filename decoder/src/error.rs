use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::{config::ConfigError, state::DataType};

/// Result alias used throughout the crate.
pub type MangoResult<T = ()> = Result<T, MangoError>;

/// Errors raised while decoding accounts or talking to the cluster.
#[derive(Debug, Error)]
pub enum MangoError {
    /// The account data length does not match the layout.
    #[allow(missing_docs)]
    #[error("{layout} layout expects {expected} bytes, account data is {actual} bytes")]
    SizeMismatch {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The metadata header names another account kind.
    #[allow(missing_docs)]
    #[error("expected a {expected:?} account, found data type {actual}")]
    WrongAccountType { expected: DataType, actual: u8 },
    /// Serum account data is missing its `serum` prefix.
    #[error("account data does not start with the serum head padding")]
    WrongAccountHeadPadding,
    /// Serum account data is missing its `padding` suffix.
    #[error("account data does not end with the serum tail padding")]
    WrongAccountTailPadding,
    /// A tag byte or discriminant outside the known set.
    #[allow(missing_docs)]
    #[error("unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: u32 },
    /// A free or uninitialized node carries data in its reserved bytes.
    #[allow(missing_docs)]
    #[error("{variant} node has non-zero reserved bytes")]
    InvalidNodeLayout { variant: &'static str },
    /// The tree has an out-of-range index or a cycle.
    #[error("malformed order book tree: {0}")]
    MalformedTree(String),
    /// The queue header reports more live events than slots.
    #[allow(missing_docs)]
    #[error("invalid event queue header: count {count} exceeds capacity {capacity}")]
    InvalidQueueHeader { count: u64, capacity: usize },
    /// A queue snapshot is older than one already observed.
    #[allow(missing_docs)]
    #[error("event queue sequence number went backwards from {previous} to {current}")]
    SequenceRegression { previous: u64, current: u64 },
    /// A required account does not exist.
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[allow(missing_docs)]
    #[error("RPC error: {0}")]
    Rpc(#[from] Box<solana_client::client_error::ClientError>),
    #[allow(missing_docs)]
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[allow(missing_docs)]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[allow(missing_docs)]
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A base58 public key in a server message does not parse.
    #[error("invalid public key: {0}")]
    InvalidPubkey(String),
    #[allow(missing_docs)]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The websocket connection ended.
    #[error("subscription transport closed")]
    TransportClosed,
    #[allow(missing_docs)]
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<solana_client::client_error::ClientError> for MangoError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        MangoError::Rpc(Box::new(err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MangoError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MangoError::WebSocket(Box::new(err))
    }
}
