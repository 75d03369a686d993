use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid adjustment: {0:?}")]
    InvalidAdjustment(String),

    #[error("invalid lamport message: {0:?}")]
    InvalidLamport(String),

    #[error("logical clock overflow: counter {local}, remote {remote}")]
    CounterOverflow { local: u64, remote: u64 },

    #[error("clock adjustment out of range: {0}")]
    ClockOutOfRange(String),

    #[error("peer {0} closed the connection without replying")]
    EmptyReply(String),

    #[error("no time differences collected in this round")]
    EmptyRound,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("secure message signature does not verify")]
    InvalidSignature,

    #[error("secure message expired ({age} seconds old)")]
    Expired { age: i64 },
}
