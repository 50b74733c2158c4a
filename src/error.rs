use thiserror::Error as ThisError;

/// A malformed request. These are answered on the wire and never end a session.
///
/// The messages follow the texts memcached itself sends after `CLIENT_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ProtocolError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("bad command line format")]
    BadFormat,
    /// A retrieval command without keys. memcached answers a plain `ERROR` here.
    #[error("no keys given")]
    NoKeys,
    #[error("bad command line format")]
    InvalidKey,
    #[error("invalid exptime argument")]
    InvalidExptime,
    #[error("invalid numeric delta argument")]
    InvalidDelta,
    #[error("bad data chunk")]
    BadDataChunk,
    #[error("object too large for cache")]
    TooLarge,
    #[error("bad data chunk")]
    Truncated,
}
