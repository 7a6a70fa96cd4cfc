//! Errors raised by the wire layer.

use crate::crypto::CryptoError;

/// Alias for `Result<T, tclbridge_proto::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned while framing, encrypting or decoding messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying channel failed or closed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A payload failed to decrypt.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A payload decoded but was not a valid message.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether the peer closed the channel.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
