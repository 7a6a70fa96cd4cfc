//! Error types for tclbridge sessions.

/// Alias for `Result<T, tclbridge::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by host callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by session, codec and proxy operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Binding, connecting or reading the channel failed.
    #[error("transport: {0}")]
    Transport(String),

    /// The interpreter process could not be started or died early.
    #[error("interpreter process: {message}")]
    Process {
        /// What went wrong.
        message: String,
        /// Exit code, when the process has exited.
        code: Option<i32>,
        /// Captured standard error, if any.
        stderr: String,
    },

    /// The peer sent something that is not a valid message.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The interpreter reported an error for a command. The session stays
    /// usable.
    #[error("while evaluating `{command}`: {message}")]
    Remote {
        /// The command that failed.
        command: String,
        /// The interpreter's error message.
        message: String,
    },

    /// The interpreter terminated while a command was pending.
    #[error("interpreter exited: {0}")]
    RemoteExit(String),

    /// A payload failed to decrypt, or the key handshake failed.
    #[error(transparent)]
    Crypto(#[from] tclbridge_proto::CryptoError),

    /// An address did not resolve to any namespace member.
    #[error("name '{name}' is not defined in namespace '{namespace}'")]
    Name {
        /// Unqualified name that was looked up.
        name: String,
        /// Namespace that was searched.
        namespace: String,
    },

    /// Interpreter text did not match the expected literal grammar.
    #[error("parse: {0}")]
    Parse(String),

    /// A host callback failed; reported to the interpreter as an error reply.
    #[error("callback: {0}")]
    Callback(String),

    /// The session is not open.
    #[error("session is not open")]
    NotOpen,

    /// The session configuration is invalid.
    #[error("config: {0}")]
    Config(String),

    /// A local I/O error (staging files, reading config).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tclbridge_proto::Error> for Error {
    fn from(err: tclbridge_proto::Error) -> Self {
        match err {
            tclbridge_proto::Error::Crypto(e) => Self::Crypto(e),
            tclbridge_proto::Error::Protocol(m) => Self::Protocol(m),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl Error {
    /// Whether the session is still usable after this error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Name { .. } | Self::Parse(_) | Self::Callback(_)
        )
    }
}
