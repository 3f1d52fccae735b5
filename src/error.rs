// Crate-wide error type, threaded through with `?`.

use std::fmt::{self, Display};
use std::io;

/// Represent the types of errors this broker can produce.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error, or a well-formed but out-of-sequence packet.
    ProtocolViolation,

    /// Authentication or authorization failure.
    AuthFailed,

    /// Keep-alive watchdog fired with no traffic in the window.
    KeepAliveTimeout,

    /// Config file could not be parsed or failed validation.
    ConfigError,

    /// mpsc channel send/recv error.
    ChannelError,

    /// A handler panicked while processing a packet; the connection was
    /// torn down but the broker itself survives.
    Internal,

    /// Looked up a client id with no matching session.
    SessionNotFound,
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    #[must_use]
    pub fn keep_alive_timeout() -> Self {
        Self::new(ErrorKind::KeepAliveTimeout, "keep-alive window elapsed")
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::IoError, format!("io error: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::new(ErrorKind::EncodeError, format!("{err}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::new(ErrorKind::ProtocolViolation, format!("{err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::new(ErrorKind::ConfigError, format!("{err}"))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::new(ErrorKind::ChannelError, format!("channel closed: {err}"))
    }
}
