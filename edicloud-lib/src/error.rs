use std::io;
use thiserror::Error;

/// The primary error type for the `edicloud-lib` library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout during socket operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("TCP connection broken")]
    ConnectionBroken,

    #[error("End of stream")]
    EndOfStream,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed markup: {0}")]
    Markup(String),

    #[error("Invalid cipher rotation {0}, expected 1-7")]
    InvalidRotation(u8),

    #[error("Access denied, HTTP status {status}")]
    AuthenticationFailure { status: String },

    #[error("Device is offline")]
    DeviceOffline,

    #[error("Device cannot be reached through the cloud (status {status})")]
    DeviceUnreachable { status: String },

    #[error("{operation} failed, {attempts} attempts exhausted")]
    RetriesExhausted { operation: &'static str, attempts: u32 },

    #[error("Unexpected content (HTTP {status}, {content_type}): {body}")]
    UnexpectedContent {
        status: String,
        content_type: String,
        body: String,
    },
}

impl Error {
    /// Whether the failure concerns the transport and may clear up after a reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Timeout(_) | Error::ConnectionBroken | Error::EndOfStream | Error::Protocol(_)
        )
    }

    /// Whether the failure must end the whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }
}

impl From<xml::reader::Error> for Error {
    fn from(err: xml::reader::Error) -> Self {
        Error::Markup(err.to_string())
    }
}
