//! Error types for the rustyhfp library
//!
//! This module defines the error types used throughout the library.

use thiserror::Error;

/// Errors that can occur on the RFCOMM control channel
#[derive(Error, Debug)]
pub enum RfcommError {
    #[error("Failed to open RFCOMM socket: {0}")]
    SocketError(std::io::Error),

    #[error("Failed to bind RFCOMM socket: {0}")]
    BindError(std::io::Error),

    #[error("Failed to connect RFCOMM socket: {0}")]
    ConnectError(std::io::Error),

    #[error("Invalid AT message")]
    BadMessage,

    #[error("Operation not supported by the peer")]
    NotSupported,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Service level connection timed out")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RfcommError {
    /// Whether this error terminates the RFCOMM session.
    ///
    /// Transient I/O errors are logged and the session keeps running;
    /// everything signalling a dead or misbehaving link tears it down.
    pub fn is_fatal(&self) -> bool {
        match self {
            RfcommError::NotSupported
            | RfcommError::ConnectionReset
            | RfcommError::TimedOut => true,
            RfcommError::Io(e) => matches!(
                e.raw_os_error(),
                Some(libc::ECONNABORTED) | Some(libc::ECONNRESET) | Some(libc::ENOTCONN)
            ),
            _ => false,
        }
    }
}

/// Result type for RFCOMM control channel operations
pub type RfcommResult<T> = std::result::Result<T, RfcommError>;

/// General errors that can occur in the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("RFCOMM error: {0}")]
    Rfcomm(#[from] RfcommError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),
}
