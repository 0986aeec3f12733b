//! Console error types.

use thiserror::Error;

/// Errors that stop the console before or outside the state machine.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// I/O error (stdin, certificate files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// A trust anchor file was unusable.
    #[error("certificate error: {0}")]
    Certificate(String),
}
