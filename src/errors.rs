use thiserror::Error;

/// Errors produced by the feed server subsystem.
///
/// Only startup failures surface here; once the loop is running, write
/// errors and slow consumers are absorbed into counters and log records.
#[derive(Error, Debug)]
pub enum FeedServerError {
    /// Configuration rejected before any socket was opened.
    #[error("Invalid feed server config: {0}")]
    InvalidConfig(String),

    /// The listener socket could not be created, bound, or put into
    /// listening mode.
    #[error("Failed to bind listener: {0}")]
    BindError(String),

    /// The readiness multiplexer could not be created or polled.
    #[error("Readiness poll error: {0}")]
    PollError(String),

    /// An operation was attempted before `start()` or after `stop()`.
    #[error("Feed server is not running")]
    NotRunning,
}

/// Errors produced by the feed client subsystem.
///
/// Parser-level corruption never raises an error; it is counted in
/// [`ParserStats`](crate::parser::ParserStats). These variants cover the
/// transport only.
#[derive(Error, Debug)]
pub enum FeedClientError {
    /// The TCP connection to the feed server could not be established.
    #[error("Failed to connect to feed server: {0}")]
    ConnectError(String),

    /// I/O error on the established feed connection.
    #[error("Feed connection error: {0}")]
    IoError(String),

    /// The server closed the connection.
    #[error("Feed server closed the connection")]
    Disconnected,
}

/// High-level errors returned by the server and client binaries.
///
/// Used at the application entry points for formatting user-facing
/// messages and wrapping lower-level failures.
#[derive(Error, Debug)]
pub enum CliError {
    /// General wrapper around any textual failure.
    #[error("Cli failed with error: {0}")]
    GeneralError(String),
}

impl From<FeedServerError> for CliError {
    fn from(err: FeedServerError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}

impl From<FeedClientError> for CliError {
    fn from(err: FeedClientError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}
