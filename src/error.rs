use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON document: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Malformed input: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Connection to host '{host}' failed: {reason}")]
    ConnectionError { host: String, reason: String },

    #[error("Command '{command}' on host '{host}' exited with code {exit_code}: {stderr}")]
    RemoteError {
        command: String,
        host: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command '{command}' on host '{host}' received no acknowledgment after {attempts} attempt(s)")]
    TimeoutError {
        command: String,
        host: String,
        attempts: u32,
    },
}

impl Error {
    /// Transport-level failures where the command never reached the remote
    /// engine. These are safe to resend for any command kind.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ConnectionError { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
