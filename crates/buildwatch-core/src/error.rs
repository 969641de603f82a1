//! Error types for buildwatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Naming errors
    #[error("Malformed build name: {0}")]
    MalformedBuildName(String),

    // History errors
    #[error("History query failed: `{command}`: {source}")]
    HistoryQuery {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to clone {url} after {attempts} attempts: {reason}")]
    Clone {
        url: String,
        attempts: u32,
        reason: String,
    },

    // Configuration errors
    #[error("Malformed config entry: {0}")]
    MalformedConfig(String),

    // Event errors
    #[error("Event not prepared: {0}")]
    EventNotPrepared(String),

    // Scheduling errors
    #[error("Failed to schedule suite: {0}")]
    Schedule(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a history query error from a failed command and its cause.
    pub fn history_query(command: impl Into<String>, source: std::io::Error) -> Self {
        Error::HistoryQuery {
            command: command.into(),
            source,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
