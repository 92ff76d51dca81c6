use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for a single inbound turn. Any variant other than
/// `Validation` is fatal for the request; persisted appends made before the
/// failure stay committed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("model backend failure: {0}")]
    Model(String),
    #[error("tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },
}

impl Error {
    pub fn tool(tool: &str, message: impl ToString) -> Self {
        Error::Tool {
            tool: tool.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(format!("serialization failure: {}", e))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
