//! Engine error types

use thiserror::Error;

/// Errors surfaced by the browser-engine boundary
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to launch session: {0}")]
    LaunchFailed(String),

    #[error("Failed to create context: {0}")]
    ContextFailed(String),

    #[error("Failed to create page: {0}")]
    PageFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript error: {0}")]
    JavaScriptError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Page is closed")]
    PageClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
