use std::path::PathBuf;
use thiserror::Error;

/// Failures of the connection to the task server.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("network failure: {0}")]
    Network(#[from] std::io::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("server rejected the shared secret")]
    WrongSecret,

    #[error("unexpected authentication reply: {0:?}")]
    ProtocolViolation(Vec<u8>),
}

impl SessionError {
    /// Whether the session must stop instead of reconnecting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WrongSecret)
    }
}

/// Failures while retrieving a single asset.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing to store asset with identifier {0:?}")]
    InvalidIdentifier(String),
}

/// Failures of the "set active image" action.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("no wallpaper command available for this platform (set [platform] command)")]
    Unsupported,

    #[error("wallpaper action for {0} did not complete")]
    Aborted(PathBuf),
}
