//! Common types and utilities for wallsync.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`wallsync`) and the control client
//! (`wsctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using newline-delimited
//! JSON messages. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::Command;
//!
//! let json = serde_json::to_string(&Command::Query).unwrap();
//! assert_eq!(json, "\"Query\"");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by the daemon over IPC.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum IpcError {
    #[error("IPC error: {0}")]
    Ipc(String),
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Ping the daemon
    Ping,
    /// Query connection, rotation and task list status
    Query,
    /// Shut the daemon down
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Error(IpcError),
    Status(DaemonStatus),
}

/// Daemon status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub session: SessionState,
    pub rotation: RotationState,
    /// Local path of the wallpaper most recently applied
    pub current_wallpaper: Option<String>,
    pub tasks: Vec<TaskStatus>,
}

/// One entry of the active task list as seen by the rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub identifier: String,
    pub display_secs: u64,
    /// Whether the asset has been stored locally
    pub ready: bool,
}

/// Connection state of the session with the task server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No connection yet, or the previous one was dropped
    #[default]
    Disconnected,
    /// Authenticated and waiting for task lists
    Connected,
    /// Waiting out the reconnect interval after a failure
    Backoff,
    /// The server refused the shared secret; no further attempts are made
    Rejected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Backoff => "waiting to reconnect",
            Self::Rejected => "rejected (wrong secret)",
        };
        f.write_str(name)
    }
}

/// State of the wallpaper rotation after its most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationState {
    /// No tasks; waiting for a new task list
    #[default]
    Idle,
    /// Task at this index was applied (or is being retried after a failure)
    Displaying(usize),
    /// Task at this index has no local asset yet
    WaitingAsset(usize),
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Displaying(index) => write!(f, "displaying #{}", index),
            Self::WaitingAsset(index) => write!(f, "waiting for asset #{}", index),
        }
    }
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("wallsync.sock")
}
