use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// One entry of a rotation: a remote asset, where it lives locally once
/// downloaded, and how long it stays on screen.
///
/// Clones share the local-path slot, so a download finishing for a clone
/// handed to a fetcher is visible through every snapshot of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    identifier: String,
    display_secs: u64,
    local_path: Arc<OnceLock<PathBuf>>,
}

impl Task {
    /// A task received from the server; its asset still has to be fetched.
    pub fn remote(identifier: impl Into<String>, display_secs: u64) -> Self {
        Self {
            identifier: identifier.into(),
            display_secs,
            local_path: Arc::new(OnceLock::new()),
        }
    }

    /// A task whose asset already exists on disk.
    pub fn local(identifier: impl Into<String>, path: PathBuf, display_secs: u64) -> Self {
        let task = Self::remote(identifier, display_secs);
        let _ = task.local_path.set(path);
        task
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_secs(&self) -> u64 {
        self.display_secs
    }

    pub fn display_duration(&self) -> Duration {
        Duration::from_secs(self.display_secs)
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.get().map(PathBuf::as_path)
    }

    pub fn is_ready(&self) -> bool {
        self.local_path.get().is_some()
    }

    /// Record where the asset was stored. Only the first call has an effect;
    /// returns `false` if the path was already set.
    pub fn mark_ready(&self, path: PathBuf) -> bool {
        self.local_path.set(path).is_ok()
    }

    pub fn status(&self) -> common::TaskStatus {
        common::TaskStatus {
            identifier: self.identifier.clone(),
            display_secs: self.display_secs,
            ready: self.is_ready(),
        }
    }
}
