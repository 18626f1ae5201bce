use common::RotationState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::DaemonState;
use crate::error::PlatformError;
use crate::platform::WallpaperSetter;
use crate::store::TaskStore;

/// Delay before retrying a task whose asset is missing or whose wallpaper
/// action failed.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Result of one rotation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: RotationState,
    /// How long to wait before the next step; `None` waits for a new list.
    pub wait: Option<Duration>,
    /// Path applied during this step, if any
    pub applied: Option<PathBuf>,
}

/// Cycles through the task store, applying one wallpaper per step.
pub struct Rotation<S> {
    store: Arc<TaskStore>,
    setter: Arc<S>,
    index: usize,
}

impl<S: WallpaperSetter + 'static> Rotation<S> {
    pub fn new(store: Arc<TaskStore>, setter: Arc<S>) -> Self {
        Self {
            store,
            setter,
            index: 0,
        }
    }

    /// Index of the task the next step will look at.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Evaluate the current task once.
    ///
    /// The index only advances after the wallpaper was applied; a missing
    /// asset or a failed action retries the same task after [`RETRY_DELAY`].
    pub async fn step(&mut self) -> Step {
        let tasks = self.store.snapshot().await;
        if tasks.is_empty() {
            self.index = 0;
            return Step {
                state: RotationState::Idle,
                wait: None,
                applied: None,
            };
        }

        // The list may have shrunk since the last step
        if self.index >= tasks.len() {
            self.index = 0;
        }

        let index = self.index;
        let task = &tasks[index];
        let Some(path) = task.local_path().map(PathBuf::from) else {
            log::debug!("Asset {} not ready yet", task.identifier());
            return Step {
                state: RotationState::WaitingAsset(index),
                wait: Some(RETRY_DELAY),
                applied: None,
            };
        };

        match self.apply(path.clone()).await {
            Ok(()) => {
                log::info!("Wallpaper changed to {}", path.display());
                self.index = (index + 1) % tasks.len();
                Step {
                    state: RotationState::Displaying(index),
                    // A zero duration would re-run the action back to back
                    wait: Some(task.display_duration().max(RETRY_DELAY)),
                    applied: Some(path),
                }
            }
            Err(e) => {
                log::warn!("Can't set wallpaper {}: {}", path.display(), e);
                Step {
                    state: RotationState::Displaying(index),
                    wait: Some(RETRY_DELAY),
                    applied: None,
                }
            }
        }
    }

    async fn apply(&self, path: PathBuf) -> Result<(), PlatformError> {
        let setter = Arc::clone(&self.setter);
        let target = path.clone();
        tokio::task::spawn_blocking(move || setter.set(&target))
            .await
            .map_err(|_| PlatformError::Aborted(path))?
    }

    /// Run the rotation for the lifetime of the process.
    ///
    /// A replaced task list cuts the current wait short and restarts the
    /// rotation from the first task.
    pub async fn run(mut self, state: Arc<Mutex<DaemonState>>) {
        loop {
            let step = self.step().await;

            {
                let mut state = state.lock().await;
                state.rotation = step.state;
                if let Some(ref path) = step.applied {
                    state.current_wallpaper = Some(path.display().to_string());
                }
            }

            let preempted = match step.wait {
                Some(wait) => tokio::select! {
                    _ = self.store.preempted() => true,
                    _ = tokio::time::sleep(wait) => false,
                },
                None => {
                    self.store.preempted().await;
                    true
                }
            };

            if preempted {
                log::info!(
                    "New task list received, restarting rotation (was at #{})",
                    self.index()
                );
                self.index = 0;
            }
        }
    }
}
