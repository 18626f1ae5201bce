use tokio::sync::{Mutex, Notify};

use crate::task::Task;

/// The current task list shared between the session and the rotation.
///
/// The list is only ever replaced as a whole, and every replacement leaves a
/// single pending preemption for the rotation to pick up.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<Vec<Task>>,
    preempt: Notify,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            preempt: Notify::new(),
        }
    }

    /// Swap in a new task list and preempt the rotation.
    pub async fn replace(&self, tasks: Vec<Task>) {
        {
            let mut current = self.tasks.lock().await;
            *current = tasks;
        }
        // Stores a permit if the rotation is not waiting right now
        self.preempt.notify_one();
    }

    /// Copy of the current list. Local paths stay linked to the stored tasks.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn status(&self) -> Vec<common::TaskStatus> {
        self.tasks.lock().await.iter().map(Task::status).collect()
    }

    /// Resolves once the list has been replaced since the last call.
    pub async fn preempted(&self) {
        self.preempt.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn list(prefix: &str, len: usize) -> Vec<Task> {
        (0..len)
            .map(|i| Task::remote(format!("{}-{}.jpg", prefix, i), i as u64))
            .collect()
    }

    #[tokio::test]
    async fn test_replace_then_snapshot() {
        let store = TaskStore::new(list("old", 2));
        store.replace(list("new", 3)).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot, list("new", 3));
    }

    #[tokio::test]
    async fn test_replace_leaves_pending_preemption() {
        let store = TaskStore::new(Vec::new());
        store.replace(list("a", 1)).await;
        store.replace(list("b", 1)).await;

        // Two replacements collapse into one pending notification
        tokio::time::timeout(Duration::from_millis(50), store.preempted())
            .await
            .expect("replacement should be observed");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), store.preempted())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_snapshot_shares_local_paths() {
        let store = TaskStore::new(list("a", 1));
        let snapshot = store.snapshot().await;
        snapshot[0].mark_ready("/tmp/a-0.jpg".into());

        assert!(store.snapshot().await[0].is_ready());
        assert!(store.status().await[0].ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_snapshots_never_mix_lists() {
        let store = Arc::new(TaskStore::new(list("old", 8)));

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for round in 0..200 {
                    let prefix = if round % 2 == 0 { "new" } else { "old" };
                    store.replace(list(prefix, if round % 2 == 0 { 5 } else { 8 })).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let snapshot = store.snapshot().await;
                        let all_old = snapshot.iter().all(|t| t.identifier().starts_with("old"));
                        let all_new = snapshot.iter().all(|t| t.identifier().starts_with("new"));
                        assert!((all_old && snapshot.len() == 8) || (all_new && snapshot.len() == 5));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
