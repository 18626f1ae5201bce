use glob::{MatchOptions, glob_with};
use std::path::{Path, PathBuf};

use crate::task::Task;

/// Build the offline task list from images already in the storage directory.
///
/// Every file with a matching extension becomes a ready task shown for
/// `display_secs`. Nothing is scanned when the storage directory is the
/// system temp dir, since that holds no library of its own.
pub fn scan(dir: &Path, extensions: &[String], display_secs: u64) -> Vec<Task> {
    if is_temp_dir(dir) {
        log::debug!("Storage is the temp dir, skipping offline library scan");
        return Vec::new();
    }

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let base = glob::Pattern::escape(&dir.to_string_lossy());

    let mut wallpapers = Vec::new();
    for ext in extensions {
        let pattern = format!("{}/*.{}", base, ext);
        match glob_with(&pattern, options) {
            Ok(entries) => {
                wallpapers.extend(entries.flatten().filter(|entry| entry.is_file()));
            }
            Err(e) => {
                log::warn!("Failed to glob pattern '{}': {}", pattern, e);
            }
        }
    }

    wallpapers.sort();
    wallpapers.dedup();

    let tasks: Vec<Task> = wallpapers
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some(Task::local(name, path, display_secs))
        })
        .collect();

    log::info!(
        "Found {} local wallpaper(s) in {}",
        tasks.len(),
        dir.display()
    );
    tasks
}

fn is_temp_dir(dir: &Path) -> bool {
    let temp = std::env::temp_dir();
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| PathBuf::from(p));
    canonical(dir) == canonical(&temp)
}
