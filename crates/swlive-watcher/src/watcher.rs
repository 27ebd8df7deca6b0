//! Debounced source watching.
//!
//! File-system events are collapsed by `notify-debouncer-mini` and then into
//! a capacity-one trigger channel: while a rebuild is pending, further
//! changes add nothing, so the build loop never queues up stale work.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Directory names that never trigger a rebuild.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", ".swlive"];

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Nothing to watch")]
    NoPaths,
}

/// Keeps the underlying watcher alive; dropping it stops watching.
pub struct SourceWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    paths: Vec<PathBuf>,
}

impl SourceWatcher {
    /// Directories being watched.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Watches `paths` recursively and sends a trigger on every relevant change.
///
/// Changes under any of `ignored` (typically the output directory, so the
/// bundler's own writes do not loop) or under [`IGNORED_DIRS`] are dropped.
/// Use a channel of capacity one so pending triggers coalesce.
pub fn watch_sources(
    paths: &[PathBuf],
    ignored: Vec<PathBuf>,
    debounce: Duration,
    triggers: mpsc::Sender<()>,
) -> Result<SourceWatcher, WatchError> {
    if paths.is_empty() {
        return Err(WatchError::NoPaths);
    }

    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let relevant = events.iter().any(|e| !is_ignored(&e.path, &ignored));
            if relevant {
                debug!(events = events.len(), "sources changed");
                // A full channel already holds a pending rebuild.
                let _ = triggers.try_send(());
            }
        }
        Err(e) => warn!("Watch error: {:?}", e),
    })?;

    for path in paths {
        debouncer.watcher().watch(path, RecursiveMode::Recursive)?;
        info!("Watching {}", path.display());
    }

    Ok(SourceWatcher {
        _debouncer: debouncer,
        paths: paths.to_vec(),
    })
}

/// Checks whether a changed path should be ignored.
fn is_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    if ignored.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }

    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
    })
}
