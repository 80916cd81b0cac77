//! File watcher over the repository metadata tree.
//!
//! Watches `.git` recursively so external changes (another terminal, an
//! editor's git integration, a fetch from elsewhere) trigger a reactive
//! refresh. The recursive mode keeps coverage complete for subdirectories
//! created after registration, without re-registering.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Transient marker rewritten by git on every fetch; write-noise, not a
/// user-meaningful change.
const FETCH_HEAD: &str = "FETCH_HEAD";

/// Streams raw filesystem events into the scheduler loop.
pub struct RepoWatcher {
    /// The underlying notify watcher. Must be kept alive; dropping it tears
    /// down all watches.
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<Result<Event, notify::Error>>,
}

impl RepoWatcher {
    /// Register a recursive watch on the metadata directory.
    ///
    /// Returns `None` if registration fails (unsupported platform, missing
    /// directory, permissions). The daemon then runs in degraded mode: the
    /// periodic timers keep working, reactive refresh does not.
    pub fn new(git_dir: &Path) -> Option<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = match notify::recommended_watcher(move |res| {
            // Receiver gone means the daemon stopped; nothing to report to.
            let _ = tx.send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!(
                    event = "sync.watcher.create_failed",
                    error = %e,
                    "Reactive refresh unavailable - continuing on periodic timers"
                );
                return None;
            }
        };

        if let Err(e) = watcher.watch(git_dir, RecursiveMode::Recursive) {
            warn!(
                event = "sync.watcher.watch_failed",
                path = %git_dir.display(),
                error = %e,
                "Reactive refresh unavailable - continuing on periodic timers"
            );
            return None;
        }

        info!(event = "sync.watcher.started", path = %git_dir.display());

        Some(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Next raw watcher result. `None` means the backend hung up.
    pub async fn next(&mut self) -> Option<Result<Event, notify::Error>> {
        self.receiver.recv().await
    }
}

/// Whether an event should reset the debounce timer.
///
/// Qualifying kinds are content writes, removes, renames, and directory
/// creates (notify reports renames under `Modify(ModifyKind::Name)`).
/// Lock files and the transient fetch marker are write-noise produced by
/// the tool itself and never qualify.
pub fn is_relevant_event(root: &Path, event: &Event) -> bool {
    let qualifying_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );

    if !qualifying_kind {
        return false;
    }

    event.paths.iter().any(|p| is_relevant_path(root, p))
}

fn is_relevant_path(root: &Path, path: &Path) -> bool {
    if !path.starts_with(root) {
        return false;
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name == FETCH_HEAD {
        return false;
    }

    // index.lock, HEAD.lock, packed-refs.lock, ...
    if path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "lock")
    {
        return false;
    }

    true
}
