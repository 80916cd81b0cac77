//! Engine assembly.
//!
//! One coordinator object constructed at startup and handed by reference to
//! every consumer. The rendering layer only ever reads the event receiver
//! and calls the fire-and-forget entry points here; it never reaches into
//! the filesystem or subprocess layers directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use skiff_git::{GitError, validation};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::SyncConfig;
use crate::daemon::{StateFetcher, SyncDaemon};
use crate::errors::SyncError;
use crate::events::{EventBus, UpdateEvent};
use crate::gate::RefreshCategory;
use crate::ops::Operations;
use crate::write_lock::WriteLock;

pub struct SyncEngine {
    daemon: SyncDaemon,
    ops: Operations,
    repo_root: PathBuf,
}

impl SyncEngine {
    /// Build the engine for one repository session.
    ///
    /// Returns the engine plus the single event receiver the rendering
    /// layer's main loop consumes.
    pub fn new(
        config: SyncConfig,
        repo_root: &Path,
        fetcher: Arc<dyn StateFetcher>,
    ) -> Result<(Self, mpsc::Receiver<UpdateEvent>), SyncError> {
        config.validate()?;

        if !validation::is_git_repository(repo_root) {
            return Err(GitError::NotARepository {
                path: repo_root.display().to_string(),
            }
            .into());
        }

        if which::which("git").is_err() {
            warn!(
                event = "sync.engine.git_missing",
                "git binary not found on PATH; operations will fail to spawn"
            );
        }

        let (bus, rx) = EventBus::new(config.bus_capacity);
        let lock = WriteLock::new();
        let ops = Operations::new(repo_root, Arc::clone(&lock), bus.clone());
        let daemon = SyncDaemon::new(config, repo_root, fetcher, bus);

        Ok((
            Self {
                daemon,
                ops,
                repo_root: repo_root.to_path_buf(),
            },
            rx,
        ))
    }

    /// Begin watching and refreshing. Only the first call does anything.
    pub fn start(&self) {
        self.daemon.start();
    }

    /// Terminal: tears down the watcher and ends the scheduler loop.
    pub fn stop(&self) {
        self.daemon.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.daemon.is_stopped()
    }

    /// Immediate gated fetch, bypassing the periodic cadence.
    pub fn refresh_now(&self, category: RefreshCategory) {
        self.daemon.refresh_now(category);
    }

    pub fn full_refresh(&self) {
        self.daemon.full_refresh();
    }

    /// Mutating operation entry points.
    pub fn operations(&self) -> &Operations {
        &self.ops
    }

    /// Description of the operation holding the write lock, if any.
    pub fn busy(&self) -> Option<String> {
        self.ops.busy()
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}
