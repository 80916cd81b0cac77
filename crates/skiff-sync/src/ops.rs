//! Mutating operation entry points.
//!
//! Every command that can touch the working tree or refs goes through here:
//! argument validation first (a validation failure returns before any lock
//! or subprocess), then the write lock (contention is synchronous), then the
//! cancellable runner. Read-only queries never enter this module.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use skiff_git::GitCommand;
use tracing::info;

use crate::errors::SyncError;
use crate::events::{EventBus, UpdateEvent};
use crate::runner::{OperationHandle, spawn_streamed};
use crate::write_lock::WriteLock;

pub struct Operations {
    repo_root: PathBuf,
    lock: Arc<WriteLock>,
    bus: EventBus,
}

impl Operations {
    pub fn new(repo_root: &Path, lock: Arc<WriteLock>, bus: EventBus) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            lock,
            bus,
        }
    }

    /// Description of the operation currently holding the write lock, if
    /// any. The UI polls this to pre-disable mutating actions.
    pub fn busy(&self) -> Option<String> {
        self.lock.busy()
    }

    pub fn commit(&self, message: &str) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::commit(&self.repo_root, message)?;
        self.run_mutating(command, UpdateEvent::CommitOutputUpdated)
    }

    pub fn commit_amend(&self, message: Option<&str>) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::commit_amend(&self.repo_root, message)?;
        self.run_mutating(command, UpdateEvent::CommitOutputUpdated)
    }

    pub fn push(&self, force: bool) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::push(&self.repo_root, force);
        self.run_mutating(command, UpdateEvent::PushOutputUpdated)
    }

    pub fn pull(&self) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::pull(&self.repo_root);
        self.run_mutating(command, UpdateEvent::PullOutputUpdated)
    }

    pub fn stash_push(&self, message: Option<&str>) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::stash_push(&self.repo_root, message)?;
        self.run_mutating(command, UpdateEvent::StashOutputUpdated)
    }

    pub fn stash_pop(&self) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::stash_pop(&self.repo_root);
        self.run_mutating(command, UpdateEvent::StashOutputUpdated)
    }

    pub fn stash_apply(&self, index: usize) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::stash_apply(&self.repo_root, index);
        self.run_mutating(command, UpdateEvent::StashOutputUpdated)
    }

    pub fn stash_drop(&self, index: usize) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::stash_drop(&self.repo_root, index);
        self.run_mutating(command, UpdateEvent::StashOutputUpdated)
    }

    pub fn branch_create(&self, name: &str) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::branch_create(&self.repo_root, name)?;
        self.run_mutating(command, UpdateEvent::BranchOutputUpdated)
    }

    pub fn branch_switch(&self, name: &str) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::branch_switch(&self.repo_root, name)?;
        self.run_mutating(command, UpdateEvent::BranchOutputUpdated)
    }

    pub fn branch_delete(&self, name: &str, force: bool) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::branch_delete(&self.repo_root, name, force)?;
        self.run_mutating(command, UpdateEvent::BranchOutputUpdated)
    }

    pub fn remote_add(&self, name: &str, url: &str) -> Result<OperationHandle, SyncError> {
        let command = GitCommand::remote_add(&self.repo_root, name, url)?;
        self.run_mutating(command, UpdateEvent::RemoteOutputUpdated)
    }

    fn run_mutating(
        &self,
        command: GitCommand,
        output_event: UpdateEvent,
    ) -> Result<OperationHandle, SyncError> {
        let guard = self.lock.try_acquire(&command.describe())?;
        info!(
            event = "sync.ops.operation_started",
            command = %command.describe()
        );
        Ok(spawn_streamed(command, output_event, self.bus.clone(), guard))
    }
}
