use skiff_git::GitError;

use crate::config::ConfigError;
use crate::write_lock::LockBusy;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Another operation holds the repository: {holder}")]
    LockContention { holder: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<LockBusy> for SyncError {
    fn from(busy: LockBusy) -> Self {
        SyncError::LockContention {
            holder: busy.holder,
        }
    }
}
