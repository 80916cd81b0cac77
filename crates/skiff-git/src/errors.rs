#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Not a git repository: {path}")]
    NotARepository { path: String },

    #[error("Failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Invalid {label}: {message}")]
    InvalidArgument { label: String, message: String },

    #[error("Invalid remote URL '{url}': {message}")]
    InvalidRemoteUrl { url: String, message: String },

    #[error("IO error during git invocation: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
