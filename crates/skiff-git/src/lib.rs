//! skiff-git: git CLI invocation layer for skiff.
//!
//! All production `git` subprocess argument vectors are built here, and the
//! synchronous run-to-completion call shape lives here. The streamed,
//! cancellable call shape is owned by `skiff-sync`, which consumes the same
//! [`GitCommand`] values.
//!
//! **Why CLI instead of a libgit binding?** skiff never implements a
//! repository object model. Mutating operations like `push` and `pull`
//! require authentication, and the git CLI inherits the user's SSH agent and
//! credential helpers automatically.

pub mod cli;
pub mod errors;
pub mod validation;

pub use cli::{GitCommand, GitOutput, SPAWN_FAILURE_CODE, run_blocking};
pub use errors::GitError;
