//! Git command construction and blocking execution.
//!
//! [`GitCommand`] is one invocation's argument vector. Constructors exist for
//! every operation skiff exposes; user-supplied values are validated during
//! construction, so a builder failure happens before any lock or spawn.
//!
//! [`run_blocking`] is the synchronous run-to-completion call shape: combined
//! stdout+stderr plus the exit code, with spawn failure kept distinct from a
//! tool-reported failure.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::errors::GitError;
use crate::validation::{
    validate_branch_name, validate_commit_message, validate_remote_name, validate_remote_url,
};

/// Exit code reported for operations whose subprocess never started.
///
/// Real git exit codes are non-negative, so −1 is unambiguous.
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// A single git invocation: program, argument vector, working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GitCommand {
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
}

impl GitCommand {
    fn new(dir: &Path, args: Vec<String>) -> Self {
        Self {
            program: "git".to_string(),
            args,
            dir: dir.to_path_buf(),
        }
    }

    /// Override the program to run. Test seam; production always runs `git`.
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Human-readable form for logs and busy messages, e.g. `git push --force-with-lease`.
    pub fn describe(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }

    pub fn commit(dir: &Path, message: &str) -> Result<Self, GitError> {
        let message = validate_commit_message(message)?;
        Ok(Self::new(
            dir,
            vec!["commit".into(), "-m".into(), message],
        ))
    }

    pub fn commit_amend(dir: &Path, message: Option<&str>) -> Result<Self, GitError> {
        let mut args = vec!["commit".to_string(), "--amend".to_string()];
        match message {
            Some(m) => {
                let m = validate_commit_message(m)?;
                args.push("-m".into());
                args.push(m);
            }
            None => args.push("--no-edit".into()),
        }
        Ok(Self::new(dir, args))
    }

    pub fn push(dir: &Path, force: bool) -> Self {
        let mut args = vec!["push".to_string(), "--progress".to_string()];
        if force {
            args.push("--force-with-lease".into());
        }
        Self::new(dir, args)
    }

    pub fn pull(dir: &Path) -> Self {
        Self::new(dir, vec!["pull".into(), "--progress".into()])
    }

    pub fn stash_push(dir: &Path, message: Option<&str>) -> Result<Self, GitError> {
        let mut args = vec!["stash".to_string(), "push".to_string()];
        if let Some(m) = message {
            let m = validate_commit_message(m)?;
            args.push("-m".into());
            args.push(m);
        }
        Ok(Self::new(dir, args))
    }

    pub fn stash_pop(dir: &Path) -> Self {
        Self::new(dir, vec!["stash".into(), "pop".into()])
    }

    pub fn stash_apply(dir: &Path, index: usize) -> Self {
        Self::new(
            dir,
            vec!["stash".into(), "apply".into(), format!("stash@{{{index}}}")],
        )
    }

    pub fn stash_drop(dir: &Path, index: usize) -> Self {
        Self::new(
            dir,
            vec!["stash".into(), "drop".into(), format!("stash@{{{index}}}")],
        )
    }

    pub fn branch_create(dir: &Path, name: &str) -> Result<Self, GitError> {
        let name = validate_branch_name(name)?;
        Ok(Self::new(dir, vec!["checkout".into(), "-b".into(), name]))
    }

    pub fn branch_switch(dir: &Path, name: &str) -> Result<Self, GitError> {
        let name = validate_branch_name(name)?;
        Ok(Self::new(dir, vec!["checkout".into(), name]))
    }

    pub fn branch_delete(dir: &Path, name: &str, force: bool) -> Result<Self, GitError> {
        let name = validate_branch_name(name)?;
        let flag = if force { "-D" } else { "-d" };
        Ok(Self::new(
            dir,
            vec!["branch".into(), flag.to_string(), name],
        ))
    }

    pub fn remote_add(dir: &Path, name: &str, url: &str) -> Result<Self, GitError> {
        let name = validate_remote_name(name)?;
        let url = validate_remote_url(url)?;
        Ok(Self::new(dir, vec!["remote".into(), "add".into(), name, url]))
    }

    // Read-only queries. These never go through the write lock.

    pub fn status(dir: &Path) -> Self {
        Self::new(dir, vec!["status".into(), "--porcelain".into()])
    }

    pub fn branch_list(dir: &Path) -> Self {
        Self::new(dir, vec!["branch".into(), "--list".into()])
    }

    pub fn stash_list(dir: &Path) -> Self {
        Self::new(dir, vec!["stash".into(), "list".into()])
    }
}

/// Captured result of a run-to-completion invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Exit code; [`SPAWN_FAILURE_CODE`] when the process died to a signal.
    pub code: i32,
    /// Combined stdout + stderr, in that order.
    pub output: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a command to completion, capturing combined output and exit code.
///
/// A non-zero exit is not an `Err`: the tool ran and reported a failure, and
/// the caller surfaces output and code as-is. Only a spawn failure (missing
/// binary, permission denied) is an error.
pub fn run_blocking(cmd: &GitCommand) -> Result<GitOutput, GitError> {
    info!(
        event = "git.cli.run_started",
        command = %cmd.describe(),
        path = %cmd.dir.display()
    );

    let output = std::process::Command::new(&cmd.program)
        .current_dir(&cmd.dir)
        .args(&cmd.args)
        .output()
        .map_err(|e| {
            error!(
                event = "git.cli.spawn_failed",
                command = %cmd.describe(),
                error = %e
            );
            GitError::SpawnFailed {
                program: cmd.program.clone(),
                message: e.to_string(),
            }
        })?;

    // code() is None for signal-terminated processes
    let code = output.status.code().unwrap_or(SPAWN_FAILURE_CODE);

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if code == 0 {
        info!(event = "git.cli.run_completed", command = %cmd.describe());
    } else {
        warn!(
            event = "git.cli.run_failed",
            command = %cmd.describe(),
            code = code,
            output = %combined.trim()
        );
    }

    Ok(GitOutput {
        code,
        output: combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_repo() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.invalid"],
            vec!["config", "user.name", "Test"],
        ] {
            let status = std::process::Command::new("git")
                .current_dir(dir.path())
                .args(&args)
                .output()
                .expect("git must be installed for tests")
                .status;
            assert!(status.success(), "git {:?} failed", args);
        }
        dir
    }

    #[test]
    fn test_commit_builds_expected_args() {
        let cmd = GitCommand::commit(Path::new("/repo"), "fix: bug").unwrap();
        assert_eq!(cmd.program, "git");
        assert_eq!(cmd.args, vec!["commit", "-m", "fix: bug"]);
        assert_eq!(cmd.dir, PathBuf::from("/repo"));
    }

    #[test]
    fn test_commit_rejects_empty_message() {
        assert!(GitCommand::commit(Path::new("/repo"), "   ").is_err());
    }

    #[test]
    fn test_commit_amend_variants() {
        let no_edit = GitCommand::commit_amend(Path::new("/repo"), None).unwrap();
        assert_eq!(no_edit.args, vec!["commit", "--amend", "--no-edit"]);

        let reworded = GitCommand::commit_amend(Path::new("/repo"), Some("new msg")).unwrap();
        assert_eq!(reworded.args, vec!["commit", "--amend", "-m", "new msg"]);
    }

    #[test]
    fn test_push_force_uses_force_with_lease() {
        let plain = GitCommand::push(Path::new("/repo"), false);
        assert_eq!(plain.args, vec!["push", "--progress"]);

        let forced = GitCommand::push(Path::new("/repo"), true);
        assert_eq!(forced.args, vec!["push", "--progress", "--force-with-lease"]);
    }

    #[test]
    fn test_stash_index_addressing() {
        let apply = GitCommand::stash_apply(Path::new("/repo"), 2);
        assert_eq!(apply.args, vec!["stash", "apply", "stash@{2}"]);

        let drop = GitCommand::stash_drop(Path::new("/repo"), 0);
        assert_eq!(drop.args, vec!["stash", "drop", "stash@{0}"]);
    }

    #[test]
    fn test_branch_delete_force_flag() {
        let soft = GitCommand::branch_delete(Path::new("/repo"), "old", false).unwrap();
        assert_eq!(soft.args, vec!["branch", "-d", "old"]);

        let hard = GitCommand::branch_delete(Path::new("/repo"), "old", true).unwrap();
        assert_eq!(hard.args, vec!["branch", "-D", "old"]);
    }

    #[test]
    fn test_remote_add_rejects_malformed_url() {
        let result = GitCommand::remote_add(Path::new("/repo"), "origin", "not a url");
        assert!(matches!(
            result.unwrap_err(),
            GitError::InvalidRemoteUrl { .. }
        ));
    }

    #[test]
    fn test_branch_create_rejects_injection() {
        let result = GitCommand::branch_create(Path::new("/repo"), "--track=evil");
        assert!(matches!(
            result.unwrap_err(),
            GitError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_describe() {
        let cmd = GitCommand::push(Path::new("/repo"), true);
        assert_eq!(cmd.describe(), "git push --progress --force-with-lease");
    }

    #[test]
    fn test_run_blocking_success() {
        let repo = init_test_repo();
        let result = run_blocking(&GitCommand::status(repo.path())).unwrap();
        assert!(result.success());
    }

    #[test]
    fn test_run_blocking_captures_failure_output() {
        let repo = init_test_repo();
        // No commits yet, so stash pop has nothing to pop: non-zero exit,
        // output captured, but no Err.
        let result = run_blocking(&GitCommand::stash_pop(repo.path())).unwrap();
        assert!(!result.success());
        assert!(!result.output.is_empty());
    }

    #[test]
    fn test_run_blocking_spawn_failure_is_distinguished() {
        let repo = tempfile::TempDir::new().unwrap();
        let cmd = GitCommand::status(repo.path()).with_program("skiff-no-such-binary");
        let result = run_blocking(&cmd);
        assert!(matches!(result.unwrap_err(), GitError::SpawnFailed { .. }));
    }
}
