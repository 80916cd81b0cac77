//! Argument validation for git invocations.
//!
//! Every user-supplied value that ends up in a git argument vector passes
//! through here first, so validation failures surface before any lock is
//! taken or any subprocess is spawned.

use std::path::Path;

use crate::errors::GitError;

/// Validate a git argument to prevent injection.
///
/// Rejects values that start with `-` (option injection), contain control
/// characters, or contain `::` sequences (refspec injection).
pub fn validate_git_arg(value: &str, label: &str) -> Result<(), GitError> {
    if value.starts_with('-') {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: format!("'{value}' must not start with '-'"),
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: "contains control characters".to_string(),
        });
    }
    if value.contains("::") {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: "'::' sequences are not allowed".to_string(),
        });
    }
    Ok(())
}

/// Validate a branch name and return the trimmed form.
pub fn validate_branch_name(branch: &str) -> Result<String, GitError> {
    let trimmed = branch.trim();

    if trimmed.is_empty() {
        return Err(GitError::InvalidArgument {
            label: "branch name".to_string(),
            message: "cannot be empty".to_string(),
        });
    }

    // Git branch name rules
    if trimmed.contains("..") || trimmed.chars().any(char::is_whitespace) {
        return Err(GitError::InvalidArgument {
            label: "branch name".to_string(),
            message: format!("'{trimmed}' is not a valid branch name"),
        });
    }
    validate_git_arg(trimmed, "branch name")?;

    Ok(trimmed.to_string())
}

/// Validate a remote name and return the trimmed form.
///
/// Remote names follow the same character rules as branch names.
pub fn validate_remote_name(remote: &str) -> Result<String, GitError> {
    let trimmed = remote.trim();

    if trimmed.is_empty() {
        return Err(GitError::InvalidArgument {
            label: "remote name".to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
        return Err(GitError::InvalidArgument {
            label: "remote name".to_string(),
            message: format!("'{trimmed}' is not a valid remote name"),
        });
    }
    validate_git_arg(trimmed, "remote name")?;

    Ok(trimmed.to_string())
}

/// Validate a remote URL and return the trimmed form.
///
/// Accepts `scheme://…` URLs, scp-like `host:path` forms, and local paths.
/// Anything else is rejected here, before lock acquisition or spawn.
pub fn validate_remote_url(url: &str) -> Result<String, GitError> {
    let trimmed = url.trim();

    let reject = |message: &str| {
        Err(GitError::InvalidRemoteUrl {
            url: trimmed.to_string(),
            message: message.to_string(),
        })
    };

    if trimmed.is_empty() {
        return reject("cannot be empty");
    }
    if trimmed.starts_with('-') {
        return reject("must not start with '-'");
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return reject("contains control characters");
    }
    if trimmed.chars().any(char::is_whitespace) {
        return reject("contains whitespace");
    }

    // scheme://host/path
    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+');
        if !scheme_ok || rest.is_empty() {
            return reject("malformed scheme URL");
        }
        return Ok(trimmed.to_string());
    }

    // Local path
    if trimmed.starts_with('/')
        || trimmed.starts_with("./")
        || trimmed.starts_with("../")
        || trimmed.starts_with("~/")
    {
        return Ok(trimmed.to_string());
    }

    // scp-like user@host:path
    if let Some((host, path)) = trimmed.split_once(':')
        && !host.is_empty()
        && !path.is_empty()
        && !host.contains('/')
    {
        return Ok(trimmed.to_string());
    }

    reject("not a recognized URL form")
}

/// Validate a commit message: non-empty, no control characters other than
/// newlines (multi-line messages are legitimate).
pub fn validate_commit_message(message: &str) -> Result<String, GitError> {
    let trimmed = message.trim();

    if trimmed.is_empty() {
        return Err(GitError::InvalidArgument {
            label: "commit message".to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    if trimmed.chars().any(|c| c.is_control() && c != '\n') {
        return Err(GitError::InvalidArgument {
            label: "commit message".to_string(),
            message: "contains control characters".to_string(),
        });
    }

    Ok(trimmed.to_string())
}

/// Check whether the given directory is a git working tree root.
pub fn is_git_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_git_arg_rejects_dash_prefix() {
        let result = validate_git_arg("--upload-pack=evil", "remote name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must not start"));
    }

    #[test]
    fn test_validate_git_arg_rejects_control_chars() {
        assert!(validate_git_arg("main\x00evil", "branch name").is_err());
    }

    #[test]
    fn test_validate_git_arg_rejects_double_colon() {
        assert!(validate_git_arg("refs::heads", "refspec").is_err());
    }

    #[test]
    fn test_validate_git_arg_accepts_valid_values() {
        assert!(validate_git_arg("origin", "remote name").is_ok());
        assert!(validate_git_arg("feature/auth", "branch name").is_ok());
    }

    #[test]
    fn test_validate_branch_name() {
        assert_eq!(validate_branch_name("feature-x").unwrap(), "feature-x");
        assert_eq!(validate_branch_name("  v1.2.3  ").unwrap(), "v1.2.3");

        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("   ").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("-b").is_err());
        assert!(validate_branch_name("a b").is_err());
    }

    #[test]
    fn test_validate_remote_name() {
        assert_eq!(validate_remote_name("origin").unwrap(), "origin");
        assert_eq!(validate_remote_name("upstream").unwrap(), "upstream");

        assert!(validate_remote_name("").is_err());
        assert!(validate_remote_name("a/b").is_err());
        assert!(validate_remote_name("-origin").is_err());
    }

    #[test]
    fn test_validate_remote_url_accepts_common_forms() {
        assert!(validate_remote_url("https://example.com/repo.git").is_ok());
        assert!(validate_remote_url("ssh://git@example.com/repo.git").is_ok());
        assert!(validate_remote_url("git@example.com:user/repo.git").is_ok());
        assert!(validate_remote_url("/srv/git/repo.git").is_ok());
        assert!(validate_remote_url("../other-repo").is_ok());
    }

    #[test]
    fn test_validate_remote_url_rejects_malformed() {
        assert!(validate_remote_url("").is_err());
        assert!(validate_remote_url("not a url").is_err());
        assert!(validate_remote_url("--upload-pack=evil").is_err());
        assert!(validate_remote_url("http://").is_err());
        assert!(validate_remote_url("://missing-scheme").is_err());
        assert!(validate_remote_url("plainword").is_err());
    }

    #[test]
    fn test_validate_commit_message() {
        assert_eq!(validate_commit_message("fix: a bug").unwrap(), "fix: a bug");
        assert!(validate_commit_message("line one\n\nbody").is_ok());

        assert!(validate_commit_message("").is_err());
        assert!(validate_commit_message("  \n ").is_err());
        assert!(validate_commit_message("msg\x07bell").is_err());
    }

    #[test]
    fn test_is_git_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!is_git_repository(dir.path()));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(is_git_repository(dir.path()));
    }
}
