use crate::engine::{run_command, CommandOutput};
use std::path::Path;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

fn git(repo: &Path, args: &[&str]) -> CommandOutput {
    run_command("git", args, Some(repo), GIT_TIMEOUT)
}

fn git_stdout(repo: &Path, args: &[&str]) -> Option<String> {
    let out = git(repo, args);
    out.success.then(|| out.stdout.trim().to_string())
}

pub fn is_repo(repo: &Path) -> bool {
    repo.join(".git").exists()
}

pub fn head(repo: &Path) -> Option<String> {
    git_stdout(repo, &["rev-parse", "HEAD"]).filter(|s| !s.is_empty())
}

/// Current branch name; `None` when detached.
pub fn current_branch(repo: &Path) -> Option<String> {
    git_stdout(repo, &["branch", "--show-current"]).filter(|s| !s.is_empty())
}

/// Local branch names.
pub fn local_branches(repo: &Path) -> Vec<String> {
    git_stdout(repo, &["branch", "--format=%(refname:short)"])
        .map(|s| {
            s.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn add(repo: &Path, file: &Path) -> CommandOutput {
    let file = file.to_string_lossy().into_owned();
    git(repo, &["add", "--", file.as_str()])
}

/// Commit staged changes under a fixed harness identity.
pub fn commit(repo: &Path, message: &str) -> CommandOutput {
    git(
        repo,
        &[
            "-c",
            "user.name=semfora-bench",
            "-c",
            "user.email=semfora-bench@localhost",
            "commit",
            "--no-verify",
            "-m",
            message,
        ],
    )
}

pub fn reset_hard(repo: &Path, rev: &str) -> CommandOutput {
    git(repo, &["reset", "--hard", rev])
}

pub fn checkout(repo: &Path, branch: &str) -> CommandOutput {
    git(repo, &["checkout", branch])
}

pub fn checkout_file(repo: &Path, file: &Path) -> CommandOutput {
    let file = file.to_string_lossy().into_owned();
    git(repo, &["checkout", "--", file.as_str()])
}

/// Whether `file` is in the index.
pub fn is_tracked(repo: &Path, file: &Path) -> bool {
    let file = file.to_string_lossy().into_owned();
    git(repo, &["ls-files", "--error-unmatch", "--", file.as_str()]).success
}

/// Drop a file from the index, leaving the working tree alone.
pub fn unstage(repo: &Path, file: &Path) -> CommandOutput {
    let file = file.to_string_lossy().into_owned();
    git(repo, &["rm", "--cached", "-q", "--", file.as_str()])
}

/// Remove the current branch ref, returning the repository to its unborn state.
/// The working tree and index are kept.
pub fn delete_head(repo: &Path) -> CommandOutput {
    git(repo, &["update-ref", "-d", "HEAD"])
}
