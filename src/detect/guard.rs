//! Scoped restoration of mutated repository state.
//!
//! Each guard captures the state it will put back when it is created and
//! restores it in `Drop`, so every exit path of a scenario (early return,
//! `?`, panic unwind) leaves the repository as it was found. Restoration
//! problems are logged, never propagated.

use super::git;
use crate::engine::CommandOutput;
use crate::error::HarnessError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

struct Snapshot {
    path: PathBuf,
    original: Vec<u8>,
    digest: [u8; 32],
}

/// Restores the original bytes of every captured file.
pub struct FileRestoreGuard {
    snapshots: Vec<Snapshot>,
}

impl FileRestoreGuard {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
        }
    }

    /// Snapshot `path` (once) before it is modified.
    pub fn capture(&mut self, path: &Path) -> io::Result<()> {
        if self.snapshots.iter().any(|s| s.path == path) {
            return Ok(());
        }
        let original = fs::read(path)?;
        let digest = Sha256::digest(&original).into();
        self.snapshots.push(Snapshot {
            path: path.to_path_buf(),
            original,
            digest,
        });
        Ok(())
    }

    /// Capture `path` and append `code` to it.
    pub fn append(&mut self, path: &Path, code: &str) -> io::Result<()> {
        self.capture(path)?;
        let mut bytes = self
            .snapshots
            .iter()
            .find(|s| s.path == path)
            .map(|s| s.original.clone())
            .unwrap_or_default();
        bytes.extend_from_slice(code.as_bytes());
        fs::write(path, bytes)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.snapshots.iter().map(|s| s.path.as_path())
    }

    /// Write every snapshot back and verify it; returns the failures.
    pub fn restore(&self) -> Vec<HarnessError> {
        let mut failures = Vec::new();
        for snap in &self.snapshots {
            let outcome = fs::write(&snap.path, &snap.original).and_then(|_| fs::read(&snap.path));
            let reason = match outcome {
                Ok(now) if <[u8; 32]>::from(Sha256::digest(&now)) == snap.digest => continue,
                Ok(_) => "content differs after rewrite".to_string(),
                Err(e) => e.to_string(),
            };
            failures.push(HarnessError::RestorationFailure {
                path: snap.path.clone(),
                reason,
            });
        }
        failures
    }
}

impl Default for FileRestoreGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileRestoreGuard {
    fn drop(&mut self) {
        for err in self.restore() {
            warn!(error = %err, "file restoration failed");
        }
    }
}

/// Undoes a test commit: hard reset to the recorded revision, or, when no
/// revision was captured, removal of the commit made on the unborn branch and
/// of any index entries it added. File contents are rewritten afterwards
/// either way.
pub struct CommitGuard {
    repo: PathBuf,
    head: Option<String>,
    files: FileRestoreGuard,
    /// Staged paths that were not in the index beforehand.
    newly_staged: Vec<PathBuf>,
    committed: bool,
}

impl CommitGuard {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
            head: git::head(repo),
            files: FileRestoreGuard::new(),
            newly_staged: Vec::new(),
            committed: false,
        }
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    pub fn files(&mut self) -> &mut FileRestoreGuard {
        &mut self.files
    }

    /// `git add` one file, remembering whether it was already tracked.
    pub fn stage(&mut self, file: &Path) -> CommandOutput {
        if !git::is_tracked(&self.repo, file) && !self.newly_staged.iter().any(|p| p == file) {
            self.newly_staged.push(file.to_path_buf());
        }
        git::add(&self.repo, file)
    }

    pub fn commit(&mut self, message: &str) -> CommandOutput {
        let out = git::commit(&self.repo, message);
        self.committed |= out.success;
        out
    }

    fn restore_unborn(&self) {
        if self.committed {
            let out = git::delete_head(&self.repo);
            if !out.success {
                let err = HarnessError::RestorationFailure {
                    path: self.repo.clone(),
                    reason: format!("git update-ref -d HEAD: {}", out.combined().trim()),
                };
                warn!(error = %err, "commit restoration failed");
            }
        }
        for path in &self.newly_staged {
            if !git::unstage(&self.repo, path).success {
                debug!(path = %path.display(), "unstage skipped");
            }
        }
        for path in self.files.paths() {
            if self.newly_staged.iter().any(|p| p == path) {
                continue;
            }
            if !git::checkout_file(&self.repo, path).success {
                debug!(path = %path.display(), "checkout of untracked file skipped");
            }
        }
    }
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        match &self.head {
            Some(head) => {
                let out = git::reset_hard(&self.repo, head);
                if !out.success {
                    let err = HarnessError::RestorationFailure {
                        path: self.repo.clone(),
                        reason: format!("git reset --hard {head}: {}", out.combined().trim()),
                    };
                    warn!(error = %err, "commit restoration failed");
                } else {
                    debug!(repo = %self.repo.display(), head = %head, "reset to original revision");
                }
            }
            None => self.restore_unborn(),
        }
        // `files` drops after this body and rewrites the original bytes.
    }
}

/// Checks the original branch back out.
pub struct BranchGuard {
    repo: PathBuf,
    branch: String,
}

impl BranchGuard {
    pub fn new(repo: &Path, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.to_path_buf(),
            branch: branch.into(),
        }
    }
}

impl Drop for BranchGuard {
    fn drop(&mut self) {
        let out = git::checkout(&self.repo, &self.branch);
        if !out.success {
            let err = HarnessError::RestorationFailure {
                path: self.repo.clone(),
                reason: format!("git checkout {}: {}", self.branch, out.combined().trim()),
            };
            warn!(error = %err, "branch restoration failed");
        }
    }
}
