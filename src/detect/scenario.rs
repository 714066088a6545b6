//! Mutate, measure, restore.
//!
//! Each scenario changes a repository in a way a developer would, asks the
//! engine to reindex, and measures how long the change takes to surface.
//! Restoration is owned by the guards in [`super::guard`]; no scenario
//! restores state by hand.

use super::guard::{BranchGuard, CommitGuard, FileRestoreGuard};
use super::poller::{search_symbol, DetectionPoller, PollConfig};
use super::git;
use crate::engine::{Engine, EngineOp};
use crate::harness::{millis, timed};
use crate::schema::{DetectionResult, Operation};
use crate::workload::{eligible_source_files, Repo};
use rand::Rng;
use rayon::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

pub const FILE_SAVE: &str = "file_save_detection";
pub const INCREMENTAL_COMMIT: &str = "incremental_commit";
pub const GIT_CHECKOUT: &str = "git_checkout";
pub const MULTI_FILE: &str = "multi_file_change";

/// `<unix millis>_<four lowercase letters>`.
pub fn unique_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    format!("{millis}_{suffix}")
}

fn file_save_snippet(name: &str) -> String {
    format!(
        "\n// Semfora test function - will be removed\nexport function {name}() {{\n    console.log(\"test\");\n    return Date.now();\n}}\n"
    )
}

fn relative(repo: &Repo, path: &Path) -> String {
    path.strip_prefix(&repo.path)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Which scenario families a run includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenarioSelection {
    /// File save and multi-file change.
    pub file_save: bool,
    /// Incremental commit and branch checkout.
    pub git_ops: bool,
}

impl Default for ScenarioSelection {
    fn default() -> Self {
        Self {
            file_save: true,
            git_ops: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScenarioOptions {
    pub iterations: usize,
    /// Upper bound on files touched by the multi-file scenario.
    pub num_files: usize,
    pub selection: ScenarioSelection,
    /// Run distinct repositories concurrently.
    pub parallel_repos: bool,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            iterations: 3,
            num_files: 5,
            selection: ScenarioSelection::default(),
            parallel_repos: false,
        }
    }
}

pub struct ScenarioRunner<'a> {
    engine: &'a dyn Engine,
    poller: DetectionPoller<'a>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(engine: &'a dyn Engine, poll: PollConfig) -> Self {
        Self {
            engine,
            poller: DetectionPoller::new(engine, poll),
        }
    }

    fn search_limit(&self) -> usize {
        self.poller.config().search_limit
    }

    /// Combine a reindex with a poll into one scenario result.
    fn merge(
        &self,
        test_name: &str,
        operation: Operation,
        repo: &Repo,
        reindex_ms: f64,
        poll: DetectionResult,
    ) -> DetectionResult {
        let symbol_ms = poll.symbol_detection_ms.map(|ms| reindex_ms + ms);
        let call_graph_ms = poll.call_graph_detection_ms.map(|ms| reindex_ms + ms);
        let mut result = DetectionResult::new(test_name, &repo.name, operation)
            .with_symbol(poll.symbol_detected, symbol_ms)
            .with_call_graph(call_graph_ms)
            .with_metadata(poll.metadata);
        result.total_time_ms = reindex_ms + poll.total_time_ms;
        result.poll_count = poll.poll_count;
        result
    }

    /// Append an exported function to the first eligible file, reindex, and
    /// poll for the symbol and its call-graph entry.
    pub fn file_save(&self, repo: &Repo, iterations: usize) -> Vec<DetectionResult> {
        let Some(file) = eligible_source_files(&repo.path).into_iter().next() else {
            warn!(repo = %repo.name, "no eligible source files, skipping file save");
            return Vec::new();
        };

        let mut results = Vec::with_capacity(iterations);
        for i in 0..iterations {
            let func_name = format!("semforaTestFunc_{}", unique_id());
            let mut guard = FileRestoreGuard::new();
            if let Err(e) = guard.append(&file, &file_save_snippet(&func_name)) {
                results.push(DetectionResult::failed(
                    FILE_SAVE,
                    &repo.name,
                    Operation::FileSave,
                    0.0,
                    format!("could not modify {}: {e}", file.display()),
                ));
                continue;
            }

            let (reindex, elapsed) = timed(|| self.engine.run(&EngineOp::index(), &repo.path));
            let reindex_ms = millis(elapsed);
            if !reindex.success {
                results.push(DetectionResult::failed(
                    FILE_SAVE,
                    &repo.name,
                    Operation::FileSave,
                    reindex_ms,
                    "Reindex failed",
                ));
                continue;
            }

            let poll = self.poller.poll(repo, &func_name, true);
            results.push(
                self.merge(FILE_SAVE, Operation::FileSave, repo, reindex_ms, poll)
                    .with_metadata(json!({
                        "func_name": func_name,
                        "reindex_time_ms": reindex_ms,
                        "file": relative(repo, &file),
                        "iteration": i + 1,
                    })),
            );
            drop(guard);
        }
        results
    }

    /// Commit a new function, run an incremental reindex, and poll for it.
    pub fn incremental_commit(&self, repo: &Repo, iterations: usize) -> Vec<DetectionResult> {
        if !git::is_repo(&repo.path) {
            info!(repo = %repo.name, "not a git repository, skipping commit scenario");
            return Vec::new();
        }
        let Some(file) = eligible_source_files(&repo.path).into_iter().next() else {
            warn!(repo = %repo.name, "no eligible source files, skipping commit scenario");
            return Vec::new();
        };

        let mut results = Vec::with_capacity(iterations);
        for i in 0..iterations {
            let id = unique_id();
            let func_name = format!("semforaCommitTest_{id}");
            let mut guard = CommitGuard::new(&repo.path);
            let original_head = guard.head().map(str::to_string);

            let code = format!("\nexport function {func_name}() {{ return 42; }}\n");
            if let Err(e) = guard.files().append(&file, &code) {
                results.push(DetectionResult::failed(
                    INCREMENTAL_COMMIT,
                    &repo.name,
                    Operation::GitCommit,
                    0.0,
                    format!("could not modify {}: {e}", file.display()),
                ));
                continue;
            }
            let staged = guard.stage(&file);
            let committed = guard.commit(&format!("Semfora test commit {id}"));
            if !staged.success || !committed.success {
                warn!(repo = %repo.name, output = %committed.combined().trim(), "test commit failed");
            }

            let (reindex, elapsed) =
                timed(|| self.engine.run(&EngineOp::incremental_index(), &repo.path));
            let reindex_ms = millis(elapsed);
            if !reindex.success {
                results.push(DetectionResult::failed(
                    INCREMENTAL_COMMIT,
                    &repo.name,
                    Operation::GitCommit,
                    reindex_ms,
                    "Incremental reindex failed",
                ));
                continue;
            }

            let poll = self.poller.poll(repo, &func_name, true);
            results.push(
                self.merge(INCREMENTAL_COMMIT, Operation::GitCommit, repo, reindex_ms, poll)
                    .with_metadata(json!({
                        "func_name": func_name,
                        "reindex_time_ms": reindex_ms,
                        "original_head": original_head,
                        "committed": committed.success,
                        "iteration": i + 1,
                    })),
            );
        }
        results
    }

    /// Check out another local branch and time the reindex that follows.
    pub fn git_checkout(&self, repo: &Repo) -> Vec<DetectionResult> {
        if !git::is_repo(&repo.path) {
            return Vec::new();
        }
        let Some(current) = git::current_branch(&repo.path) else {
            info!(repo = %repo.name, "detached HEAD, skipping checkout scenario");
            return Vec::new();
        };
        let Some(target) = git::local_branches(&repo.path)
            .into_iter()
            .find(|b| *b != current)
        else {
            info!(repo = %repo.name, "no other branches, skipping checkout scenario");
            return Vec::new();
        };

        let start = Instant::now();
        if !git::checkout(&repo.path, &target).success {
            warn!(repo = %repo.name, branch = %target, "checkout failed");
            return Vec::new();
        }
        let _guard = BranchGuard::new(&repo.path, current.as_str());
        let checkout_ms = millis(start.elapsed());

        let reindex = self.engine.run(&EngineOp::index(), &repo.path);
        let total_ms = millis(start.elapsed());

        let mut result = DetectionResult::new(GIT_CHECKOUT, &repo.name, Operation::GitCheckout)
            .with_symbol(reindex.success, None)
            .with_metadata(json!({
                "from_branch": current,
                "to_branch": target,
                "checkout_time_ms": checkout_ms,
            }));
        result.total_time_ms = total_ms;
        if !reindex.success {
            result.error = Some("Reindex failed".to_string());
        }
        vec![result]
    }

    /// Add a distinct function to each of up to `num_files` files, reindex
    /// once, and check that every function is searchable.
    pub fn multi_file_change(&self, repo: &Repo, num_files: usize) -> Vec<DetectionResult> {
        let files: Vec<_> = eligible_source_files(&repo.path)
            .into_iter()
            .take(num_files)
            .collect();
        if files.len() < 2 {
            info!(repo = %repo.name, "fewer than two eligible files, skipping multi-file scenario");
            return Vec::new();
        }

        let id = unique_id();
        let names: Vec<String> = (0..files.len())
            .map(|i| format!("semforaMulti_{id}_{i}"))
            .collect();

        let mut guard = FileRestoreGuard::new();
        for (i, (file, name)) in files.iter().zip(&names).enumerate() {
            let code = format!("\nexport function {name}() {{ return {i}; }}\n");
            if let Err(e) = guard.append(file, &code) {
                return vec![DetectionResult::failed(
                    MULTI_FILE,
                    &repo.name,
                    Operation::MultiFileSave,
                    0.0,
                    format!("could not modify {}: {e}", file.display()),
                )];
            }
        }

        let start = Instant::now();
        let reindex = self.engine.run(&EngineOp::index(), &repo.path);
        let reindex_ms = millis(start.elapsed());
        if !reindex.success {
            return vec![DetectionResult::failed(
                MULTI_FILE,
                &repo.name,
                Operation::MultiFileSave,
                reindex_ms,
                "Reindex failed",
            )];
        }

        let detected = names
            .iter()
            .filter(|name| search_symbol(self.engine, &repo.path, name, self.search_limit()).is_some())
            .count();
        let total_ms = millis(start.elapsed());
        let all_found = detected == names.len();

        let mut result = DetectionResult::new(MULTI_FILE, &repo.name, Operation::MultiFileSave)
            .with_symbol(all_found, Some(total_ms))
            .with_metadata(json!({
                "files_changed": files.len(),
                "symbols_detected": detected,
                "reindex_time_ms": reindex_ms,
            }));
        result.total_time_ms = total_ms;
        drop(guard);
        vec![result]
    }

    /// Run the selected scenarios against one repository, in a fixed order.
    pub fn run_repo(&self, repo: &Repo, opts: &ScenarioOptions) -> Vec<DetectionResult> {
        if !repo.path.is_dir() {
            error!(path = %repo.path.display(), "repository not found, skipping");
            return Vec::new();
        }
        if !ensure_index(self.engine, repo) {
            error!(repo = %repo.name, "failed to create index, skipping");
            return Vec::new();
        }

        let mut results = Vec::new();
        if opts.selection.file_save {
            info!(repo = %repo.name, iterations = opts.iterations, "[1/4] file save detection");
            results.extend(self.file_save(repo, opts.iterations));
            info!(repo = %repo.name, "[2/4] multi-file changes");
            results.extend(self.multi_file_change(repo, opts.num_files));
        }
        if opts.selection.git_ops {
            info!(repo = %repo.name, iterations = opts.iterations, "[3/4] incremental commit detection");
            results.extend(self.incremental_commit(repo, opts.iterations));
            info!(repo = %repo.name, "[4/4] git checkout detection");
            results.extend(self.git_checkout(repo));
        }
        for r in &results {
            log_result(r);
        }
        results
    }

    /// Run scenarios over every repository.
    ///
    /// Duplicate paths are dropped first, so concurrent runs never share a
    /// repository.
    pub fn run_all(&self, repos: &[Repo], opts: &ScenarioOptions) -> Vec<DetectionResult> {
        let repos = distinct_repos(repos);
        if opts.parallel_repos && repos.len() > 1 {
            repos
                .par_iter()
                .map(|repo| self.run_repo(repo, opts))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        } else {
            repos.iter().flat_map(|repo| self.run_repo(repo, opts)).collect()
        }
    }
}

/// Build an index unless the engine already reports one.
pub fn ensure_index(engine: &dyn Engine, repo: &Repo) -> bool {
    let info = engine.run(&EngineOp::CacheInfo, &repo.path);
    if info.success && !info.output.contains("No cache") {
        return true;
    }
    info!(repo = %repo.name, "creating index");
    engine.run(&EngineOp::index(), &repo.path).success
}

fn distinct_repos(repos: &[Repo]) -> Vec<Repo> {
    let mut seen = HashSet::new();
    repos
        .iter()
        .filter(|r| seen.insert(r.path.canonicalize().unwrap_or_else(|_| r.path.clone())))
        .cloned()
        .collect()
}

fn log_result(r: &DetectionResult) {
    let status = if r.success { "OK" } else { "FAIL" };
    info!(
        test = %r.test_name,
        repo = %r.repo_name,
        status,
        total_ms = r.total_time_ms.round(),
        symbol_ms = r.symbol_detection_ms.map(f64::round),
        call_graph_ms = r.call_graph_detection_ms.map(f64::round),
        polls = r.poll_count,
        error = r.error.as_deref(),
        "scenario finished"
    );
}
