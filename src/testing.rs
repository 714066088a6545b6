//! In-process engine double for unit tests.
//!
//! Indexing scans `export function <name>(` declarations from `.ts/.tsx/.js/.jsx`
//! files. Search and call-graph visibility can lag a configurable number of
//! queries behind each index, mimicking an eventually consistent engine.

use crate::engine::{Engine, EngineOp, Invocation};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Default)]
struct RepoState {
    symbols: Vec<String>,
    searches_since_index: usize,
    graph_queries_since_index: usize,
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    pub(crate) repos: Mutex<HashMap<PathBuf, RepoState>>,
    pub(crate) calls: Mutex<Vec<(&'static str, PathBuf)>>,
    /// Search calls after an index before new symbols become visible.
    pub search_lag: usize,
    /// Call-graph calls after an index before edges become visible.
    pub graph_lag: usize,
    /// Omit hashes from search output.
    pub hide_hashes: bool,
    /// Emit structured JSON lines instead of text.
    pub json_output: bool,
    pub index_delay: Duration,
    pub search_delay: Duration,
    /// Operation labels that always fail.
    pub failing: HashSet<&'static str>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, label: &'static str) -> Self {
        self.failing.insert(label);
        self
    }

    pub fn calls(&self, label: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == label)
            .count()
    }

    pub fn searches_in(&self, dir: &Path) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, d)| *l == "search-symbols" && d == dir)
            .count()
    }

    pub fn is_indexed(&self, dir: &Path) -> bool {
        self.repos.lock().unwrap().contains_key(dir)
    }

    fn reindex(&self, dir: &Path) {
        let symbols = scan_exports(dir);
        let mut repos = self.repos.lock().unwrap();
        repos.insert(
            dir.to_path_buf(),
            RepoState {
                symbols,
                ..Default::default()
            },
        );
    }

    fn search(&self, dir: &Path, pattern: &str, limit: usize) -> Option<String> {
        let mut repos = self.repos.lock().unwrap();
        let state = repos.get_mut(dir)?;
        state.searches_since_index += 1;
        if state.searches_since_index <= self.search_lag {
            return Some(String::new());
        }
        let needle = pattern.to_lowercase();
        let lines: Vec<String> = state
            .symbols
            .iter()
            .filter(|s| s.to_lowercase().contains(&needle))
            .take(limit)
            .map(|s| {
                if self.json_output {
                    format!(r#"{{"s":"{s}","h":"{}","k":"fn","m":"src"}}"#, symbol_hash(s))
                } else if self.hide_hashes {
                    format!("{s} fn src")
                } else {
                    format!("{s} {} fn src", symbol_hash(s))
                }
            })
            .collect();
        Some(lines.join("\n"))
    }

    fn call_graph(&self, dir: &Path) -> Option<String> {
        let mut repos = self.repos.lock().unwrap();
        let state = repos.get_mut(dir)?;
        state.graph_queries_since_index += 1;
        if state.graph_queries_since_index <= self.graph_lag {
            return Some("edges: 0".to_string());
        }
        let edges: Vec<String> = state
            .symbols
            .iter()
            .map(|s| format!("{} -> 00000000000000ff", symbol_hash(s)))
            .collect();
        Some(edges.join("\n"))
    }
}

impl Engine for FakeEngine {
    fn invoke(&self, op: &EngineOp, dir: &Path, _timeout: Duration) -> Invocation {
        let start = Instant::now();
        self.calls
            .lock()
            .unwrap()
            .push((op.label(), dir.to_path_buf()));

        if self.failing.contains(op.label()) {
            return Invocation::failed("injected failure", start.elapsed());
        }

        let output = match op {
            EngineOp::Index { .. } | EngineOp::IncrementalIndex { .. } => {
                thread::sleep(self.index_delay);
                self.reindex(dir);
                Some("indexed".to_string())
            }
            EngineOp::SearchSymbols { pattern, limit } => {
                thread::sleep(self.search_delay);
                self.search(dir, pattern, *limit)
            }
            EngineOp::CallGraph => self.call_graph(dir),
            EngineOp::Overview => self.is_indexed(dir).then(|| "overview".to_string()),
            EngineOp::CacheInfo => Some(if self.is_indexed(dir) {
                "cache: present".to_string()
            } else {
                "No cache found".to_string()
            }),
            EngineOp::CacheClear => {
                self.repos.lock().unwrap().remove(dir);
                Some(String::new())
            }
        };

        match output {
            Some(out) => Invocation::ok(out, start.elapsed()),
            None => Invocation::failed("no index", start.elapsed()),
        }
    }

    fn describe(&self) -> String {
        "fake-engine".to_string()
    }
}

/// 16-hex FNV-1a of the symbol name.
pub(crate) fn symbol_hash(name: &str) -> String {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in name.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    format!("{h:016x}")
}

fn scan_exports(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if entry.file_type().is_dir() && path.ends_with(".git") {
            continue;
        }
        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "ts" | "tsx" | "js" | "jsx"));
        if !entry.file_type().is_file() || !is_source {
            continue;
        }
        let Ok(text) = fs::read_to_string(path) else {
            continue;
        };
        for line in text.lines() {
            if let Some(rest) = line.trim_start().strip_prefix("export function ") {
                if let Some(name) = rest.split('(').next() {
                    out.push(name.trim().to_string());
                }
            }
        }
    }
    out
}

/// A scratch repository with `files` TypeScript sources.
pub(crate) fn scratch_repo(files: usize) -> (tempfile::TempDir, crate::workload::Repo) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("sample-repo");
    fs::create_dir_all(root.join("src")).unwrap();
    for i in 0..files {
        fs::write(
            root.join("src").join(format!("mod{i}.ts")),
            format!("export function existing{i}() {{\n    return {i};\n}}\n"),
        )
        .unwrap();
    }
    (dir, crate::workload::Repo::from_path(root))
}

/// Whether a usable `git` is on PATH.
pub(crate) fn git_available() -> bool {
    crate::engine::run_command("git", &["--version"], None, Duration::from_secs(10)).success
}
