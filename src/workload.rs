//! Workload catalog: which repositories and search patterns a run uses.
//!
//! The lists come from a [`WorkloadDescriptor`], either the built-in default
//! or a TOML file passed on the command line:
//!
//! ```toml
//! small = ["nestjs-starter"]
//! medium = ["zod"]
//! large = []
//! detection_repos = ["zod"]
//! search_patterns = ["function", "export"]
//! ```

use crate::error::{HarnessError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories that never hold source worth counting or mutating.
pub const SKIP_DIRS: &[&str] = &["node_modules", ".git", "target", "__pycache__", "dist", "build"];

const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "rs", "py", "go", "java", "c", "cpp", "h", "hpp",
];

/// Size tier of a test repository.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Tier {
    Small,
    Medium,
    Large,
    /// Every known tier plus any other directory in the corpus.
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadDescriptor {
    pub small: Vec<String>,
    pub medium: Vec<String>,
    pub large: Vec<String>,
    /// Repositories mutated by the detection scenarios.
    pub detection_repos: Vec<String>,
    pub search_patterns: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for WorkloadDescriptor {
    fn default() -> Self {
        Self {
            small: strings(&[
                "nestjs-starter",
                "react-realworld",
                "angular-realworld",
                "sample-hugo",
            ]),
            medium: strings(&[
                "express-examples",
                "fastify-examples",
                "koa-examples",
                "zod",
                "routing-controllers",
            ]),
            large: strings(&[
                "next.js",
                "typescript-eslint",
                "babel",
                "puppeteer",
                "playwright",
                "nextjs-examples",
            ]),
            detection_repos: strings(&["zod", "express-examples", "next.js"]),
            search_patterns: strings(&[
                "function",
                "export",
                "handler",
                "error",
                "async",
                "render",
                "parse",
                "interface",
            ]),
        }
    }
}

impl WorkloadDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let descriptor: Self = toml::from_str(&text).map_err(|e| HarnessError::Workload {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if descriptor.search_patterns.is_empty() {
            return Err(HarnessError::Workload {
                path: path.to_path_buf(),
                reason: "search_patterns must not be empty".to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Repository names for `tier`, in declaration order.
    pub fn names(&self, tier: Tier) -> Vec<&str> {
        let lists: Vec<&Vec<String>> = match tier {
            Tier::Small => vec![&self.small],
            Tier::Medium => vec![&self.medium],
            Tier::Large => vec![&self.large],
            Tier::All => vec![&self.small, &self.medium, &self.large],
        };
        lists.into_iter().flatten().map(String::as_str).collect()
    }
}

/// A test repository on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repo {
    pub name: String,
    pub path: PathBuf,
}

impl Repo {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Name a repository after its directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

#[derive(Clone, Debug)]
pub struct WorkloadCatalog {
    root: PathBuf,
    descriptor: WorkloadDescriptor,
}

impl WorkloadCatalog {
    pub fn new(root: impl Into<PathBuf>, descriptor: WorkloadDescriptor) -> Self {
        Self {
            root: root.into(),
            descriptor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor(&self) -> &WorkloadDescriptor {
        &self.descriptor
    }

    pub fn search_patterns(&self) -> &[String] {
        &self.descriptor.search_patterns
    }

    /// Repositories of `tier` that exist under the corpus root.
    ///
    /// For [`Tier::All`], directories the descriptor does not name are
    /// appended in name order.
    pub fn discover(&self, tier: Tier) -> Vec<Repo> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut repos: Vec<Repo> = self
            .descriptor
            .names(tier)
            .into_iter()
            .map(|name| Repo::new(name, self.root.join(name)))
            .filter(|repo| repo.path.is_dir())
            .collect();

        if tier == Tier::All {
            let known = self.descriptor.names(Tier::All);
            let mut extra: Vec<Repo> = fs::read_dir(&self.root)
                .into_iter()
                .flatten()
                .flatten()
                .filter(|entry| entry.path().is_dir())
                .map(|entry| Repo::from_path(entry.path()))
                .filter(|repo| !known.contains(&repo.name.as_str()))
                .collect();
            extra.sort_by(|a, b| a.name.cmp(&b.name));
            repos.extend(extra);
        }

        repos
    }

    /// The descriptor's detection repositories that exist on disk.
    pub fn detection_repos(&self) -> Vec<Repo> {
        self.descriptor
            .detection_repos
            .iter()
            .map(|name| Repo::new(name.as_str(), self.root.join(name)))
            .filter(|repo| repo.path.is_dir())
            .collect()
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.contains(&e.to_ascii_lowercase().as_str()))
}

/// Recursively count source-like files, skipping [`SKIP_DIRS`].
pub fn count_source_files(root: &Path) -> usize {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), SOURCE_EXTENSIONS))
        .count()
}

/// Whether a file may receive a generated function: not a declaration
/// file, not a test, not under a test directory.
fn is_mutable_source(root: &Path, path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".d.ts")
        || name.ends_with(".test.ts")
        || name.ends_with(".test.tsx")
        || name.ends_with(".spec.ts")
    {
        return false;
    }
    let rel = path.strip_prefix(root).unwrap_or(path);
    !rel.components().any(|c| {
        matches!(c.as_os_str().to_str(), Some("__tests__") | Some("tests"))
    })
}

fn collect_mutable(root: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, exts) && is_mutable_source(root, p))
        .collect();
    files.sort();
    files
}

/// Source files a detection scenario may append to, in path order.
///
/// TypeScript is preferred; JavaScript is used only when a repository has
/// no eligible TypeScript.
pub fn eligible_source_files(root: &Path) -> Vec<PathBuf> {
    let ts = collect_mutable(root, &["ts", "tsx"]);
    if !ts.is_empty() {
        return ts;
    }
    collect_mutable(root, &["js", "jsx"])
}
