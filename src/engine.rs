//! Blocking, time-bounded invocation of the indexing engine.
//!
//! Every engine operation is one child process. The caller always gets a
//! [`Invocation`] back; nothing here retries or returns `Err`.

use crate::error::HarnessError;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Output format requested from index operations.
pub const DEFAULT_FORMAT: &str = "toon";

/// Interval between `try_wait` checks on a running child.
const WAIT_TICK: Duration = Duration::from_millis(5);

/// One black-box engine operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOp {
    Index { format: String },
    IncrementalIndex { format: String },
    SearchSymbols { pattern: String, limit: usize },
    Overview,
    CallGraph,
    CacheInfo,
    CacheClear,
}

impl EngineOp {
    pub fn index() -> Self {
        Self::Index {
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    pub fn incremental_index() -> Self {
        Self::IncrementalIndex {
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    pub fn search(pattern: impl Into<String>, limit: usize) -> Self {
        Self::SearchSymbols {
            pattern: pattern.into(),
            limit,
        }
    }

    /// Short label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Index { .. } => "index",
            Self::IncrementalIndex { .. } => "incremental-index",
            Self::SearchSymbols { .. } => "search-symbols",
            Self::Overview => "get-overview",
            Self::CallGraph => "get-call-graph",
            Self::CacheInfo => "cache-info",
            Self::CacheClear => "cache-clear",
        }
    }

    /// Command-line arguments for this operation, excluding `--dir`.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Index { format } => vec!["--shard".into(), "--format".into(), format.clone()],
            Self::IncrementalIndex { format } => vec![
                "--shard".into(),
                "--incremental".into(),
                "--format".into(),
                format.clone(),
            ],
            Self::SearchSymbols { pattern, limit } => vec![
                "--search-symbols".into(),
                pattern.clone(),
                "--limit".into(),
                limit.to_string(),
            ],
            Self::Overview => vec!["--get-overview".into()],
            Self::CallGraph => vec!["--get-call-graph".into()],
            Self::CacheInfo => vec!["--cache-info".into()],
            Self::CacheClear => vec!["--cache-clear".into()],
        }
    }

    pub fn default_timeout(&self) -> Duration {
        let secs = match self {
            Self::Index { .. } => 300,
            Self::IncrementalIndex { .. } => 120,
            Self::SearchSymbols { .. } | Self::Overview | Self::CacheClear => 30,
            Self::CallGraph => 60,
            Self::CacheInfo => 120,
        };
        Duration::from_secs(secs)
    }
}

/// Outcome of one engine call.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub success: bool,
    /// stdout followed by stderr, or `"Timeout"`.
    pub output: String,
    /// Wall time, pinned to the timeout when the call timed out.
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl Invocation {
    pub fn ok(output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            elapsed,
            timed_out: false,
        }
    }

    pub fn failed(output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: output.into(),
            elapsed,
            timed_out: false,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self {
            success: false,
            output: "Timeout".to_string(),
            elapsed: timeout,
            timed_out: true,
        }
    }

    /// The failure of this call in the harness taxonomy, if it failed.
    pub fn error(&self, op: &EngineOp) -> Option<HarnessError> {
        if self.success {
            None
        } else if self.timed_out {
            Some(HarnessError::InvocationTimeout {
                op: op.label().to_string(),
                timeout: self.elapsed,
            })
        } else {
            Some(HarnessError::InvocationFailure {
                op: op.label().to_string(),
                output: truncate(&self.output, 200),
            })
        }
    }
}

/// The engine as seen by the harness.
pub trait Engine: Send + Sync {
    /// Run one operation against `dir`, blocking for at most `timeout`.
    fn invoke(&self, op: &EngineOp, dir: &Path, timeout: Duration) -> Invocation;

    /// Human-readable identity of the engine (recorded in report context).
    fn describe(&self) -> String;

    /// [`Engine::invoke`] with the operation's default timeout.
    fn run(&self, op: &EngineOp, dir: &Path) -> Invocation {
        self.invoke(op, dir, op.default_timeout())
    }
}

/// Engine backed by an executable on disk.
#[derive(Clone, Debug)]
pub struct CliEngine {
    bin: PathBuf,
}

impl CliEngine {
    /// Resolve the executable, failing if it does not exist.
    pub fn locate(bin: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let bin = bin.into();
        if !bin.is_file() {
            return Err(HarnessError::EngineNotFound(bin));
        }
        Ok(Self { bin })
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }
}

impl Engine for CliEngine {
    fn invoke(&self, op: &EngineOp, dir: &Path, timeout: Duration) -> Invocation {
        let mut args: Vec<String> = op.args();
        args.push("--dir".into());
        args.push(dir.to_string_lossy().into_owned());

        debug!(op = op.label(), dir = %dir.display(), "invoking engine");
        let out = run_command(&self.bin, &args, None, timeout);
        if out.timed_out {
            return Invocation::timeout(timeout);
        }
        let combined = out.combined();
        trace!(op = op.label(), success = out.success, elapsed_s = out.elapsed.as_secs_f64(), "engine returned");
        Invocation {
            success: out.success,
            output: combined,
            elapsed: out.elapsed,
            timed_out: false,
        }
    }

    fn describe(&self) -> String {
        self.bin.display().to_string()
    }
}

/// Raw result of [`run_command`].
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + self.stderr.len());
        s.push_str(&self.stdout);
        s.push_str(&self.stderr);
        s
    }
}

/// Spawn `program`, capture both streams, and kill it once `timeout` elapses.
///
/// Launch errors come back as an unsuccessful output whose stderr holds the
/// error text.
pub fn run_command<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    cwd: Option<&Path>,
    timeout: Duration,
) -> CommandOutput {
    let start = Instant::now();

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("failed to launch {}: {e}", program.as_ref().to_string_lossy()),
                elapsed: start.elapsed(),
                timed_out: false,
            }
        }
    };

    // Drain pipes on their own threads so a chatty child cannot block on a full buffer.
    let stdout_handle = child.stdout.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });
    let stderr_handle = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    break child.wait().ok();
                }
                thread::sleep(WAIT_TICK);
            }
            Err(_) => {
                let _ = child.kill();
                break child.wait().ok();
            }
        }
    };
    let elapsed = start.elapsed();

    if timed_out {
        // Grandchildren may still hold the pipes open; leave the readers detached.
        return CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: format!("timed out after {timeout:?}"),
            elapsed,
            timed_out,
        };
    }

    let stdout = stdout_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    CommandOutput {
        success: status.is_some_and(|s| s.success()),
        stdout,
        stderr,
        elapsed,
        timed_out,
    }
}

/// Truncate to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
