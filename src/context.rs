//! Best-effort probes for [`BenchmarkContext`].

use crate::engine::run_command;
use crate::schema::BenchmarkContext;
use std::fs;
use std::path::Path;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

impl BenchmarkContext {
    /// Capture the environment. `project_dir` is where the source revision is read.
    pub fn capture(executable: &str, project_dir: &Path) -> Self {
        Self {
            date: chrono::Local::now().to_rfc3339(),
            host_name: host_name(),
            executable: executable.to_string(),
            num_cpus: cpu_count(),
            os: std::env::consts::OS.to_string(),
            os_version: os_release(),
            memory_gb: fs::read_to_string("/proc/meminfo")
                .ok()
                .and_then(|s| parse_meminfo_gb(&s))
                .unwrap_or(0.0),
            git_commit: probe("git", &["rev-parse", "--short", "HEAD"], Some(project_dir)),
            rust_version: probe("rustc", &["--version"], None),
            ..Default::default()
        }
    }
}

pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn probe(program: &str, args: &[&str], cwd: Option<&Path>) -> String {
    let out = run_command(program, args, cwd, PROBE_TIMEOUT);
    if out.success {
        out.stdout.trim().to_string()
    } else {
        String::new()
    }
}

fn host_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    if let Ok(name) = fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    probe("hostname", &[], None)
}

fn os_release() -> String {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| probe("uname", &["-r"], None))
}

/// `MemTotal` from `/proc/meminfo`, in GB rounded to one decimal.
fn parse_meminfo_gb(meminfo: &str) -> Option<f64> {
    let kb: f64 = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()?;
    let gb = kb / 1024.0 / 1024.0;
    Some((gb * 10.0).round() / 10.0)
}
