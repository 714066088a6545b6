//! Aggregation, persistence, and text rendering of run results.

use crate::harness::Result;
use crate::schema::{BenchmarkReport, BenchmarkResult, DetectionReport, DetectionResult, TestSummary};
use crate::workload::Repo;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Group results by the first segment of their name, in first-seen order.
pub fn categorize(results: &[BenchmarkResult]) -> Vec<(String, Vec<&BenchmarkResult>)> {
    let mut groups: Vec<(String, Vec<&BenchmarkResult>)> = Vec::new();
    for r in results {
        let cat = r.category();
        match groups.iter().position(|(c, _)| c == cat) {
            Some(i) => groups[i].1.push(r),
            None => groups.push((cat.to_string(), vec![r])),
        }
    }
    groups
}

fn min_max_mean(xs: &[f64]) -> (f64, f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max, xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Summary of the results named `test_name`.
///
/// Timing aggregates cover successful runs only.
pub fn summarize(results: &[DetectionResult], test_name: &str) -> TestSummary {
    let runs: Vec<&DetectionResult> = results.iter().filter(|r| r.test_name == test_name).collect();
    let successful: Vec<&&DetectionResult> = runs.iter().filter(|r| r.success).collect();

    let symbol: Vec<f64> = successful.iter().filter_map(|r| r.symbol_detection_ms).collect();
    let graph: Vec<f64> = successful.iter().filter_map(|r| r.call_graph_detection_ms).collect();
    let (min_s, max_s, avg_s) = min_max_mean(&symbol);
    let (min_g, max_g, avg_g) = min_max_mean(&graph);

    TestSummary {
        test_name: test_name.to_string(),
        runs: runs.len(),
        successes: successful.len(),
        failures: runs.len() - successful.len(),
        avg_symbol_detection_ms: avg_s,
        min_symbol_detection_ms: min_s,
        max_symbol_detection_ms: max_s,
        avg_call_graph_detection_ms: avg_g,
        min_call_graph_detection_ms: min_g,
        max_call_graph_detection_ms: max_g,
        call_graph_success_rate: if successful.is_empty() {
            0.0
        } else {
            graph.len() as f64 / successful.len() as f64
        },
    }
}

/// One summary per distinct test name, in first-seen order.
pub fn summarize_all(results: &[DetectionResult]) -> Vec<TestSummary> {
    let mut names: Vec<&str> = Vec::new();
    for r in results {
        if !names.contains(&r.test_name.as_str()) {
            names.push(&r.test_name);
        }
    }
    names.into_iter().map(|n| summarize(results, n)).collect()
}

pub fn detection_report(results: Vec<DetectionResult>, repos: &[Repo]) -> DetectionReport {
    let summaries = summarize_all(&results);
    DetectionReport {
        results,
        summaries,
        timestamp: chrono::Local::now().to_rfc3339(),
        repos_tested: repos
            .iter()
            .filter(|r| r.path.exists())
            .map(|r| r.path.display().to_string())
            .collect(),
    }
}

/// Write `value` as pretty JSON to `out`, or to `<dir>/<prefix>_<timestamp>.json`.
pub fn write_report<T: Serialize>(dir: &Path, prefix: &str, value: &T, out: Option<&Path>) -> Result<PathBuf> {
    let path = match out {
        Some(p) => p.to_path_buf(),
        None => {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("{prefix}_{stamp}.json"))
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json)?;
    info!(path = %path.display(), "report written");
    Ok(path)
}

/// Newest `<prefix>_*.json` in `dir`, by name.
pub fn latest_report(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let head = format!("{prefix}_");
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&head))
        })
        .max()
}

/// A report read back from disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SavedReport {
    Benchmark(BenchmarkReport),
    Detection(DetectionReport),
}

impl SavedReport {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn render(&self) -> String {
        match self {
            Self::Benchmark(r) => render_benchmark_summary(r),
            Self::Detection(r) => render_detection_summary(r),
        }
    }
}

pub fn render_benchmark_summary(report: &BenchmarkReport) -> String {
    let mut s = String::new();
    let ctx = &report.context;
    let _ = writeln!(
        s,
        "{} | {} | {} cpus | {:.1} GB | {} {}",
        ctx.date, ctx.host_name, ctx.num_cpus, ctx.memory_gb, ctx.os, ctx.os_version
    );
    for (cat, members) in categorize(&report.benchmarks) {
        let _ = writeln!(s, "\n[{cat}]");
        for r in members {
            let status = match &r.error {
                None => "OK".to_string(),
                Some(e) => format!("ERR {e}"),
            };
            let rate = if r.items_per_second > 0.0 {
                format!("{:>10.1}/s", r.items_per_second)
            } else {
                format!("{:>12}", "-")
            };
            let _ = writeln!(
                s,
                "  {:<48} {:>10.1} ms  x{:<4} {rate}  {status}",
                r.name,
                r.real_time * 1000.0,
                r.iterations
            );
        }
    }
    s
}

pub fn render_detection_summary(report: &DetectionReport) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "{} | repos: {}", report.timestamp, report.repos_tested.join(", "));
    for t in &report.summaries {
        let _ = writeln!(s, "\n{}", t.test_name);
        let _ = writeln!(s, "  Runs: {} | Success: {} | Fail: {}", t.runs, t.successes, t.failures);
        if t.avg_symbol_detection_ms > 0.0 {
            let _ = writeln!(
                s,
                "  Symbol detection: avg={:.0}ms min={:.0}ms max={:.0}ms",
                t.avg_symbol_detection_ms, t.min_symbol_detection_ms, t.max_symbol_detection_ms
            );
        }
        if t.avg_call_graph_detection_ms > 0.0 {
            let _ = writeln!(
                s,
                "  Call graph:       avg={:.0}ms min={:.0}ms max={:.0}ms",
                t.avg_call_graph_detection_ms, t.min_call_graph_detection_ms, t.max_call_graph_detection_ms
            );
            let _ = writeln!(s, "  Call graph success rate: {:.0}%", t.call_graph_success_rate * 100.0);
        }
    }
    s
}
