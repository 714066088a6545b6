use super::{MAX_QUERY_REPOS, SEARCH_LIMIT};
use crate::engine::{Engine, EngineOp};
use crate::harness::{quantile, round2, timed, BenchConfig, Result, STRESS_WORKERS};
use crate::schema::BenchmarkResult;
use crate::workload::Repo;
use rand::Rng;
use rayon::prelude::*;
use serde_json::json;
use std::cmp::Ordering;
use tracing::info;

pub const NAME: &str = "stress/concurrent_queries";

/// `cfg.stress_queries` random searches on a [`STRESS_WORKERS`]-wide pool.
pub fn run(
    cfg: &BenchConfig,
    engine: &dyn Engine,
    repos: &[Repo],
    patterns: &[String],
) -> Result<BenchmarkResult> {
    run_with(cfg, engine, repos, patterns, STRESS_WORKERS)
}

pub fn run_with(
    cfg: &BenchConfig,
    engine: &dyn Engine,
    repos: &[Repo],
    patterns: &[String],
    concurrency: usize,
) -> Result<BenchmarkResult> {
    let repos = &repos[..repos.len().min(MAX_QUERY_REPOS)];
    if repos.is_empty() || patterns.is_empty() {
        return Ok(BenchmarkResult::failed(NAME, "no repositories or patterns"));
    }

    for repo in repos {
        engine.run(&EngineOp::index(), &repo.path);
    }

    let num_queries = cfg.stress_queries;
    let mut rng = cfg.rng();
    let samples: Vec<(&Repo, &str)> = (0..num_queries)
        .map(|_| {
            let repo = &repos[rng.gen_range(0..repos.len())];
            let pattern = patterns[rng.gen_range(0..patterns.len())].as_str();
            (repo, pattern)
        })
        .collect();
    info!(queries = num_queries, repos = repos.len(), concurrency, "stress batch");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()?;
    let (outcomes, elapsed) = timed(|| {
        pool.install(|| {
            samples
                .par_iter()
                .map(|(repo, pattern)| {
                    let inv = engine.run(&EngineOp::search(*pattern, SEARCH_LIMIT), &repo.path);
                    (inv.elapsed.as_secs_f64() * 1000.0, inv.success)
                })
                .collect::<Vec<_>>()
        })
    });

    let mut latencies: Vec<f64> = outcomes.iter().filter(|(_, ok)| *ok).map(|(ms, _)| *ms).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let successes = latencies.len();
    let failures = num_queries - successes;

    let total = elapsed.as_secs_f64();
    let qps = if total > 0.0 { num_queries as f64 / total } else { 0.0 };
    let avg = if successes > 0 {
        latencies.iter().sum::<f64>() / successes as f64
    } else {
        0.0
    };

    info!(
        total_secs = total,
        qps,
        avg_latency_ms = round2(avg),
        successes,
        failures,
        "stress batch done"
    );

    Ok(BenchmarkResult::measured(NAME, total)
        .with_iterations(num_queries as u64)
        .with_items_per_second(qps)
        .with_metadata(json!({
            "avg_latency_ms": round2(avg),
            "min_latency_ms": round2(latencies.first().copied().unwrap_or(0.0)),
            "max_latency_ms": round2(latencies.last().copied().unwrap_or(0.0)),
            "p50_latency_ms": round2(quantile(&latencies, 0.50)),
            "p95_latency_ms": round2(quantile(&latencies, 0.95)),
            "p99_latency_ms": round2(quantile(&latencies, 0.99)),
            "success_count": successes,
            "failure_count": failures,
            "concurrency": concurrency,
        })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scratch_repo, FakeEngine};
    use std::time::Duration;

    fn patterns() -> Vec<String> {
        vec!["existing".into(), "function".into()]
    }

    #[test]
    fn test_hundred_queries_sixteen_wide() {
        let (_tmp, repo) = scratch_repo(2);
        let engine = FakeEngine {
            search_delay: Duration::from_millis(2),
            ..FakeEngine::new()
        };
        let cfg = BenchConfig {
            stress_queries: 100,
            ..Default::default()
        };

        let r = run(&cfg, &engine, &[repo], &patterns()).unwrap();
        assert_eq!(r.name, NAME);
        assert_eq!(r.iterations, 100);
        assert!((r.items_per_second - 100.0 / r.real_time).abs() < 1e-6);
        let ok = r.metadata["success_count"].as_u64().unwrap();
        let failed = r.metadata["failure_count"].as_u64().unwrap();
        assert_eq!(ok + failed, 100);
        assert_eq!(ok, 100);
        assert_eq!(r.metadata["concurrency"], 16);
        assert_eq!(engine.calls("search-symbols"), 100);
        let p50 = r.metadata["p50_latency_ms"].as_f64().unwrap();
        let p99 = r.metadata["p99_latency_ms"].as_f64().unwrap();
        assert!(p50 <= p99);
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine::new().failing("search-symbols");
        let cfg = BenchConfig {
            stress_queries: 20,
            ..Default::default()
        };
        let r = run_with(&cfg, &engine, &[repo], &patterns(), 4).unwrap();
        assert!(r.is_ok());
        assert_eq!(r.metadata["success_count"], 0);
        assert_eq!(r.metadata["failure_count"], 20);
        assert_eq!(r.metadata["avg_latency_ms"], 0.0);
    }

    #[test]
    fn test_seed_fixes_query_mix() {
        let (_a, mut one) = scratch_repo(1);
        let (_b, mut two) = scratch_repo(1);
        one.name = "one".into();
        two.name = "two".into();
        let repos = [one, two];
        let cfg = BenchConfig {
            stress_queries: 30,
            seed: 7,
            ..Default::default()
        };

        let per_repo = |engine: &FakeEngine| {
            run_with(&cfg, engine, &repos, &patterns(), 1).unwrap();
            engine.searches_in(&repos[0].path)
        };
        let a = FakeEngine::new();
        let b = FakeEngine::new();
        assert_eq!(per_repo(&a), per_repo(&b));
    }

    #[test]
    fn test_empty_inputs() {
        let engine = FakeEngine::new();
        let r = run(&BenchConfig::default(), &engine, &[], &patterns()).unwrap();
        assert!(!r.is_ok());
        assert_eq!(engine.calls("index"), 0);
    }
}
