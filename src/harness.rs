use std::time::{Duration, Instant};

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use crate::error::Result;

/// Worker-pool width for per-pattern search benchmarks.
pub const QUERY_WORKERS: usize = 8;

/// Worker-pool width for the stress batch.
pub const STRESS_WORKERS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Small tier only, first three repositories.
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    /// Cap on how many catalog repositories a run touches.
    pub fn repo_limit(&self) -> Option<usize> {
        match self {
            Profile::Quick => Some(3),
            Profile::Full => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
    /// Sequential iterations per query benchmark unit.
    pub iterations: usize,
    /// Number of queries in the stress batch.
    pub stress_queries: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Full,
            seed: 0,
            iterations: 5,
            stress_queries: 100,
        }
    }
}

impl BenchConfig {
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

/// Summary statistics over a set of successful samples, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; zero with fewer than two samples.
    pub stddev: f64,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let stddev = if n > 1 {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        Some(Self {
            count: n,
            mean,
            min,
            max,
            stddev,
        })
    }
}

/// Nearest-rank quantile over an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Durations (seconds) of the runs of `f` that reported success.
pub fn measure_runs(iterations: usize, mut f: impl FnMut() -> Option<Duration>) -> Vec<f64> {
    let mut times = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        if let Some(d) = f() {
            times.push(d.as_secs_f64());
        }
    }
    times
}

/// Run `f` and return its value with the wall time it took.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
