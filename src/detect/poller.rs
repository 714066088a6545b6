//! Polls the engine until a new symbol, then its call-graph edge, shows up.
//!
//! ```text
//! WaitingSymbol --match--> WaitingCallGraph --identifier in graph--> Done
//!       |                        |
//!       +------ max_wait --------+--> TimedOut
//! ```
//!
//! The call-graph query needs the identifier recovered from the symbol
//! search, so it is never issued before the symbol is confirmed.

use super::parse::{call_graph_mentions, find_symbol, SymbolHit};
use crate::engine::{Engine, EngineOp};
use crate::error::HarnessError;
use crate::harness::millis;
use crate::schema::{DetectionResult, Operation};
use crate::workload::Repo;
use serde_json::json;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug)]
pub struct PollConfig {
    /// Delay before the first check.
    pub settle: Duration,
    pub interval: Duration,
    pub max_wait: Duration,
    /// `--limit` passed to symbol searches.
    pub search_limit: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            interval: Duration::from_millis(50),
            max_wait: Duration::from_secs(30),
            search_limit: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    WaitingSymbol,
    WaitingCallGraph,
    Done,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitingSymbol => "waiting_symbol",
            Self::WaitingCallGraph => "waiting_call_graph",
            Self::Done => "done",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Search once for `symbol`.
pub fn search_symbol(engine: &dyn Engine, dir: &Path, symbol: &str, limit: usize) -> Option<SymbolHit> {
    let inv = engine.run(&EngineOp::search(symbol, limit), dir);
    if !inv.success {
        return None;
    }
    find_symbol(&inv.output, symbol)
}

/// Query the call graph once for `identifier`.
pub fn call_graph_contains(engine: &dyn Engine, dir: &Path, identifier: &str) -> bool {
    let inv = engine.run(&EngineOp::CallGraph, dir);
    inv.success && call_graph_mentions(&inv.output, identifier)
}

pub struct DetectionPoller<'a> {
    engine: &'a dyn Engine,
    config: PollConfig,
}

impl<'a> DetectionPoller<'a> {
    pub fn new(engine: &'a dyn Engine, config: PollConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll for `symbol` in `repo`; elapsed times are measured from the call.
    pub fn poll(&self, repo: &Repo, symbol: &str, track_call_graph: bool) -> DetectionResult {
        let start = Instant::now();
        let mut state = PollState::WaitingSymbol;
        let mut poll_count: u32 = 0;
        let mut symbol_ms = None;
        let mut call_graph_ms = None;
        let mut identifier: Option<String> = None;
        let mut skipped: Option<HarnessError> = None;

        thread::sleep(self.config.settle);

        loop {
            if start.elapsed() > self.config.max_wait {
                state = PollState::TimedOut;
                break;
            }
            poll_count += 1;
            let elapsed_ms = millis(start.elapsed());

            if state == PollState::WaitingSymbol {
                if let Some(hit) =
                    search_symbol(self.engine, &repo.path, symbol, self.config.search_limit)
                {
                    symbol_ms = Some(elapsed_ms);
                    identifier = hit.identifier;
                    state = if !track_call_graph {
                        PollState::Done
                    } else if identifier.is_none() {
                        let err = HarnessError::ParseFailure {
                            expected: format!("identifier for {symbol}"),
                        };
                        warn!(repo = %repo.name, error = %err, "call-graph confirmation disabled");
                        skipped = Some(err);
                        PollState::Done
                    } else {
                        PollState::WaitingCallGraph
                    };
                    debug!(repo = %repo.name, symbol, elapsed_ms, "symbol detected");
                }
            }

            if state == PollState::WaitingCallGraph {
                if let Some(id) = identifier.as_deref() {
                    if call_graph_contains(self.engine, &repo.path, id) {
                        call_graph_ms = Some(elapsed_ms);
                        state = PollState::Done;
                        debug!(repo = %repo.name, symbol, elapsed_ms, "call graph updated");
                    }
                }
            }

            if state.is_terminal() {
                break;
            }
            thread::sleep(self.config.interval);
        }

        let total_ms = millis(start.elapsed());
        if state == PollState::TimedOut {
            debug!(repo = %repo.name, symbol, poll_count, "detection timed out");
        }

        let mut result = DetectionResult::new("poll_detection", &repo.name, Operation::Poll)
            .with_symbol(symbol_ms.is_some(), symbol_ms)
            .with_call_graph(call_graph_ms)
            .with_metadata(json!({
                "symbol_name": symbol,
                "symbol_hash": identifier,
                "final_state": state.as_str(),
            }));
        if let Some(err) = skipped {
            result = result.with_metadata(json!({ "call_graph_skipped": err.to_string() }));
        }
        result.total_time_ms = total_ms;
        result.poll_count = poll_count;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scratch_repo, symbol_hash, FakeEngine};
    use std::fs;

    fn fast() -> PollConfig {
        PollConfig {
            settle: Duration::from_millis(1),
            interval: Duration::from_millis(2),
            max_wait: Duration::from_millis(500),
            search_limit: 50,
        }
    }

    #[test]
    fn test_detects_symbol_then_call_graph() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            search_lag: 2,
            graph_lag: 3,
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));

        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "existing0", true);
        assert!(r.success);
        assert!(r.symbol_detected);
        assert!(r.call_graph_detected);
        assert!(r.is_consistent());
        // Two empty searches, then one search plus four graph queries.
        assert_eq!(r.poll_count, 6);
        assert_eq!(engine.calls("search-symbols"), 3);
        assert_eq!(engine.calls("get-call-graph"), 4);
        assert_eq!(r.metadata["symbol_hash"], symbol_hash("existing0"));
        assert_eq!(r.metadata["final_state"], "done");
    }

    #[test]
    fn test_call_graph_never_queried_before_symbol() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            search_lag: 5,
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));

        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "existing0", true);
        assert!(r.success);
        assert_eq!(engine.calls("search-symbols"), 6);
        // First graph query happens in the same iteration the symbol appears.
        assert_eq!(engine.calls("get-call-graph"), 1);
        assert_eq!(r.poll_count, 6);
    }

    #[test]
    fn test_without_call_graph_tracking() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine::new();
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));

        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "existing0", false);
        assert!(r.success);
        assert!(!r.call_graph_detected);
        assert_eq!(r.call_graph_detection_ms, None);
        assert_eq!(engine.calls("get-call-graph"), 0);
        assert_eq!(r.poll_count, 1);
    }

    #[test]
    fn test_missing_identifier_disables_call_graph() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            hide_hashes: true,
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));

        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "existing0", true);
        assert!(r.success);
        assert!(!r.call_graph_detected);
        assert_eq!(engine.calls("get-call-graph"), 0);
        assert!(r.metadata["call_graph_skipped"]
            .as_str()
            .unwrap()
            .contains("existing0"));
    }

    #[test]
    fn test_structured_output_is_used() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            json_output: true,
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));

        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "existing0", true);
        assert!(r.call_graph_detected);
    }

    #[test]
    fn test_timeout_is_bounded() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            search_delay: Duration::from_millis(5),
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));
        let cfg = PollConfig {
            max_wait: Duration::from_millis(150),
            interval: Duration::from_millis(20),
            ..fast()
        };

        let r = DetectionPoller::new(&engine, cfg).poll(&repo, "neverAdded", true);
        assert!(!r.success);
        assert!(!r.symbol_detected);
        assert_eq!(r.metadata["final_state"], "timed_out");
        assert!(r.poll_count >= 1);
        // max_wait + one interval + one check, with scheduling slack.
        assert!(r.total_time_ms < 150.0 + 20.0 + 5.0 + 250.0);
        assert!(r.total_time_ms >= 150.0);
    }

    #[test]
    fn test_timeout_keeps_partial_symbol_detection() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine {
            graph_lag: usize::MAX,
            ..FakeEngine::new()
        };
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));
        let cfg = PollConfig {
            max_wait: Duration::from_millis(60),
            ..fast()
        };

        let r = DetectionPoller::new(&engine, cfg).poll(&repo, "existing0", true);
        assert!(r.success);
        assert!(!r.call_graph_detected);
        assert_eq!(r.call_graph_detection_ms, None);
        assert!(r.is_consistent());
        assert_eq!(r.metadata["final_state"], "timed_out");
    }

    #[test]
    fn test_newly_written_symbol_appears_after_reindex() {
        let (_tmp, repo) = scratch_repo(1);
        let engine = FakeEngine::new();
        fs::write(
            repo.path.join("src/fresh.ts"),
            "export function freshSymbol() { return 1; }\n",
        )
        .unwrap();
        engine.invoke(&EngineOp::index(), &repo.path, Duration::from_secs(1));
        let r = DetectionPoller::new(&engine, fast()).poll(&repo, "freshSymbol", true);
        assert!(r.success && r.call_graph_detected);
    }
}
