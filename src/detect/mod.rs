//! Change-detection latency: how long after a source change the engine
//! reflects it.

pub mod git;
pub mod guard;
pub mod parse;
pub mod poller;
pub mod scenario;

pub use guard::{BranchGuard, CommitGuard, FileRestoreGuard};
pub use parse::{find_symbol, SymbolHit};
pub use poller::{DetectionPoller, PollConfig, PollState};
pub use scenario::{ScenarioOptions, ScenarioRunner, ScenarioSelection};
