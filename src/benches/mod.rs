//! Throughput benchmark suites.

pub mod stress;

/// `--limit` for benchmark searches.
pub const SEARCH_LIMIT: usize = 20;

/// Query and stress suites use at most this many repositories.
pub const MAX_QUERY_REPOS: usize = 5;
