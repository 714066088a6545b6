pub mod benches;
pub mod context;
pub mod detect;
pub mod engine;
pub mod error;
pub mod harness;
pub mod logging;
pub mod report;
pub mod schema;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

/// Which benchmark suites a `perf` run includes, chosen by its `--*-only` flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Suite {
    /// Indexing, query, and stress suites.
    #[default]
    All,
    /// Sequential and parallel indexing only.
    Indexing,
    /// Search, overview, and call-graph timings only.
    Queries,
    /// Concurrent query stress batch only.
    Stress,
}

impl Suite {
    pub fn includes(self, other: Suite) -> bool {
        self == Suite::All || self == other
    }
}
