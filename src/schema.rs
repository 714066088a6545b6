use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn default_iterations() -> u64 {
    1
}

fn default_time_unit() -> String {
    "s".to_string()
}

/// One measured operation, laid out like a Google Benchmark entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Slash-separated `category/subject` path.
    pub name: String,
    /// Seconds.
    pub real_time: f64,
    #[serde(default)]
    pub cpu_time: f64,
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default = "default_time_unit")]
    pub time_unit: String,

    #[serde(default)]
    pub items_per_second: f64,
    #[serde(default)]
    pub bytes_per_second: f64,
    #[serde(default)]
    pub memory_peak_mb: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

impl BenchmarkResult {
    pub fn measured(name: impl Into<String>, real_time: f64) -> Self {
        Self {
            name: name.into(),
            real_time,
            cpu_time: 0.0,
            iterations: 1,
            time_unit: default_time_unit(),
            items_per_second: 0.0,
            bytes_per_second: 0.0,
            memory_peak_mb: 0.0,
            error: None,
            metadata: empty_object(),
        }
    }

    /// A result whose numeric fields carry no meaning.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::measured(name, 0.0)
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_items_per_second(mut self, rate: f64) -> Self {
        self.items_per_second = rate;
        self
    }

    /// Merge the keys of `extra` (a JSON object) into the metadata bag.
    pub fn with_metadata(mut self, extra: Value) -> Self {
        if let (Value::Object(dst), Value::Object(src)) = (&mut self.metadata, extra) {
            dst.extend(src);
        }
        self
    }

    /// First path segment of the name.
    pub fn category(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot of the measuring environment, captured once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkContext {
    pub date: String,
    pub host_name: String,
    pub executable: String,
    pub num_cpus: usize,
    #[serde(default)]
    pub mhz_per_cpu: u64,
    #[serde(default)]
    pub cpu_scaling_enabled: bool,
    #[serde(default)]
    pub caches: Vec<Value>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub memory_gb: f64,
    #[serde(default)]
    pub git_commit: String,
    #[serde(default)]
    pub rust_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub context: BenchmarkContext,
    pub benchmarks: Vec<BenchmarkResult>,
}

/// What a detection scenario did to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Poll,
    FileSave,
    GitCommit,
    GitCheckout,
    MultiFileSave,
}

/// One scenario execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub test_name: String,
    pub repo_name: String,
    pub operation: Operation,

    pub total_time_ms: f64,
    pub symbol_detection_ms: Option<f64>,
    pub call_graph_detection_ms: Option<f64>,

    pub symbol_detected: bool,
    pub call_graph_detected: bool,
    pub success: bool,

    pub poll_count: u32,
    pub error: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

impl DetectionResult {
    pub fn new(test_name: &str, repo_name: &str, operation: Operation) -> Self {
        Self {
            test_name: test_name.to_string(),
            repo_name: repo_name.to_string(),
            operation,
            total_time_ms: 0.0,
            symbol_detection_ms: None,
            call_graph_detection_ms: None,
            symbol_detected: false,
            call_graph_detected: false,
            success: false,
            poll_count: 0,
            error: None,
            metadata: empty_object(),
        }
    }

    pub fn failed(
        test_name: &str,
        repo_name: &str,
        operation: Operation,
        total_time_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            total_time_ms,
            error: Some(error.into()),
            ..Self::new(test_name, repo_name, operation)
        }
    }

    /// Record symbol detection; success follows it.
    pub fn with_symbol(mut self, detected: bool, at_ms: Option<f64>) -> Self {
        self.symbol_detected = detected;
        self.success = detected;
        self.symbol_detection_ms = if detected { at_ms } else { None };
        self
    }

    /// Record call-graph detection. Ignored unless the symbol was detected.
    pub fn with_call_graph(mut self, at_ms: Option<f64>) -> Self {
        if !self.symbol_detected {
            return self;
        }
        self.call_graph_detected = at_ms.is_some();
        self.call_graph_detection_ms = at_ms;
        self
    }

    pub fn with_metadata(mut self, extra: Value) -> Self {
        if let (Value::Object(dst), Value::Object(src)) = (&mut self.metadata, extra) {
            dst.extend(src);
        }
        self
    }

    /// `success == symbol_detected`, and call-graph timing never precedes symbol timing.
    pub fn is_consistent(&self) -> bool {
        if self.success != self.symbol_detected {
            return false;
        }
        match self.call_graph_detection_ms {
            None => true,
            Some(cg) => {
                self.call_graph_detected
                    && self.symbol_detection_ms.is_some_and(|sym| cg >= sym)
            }
        }
    }
}

/// Aggregate over the detection results sharing one test name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub test_name: String,
    pub runs: usize,
    pub successes: usize,
    pub failures: usize,

    pub avg_symbol_detection_ms: f64,
    pub min_symbol_detection_ms: f64,
    pub max_symbol_detection_ms: f64,

    pub avg_call_graph_detection_ms: f64,
    pub min_call_graph_detection_ms: f64,
    pub max_call_graph_detection_ms: f64,

    pub call_graph_success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub results: Vec<DetectionResult>,
    pub summaries: Vec<TestSummary>,
    pub timestamp: String,
    pub repos_tested: Vec<String>,
}
