use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use semfora_bench::benches;
use semfora_bench::detect::{PollConfig, ScenarioOptions, ScenarioRunner, ScenarioSelection};
use semfora_bench::engine::{CliEngine, Engine};
use semfora_bench::error::HarnessError;
use semfora_bench::harness::{BenchConfig, Profile};
use semfora_bench::logging::init_logging;
use semfora_bench::report::{self, SavedReport};
use semfora_bench::schema::{BenchmarkContext, BenchmarkReport};
use semfora_bench::workload::{Repo, Tier, WorkloadCatalog, WorkloadDescriptor};
use semfora_bench::Suite;
use std::path::{Path, PathBuf};
use tracing::info;

const PERF_DIR: &str = "target/perf-results";
const REALWORLD_DIR: &str = "target/realworld-results";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Indexing throughput, query latency, and concurrent stress benchmarks.
    Perf {
        #[arg(long, conflicts_with_all = ["queries_only", "stress_only"])]
        indexing_only: bool,

        #[arg(long, conflicts_with = "stress_only")]
        queries_only: bool,

        #[arg(long)]
        stress_only: bool,

        /// Repository size tier (ignored by `--profile quick`, which uses small).
        #[arg(long, value_enum, default_value_t = Tier::All)]
        tier: Tier,

        /// Sequential iterations per query benchmark.
        #[arg(long, default_value_t = 5)]
        iterations: usize,

        /// Queries in the stress batch.
        #[arg(long, default_value_t = 100)]
        queries: usize,

        /// Skip the parallel indexing phase.
        #[arg(long, default_value_t = false)]
        no_parallel: bool,
    },

    /// Change-detection latency against live repositories.
    ///
    /// Every scenario restores the files, commits, and branch it touched.
    Realworld {
        /// Repository to test. Can be provided multiple times; defaults to the
        /// workload's detection repositories.
        #[arg(long, value_name = "PATH", action = clap::ArgAction::Append)]
        repo: Vec<PathBuf>,

        #[arg(long, default_value_t = 3)]
        iterations: usize,

        #[arg(long, conflicts_with = "git_ops_only")]
        file_save_only: bool,

        #[arg(long)]
        git_ops_only: bool,

        /// Files touched by the multi-file scenario.
        #[arg(long, default_value_t = 5)]
        num_files: usize,

        /// Run distinct repositories concurrently.
        #[arg(long, default_value_t = false)]
        parallel_repos: bool,
    },

    /// Print a saved report (newest perf report by default).
    Summarize {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "semfora-bench")]
#[command(about = "Benchmark and change-detection harness for the semfora engine (JSON output)")]
struct Args {
    /// Engine executable.
    #[arg(long, env = "SEMFORA_ENGINE", default_value = "target/release/semfora-engine", global = true)]
    engine: PathBuf,

    /// Directory holding the test repositories.
    #[arg(long, env = "SEMFORA_TEST_REPOS", default_value = "../semfora-test-repos/repos", global = true)]
    repos_dir: PathBuf,

    /// TOML workload descriptor; built-in lists when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    workload: Option<PathBuf>,

    /// Directory for timestamped reports.
    #[arg(long, value_name = "DIR", global = true)]
    out_dir: Option<PathBuf>,

    /// Write the JSON report here instead.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ProfileArg::Full, global = true)]
    profile: ProfileArg,

    /// Seed for the stress query mix.
    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn catalog(args: &Args) -> Result<WorkloadCatalog> {
    let descriptor = match &args.workload {
        Some(path) => WorkloadDescriptor::load(path)?,
        None => WorkloadDescriptor::default(),
    };
    Ok(WorkloadCatalog::new(&args.repos_dir, descriptor))
}

fn context(engine: &dyn Engine) -> BenchmarkContext {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    BenchmarkContext::capture(&engine.describe(), &cwd)
}

fn out_dir<'a>(args: &'a Args, default: &'a str) -> &'a Path {
    args.out_dir.as_deref().unwrap_or_else(|| Path::new(default))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.cmd {
        Command::Perf {
            indexing_only,
            queries_only,
            stress_only,
            tier,
            iterations,
            queries,
            no_parallel,
        } => {
            let engine = CliEngine::locate(&args.engine)?;
            let catalog = catalog(&args)?;
            let cfg = BenchConfig {
                profile: args.profile.into(),
                seed: args.seed,
                iterations: *iterations,
                stress_queries: *queries,
            };
            let suite = if *indexing_only {
                Suite::Indexing
            } else if *queries_only {
                Suite::Queries
            } else if *stress_only {
                Suite::Stress
            } else {
                Suite::All
            };

            let tier = match cfg.profile {
                Profile::Quick => Tier::Small,
                Profile::Full => *tier,
            };
            let mut repos = catalog.discover(tier);
            if let Some(limit) = cfg.profile.repo_limit() {
                repos.truncate(limit);
            }
            if repos.is_empty() {
                return Err(HarnessError::EmptyCorpus(catalog.root().to_path_buf()).into());
            }
            info!(
                profile = cfg.profile.as_str(),
                repos = repos.len(),
                engine = %engine.describe(),
                "performance suite"
            );

            let context = context(&engine);
            let mut benchmarks = Vec::new();
            if suite.includes(Suite::Indexing) {
                benchmarks.extend(benches::indexing::run(&engine, &repos, !*no_parallel)?);
            }
            if suite.includes(Suite::Queries) {
                benchmarks.extend(benches::query::run(&cfg, &engine, &repos, catalog.search_patterns())?);
            }
            if suite.includes(Suite::Stress) {
                benchmarks.push(benches::stress::run(&cfg, &engine, &repos, catalog.search_patterns())?);
            }

            let report = BenchmarkReport { context, benchmarks };
            report::write_report(out_dir(&args, PERF_DIR), "perf", &report, args.out.as_deref())?;
            eprintln!("{}", report::render_benchmark_summary(&report));
        }
        Command::Realworld {
            repo,
            iterations,
            file_save_only,
            git_ops_only,
            num_files,
            parallel_repos,
        } => {
            let engine = CliEngine::locate(&args.engine)?;
            let catalog = catalog(&args)?;
            let repos: Vec<Repo> = if repo.is_empty() {
                catalog.detection_repos()
            } else {
                repo.iter().map(|p| Repo::from_path(p.as_path())).collect()
            };
            if !repos.iter().any(|r| r.path.is_dir()) {
                return Err(HarnessError::EmptyCorpus(catalog.root().to_path_buf()).into());
            }

            let opts = ScenarioOptions {
                iterations: *iterations,
                num_files: *num_files,
                selection: ScenarioSelection {
                    file_save: !*git_ops_only,
                    git_ops: !*file_save_only,
                },
                parallel_repos: *parallel_repos,
            };
            info!(repos = repos.len(), iterations, engine = %engine.describe(), "detection scenarios");

            let runner = ScenarioRunner::new(&engine, PollConfig::default());
            let results = runner.run_all(&repos, &opts);
            let report = report::detection_report(results, &repos);
            report::write_report(out_dir(&args, REALWORLD_DIR), "realworld", &report, args.out.as_deref())?;
            eprintln!("{}", report::render_detection_summary(&report));
        }
        Command::Summarize { file } => {
            let dir = out_dir(&args, PERF_DIR);
            let path = match file {
                Some(p) => p.clone(),
                None => report::latest_report(dir, "perf")
                    .ok_or_else(|| anyhow!("no perf_*.json in {}", dir.display()))?,
            };
            let saved = SavedReport::load(&path)?;
            println!("{}", saved.render());
        }
    }

    Ok(())
}
