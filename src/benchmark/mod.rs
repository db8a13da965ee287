use crate::config::{Config, TestTool};
use crate::corpus::Corpus;
use crate::error::{BenchError, Result};
use crate::executor::{resolve_tool, Executor, ExecutorSettings, LevelOptions, Sample, ScratchFiles};
use crate::level::Level;
use crate::process::CommandRunner;
use crate::stats::{self, Report};
use crate::timing::TimingStrategy;
use crate::tuning::{cpu_model, system_info, Capabilities, SystemTuning};
use colored::Colorize;
use rustc_hash::FxHashMap;
use tracing::{error, info, warn};

/// Samples per level, in run order, plus the order levels were run in.
#[derive(Debug, Clone, Default)]
pub struct RawResults {
    order: Vec<Level>,
    samples: FxHashMap<Level, Vec<Sample>>,
}

impl RawResults {
    pub fn new(levels: &[Level]) -> Self {
        RawResults {
            order: levels.to_vec(),
            samples: levels.iter().map(|level| (*level, Vec::new())).collect(),
        }
    }

    pub fn push(&mut self, level: Level, sample: Sample) {
        if !self.samples.contains_key(&level) {
            self.order.push(level);
        }
        self.samples.entry(level).or_default().push(sample);
    }

    pub fn levels(&self) -> &[Level] {
        &self.order
    }

    pub fn samples(&self, level: &Level) -> &[Sample] {
        self.samples.get(level).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of completed runs: the fewest samples any level has.
    pub fn runs(&self) -> usize {
        self.order
            .iter()
            .map(|level| self.samples(level).len())
            .min()
            .unwrap_or(0)
    }

    pub fn integrity_failures(&self) -> usize {
        self.samples
            .values()
            .flatten()
            .filter(|s| s.integrity_failed)
            .count()
    }
}

/// Runs every level `runs` times. Verification, when enabled, only happens
/// on the first run since the corpus does not change between runs.
pub fn execute<R: CommandRunner>(
    executor: &mut Executor<R>,
    levels: &[Level],
    corpus: &Corpus,
    runs: usize,
    options: LevelOptions,
) -> Result<RawResults> {
    let mut results = RawResults::new(levels);

    for run in 1..=runs {
        let options = LevelOptions {
            skip_verify: options.skip_verify || run != 1,
            ..options
        };

        println!("Starting run {} of {}", run, runs);
        for level in levels {
            let entry = corpus
                .entry(level)
                .ok_or_else(|| BenchError::Config(format!("no corpus entry for level {}", level)))?;

            let sample = executor.run_level(*level, entry, options)?;
            if sample.integrity_failed {
                error!(%level, "failed crc checking");
            }
            results.push(*level, sample);
        }
    }

    Ok(results)
}

/// Runs a whole benchmark session and returns its report.
///
/// Configuration is validated before anything is launched. System tuning is
/// reverted and the corpus removed even when a run fails.
pub fn run_session<R: CommandRunner>(config: &Config, runner: R, caps: &Capabilities) -> Result<Report> {
    config.validate()?;
    let kind = TestTool::from_path(&config.runs.test_tool)?;
    let tool = resolve_tool(&config.runs.test_tool)?;
    info!("Testing {} at {}", kind.name(), tool.display());

    info!("{}", system_info());
    if let Some(cpu) = cpu_model() {
        info!("CPU: {}", cpu);
    }

    let tuning = SystemTuning::new(&config.tuning, caps);
    let timing = TimingStrategy::select(config.general.use_perf, config.general.start_delay, caps);
    if timing == TimingStrategy::Direct {
        warn!("no timing tool found, falling back to wall-clock measurement");
    }

    let scratch = ScratchFiles::new(&config.general.temp_path);
    let prefix = timing.command_prefix(tuning.priority(), &scratch.timefile)?;
    let settings = ExecutorSettings {
        tool,
        timing,
        prefix,
        env: tuning.bench_env(),
        scratch,
        reference: config.general.reference_tool.clone(),
    };
    let mut executor = Executor::new(runner, settings)?;

    let levels = config.runs.levels();
    let corpus = Corpus::prepare(config, &levels)?;

    tuning.enable(executor.runner_mut());
    let options = LevelOptions {
        skip_verify: config.general.skip_verify,
        skip_decomp: config.general.skip_decomp,
    };
    let raw = execute(&mut executor, &levels, &corpus, config.runs.runs, options);
    tuning.disable(executor.runner_mut());
    let raw = raw?;

    let failures = raw.integrity_failures();
    if failures > 0 {
        println!(
            "{}",
            format!("{} sample(s) failed verification", failures).red().bold()
        );
    }

    stats::aggregate(&raw, &corpus, config.runs.trim_worst, config.runs.has_baseline())
}
