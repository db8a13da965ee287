use crate::benchmark::RawResults;
use crate::corpus::Corpus;
use crate::error::{BenchError, Result};
use crate::executor::Sample;
use crate::level::Level;
use serde::Serialize;
use tracing::warn;

/// min/avg/max/stddev over the trimmed samples of one measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub stddev: f64,
}

/// Sorts ascending and drops the `trim` largest values.
pub fn trim_worst(samples: &[f64], trim: usize) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.truncate(sorted.len().saturating_sub(trim));
    sorted
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation around a precomputed mean. Zero for fewer than
/// two values.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

pub fn summarize(values: &[f64]) -> TimeStats {
    if values.is_empty() {
        return TimeStats::default();
    }
    let avg = mean(values);
    TimeStats {
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        avg,
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        stddev: stddev(values, avg),
    }
}

/// Aggregated results of one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: Level,
    pub comp_size: u64,
    pub orig_size: u64,
    pub comp_pct: f64,
    pub comp: TimeStats,
    pub decomp: TimeStats,
    /// Sum of the trimmed compression times
    pub comp_time_sum: f64,
    /// Sum of the trimmed decompression times
    pub decomp_time_sum: f64,
    pub size_mismatches: usize,
    pub integrity_failures: usize,
}

/// Average compression ratio and per-run times over a set of levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub comp_pct: f64,
    pub comp_time: f64,
    pub decomp_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub all: Aggregate,
    /// Same as `all` without the first (level 0) row
    pub excluding_baseline: Option<Aggregate>,
    pub comp_time_total: f64,
    pub decomp_time_total: f64,
    pub comp_size_total: u64,
    pub orig_size_total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub runs: usize,
    pub trim: usize,
    pub levels: Vec<LevelStats>,
    pub totals: Totals,
}

impl Report {
    pub fn integrity_failures(&self) -> usize {
        self.levels.iter().map(|l| l.integrity_failures).sum()
    }
}

#[derive(Default)]
struct Running {
    levels: usize,
    comp_pct: f64,
    comp_time: f64,
    decomp_time: f64,
}

impl Running {
    fn add(&mut self, stats: &LevelStats) {
        self.levels += 1;
        self.comp_pct += stats.comp_pct;
        self.comp_time += stats.comp_time_sum;
        self.decomp_time += stats.decomp_time_sum;
    }

    fn average(&self, per_level: usize) -> Aggregate {
        let samples = (self.levels * per_level) as f64;
        Aggregate {
            comp_pct: self.comp_pct / self.levels as f64,
            comp_time: self.comp_time / samples,
            decomp_time: self.decomp_time / samples,
        }
    }
}

/// Aggregates one level's samples: trims compress and decompress times
/// independently and checks that the compressed size never changed.
pub fn level_stats(level: Level, samples: &[Sample], orig_size: u64, trim: usize) -> LevelStats {
    let mut comp_size: Option<u64> = None;
    let mut size_mismatches = 0;
    for sample in samples {
        match comp_size {
            Some(expected) if expected != sample.comp_size => {
                warn!(
                    %level,
                    "size changed between runs. Expected: {} Got: {}",
                    expected, sample.comp_size
                );
                size_mismatches += 1;
            }
            _ => {}
        }
        comp_size = Some(sample.comp_size);
    }
    let comp_size = comp_size.unwrap_or_default();

    let comp_times: Vec<f64> = samples.iter().map(|s| s.comp_time).collect();
    let decomp_times: Vec<f64> = samples.iter().map(|s| s.decomp_time).collect();
    let comp_times = trim_worst(&comp_times, trim);
    let decomp_times = trim_worst(&decomp_times, trim);

    let comp_pct = if orig_size > 0 {
        comp_size as f64 * 100.0 / orig_size as f64
    } else {
        0.0
    };

    LevelStats {
        level,
        comp_size,
        orig_size,
        comp_pct,
        comp: summarize(&comp_times),
        decomp: summarize(&decomp_times),
        comp_time_sum: comp_times.iter().sum(),
        decomp_time_sum: decomp_times.iter().sum(),
        size_mismatches,
        integrity_failures: samples.iter().filter(|s| s.integrity_failed).count(),
    }
}

/// Builds the report for a finished session. The secondary aggregate
/// leaves out the first level and is only computed when `has_baseline`.
pub fn aggregate(raw: &RawResults, corpus: &Corpus, trim: usize, has_baseline: bool) -> Result<Report> {
    let runs = raw.runs();
    if trim >= runs {
        return Err(BenchError::Config(format!(
            "cannot trim {} of {} runs",
            trim, runs
        )));
    }
    let per_level = runs - trim;

    let mut levels = Vec::with_capacity(raw.levels().len());
    let mut all = Running::default();
    let mut rest = Running::default();
    let mut comp_size_total = 0;
    let mut orig_size_total = 0;

    for (index, level) in raw.levels().iter().enumerate() {
        let entry = corpus
            .entry(level)
            .ok_or_else(|| BenchError::Config(format!("no corpus entry for level {}", level)))?;
        let stats = level_stats(*level, raw.samples(level), entry.orig_size, trim);

        all.add(&stats);
        if index != 0 {
            rest.add(&stats);
        }
        comp_size_total += stats.comp_size;
        orig_size_total += stats.orig_size;
        levels.push(stats);
    }

    if levels.is_empty() {
        return Err(BenchError::Config("no levels to report".to_string()));
    }

    let excluding_baseline = if has_baseline && rest.levels > 0 {
        Some(rest.average(per_level))
    } else {
        None
    };

    Ok(Report {
        runs,
        trim,
        totals: Totals {
            all: all.average(per_level),
            excluding_baseline,
            comp_time_total: all.comp_time,
            decomp_time_total: all.decomp_time,
            comp_size_total,
            orig_size_total,
        },
        levels,
    })
}
