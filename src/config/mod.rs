use crate::error::{BenchError, Result};
use crate::level::{level_sequence, Level};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_MULTI_FILES: [&str; 10] = [
    "testfile-500M",
    "testfile-300M",
    "testfile-150M",
    "testfile-125M",
    "testfile-100M",
    "testfile-85M",
    "testfile-75M",
    "testfile-40M",
    "testfile-20M",
    "testfile-20M",
];

// Flags the harness itself passes to the tool
const RESERVED_FLAGS: [char; 2] = ['c', 'd'];

// Generated corpus sizes in MiB for levels 0-9
const DEFAULT_GEN_SIZES: [u64; 10] = [500, 270, 135, 105, 90, 90, 75, 60, 45, 45];

/// How the per-level input files are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// One shared file for every level
    Single,
    /// One existing file per level
    Multi,
    /// One file per level, generated by concatenating a source file
    Generate,
}

/// The compression tools the harness knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTool {
    Minigzip,
    Minideflate,
}

impl TestTool {
    /// Identifies the tool from the file name of a configured tool path.
    pub fn from_path(path: &str) -> Result<Self> {
        let stem = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match stem {
            "minigzip" => Ok(TestTool::Minigzip),
            "minideflate" => Ok(TestTool::Minideflate),
            _ => Err(BenchError::UnsupportedTool(path.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TestTool::Minigzip => "minigzip",
            TestTool::Minideflate => "minideflate",
        }
    }
}

/// `[Testruns]`: what to run and how often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub runs: usize,
    #[serde(rename = "trimworst")]
    pub trim_worst: usize,
    #[serde(rename = "minlevel")]
    pub min_level: u32,
    #[serde(rename = "maxlevel")]
    pub max_level: u32,
    /// Each character is one strategy flag, e.g. "fhRF"
    pub strategies: String,
    #[serde(rename = "testmode")]
    pub test_mode: TestMode,
    #[serde(rename = "testtool")]
    pub test_tool: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            runs: 15,
            trim_worst: 5,
            min_level: 0,
            max_level: 9,
            strategies: String::new(),
            test_mode: TestMode::Single,
            test_tool: "minigzip".to_string(),
        }
    }
}

impl RunSettings {
    /// Levels in execution order.
    pub fn levels(&self) -> Vec<Level> {
        level_sequence(self.min_level, self.max_level, &self.strategies)
    }

    /// The secondary aggregate drops the first level only when it is level 0.
    pub fn has_baseline(&self) -> bool {
        self.min_level == 0
    }
}

/// `[Config]`: measurement behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub temp_path: PathBuf,
    pub use_perf: bool,
    /// Milliseconds of tool startup perf skips before measuring
    pub start_delay: u32,
    #[serde(rename = "skipverify")]
    pub skip_verify: bool,
    #[serde(rename = "skipdecomp")]
    pub skip_decomp: bool,
    /// Independent decompressor used for cross-verification
    pub reference_tool: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        GeneralSettings {
            temp_path: std::env::temp_dir(),
            use_perf: true,
            start_delay: 0,
            skip_verify: false,
            skip_decomp: false,
            reference_tool: "gunzip".to_string(),
        }
    }
}

/// `[Tuning]`: optional system tweaks to reduce variance. Speeds are in MHz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningSettings {
    pub use_chrt: bool,
    pub use_nosync: bool,
    pub use_turboctl: bool,
    pub use_cpupower: bool,
    pub cpu_std_minspeed: u32,
    pub cpu_std_maxspeed: u32,
    pub cpu_bench_speed: u32,
}

impl Default for TuningSettings {
    fn default() -> Self {
        TuningSettings {
            use_chrt: false,
            use_nosync: false,
            use_turboctl: false,
            use_cpupower: false,
            cpu_std_minspeed: 1000,
            cpu_std_maxspeed: 2200,
            cpu_bench_speed: 2000,
        }
    }
}

/// `[Testdata_Single]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCorpusSettings {
    pub testfile: String,
}

impl Default for SingleCorpusSettings {
    fn default() -> Self {
        SingleCorpusSettings {
            testfile: "silesia.tar".to_string(),
        }
    }
}

/// `[Testdata_Multi]`: level label to file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiCorpusSettings {
    pub files: BTreeMap<String, String>,
}

impl Default for MultiCorpusSettings {
    fn default() -> Self {
        let files = DEFAULT_MULTI_FILES
            .iter()
            .enumerate()
            .map(|(level, file)| (level.to_string(), file.to_string()))
            .collect();
        MultiCorpusSettings { files }
    }
}

/// `[Testdata_Gen]`: source file plus level label to minimum size in MiB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenCorpusSettings {
    #[serde(rename = "srcFile")]
    pub src_file: String,
    #[serde(flatten)]
    pub sizes: BTreeMap<String, u64>,
}

impl Default for GenCorpusSettings {
    fn default() -> Self {
        let sizes = DEFAULT_GEN_SIZES
            .iter()
            .enumerate()
            .map(|(level, size)| (level.to_string(), *size))
            .collect();
        GenCorpusSettings {
            src_file: "silesia-small.tar".to_string(),
            sizes,
        }
    }
}

/// Complete benchmark configuration. Built once at startup and only read
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Testruns")]
    pub runs: RunSettings,
    #[serde(rename = "Config")]
    pub general: GeneralSettings,
    #[serde(rename = "Tuning")]
    pub tuning: TuningSettings,
    #[serde(rename = "Testdata_Single")]
    pub single: SingleCorpusSettings,
    #[serde(rename = "Testdata_Multi")]
    pub multi: MultiCorpusSettings,
    #[serde(rename = "Testdata_Gen")]
    pub generated: GenCorpusSettings,
}

impl Config {
    /// Loads the defaults merged with the settings of a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BenchError::ConfigParse { source, .. } => BenchError::ConfigParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Merges a TOML document into the defaults. Keys missing from the
    /// document keep their default value, per section.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(content).map_err(|source| BenchError::ConfigParse {
            path: PathBuf::new(),
            source,
        })?;

        let mut merged = match toml::Value::try_from(Config::default())? {
            toml::Value::Table(table) => table,
            _ => return Err(BenchError::Config("defaults are not a table".to_string())),
        };
        merge_tables(&mut merged, overrides);

        toml::Value::Table(merged)
            .try_into()
            .map_err(|source| BenchError::ConfigParse {
                path: PathBuf::new(),
                source,
            })
    }

    /// Writes the default configuration to a file.
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())?;
        fs::write(path, content).map_err(|e| BenchError::io(path, e))
    }

    /// Rejects settings that would make the benchmark meaningless. Runs
    /// before any subprocess is started.
    pub fn validate(&self) -> Result<()> {
        let runs = &self.runs;
        if runs.runs == 0 {
            return Err(BenchError::Config("runs must be at least 1".to_string()));
        }
        if runs.trim_worst >= runs.runs {
            return Err(BenchError::Config(format!(
                "trimworst ({}) must be lower than runs ({})",
                runs.trim_worst, runs.runs
            )));
        }
        if runs.min_level > runs.max_level {
            return Err(BenchError::Config(format!(
                "minlevel ({}) is above maxlevel ({})",
                runs.min_level, runs.max_level
            )));
        }
        let mut seen = Vec::with_capacity(runs.strategies.len());
        for c in runs.strategies.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(BenchError::Config(format!("invalid strategy '{}'", c)));
            }
            if RESERVED_FLAGS.contains(&c) {
                return Err(BenchError::Config(format!(
                    "strategy '{}' clashes with the tool's -{} option",
                    c, c
                )));
            }
            if seen.contains(&c) {
                return Err(BenchError::Config(format!("strategy '{}' is listed twice", c)));
            }
            seen.push(c);
        }
        TestTool::from_path(&runs.test_tool)?;
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        if let toml::Value::Table(section) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, section);
                continue;
            }
            base.insert(key, toml::Value::Table(section));
        } else {
            base.insert(key, value);
        }
    }
}
