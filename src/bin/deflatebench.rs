use clap::{ArgGroup, Parser};
use deflatebench_rs::benchmark::run_session;
use deflatebench_rs::config::{Config, TestMode};
use deflatebench_rs::error::Result;
use deflatebench_rs::process::SystemRunner;
use deflatebench_rs::report::{print_report, write_json};
use deflatebench_rs::tuning::Capabilities;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Benchmarks the compression levels of a deflate tool (minigzip or
/// minideflate) over repeated runs and reports trimmed timing statistics.
#[derive(Parser, Debug)]
#[command(name = "deflatebench", version, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["single", "multi", "gen"])))]
struct Cli {
    /// Number of runs per level
    runs: Option<usize>,

    /// Number of worst runs to discard per level
    trimworst: Option<usize>,

    /// TOML configuration file, merged over the defaults
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Write the default configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    /// Use one test file for every level
    #[arg(long)]
    single: bool,

    /// Use one test file per level
    #[arg(long)]
    multi: bool,

    /// Generate one test file per level from a source file
    #[arg(long)]
    gen: bool,

    #[arg(long, value_name = "N")]
    minlevel: Option<u32>,

    #[arg(long, value_name = "N")]
    maxlevel: Option<u32>,

    /// Strategy flags to run after the numeric levels, e.g. "fhRF"
    #[arg(long, value_name = "S")]
    strategies: Option<String>,

    /// Path to minigzip or minideflate
    #[arg(long, value_name = "PATH")]
    testtool: Option<String>,

    /// Skip output verification
    #[arg(long)]
    skipverify: bool,

    /// Skip decompression timing
    #[arg(long)]
    skipdecomp: bool,

    /// Also write the results as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        let runs = &mut config.runs;
        if let Some(n) = self.runs {
            runs.runs = n;
        }
        if let Some(n) = self.trimworst {
            runs.trim_worst = n;
        }
        if let Some(n) = self.minlevel {
            runs.min_level = n;
        }
        if let Some(n) = self.maxlevel {
            runs.max_level = n;
        }
        if let Some(s) = &self.strategies {
            runs.strategies = s.clone();
        }
        if let Some(tool) = &self.testtool {
            runs.test_tool = tool.clone();
        }
        if self.single {
            runs.test_mode = TestMode::Single;
        } else if self.multi {
            runs.test_mode = TestMode::Multi;
        } else if self.gen {
            runs.test_mode = TestMode::Generate;
        }

        if self.skipverify {
            config.general.skip_verify = true;
        }
        if self.skipdecomp {
            config.general.skip_decomp = true;
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "deflatebench_rs=debug,deflatebench=debug"
    } else {
        "deflatebench_rs=info,deflatebench=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.write_config {
        Config::write_default(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let report = run_session(&config, SystemRunner, &Capabilities::probe())?;

    let levels = config
        .runs
        .levels()
        .iter()
        .map(|level| level.label())
        .collect::<Vec<_>>()
        .join(" ");
    print_report(&report, &levels, config.general.skip_decomp);

    if let Some(path) = &cli.json {
        write_json(&report, path)?;
        info!("Results written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
