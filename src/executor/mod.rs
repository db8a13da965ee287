use crate::corpus::{find_file, CorpusEntry};
use crate::error::{BenchError, Result};
use crate::hashing::hash_file;
use crate::level::Level;
use crate::process::{quote_path, CommandRunner, Output};
use crate::timing::{self, TimingStrategy};
use crate::tuning::sync_caches;
use colored::Colorize;
use serde::Serialize;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, warn};

/// Outcome of one level in one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub comp_size: u64,
    pub comp_time: f64,
    pub decomp_time: f64,
    pub integrity_failed: bool,
}

/// Which steps of a level run to perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelOptions {
    pub skip_verify: bool,
    pub skip_decomp: bool,
}

impl LevelOptions {
    fn decompress(&self) -> bool {
        !self.skip_decomp || !self.skip_verify
    }
}

/// Fixed scratch paths reused by every level run of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchFiles {
    pub timefile: PathBuf,
    pub compfile: PathBuf,
    pub decompfile: PathBuf,
}

impl ScratchFiles {
    pub fn new(temp_path: &Path) -> Self {
        ScratchFiles {
            timefile: temp_path.join("zlib-time.tmp"),
            compfile: temp_path.join("zlib-testfil.gz"),
            decompfile: temp_path.join("zlib-testfil.raw"),
        }
    }

    fn paths(&self) -> [&Path; 3] {
        [
            self.compfile.as_path(),
            self.decompfile.as_path(),
            self.timefile.as_path(),
        ]
    }
}

// Removes the scratch files when a level run ends, however it ends
struct ScratchGuard(Vec<PathBuf>);

impl ScratchGuard {
    fn new(scratch: &ScratchFiles) -> Self {
        ScratchGuard(scratch.paths().iter().map(|p| p.to_path_buf()).collect())
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        for path in &self.0 {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("unable to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Everything the executor needs besides the runner.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub tool: PathBuf,
    pub timing: TimingStrategy,
    /// Priority and timer commands placed before the tool
    pub prefix: String,
    pub env: Vec<(String, String)>,
    pub scratch: ScratchFiles,
    /// Independent decompressor, invoked as `<reference> -c <file>`
    pub reference: String,
}

/// Runs compress, decompress and verification for single levels.
pub struct Executor<R: CommandRunner> {
    runner: R,
    settings: ExecutorSettings,
    tool: String,
}

impl<R: CommandRunner> Executor<R> {
    pub fn new(runner: R, settings: ExecutorSettings) -> Result<Self> {
        let tool = quote_path(&settings.tool)?;
        Ok(Executor { runner, settings, tool })
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Benchmarks `level` on `entry`. Subprocess failures are fatal, hash
    /// mismatches are reported through `Sample::integrity_failed`.
    pub fn run_level(&mut self, level: Level, entry: &CorpusEntry, options: LevelOptions) -> Result<Sample> {
        let _guard = ScratchGuard::new(&self.settings.scratch);
        let scratch = self.settings.scratch.clone();
        let input = quote_path(&entry.path)?;
        let compfile = quote_path(&scratch.compfile)?;

        progress(&format!("Testing level {}: ", level));
        sync_caches(&mut self.runner);

        // Compress
        progress(&"c".cyan().to_string());
        let command = self.tool_command(&format!("{} -c {}", level.flag(), input));
        let comp_time = self.timed_run(&command, &scratch.compfile)?;
        let comp_size = fs::metadata(&scratch.compfile)
            .map_err(|e| BenchError::io(&scratch.compfile, e))?
            .len();

        let mut decomp_time = 0.0;
        let mut integrity_failed = false;

        // Decompress
        if options.decompress() {
            progress(&"d".cyan().to_string());
            let command = self.tool_command(&format!("-d -c {}", compfile));
            decomp_time = self.timed_run(&command, &scratch.decompfile)?;

            if !options.skip_verify {
                let ours = hash_file(&scratch.decompfile)?;
                if ours != entry.hash {
                    error!(%level, expected = %entry.hash, actual = %ours, "decompressed output differs from original");
                    integrity_failed = true;
                }
            }
        }

        // Validate using the reference decompressor
        if !options.skip_verify {
            progress(&"v".cyan().to_string());
            let command = format!("{} -c {}", self.settings.reference, compfile);
            self.runner.run(&command, &[], Output::File(&scratch.decompfile), true)?;

            let theirs = hash_file(&scratch.decompfile)?;
            if theirs != entry.hash {
                error!(%level, expected = %entry.hash, actual = %theirs, "reference decompressor output differs from original");
                integrity_failed = true;
            }
        }

        let pct = if entry.orig_size > 0 {
            comp_size as f64 * 100.0 / entry.orig_size as f64
        } else {
            0.0
        };
        let status = if integrity_failed { " FAIL".red().bold().to_string() } else { String::new() };
        println!(
            " {:7.4} {:7.4} {:>15} {:7.3}%{}",
            comp_time,
            decomp_time,
            crate::report::group_thousands(comp_size),
            pct,
            status
        );

        Ok(Sample {
            comp_size,
            comp_time,
            decomp_time,
            integrity_failed,
        })
    }

    fn tool_command(&self, args: &str) -> String {
        if self.settings.prefix.is_empty() {
            format!("{} {}", self.tool, args)
        } else {
            format!("{} {} {}", self.settings.prefix, self.tool, args)
        }
    }

    fn timed_run(&mut self, command: &str, output: &Path) -> Result<f64> {
        let start = Instant::now();
        self.runner.run(command, &self.settings.env, Output::File(output), true)?;
        let elapsed = start.elapsed().as_secs_f64();

        match self.settings.timing.format() {
            Some(format) => timing::extract(&self.settings.scratch.timefile, format),
            None => Ok(elapsed),
        }
    }
}

fn progress(text: &str) {
    print!("{}", text);
    let _ = io::stdout().flush();
}

/// Finds the test tool: the configured path itself, the usual data
/// locations, then `PATH`.
pub fn resolve_tool(tool: &str) -> Result<PathBuf> {
    if let Ok(path) = find_file(tool) {
        return Ok(path);
    }

    let has_separator = Path::new(tool).components().count() > 1;
    if !has_separator {
        if let Some(paths) = env::var_os("PATH") {
            if let Some(found) = env::split_paths(&paths)
                .map(|dir| dir.join(tool))
                .find(|candidate| candidate.is_file())
            {
                return Ok(found);
            }
        }
    }

    Err(BenchError::FileNotFound(tool.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::CatRunner;
    use crate::tuning::Priority;

    struct Fixture {
        dir: tempfile::TempDir,
        entry: CorpusEntry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        fs::write(&input, b"the quick brown fox jumps over the lazy dog").unwrap();
        let entry = CorpusEntry::from_file(input).unwrap();
        Fixture { dir, entry }
    }

    fn executor(dir: &Path, runner: CatRunner) -> Executor<CatRunner> {
        let settings = ExecutorSettings {
            tool: PathBuf::from("/opt/zlib/minigzip"),
            timing: TimingStrategy::Direct,
            prefix: String::new(),
            env: Vec::new(),
            scratch: ScratchFiles::new(dir),
            reference: "gunzip".to_string(),
        };
        Executor::new(runner, settings).unwrap()
    }

    #[test]
    fn full_level_run() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        let sample = exec
            .run_level(Level::Numeric(6), &fx.entry, LevelOptions::default())
            .unwrap();

        assert_eq!(sample.comp_size, fx.entry.orig_size);
        assert!(!sample.integrity_failed);

        let commands = exec.into_runner().commands;
        assert_eq!(
            commands,
            vec![
                "sync".to_string(),
                format!("/opt/zlib/minigzip -6 -c {}", fx.entry.path.display()),
                format!("/opt/zlib/minigzip -d -c {}", fx.dir.path().join("zlib-testfil.gz").display()),
                format!("gunzip -c {}", fx.dir.path().join("zlib-testfil.gz").display()),
            ]
        );
    }

    #[test]
    fn scratch_files_are_removed() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        exec.run_level(Level::Strategy('R'), &fx.entry, LevelOptions::default())
            .unwrap();

        let scratch = ScratchFiles::new(fx.dir.path());
        for path in scratch.paths() {
            assert!(!path.exists(), "{} left behind", path.display());
        }
    }

    #[test]
    fn corrupted_output_marks_sample() {
        let fx = fixture();
        let runner = CatRunner {
            corrupt_decompress: true,
            ..CatRunner::default()
        };
        let mut exec = executor(fx.dir.path(), runner);
        let sample = exec
            .run_level(Level::Numeric(1), &fx.entry, LevelOptions::default())
            .unwrap();
        assert!(sample.integrity_failed);
    }

    #[test]
    fn skip_verify_never_calls_reference() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        let options = LevelOptions {
            skip_verify: true,
            skip_decomp: false,
        };
        exec.run_level(Level::Numeric(3), &fx.entry, options).unwrap();

        let commands = exec.into_runner().commands;
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|c| !c.starts_with("gunzip")));
    }

    #[test]
    fn skip_both_only_compresses() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        let options = LevelOptions {
            skip_verify: true,
            skip_decomp: true,
        };
        let sample = exec.run_level(Level::Numeric(9), &fx.entry, options).unwrap();
        assert_eq!(sample.decomp_time, 0.0);
        assert_eq!(exec.into_runner().commands.len(), 2);
    }

    #[test]
    fn skip_decomp_alone_still_decompresses_for_verification() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        let options = LevelOptions {
            skip_verify: false,
            skip_decomp: true,
        };
        exec.run_level(Level::Numeric(9), &fx.entry, options).unwrap();
        assert_eq!(exec.into_runner().commands.len(), 4);
    }

    #[test]
    fn prefix_goes_before_tool() {
        let fx = fixture();
        let mut exec = executor(fx.dir.path(), CatRunner::default());
        exec.settings.prefix = "/usr/bin/nice -n -20".to_string();
        exec.run_level(
            Level::Numeric(2),
            &fx.entry,
            LevelOptions {
                skip_verify: true,
                skip_decomp: true,
            },
        )
        .unwrap();
        let commands = exec.into_runner().commands;
        assert!(commands[1].starts_with("/usr/bin/nice -n -20 /opt/zlib/minigzip -2 -c "));
    }

    fn timed_executor(dir: &Path, timing: TimingStrategy, reports: &[&str]) -> Executor<CatRunner> {
        let runner = CatRunner {
            time_reports: reports.iter().map(|r| r.to_string()).collect(),
            ..CatRunner::default()
        };
        let mut exec = executor(dir, runner);
        let scratch = ScratchFiles::new(dir);
        exec.settings.prefix = timing.command_prefix(Priority::Normal, &scratch.timefile).unwrap();
        exec.settings.timing = timing;
        exec
    }

    #[test]
    fn times_come_from_perf_report() {
        let fx = fixture();
        let mut exec = timed_executor(
            fx.dir.path(),
            TimingStrategy::Profiler { start_delay_ms: 0 },
            &[
                " Performance counter stats:\n\n       0.250000000 seconds user\n       0.010000000 seconds sys\n",
                "\n       0.500000000 seconds user",
            ],
        );
        let sample = exec
            .run_level(Level::Numeric(6), &fx.entry, LevelOptions::default())
            .unwrap();

        assert_eq!(sample.comp_time, 0.25);
        assert_eq!(sample.decomp_time, 0.5);
        assert!(!sample.integrity_failed);

        let commands = exec.into_runner().commands;
        assert!(commands[1].starts_with("/usr/bin/perf stat -D 0 -e cpu-clock:u -o "));
        assert!(commands[1].contains("-- /opt/zlib/minigzip -6 -c "));
    }

    #[test]
    fn times_come_from_time_tool_output() {
        let fx = fixture();
        let mut exec = timed_executor(fx.dir.path(), TimingStrategy::TimeTool, &["1.75\n", "0.125\n"]);
        let sample = exec
            .run_level(Level::Strategy('h'), &fx.entry, LevelOptions::default())
            .unwrap();

        assert_eq!(sample.comp_time, 1.75);
        assert_eq!(sample.decomp_time, 0.125);
        assert!(!fx.dir.path().join("zlib-time.tmp").exists());
    }

    #[test]
    fn unparsable_time_artifact_is_fatal() {
        let fx = fixture();
        let mut exec = timed_executor(fx.dir.path(), TimingStrategy::TimeTool, &["Command terminated\n"]);
        let err = exec
            .run_level(Level::Numeric(1), &fx.entry, LevelOptions::default())
            .unwrap_err();
        assert!(matches!(err, BenchError::TimeParse { .. }));
    }

    #[test]
    fn unresolvable_tool() {
        assert!(matches!(
            resolve_tool("./no-such-dir/minigzip"),
            Err(BenchError::FileNotFound(_))
        ));
    }
}
