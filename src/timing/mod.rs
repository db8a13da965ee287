use crate::error::{BenchError, Result};
use crate::process::quote_path;
use crate::tuning::{Capabilities, Priority, PERF_PATH, TIME_PATH};
use std::fs;
use std::path::Path;

const PROFILER_SUFFIX: &str = "seconds user";

/// Layout of a timing artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `perf stat` report, one line ends in "seconds user"
    Profiler,
    /// A single number on the first line, as written by `time -f %U`
    WallClock,
}

/// Reads the elapsed time from a timing artifact.
pub fn extract<P: AsRef<Path>>(path: P, format: TimeFormat) -> Result<f64> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    match format {
        TimeFormat::Profiler => parse_profiler(&content, path),
        TimeFormat::WallClock => parse_wall_clock(&content, path),
    }
}

fn parse_profiler(content: &str, path: &Path) -> Result<f64> {
    for line in content.lines() {
        if let Some(value) = line.trim_end().strip_suffix(PROFILER_SUFFIX) {
            return parse_value(value, path);
        }
    }
    Ok(0.0)
}

fn parse_wall_clock(content: &str, path: &Path) -> Result<f64> {
    let first = content.lines().next().unwrap_or_default();
    parse_value(first, path)
}

fn parse_value(value: &str, path: &Path) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| BenchError::TimeParse {
        path: path.to_path_buf(),
        value: value.trim().to_string(),
    })
}

/// How compress/decompress commands are timed. Chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingStrategy {
    /// `perf stat` user-space cpu-clock, optionally skipping tool startup
    Profiler { start_delay_ms: u32 },
    /// `/usr/bin/time` user time
    TimeTool,
    /// No external timer available: wall-clock delta around the command
    Direct,
}

impl TimingStrategy {
    /// Picks the best timer the host offers.
    pub fn select(use_perf: bool, start_delay_ms: u32, caps: &Capabilities) -> Self {
        if use_perf && caps.perf {
            TimingStrategy::Profiler { start_delay_ms }
        } else if caps.time {
            TimingStrategy::TimeTool
        } else {
            TimingStrategy::Direct
        }
    }

    /// Artifact format to parse, `None` when timing is measured directly.
    pub fn format(&self) -> Option<TimeFormat> {
        match self {
            TimingStrategy::Profiler { .. } => Some(TimeFormat::Profiler),
            TimingStrategy::TimeTool => Some(TimeFormat::WallClock),
            TimingStrategy::Direct => None,
        }
    }

    /// Builds the prefix placed in front of every benchmarked command.
    pub fn command_prefix(&self, priority: Priority, timefile: &Path) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(p) = priority.prefix() {
            parts.push(p.to_string());
        }

        match self {
            TimingStrategy::Profiler { start_delay_ms } => {
                parts.push(format!(
                    "{} stat -D {} -e cpu-clock:u -o {} --",
                    PERF_PATH,
                    start_delay_ms,
                    quote_path(timefile)?
                ));
            }
            TimingStrategy::TimeTool => {
                parts.push(format!("{} -o {} -f '%U' --", TIME_PATH, quote_path(timefile)?));
            }
            TimingStrategy::Direct => {}
        }
        Ok(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PERF_REPORT: &str = "# started on Mon Jan  6 10:00:00 2025

 Performance counter stats for './minigzip -6 -c testfile':

            812.41 msec cpu-clock:u               #    0.998 CPUs utilized

       0.813729370 seconds time elapsed

       0.792813000 seconds user
       0.019873000 seconds sys";

    fn artifact(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn profiler_report_yields_user_seconds() {
        let file = artifact(PERF_REPORT);
        let t = extract(file.path(), TimeFormat::Profiler).unwrap();
        assert!((t - 0.792813).abs() < 1e-9);
    }

    #[test]
    fn profiler_line_without_trailing_newline() {
        let file = artifact("preamble\n 1.5 seconds user");
        assert_eq!(extract(file.path(), TimeFormat::Profiler).unwrap(), 1.5);
    }

    #[test]
    fn profiler_report_without_user_line_is_zero() {
        let file = artifact("nothing to see\n0.5 seconds sys\n");
        assert_eq!(extract(file.path(), TimeFormat::Profiler).unwrap(), 0.0);
    }

    #[test]
    fn wall_clock_reads_first_line() {
        let file = artifact("2.37\n");
        assert_eq!(extract(file.path(), TimeFormat::WallClock).unwrap(), 2.37);

        let file = artifact("0.04");
        assert_eq!(extract(file.path(), TimeFormat::WallClock).unwrap(), 0.04);
    }

    #[test]
    fn garbage_value_is_an_error() {
        let file = artifact("Command exited with non-zero status 1\n");
        assert!(matches!(
            extract(file.path(), TimeFormat::WallClock),
            Err(BenchError::TimeParse { .. })
        ));
    }

    #[test]
    fn selection_prefers_perf() {
        let mut caps = Capabilities::default();
        assert_eq!(TimingStrategy::select(true, 0, &caps), TimingStrategy::Direct);

        caps.time = true;
        assert_eq!(TimingStrategy::select(true, 0, &caps), TimingStrategy::TimeTool);

        caps.perf = true;
        assert_eq!(
            TimingStrategy::select(true, 5, &caps),
            TimingStrategy::Profiler { start_delay_ms: 5 }
        );
        assert_eq!(TimingStrategy::select(false, 5, &caps), TimingStrategy::TimeTool);
    }

    #[test]
    fn prefixes() {
        let timefile = Path::new("/tmp/zlib-time.tmp");
        let perf = TimingStrategy::Profiler { start_delay_ms: 0 }
            .command_prefix(Priority::Realtime, timefile)
            .unwrap();
        assert_eq!(
            perf,
            "/usr/bin/chrt -f 99 /usr/bin/perf stat -D 0 -e cpu-clock:u -o /tmp/zlib-time.tmp --"
        );

        let direct = TimingStrategy::Direct.command_prefix(Priority::Normal, timefile).unwrap();
        assert_eq!(direct, "");
    }
}
