//! End-to-end sessions against shell-script stand-ins for the deflate tool
//! and the reference decompressor.
#![cfg(unix)]

use deflatebench_rs::benchmark::run_session;
use deflatebench_rs::config::{Config, TestMode};
use deflatebench_rs::error::BenchError;
use deflatebench_rs::process::SystemRunner;
use deflatebench_rs::tuning::Capabilities;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Copies the last argument to stdout, which is all the harness needs from
// both compression and decompression
const CAT_TOOL: &str = "#!/bin/sh\nfor last; do :; done\nexec cat \"$last\"\n";

const CORRUPTING_TOOL: &str = "#!/bin/sh\nfor last; do :; done\ncat \"$last\"\nif [ \"$1\" = \"-d\" ]; then printf '!'; fi\n";

const FAILING_TOOL: &str = "#!/bin/sh\nexit 7\n";

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write script");
    let mut perms = fs::metadata(&path).expect("Failed to stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to chmod script");
    path
}

fn session(tool: &str, reference: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let work = dir.path().join("work");
    fs::create_dir(&work).expect("Failed to create work dir");

    let testfile = dir.path().join("corpus.bin");
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 97) as u8).collect();
    fs::write(&testfile, data).expect("Failed to write corpus");

    let tool = script(dir.path(), "minigzip", tool);
    let reference = script(dir.path(), "reference", reference);

    let mut config = Config::default();
    config.runs.runs = 3;
    config.runs.trim_worst = 1;
    config.runs.min_level = 0;
    config.runs.max_level = 2;
    config.runs.test_mode = TestMode::Single;
    config.runs.test_tool = tool.to_string_lossy().into_owned();
    config.general.temp_path = work;
    config.general.use_perf = false;
    config.general.reference_tool = reference.to_string_lossy().into_owned();
    config.single.testfile = testfile.to_string_lossy().into_owned();

    (dir, config)
}

fn work_dir_is_empty(config: &Config) -> bool {
    fs::read_dir(&config.general.temp_path)
        .expect("Failed to list work dir")
        .next()
        .is_none()
}

#[test]
fn clean_session_reports_every_level() {
    let (_dir, config) = session(CAT_TOOL, "#!/bin/sh\nexec cat \"$2\"\n");
    let report = run_session(&config, SystemRunner, &Capabilities::default()).unwrap();

    assert_eq!(report.runs, 3);
    assert_eq!(report.trim, 1);
    assert_eq!(report.levels.len(), 3);
    assert_eq!(report.integrity_failures(), 0);
    for level in &report.levels {
        assert_eq!(level.comp_size, 50_000);
        assert!((level.comp_pct - 100.0).abs() < 1e-9);
        assert_eq!(level.size_mismatches, 0);
    }
    assert!(report.totals.excluding_baseline.is_some());
    assert!(work_dir_is_empty(&config));
}

#[test]
fn corrupted_output_is_reported_not_fatal() {
    let (_dir, config) = session(CORRUPTING_TOOL, "#!/bin/sh\nexec cat \"$2\"\n");
    let report = run_session(&config, SystemRunner, &Capabilities::default()).unwrap();

    // Verification only happens on the first run
    assert_eq!(report.integrity_failures(), 3);
    assert_eq!(report.levels.len(), 3);
}

#[test]
fn skip_verify_never_touches_reference() {
    let (_dir, mut config) = session(CAT_TOOL, FAILING_TOOL);
    config.general.skip_verify = true;

    let report = run_session(&config, SystemRunner, &Capabilities::default()).unwrap();
    assert_eq!(report.levels.len(), 3);
}

#[test]
fn failing_tool_aborts_the_session() {
    let (_dir, config) = session(FAILING_TOOL, FAILING_TOOL);
    let err = run_session(&config, SystemRunner, &Capabilities::default()).unwrap_err();

    assert!(matches!(err, BenchError::CommandFailed { code: 7, .. }));
    assert!(work_dir_is_empty(&config));
}

#[test]
fn missing_testfile_is_fatal() {
    let (dir, mut config) = session(CAT_TOOL, FAILING_TOOL);
    config.single.testfile = dir.path().join("nope.bin").to_string_lossy().into_owned();

    let err = run_session(&config, SystemRunner, &Capabilities::default()).unwrap_err();
    assert!(matches!(err, BenchError::FileNotFound(_)));
}

#[test]
fn generated_corpus_per_level() {
    let (dir, mut config) = session(CAT_TOOL, "#!/bin/sh\nexec cat \"$2\"\n");
    config.runs.test_mode = TestMode::Generate;
    config.runs.max_level = 1;
    config.generated.src_file = dir.path().join("corpus.bin").to_string_lossy().into_owned();
    config.generated.sizes.insert("0".to_string(), 1);
    config.generated.sizes.insert("1".to_string(), 2);

    let report = run_session(&config, SystemRunner, &Capabilities::default()).unwrap();

    // 1 MiB and 2 MiB rounded up to whole copies of the 50000 byte source
    assert_eq!(report.levels[0].orig_size, 21 * 50_000);
    assert_eq!(report.levels[1].orig_size, 42 * 50_000);
    assert!(work_dir_is_empty(&config));
}
