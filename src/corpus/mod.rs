use crate::config::{Config, TestMode};
use crate::error::{BenchError, Result};
use crate::hashing::{hash_file, Digest, BUF_SIZE};
use crate::level::Level;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MIB: u64 = 1024 * 1024;

/// Input file benchmarked for one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusEntry {
    pub path: PathBuf,
    pub hash: Digest,
    pub orig_size: u64,
}

impl CorpusEntry {
    /// Fingerprints an existing file.
    pub fn from_file(path: PathBuf) -> Result<Self> {
        let hash = hash_file(&path)?;
        let orig_size = fs::metadata(&path).map_err(|e| BenchError::io(&path, e))?.len();
        Ok(CorpusEntry { path, hash, orig_size })
    }
}

/// Per-level input files for one session. Files the corpus created itself
/// are removed on `cleanup` or drop.
#[derive(Debug, Default)]
pub struct Corpus {
    entries: FxHashMap<Level, CorpusEntry>,
    owned_files: Vec<PathBuf>,
}

impl Corpus {
    /// Wraps existing entries without taking ownership of their files.
    pub fn from_entries<I: IntoIterator<Item = (Level, CorpusEntry)>>(entries: I) -> Self {
        Corpus {
            entries: entries.into_iter().collect(),
            owned_files: Vec::new(),
        }
    }

    /// Copies or generates the test files for every level into `temp_path`.
    pub fn prepare(config: &Config, levels: &[Level]) -> Result<Self> {
        let temp_path = &config.general.temp_path;
        let mut corpus = Corpus::default();

        match config.runs.test_mode {
            TestMode::Single => {
                // Every level references the same file
                let source = find_file(&config.single.testfile)?;
                let tmp = temp_path.join("deflatebench.tmp");
                copy_file(&source, &tmp)?;
                corpus.owned_files.push(tmp.clone());

                let entry = CorpusEntry::from_file(tmp)?;
                info!(
                    "Activated single file mode: {} {:.1}MiB",
                    source.display(),
                    entry.orig_size as f64 / MIB as f64
                );
                for level in levels {
                    corpus.entries.insert(*level, entry.clone());
                }
            }
            TestMode::Multi => {
                info!("Activated multiple file mode.");
                for level in levels {
                    let name = config.multi.files.get(&level.label()).ok_or_else(|| {
                        BenchError::Config(format!("no test file configured for level {}", level))
                    })?;
                    let source = find_file(name)?;
                    let tmp = level_tempfile(temp_path, level);
                    copy_file(&source, &tmp)?;
                    corpus.owned_files.push(tmp.clone());
                    corpus.entries.insert(*level, CorpusEntry::from_file(tmp)?);
                }
            }
            TestMode::Generate => {
                let source = find_file(&config.generated.src_file)?;
                info!(
                    "Activated multiple generated file mode. Source: {}",
                    source.display()
                );
                for level in levels {
                    let size = config.generated.sizes.get(&level.label()).ok_or_else(|| {
                        BenchError::Config(format!("no generated size configured for level {}", level))
                    })?;
                    let tmp = level_tempfile(temp_path, level);
                    corpus.owned_files.push(tmp.clone());
                    generate_testfile(&source, &tmp, size * MIB)?;
                    corpus.entries.insert(*level, CorpusEntry::from_file(tmp)?);
                }
            }
        }

        Ok(corpus)
    }

    pub fn entry(&self, level: &Level) -> Option<&CorpusEntry> {
        self.entries.get(level)
    }

    /// Removes the files created by `prepare`.
    pub fn cleanup(&mut self) {
        for path in self.owned_files.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("unable to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for Corpus {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn level_tempfile(temp_path: &Path, level: &Level) -> PathBuf {
    temp_path.join(format!("deflatebench-{}.tmp", level))
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    fs::copy(source, dest).map_err(|e| BenchError::io(source, e))?;
    Ok(())
}

/// Looks for a file as given, then in the home directory, then next to the
/// executable and one level above it.
pub fn find_file(name: &str) -> Result<PathBuf> {
    let mut candidates = vec![PathBuf::from(name)];
    if let Some(home) = home_dir() {
        candidates.push(home.join(name));
    }
    if let Some(exe_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(exe_dir.join(name));
        candidates.push(exe_dir.join("..").join(name));
    }

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .map(|path| fs::canonicalize(&path).unwrap_or(path))
        .ok_or_else(|| BenchError::FileNotFound(name.to_string()))
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Writes `source` repeatedly into `dest` until it holds at least `min_size`
/// bytes. The result is always a whole number of copies, at least one.
pub fn generate_testfile(source: &Path, dest: &Path, min_size: u64) -> Result<u64> {
    let src_size = fs::metadata(source).map_err(|e| BenchError::io(source, e))?.len();
    if src_size == 0 {
        return Err(BenchError::EmptySource(source.to_path_buf()));
    }

    let count = min_size.div_ceil(src_size).max(1);
    let dest_size = src_size * count;

    let mut src = File::open(source).map_err(|e| BenchError::io(source, e))?;
    let out = File::create(dest).map_err(|e| BenchError::io(dest, e))?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, out);
    let mut buffer = vec![0u8; BUF_SIZE];

    for _ in 0..count {
        src.seek(SeekFrom::Start(0)).map_err(|e| BenchError::io(source, e))?;
        let mut remaining = src_size;
        while remaining > 0 {
            let want = remaining.min(BUF_SIZE as u64) as usize;
            let n = src.read(&mut buffer[..want]).map_err(|e| BenchError::io(source, e))?;
            if n == 0 {
                // Source shrank while we were reading it
                return Err(BenchError::io(source, io::ErrorKind::UnexpectedEof.into()));
            }
            writer.write_all(&buffer[..n]).map_err(|e| BenchError::io(dest, e))?;
            remaining -= n as u64;
        }
    }
    writer.flush().map_err(|e| BenchError::io(dest, e))?;

    Ok(dest_size)
}
